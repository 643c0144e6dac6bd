use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("port {0} is configured more than once")]
    DuplicatePort(u16),

    #[error("channel on port {0} has an empty label")]
    EmptyLabel(u16),
}

/// How a channel treats its traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Rebroadcasts every valid inbound message to the whole channel.
    Relay,
    /// Broadcasts today's rollup on a timer; the only command is `stop`.
    Polling,
}

/// One socket endpoint of the line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// The port the channel listens on; also its identity.
    pub id: u16,
    /// Display name used in logs, error replies and the startup banner.
    pub label: String,
    pub kind: ChannelKind,
}

impl Channel {
    pub fn new(id: u16, label: &str, kind: ChannelKind) -> Self {
        Self {
            id,
            label: label.to_string(),
            kind,
        }
    }

    /// Origin string used when this channel reports to the error sink.
    pub fn origin(&self) -> String {
        format!("{} socket", self.label)
    }
}

/// # Channel Registry
///
/// Immutable map of port to channel. Labels are cosmetic; routing only ever
/// looks at the port and the kind.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    channels: BTreeMap<u16, Channel>,
}

impl ChannelRegistry {
    /// Builds a registry, rejecting duplicate ports and blank labels.
    pub fn new(channels: Vec<Channel>) -> Result<Self, ConfigError> {
        let mut map = BTreeMap::new();
        for channel in channels {
            if channel.label.trim().is_empty() {
                return Err(ConfigError::EmptyLabel(channel.id));
            }
            if map.contains_key(&channel.id) {
                return Err(ConfigError::DuplicatePort(channel.id));
            }
            map.insert(channel.id, channel);
        }
        Ok(Self { channels: map })
    }

    /// The grading line as shipped: two cameras, the encoder, two image
    /// streams and the interval rollup.
    pub fn default_line() -> Self {
        Self {
            channels: default_channels().into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    pub fn get(&self, port: u16) -> Option<&Channel> {
        self.channels.get(&port)
    }

    /// The label for `port`, or `"port <n>"` when it is not configured.
    pub fn label(&self, port: u16) -> String {
        self.channels
            .get(&port)
            .map(|c| c.label.clone())
            .unwrap_or_else(|| format!("port {}", port))
    }

    /// All channels in port order.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn relays(&self) -> impl Iterator<Item = &Channel> {
        self.iter().filter(|c| c.kind == ChannelKind::Relay)
    }

    pub fn pollers(&self) -> impl Iterator<Item = &Channel> {
        self.iter().filter(|c| c.kind == ChannelKind::Polling)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// The default channel table.
pub fn default_channels() -> Vec<Channel> {
    vec![
        Channel::new(4001, "CAM1", ChannelKind::Relay),
        Channel::new(4002, "CAM2", ChannelKind::Relay),
        Channel::new(4003, "Encorder", ChannelKind::Relay),
        Channel::new(4004, "CAM1 IMAGE", ChannelKind::Relay),
        Channel::new(4005, "CAM2 IMAGE", ChannelKind::Relay),
        Channel::new(4006, "Interval", ChannelKind::Polling),
    ]
}
