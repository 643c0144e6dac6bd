//! # Channel Hub
//!
//! Every channel is served by one task that owns its behaviour and consumes
//! an unbounded queue of [`ChannelEvent`]s. Events are handled strictly one at
//! a time, so a broadcast caused by one frame is finished before the next
//! frame on the same channel is looked at. Socket tasks talk to the hub only
//! through a cloneable [`ChannelHandle`].

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::polling::PollingChannel;
use super::relay::RelayChannel;
use crate::aggregation::AggregationQueryService;
use crate::configs::{Channel, ChannelKind};
use crate::connections::QueryExecutor;
use crate::core::{ConnectionId, Dispatcher, Outbound, PollingSession};
use crate::loggers::ErrorSink;

/// Shared collaborators handed to every channel at startup.
#[derive(Clone)]
pub struct ChannelDeps {
    pub executor: Arc<dyn QueryExecutor>,
    pub sink: Arc<dyn ErrorSink>,
    pub rollups: AggregationQueryService,
    /// Tick period of polling channels.
    pub interval: Duration,
}

#[derive(Debug)]
pub enum ChannelEvent {
    Join(ConnectionId),
    Inbound(ConnectionId, String),
    Leave(ConnectionId),
    /// Answered once every earlier event has been handled.
    Settle(oneshot::Sender<()>),
}

enum Behaviour {
    Relay(RelayChannel),
    Polling(PollingChannel),
}

struct ChannelHub {
    label: String,
    dispatcher: Arc<Dispatcher>,
    behaviour: Behaviour,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl ChannelHub {
    async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            match event {
                ChannelEvent::Join(id) => {
                    tracing::debug!(channel = %self.label, conn = id, "connected");
                    if let Behaviour::Polling(polling) = &self.behaviour {
                        polling.on_join(id).await;
                    }
                }
                ChannelEvent::Inbound(id, raw) => match &self.behaviour {
                    Behaviour::Relay(relay) => relay.on_message(id, &raw).await,
                    Behaviour::Polling(polling) => polling.on_message(id, &raw).await,
                },
                ChannelEvent::Leave(id) => {
                    self.dispatcher.remove_member(id);
                    tracing::debug!(channel = %self.label, conn = id, "disconnected");
                }
                ChannelEvent::Settle(done) => {
                    let _ = done.send(());
                }
            }
        }
        tracing::debug!(channel = %self.label, "channel hub stopped");
    }
}

pub struct ChannelServer;

impl ChannelServer {
    /// Starts the hub task for `channel` and returns a handle to it. The hub
    /// runs until every handle is dropped.
    pub fn spawn(channel: Channel, deps: ChannelDeps) -> ChannelHandle {
        let dispatcher = Arc::new(Dispatcher::new());
        let (tx, rx) = mpsc::unbounded_channel();

        let (behaviour, session) = match channel.kind {
            ChannelKind::Relay => (
                Behaviour::Relay(RelayChannel::new(&channel, dispatcher.clone(), deps.executor, deps.sink)),
                None,
            ),
            ChannelKind::Polling => {
                let polling = PollingChannel::new(&channel, dispatcher.clone(), deps.rollups, deps.sink, deps.interval);
                let session = polling.session();
                (Behaviour::Polling(polling), Some(session))
            }
        };

        let hub = ChannelHub {
            label: channel.label.clone(),
            dispatcher: dispatcher.clone(),
            behaviour,
            events: rx,
        };
        tokio::spawn(hub.run());

        ChannelHandle {
            channel: Arc::new(channel),
            events: tx,
            dispatcher,
            session,
        }
    }
}

/// # Channel Handle
///
/// The socket-facing side of a running channel.
#[derive(Clone)]
pub struct ChannelHandle {
    channel: Arc<Channel>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    dispatcher: Arc<Dispatcher>,
    session: Option<Arc<PollingSession>>,
}

impl ChannelHandle {
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Registers a new connection. Frames for it arrive on the returned
    /// receiver until [`leave`](Self::leave) is called, the receiver is
    /// dropped, or the connection falls [`DEFAULT_QUEUE_DEPTH`] frames behind
    /// and is evicted. The receiver yields `None` once that happens.
    ///
    /// [`DEFAULT_QUEUE_DEPTH`]: crate::core::DEFAULT_QUEUE_DEPTH
    pub fn join(&self) -> (ConnectionId, mpsc::Receiver<Outbound>) {
        let (id, rx) = self.dispatcher.add_member();
        self.send(ChannelEvent::Join(id));
        (id, rx)
    }

    /// Queues one inbound text frame from `id`.
    pub fn inbound(&self, id: ConnectionId, raw: impl Into<String>) {
        self.send(ChannelEvent::Inbound(id, raw.into()));
    }

    pub fn leave(&self, id: ConnectionId) {
        self.send(ChannelEvent::Leave(id));
    }

    /// Whether the rollup timer is running. Always `false` for relays.
    pub async fn is_active(&self) -> bool {
        match &self.session {
            Some(session) => session.is_active().await,
            None => false,
        }
    }

    /// Waits until every event queued before this call has been handled.
    pub async fn settled(&self) {
        let (done, wait) = oneshot::channel();
        self.send(ChannelEvent::Settle(done));
        let _ = wait.await;
    }

    pub fn member_count(&self) -> usize {
        self.dispatcher.len()
    }

    fn send(&self, event: ChannelEvent) {
        if self.events.send(event).is_err() {
            tracing::warn!(channel = %self.channel.label, "channel hub is gone, event dropped");
        }
    }
}
