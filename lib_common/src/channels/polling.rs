use std::sync::Arc;
use std::time::Duration;

use super::message::ControlMessage;
use crate::aggregation::AggregationQueryService;
use crate::configs::Channel;
use crate::core::{ConnectionId, Dispatcher, Outbound, PollingSession, TickFn, TickFuture};
use crate::loggers::{ErrorSink, Severity};

/// # Polling Channel
///
/// Broadcasts today's rollup to the whole channel on a shared timer. The
/// timer is armed by a join while inert and disarmed by a `stop` from any
/// client; it is not disarmed when the last client leaves.
pub struct PollingChannel {
    label: String,
    origin: String,
    dispatcher: Arc<Dispatcher>,
    sink: Arc<dyn ErrorSink>,
    session: Arc<PollingSession>,
}

impl PollingChannel {
    pub fn new(
        channel: &Channel,
        dispatcher: Arc<Dispatcher>,
        rollups: AggregationQueryService,
        sink: Arc<dyn ErrorSink>,
        period: Duration,
    ) -> Self {
        let tick = rollup_tick(channel.origin(), dispatcher.clone(), rollups, sink.clone());
        Self {
            label: channel.label.clone(),
            origin: channel.origin(),
            dispatcher,
            sink,
            session: Arc::new(PollingSession::new(period, tick)),
        }
    }

    pub fn session(&self) -> Arc<PollingSession> {
        self.session.clone()
    }

    pub async fn on_join(&self, id: ConnectionId) {
        if self.session.arm().await {
            tracing::debug!(channel = %self.label, conn = id, "join armed the rollup timer");
        }
    }

    pub async fn on_message(&self, from: ConnectionId, raw: &str) {
        match ControlMessage::parse(raw) {
            Ok(ControlMessage::Stop) => {
                if !self.session.disarm().await {
                    tracing::debug!(channel = %self.label, conn = from, "stop while already inactive");
                }
            }
            Ok(ControlMessage::Other) => {}
            Err(e) => {
                let text = format!("{} invalid json body: {}", self.label, e);
                if !self.dispatcher.send_to(from, Outbound::Text(text)) {
                    tracing::debug!(channel = %self.label, conn = from, "reply target already gone");
                }
                self.sink.report_local(&self.origin, Severity::InvalidValue, &e.to_string());
            }
        }
    }
}

/// One tick: fetch the rollup and broadcast it, or report why not.
fn rollup_tick(
    origin: String,
    dispatcher: Arc<Dispatcher>,
    rollups: AggregationQueryService,
    sink: Arc<dyn ErrorSink>,
) -> TickFn {
    Arc::new(move || -> TickFuture {
        let origin = origin.clone();
        let dispatcher = dispatcher.clone();
        let rollups = rollups.clone();
        let sink = sink.clone();
        Box::pin(async move {
            match rollups.fetch_today_rollup().await {
                Ok(rollup) => match serde_json::to_string(&rollup.rows()) {
                    Ok(text) => {
                        let delivered = dispatcher.broadcast(Outbound::Text(text));
                        tracing::trace!(origin = %origin, delivered, "rollup broadcast");
                    }
                    Err(e) => sink.report_local(&origin, Severity::ServerError, &e.to_string()),
                },
                Err(e) if e.is_connection_unavailable() => {
                    tracing::warn!(origin = %origin, "skipping tick: {}", e);
                    sink.report_local(&origin, Severity::PoolConnectFailed, &e.to_string());
                }
                Err(e) => {
                    tracing::warn!(origin = %origin, "skipping tick: {}", e);
                    sink.report(&origin, Severity::QueryFailed, &e.to_string()).await;
                }
            }
        })
    })
}
