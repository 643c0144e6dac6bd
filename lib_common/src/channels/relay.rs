use std::sync::Arc;

use super::message::InboundMessage;
use crate::configs::Channel;
use crate::connections::{QueryExecutor, SqlValue};
use crate::core::{ConnectionId, Dispatcher, Outbound};
use crate::loggers::{ErrorSink, Severity};

const INSERT_ERROR_SQL: &str = "INSERT INTO error (type, message) VALUES ($1, $2) RETURNING *";

/// # Relay Channel
///
/// Rebroadcasts every valid frame to the whole channel, sender included.
/// Error reports (see [`InboundMessage`]) are written to the `error` table
/// first and are only relayed once that write succeeds.
pub struct RelayChannel {
    label: String,
    origin: String,
    dispatcher: Arc<Dispatcher>,
    executor: Arc<dyn QueryExecutor>,
    sink: Arc<dyn ErrorSink>,
}

impl RelayChannel {
    pub fn new(
        channel: &Channel,
        dispatcher: Arc<Dispatcher>,
        executor: Arc<dyn QueryExecutor>,
        sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self {
            label: channel.label.clone(),
            origin: channel.origin(),
            dispatcher,
            executor,
            sink,
        }
    }

    pub async fn on_message(&self, from: ConnectionId, raw: &str) {
        let msg = match InboundMessage::parse(raw) {
            Ok(msg) => msg,
            Err(e) => {
                self.reply(from, format!("{} invalid json body: {}", self.label, e));
                self.sink.report_local(&self.origin, Severity::InvalidValue, &e.to_string());
                return;
            }
        };

        if msg.is_error_report() && !self.persist(from, &msg).await {
            return;
        }

        let delivered = self.dispatcher.broadcast(Outbound::Text(msg.to_wire()));
        tracing::debug!(channel = %self.label, delivered, "relayed");
    }

    /// Writes the error report. Returns `false` when the frame must not be
    /// relayed.
    async fn persist(&self, from: ConnectionId, msg: &InboundMessage) -> bool {
        let conn = match self.executor.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                self.reply(from, format!("{} database error: {}", self.label, e));
                self.sink.report_local(&self.origin, Severity::PoolConnectFailed, &e.to_string());
                return false;
            }
        };
        let params = [
            SqlValue::from(self.label.as_str()),
            msg.message().map_or(SqlValue::Null, SqlValue::from),
        ];
        let inserted = conn.query(INSERT_ERROR_SQL, &params).await;
        drop(conn);

        match inserted {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(channel = %self.label, "dropping error report, insert failed: {}", e);
                self.sink.report(&self.origin, Severity::QueryFailed, &e.to_string()).await;
                false
            }
        }
    }

    fn reply(&self, to: ConnectionId, text: String) {
        if !self.dispatcher.send_to(to, Outbound::Text(text)) {
            tracing::debug!(channel = %self.label, conn = to, "reply target already gone");
        }
    }
}
