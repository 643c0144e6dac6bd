use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("{0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("body is null")]
    NullPayload,
}

/// # Inbound Message
///
/// A relay frame. Any JSON value other than `null` is accepted and relayed
/// as-is; only `status` and `message` are looked at.
///
/// `status` is compared numerically: a number, or a string holding one,
/// below zero marks an error report. Floats count (`-1.5`), as do strings
/// (`"-1"`). A missing, `null`, boolean
/// or non-numeric status is not negative, so the frame is only relayed, and
/// a frame that is not an object never carries a status at all.
///
/// An error report without `message` is still persisted, with a NULL message.
/// A non-string `message` is stored as its JSON text.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    payload: Value,
    error_report: bool,
    message: Option<String>,
}

/// `status < 0` with numeric coercion of strings.
fn is_negative(status: &Value) -> bool {
    match status {
        Value::Number(n) => n.as_f64().is_some_and(|v| v < 0.0),
        Value::String(s) => s.trim().parse::<f64>().is_ok_and(|v| v < 0.0),
        _ => false,
    }
}

impl InboundMessage {
    pub fn parse(raw: &str) -> Result<Self, MessageError> {
        let payload: Value = serde_json::from_str(raw)?;
        if payload.is_null() {
            return Err(MessageError::NullPayload);
        }

        let error_report = payload.get("status").is_some_and(is_negative);
        let message = match payload.get("message") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };

        Ok(Self {
            payload,
            error_report,
            message,
        })
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// A negative status marks a machine-side error that must be persisted
    /// before it is relayed.
    pub fn is_error_report(&self) -> bool {
        self.error_report
    }

    /// The payload re-serialized for broadcast.
    pub fn to_wire(&self) -> String {
        self.payload.to_string()
    }
}

/// A frame received on a polling channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// `{"message": "stop"}`: disarm the shared timer.
    Stop,
    /// Any other well-formed JSON. Accepted and ignored.
    Other,
}

impl ControlMessage {
    pub fn parse(raw: &str) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_str(raw)?;
        match value.get("message").and_then(Value::as_str) {
            Some("stop") => Ok(ControlMessage::Stop),
            _ => Ok(ControlMessage::Other),
        }
    }
}
