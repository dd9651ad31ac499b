//! Front-end message bridge
//!
//! Translates JSON messages posted by the embedded web front end into print
//! calls, and produces the matching `printResult` replies:
//!
//! ```json
//! {"type":"print","payloadBase64":"G0AK...","id":42}
//! {"type":"print","payload":"\\x1B\\x40\nHello","encoding":"cp858","id":"a1"}
//! ```
//!
//! Only `print` messages are answered.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::engine::PrintEngine;
use crate::request::{DEFAULT_SCRIPT_ENCODING, ScriptOptions};

/// A message posted by the front end
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Option<String>,
    pub payload_base64: Option<String>,
    pub base64: Option<String>,
    pub encoding: Option<String>,
    /// Echoed back untouched (string or number)
    pub id: Option<Value>,
}

/// Reply to a `print` message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrintReply {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl PrintReply {
    pub fn new(ok: bool, id: Option<Value>) -> Self {
        Self {
            kind: "printResult",
            ok,
            id,
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Handle one raw message; `None` means nothing to send back
pub async fn handle_message(engine: &PrintEngine, raw: &str) -> Option<PrintReply> {
    let message: WebMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Unparseable front-end message");
            return None;
        }
    };
    handle(engine, message).await
}

/// Handle one decoded message
pub async fn handle(engine: &PrintEngine, message: WebMessage) -> Option<PrintReply> {
    if message.kind != "print" {
        debug!(kind = %message.kind, "Ignoring front-end message");
        return None;
    }

    let encoded = non_empty(&message.payload_base64).or(non_empty(&message.base64));

    let result = match (encoded, non_empty(&message.payload)) {
        (Some(base64), _) => engine.print_raw_base64(base64).await,
        (None, Some(script)) => {
            let options = ScriptOptions {
                encoding: non_empty(&message.encoding)
                    .unwrap_or(DEFAULT_SCRIPT_ENCODING)
                    .to_string(),
            };
            engine.print_raw_script(script, &options).await
        }
        (None, None) => {
            warn!(id = ?message.id, "Print message without payload");
            return Some(PrintReply::new(false, message.id));
        }
    };

    match result {
        Ok(_) => {
            info!(id = ?message.id, "Front-end print job done");
            Some(PrintReply::new(true, message.id))
        }
        Err(e) => {
            warn!(id = ?message.id, code = e.code(), error = %e, "Front-end print job failed");
            Some(PrintReply::new(false, message.id))
        }
    }
}
