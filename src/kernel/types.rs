//! Jupyter message types
//!
//! Only the envelope is typed; message contents stay as JSON values and are
//! picked apart by whoever consumes them.
//! See: https://jupyter-client.readthedocs.io/en/stable/messaging.html

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Messaging protocol version sent in every header
pub const PROTOCOL_VERSION: &str = "5.3";

/// Message header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub msg_id: String,
    pub session: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub date: String,
    pub msg_type: String,
    #[serde(default)]
    pub version: String,
}

impl Header {
    /// Create a fresh header for a message originating in this session
    pub fn new(session: &str, msg_type: &str) -> Self {
        Self {
            msg_id: uuid::Uuid::new_v4().to_string(),
            session: session.to_string(),
            username: std::env::var("USER").unwrap_or_else(|_| "nbdoctest".to_string()),
            date: chrono::Utc::now().to_rfc3339(),
            msg_type: msg_type.to_string(),
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}

/// A complete kernel message
#[derive(Debug, Clone)]
pub struct KernelMessage {
    /// Routing prefix (ZeroMQ identities or the iopub topic)
    pub identities: Vec<Bytes>,
    pub header: Header,
    /// Header of the request this message answers; `{}` when there is none
    pub parent_header: Value,
    pub metadata: Value,
    pub content: Value,
    pub buffers: Vec<Bytes>,
}

impl KernelMessage {
    /// Create a new top-level message
    pub fn new(session: &str, msg_type: &str, content: Value) -> Self {
        Self {
            identities: Vec::new(),
            header: Header::new(session, msg_type),
            parent_header: json!({}),
            metadata: json!({}),
            content,
            buffers: Vec::new(),
        }
    }

    /// Create a message answering `parent`
    pub fn reply_to(parent: &KernelMessage, msg_type: &str, content: Value) -> Self {
        let mut msg = Self::new(&parent.header.session, msg_type, content);
        msg.parent_header = serde_json::to_value(&parent.header).unwrap_or_else(|_| json!({}));
        msg
    }

    pub fn msg_type(&self) -> &str {
        &self.header.msg_type
    }

    pub fn msg_id(&self) -> &str {
        &self.header.msg_id
    }

    /// The `msg_id` of the request this message belongs to, if any
    pub fn parent_msg_id(&self) -> Option<&str> {
        self.parent_header.get("msg_id").and_then(Value::as_str)
    }

    /// `execution_state` of a status message
    pub fn execution_state(&self) -> Option<&str> {
        if self.msg_type() != "status" {
            return None;
        }
        self.content.get("execution_state").and_then(Value::as_str)
    }
}

/// Content of an `execute_request`
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteRequest<'a> {
    pub code: &'a str,
    pub silent: bool,
    pub store_history: bool,
    pub user_expressions: Value,
    pub allow_stdin: bool,
    pub stop_on_error: bool,
}

impl<'a> ExecuteRequest<'a> {
    pub fn new(code: &'a str) -> Self {
        Self {
            code,
            silent: false,
            store_history: true,
            user_expressions: json!({}),
            allow_stdin: false,
            stop_on_error: true,
        }
    }
}
