//! In-memory kernel for exercising the runner without a kernel process
//!
//! Each `execute_request` consumes the next scripted cell and queues the
//! message sequence a real kernel would emit: `status: busy`,
//! `execute_input`, the scripted events, `status: idle` on iopub and an
//! `execute_reply` on shell. An empty queue behaves like a silent channel.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::common::{Error, Result};

use super::transport::KernelTransport;
use super::types::{KernelMessage, PROTOCOL_VERSION};

/// One message the fake kernel publishes on iopub
#[derive(Debug, Clone)]
pub struct IopubEvent {
    pub msg_type: String,
    pub content: Value,
}

impl IopubEvent {
    pub fn new(msg_type: &str, content: Value) -> Self {
        Self {
            msg_type: msg_type.to_string(),
            content,
        }
    }

    pub fn stream(name: &str, text: &str) -> Self {
        Self::new("stream", json!({ "name": name, "text": text }))
    }

    pub fn stdout(text: &str) -> Self {
        Self::stream("stdout", text)
    }

    pub fn execute_result(execution_count: i64, text_plain: &str) -> Self {
        Self::new(
            "execute_result",
            json!({
                "execution_count": execution_count,
                "data": { "text/plain": text_plain },
                "metadata": {}
            }),
        )
    }

    pub fn display_data(data: Value) -> Self {
        Self::new(
            "display_data",
            json!({
                "data": data,
                "metadata": {},
                "transient": { "display_id": uuid::Uuid::new_v4().to_string() }
            }),
        )
    }

    pub fn error(ename: &str, evalue: &str) -> Self {
        Self::new(
            "error",
            json!({
                "ename": ename,
                "evalue": evalue,
                "traceback": [format!("{}: {}", ename, evalue)]
            }),
        )
    }

    pub fn clear_output() -> Self {
        Self::new("clear_output", json!({ "wait": false }))
    }

    pub fn comm_msg() -> Self {
        Self::new("comm_msg", json!({ "comm_id": "c0", "data": {} }))
    }
}

/// What the fake kernel does with one `execute_request`
#[derive(Debug, Clone)]
enum CellScript {
    Outputs(Vec<IopubEvent>),
    SubmitError(String),
    NoReply,
}

/// Scripted in-memory [`KernelTransport`]
#[derive(Debug)]
pub struct FakeKernel {
    session: String,
    scripts: VecDeque<CellScript>,
    shell: VecDeque<KernelMessage>,
    iopub: VecDeque<KernelMessage>,
    executed: Vec<String>,
    shut_down: bool,
    execution_count: i64,
}

impl Default for FakeKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeKernel {
    pub fn new() -> Self {
        Self {
            session: "fake-kernel".to_string(),
            scripts: VecDeque::new(),
            shell: VecDeque::new(),
            iopub: VecDeque::new(),
            executed: Vec::new(),
            shut_down: false,
            execution_count: 0,
        }
    }

    /// Script the outputs of the next executed cell
    pub fn with_cell(mut self, events: Vec<IopubEvent>) -> Self {
        self.scripts.push_back(CellScript::Outputs(events));
        self
    }

    /// Make submitting the next cell fail
    pub fn with_submit_error(mut self, message: &str) -> Self {
        self.scripts.push_back(CellScript::SubmitError(message.to_string()));
        self
    }

    /// Accept the next cell but never answer it
    pub fn with_missing_reply(mut self) -> Self {
        self.scripts.push_back(CellScript::NoReply);
        self
    }

    /// Queue a raw iopub message, e.g. one belonging to another request
    pub fn push_iopub(&mut self, msg: KernelMessage) {
        self.iopub.push_back(msg);
    }

    /// Sources submitted for execution, in order
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn publish(&mut self, parent: &KernelMessage, msg_type: &str, content: Value) {
        self.iopub
            .push_back(KernelMessage::reply_to(parent, msg_type, content));
    }

    fn answer_execute(&mut self, request: &KernelMessage) -> Result<()> {
        let code = request
            .content
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let script = self
            .scripts
            .pop_front()
            .unwrap_or(CellScript::Outputs(Vec::new()));

        let events = match script {
            CellScript::SubmitError(message) => return Err(Error::KernelProtocol(message)),
            CellScript::NoReply => {
                self.executed.push(code);
                return Ok(());
            }
            CellScript::Outputs(events) => events,
        };

        self.execution_count += 1;
        let count = self.execution_count;
        let failed = events.iter().any(|e| e.msg_type == "error");

        self.publish(request, "status", json!({ "execution_state": "busy" }));
        self.publish(
            request,
            "execute_input",
            json!({ "code": code, "execution_count": count }),
        );
        for event in events {
            self.publish(request, &event.msg_type, event.content);
        }
        self.publish(request, "status", json!({ "execution_state": "idle" }));

        let status = if failed { "error" } else { "ok" };
        self.shell.push_back(KernelMessage::reply_to(
            request,
            "execute_reply",
            json!({ "status": status, "execution_count": count }),
        ));
        self.executed.push(code);
        Ok(())
    }
}

#[async_trait]
impl KernelTransport for FakeKernel {
    async fn send_shell(&mut self, msg_type: &str, content: Value) -> Result<String> {
        if self.shut_down {
            return Err(Error::KernelDied);
        }
        let request = KernelMessage::new(&self.session, msg_type, content);
        match msg_type {
            "execute_request" => self.answer_execute(&request)?,
            "kernel_info_request" => {
                self.publish(&request, "status", json!({ "execution_state": "busy" }));
                self.publish(&request, "status", json!({ "execution_state": "idle" }));
                self.shell.push_back(KernelMessage::reply_to(
                    &request,
                    "kernel_info_reply",
                    json!({
                        "status": "ok",
                        "protocol_version": PROTOCOL_VERSION,
                        "implementation": "fake",
                        "language_info": { "name": "python" }
                    }),
                ));
            }
            other => {
                return Err(Error::kernel_request_failed(other, "not supported by FakeKernel"))
            }
        }
        Ok(request.header.msg_id)
    }

    async fn recv_shell(&mut self, _wait: Duration) -> Result<Option<KernelMessage>> {
        Ok(self.shell.pop_front())
    }

    async fn recv_iopub(&mut self, _wait: Duration) -> Result<Option<KernelMessage>> {
        Ok(self.iopub.pop_front())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.shut_down = true;
        self.shell.clear();
        self.iopub.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_emits_full_sequence() {
        let mut kernel = FakeKernel::new().with_cell(vec![IopubEvent::stdout("hi\n")]);
        let msg_id = kernel.execute("print('hi')").await.unwrap();

        let reply = kernel.recv_shell(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(reply.msg_type(), "execute_reply");
        assert_eq!(reply.parent_msg_id(), Some(msg_id.as_str()));

        let mut types = Vec::new();
        while let Some(msg) = kernel.recv_iopub(Duration::ZERO).await.unwrap() {
            assert_eq!(msg.parent_msg_id(), Some(msg_id.as_str()));
            types.push(msg.msg_type().to_string());
        }
        assert_eq!(types, vec!["status", "execute_input", "stream", "status"]);
        assert_eq!(kernel.executed(), &["print('hi')".to_string()]);
    }

    #[tokio::test]
    async fn test_submit_error() {
        let mut kernel = FakeKernel::new().with_submit_error("socket closed");
        let err = kernel.execute("1").await.unwrap_err();
        assert!(err.to_string().contains("socket closed"));
    }

    #[tokio::test]
    async fn test_closed_after_shutdown() {
        let mut kernel = FakeKernel::new();
        kernel.shutdown().await.unwrap();
        assert!(kernel.is_shut_down());
        assert!(matches!(kernel.execute("1").await, Err(Error::KernelDied)));
    }
}
