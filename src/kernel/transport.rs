//! Transport seam between the cell runner and a kernel
//!
//! The runner only needs to send shell requests and read the shell and
//! iopub channels with a bounded wait. The real implementation talks
//! ZeroMQ to a kernel process; tests use an in-memory fake.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::common::Result;

use super::types::{ExecuteRequest, KernelMessage};

#[async_trait]
pub trait KernelTransport: Send {
    /// Send a request on the shell channel and return its `msg_id`
    async fn send_shell(&mut self, msg_type: &str, content: Value) -> Result<String>;

    /// Next message on the shell channel, or `None` if nothing arrives within `wait`
    async fn recv_shell(&mut self, wait: Duration) -> Result<Option<KernelMessage>>;

    /// Next message on the iopub channel, or `None` if nothing arrives within `wait`
    async fn recv_iopub(&mut self, wait: Duration) -> Result<Option<KernelMessage>>;

    /// Stop the kernel and release its channels
    async fn shutdown(&mut self) -> Result<()>;

    /// Submit code for execution
    async fn execute(&mut self, code: &str) -> Result<String> {
        let content = serde_json::to_value(ExecuteRequest::new(code))?;
        self.send_shell("execute_request", content).await
    }

    /// Ask the kernel to describe itself
    async fn kernel_info(&mut self) -> Result<String> {
        self.send_shell("kernel_info_request", Value::Object(Default::default()))
            .await
    }
}
