//! Kernel client speaking the Jupyter protocol over ZeroMQ
//!
//! Owns the kernel process for its whole life: it is launched in
//! [`KernelClient::launch`] and stopped in [`KernelTransport::shutdown`], and
//! killed on drop if shutdown never ran.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tokio::process::Child;
use tokio::time::{timeout, Instant};
use zeromq::{DealerSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use crate::common::{Error, Result};

use super::launcher::{ConnectionInfo, KernelSpec};
use super::transport::KernelTransport;
use super::types::KernelMessage;
use super::wire::{self, Signer};

/// Delay between connection attempts while the kernel binds its ports
const CONNECT_RETRY: Duration = Duration::from_millis(100);

/// Client for one running kernel
pub struct KernelClient {
    /// Kernel subprocess
    process: Child,
    shell: DealerSocket,
    control: DealerSocket,
    iopub: SubSocket,
    signer: Signer,
    /// Session id stamped on every request
    session: String,
    /// Grace period for the kernel to exit on shutdown
    shutdown_timeout: Duration,
    /// Kept alive so the connection file outlives the kernel's startup
    _connection_file: NamedTempFile,
}

impl KernelClient {
    /// Start a kernel and connect its shell, control and iopub channels
    pub async fn launch(
        spec: &KernelSpec,
        startup_timeout: Duration,
        shutdown_timeout: Duration,
    ) -> Result<Self> {
        let info = ConnectionInfo::allocate()?;
        let connection_file = info.write_temp()?;
        let signer = Signer::new(&info.key)?;

        let mut process = spec.spawn(connection_file.path())?;
        tracing::info!(
            pid = process.id(),
            shell = info.shell_port,
            iopub = info.iopub_port,
            "Kernel process started"
        );

        let deadline = Instant::now() + startup_timeout;
        let shell: DealerSocket =
            connect_with_retry(&info.endpoint(info.shell_port), deadline, &mut process).await?;
        let control: DealerSocket =
            connect_with_retry(&info.endpoint(info.control_port), deadline, &mut process).await?;
        let mut iopub: SubSocket =
            connect_with_retry(&info.endpoint(info.iopub_port), deadline, &mut process).await?;
        iopub.subscribe("").await?;

        Ok(Self {
            process,
            shell,
            control,
            iopub,
            signer,
            session: uuid::Uuid::new_v4().to_string(),
            shutdown_timeout,
            _connection_file: connection_file,
        })
    }

    fn frames(&self, msg: &KernelMessage) -> Result<ZmqMessage> {
        let frames = wire::encode(msg, &self.signer)?;
        ZmqMessage::try_from(frames).map_err(|e| Error::KernelProtocol(e.to_string()))
    }

    /// Fail fast if the kernel process is gone
    fn check_alive(&mut self) -> Result<()> {
        match self.process.try_wait()? {
            Some(status) => {
                tracing::error!(%status, "Kernel process exited");
                Err(Error::KernelDied)
            }
            None => Ok(()),
        }
    }
}

/// Connect a fresh socket, retrying until the kernel has bound the port
async fn connect_with_retry<S: Socket>(
    endpoint: &str,
    deadline: Instant,
    process: &mut Child,
) -> Result<S> {
    loop {
        let mut socket = S::new();
        match socket.connect(endpoint).await {
            Ok(()) => {
                tracing::debug!(endpoint, "Connected to kernel channel");
                return Ok(socket);
            }
            Err(e) => {
                if let Some(status) = process.try_wait()? {
                    return Err(Error::KernelStartFailed(format!(
                        "Kernel exited during startup ({})",
                        status
                    )));
                }
                if Instant::now() >= deadline {
                    return Err(Error::KernelStartFailed(format!(
                        "Could not connect to {}: {}",
                        endpoint, e
                    )));
                }
                tokio::time::sleep(CONNECT_RETRY).await;
            }
        }
    }
}

/// Receive and decode one message, or `None` after `wait` of silence
fn describe_shutdown_reply(reply: &Result<Option<KernelMessage>>, waited: Duration) -> String {
    match reply {
        Ok(Some(message)) => format!("Shutdown acknowledged with {}", message.header.msg_type),
        Ok(None) => format!("No shutdown_reply within {:?}", waited),
        Err(e) => format!("Failed to read shutdown_reply: {}", e),
    }
}

async fn recv_within<S: SocketRecv + Send>(
    socket: &mut S,
    signer: &Signer,
    wait: Duration,
) -> Result<Option<KernelMessage>> {
    match timeout(wait, socket.recv()).await {
        Err(_) => Ok(None),
        Ok(received) => {
            let msg = wire::decode(received?.into_vec(), signer)?;
            tracing::trace!(msg_type = msg.msg_type(), "Kernel message");
            Ok(Some(msg))
        }
    }
}

#[async_trait]
impl KernelTransport for KernelClient {
    async fn send_shell(&mut self, msg_type: &str, content: Value) -> Result<String> {
        self.check_alive()?;
        let msg = KernelMessage::new(&self.session, msg_type, content);
        let frames = self.frames(&msg)?;
        tracing::debug!(msg_type, msg_id = msg.msg_id(), "Shell request");
        self.shell.send(frames).await?;
        Ok(msg.header.msg_id)
    }

    async fn recv_shell(&mut self, wait: Duration) -> Result<Option<KernelMessage>> {
        self.check_alive()?;
        recv_within(&mut self.shell, &self.signer, wait).await
    }

    async fn recv_iopub(&mut self, wait: Duration) -> Result<Option<KernelMessage>> {
        self.check_alive()?;
        recv_within(&mut self.iopub, &self.signer, wait).await
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.process.try_wait()?.is_none() {
            let request = KernelMessage::new(
                &self.session,
                "shutdown_request",
                json!({ "restart": false }),
            );
            let frames = self.frames(&request)?;
            if let Err(e) = self.control.send(frames).await {
                tracing::warn!("Failed to send shutdown_request: {}", e);
            } else {
                // The reply only confirms receipt; the exit below is what matters.
                let reply = recv_within(&mut self.control, &self.signer, self.shutdown_timeout).await;
                tracing::debug!("{}", describe_shutdown_reply(&reply, self.shutdown_timeout));
            }

            match timeout(self.shutdown_timeout, self.process.wait()).await {
                Ok(status) => {
                    let status = status?;
                    tracing::debug!(%status, "Kernel exited");
                }
                Err(_) => {
                    tracing::warn!(
                        "Kernel did not exit within {:?}, killing it",
                        self.shutdown_timeout
                    );
                    self.process.kill().await?;
                }
            }
        }
        Ok(())
    }
}
