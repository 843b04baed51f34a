//! Kernel process launching
//!
//! A kernel is started the way Jupyter starts one: a connection file naming
//! five loopback ports and a signing key is written to disk, and the
//! kernelspec argv is run with `{connection_file}` substituted.

use std::collections::HashMap;
use std::io::Write;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::process::{Child, Command};

use crate::common::config::{KernelConfig, CONNECTION_FILE_PLACEHOLDER};
use crate::common::{Error, Result};

/// Contents of a kernel connection file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub ip: String,
    pub transport: String,
    pub shell_port: u16,
    pub iopub_port: u16,
    pub stdin_port: u16,
    pub control_port: u16,
    pub hb_port: u16,
    pub key: String,
    pub signature_scheme: String,
    pub kernel_name: String,
}

impl ConnectionInfo {
    /// Pick five free loopback ports and a fresh signing key
    ///
    /// All listeners are held until every port is known so the same port is
    /// never handed out twice.
    pub fn allocate() -> Result<Self> {
        let listeners = (0..5)
            .map(|_| TcpListener::bind("127.0.0.1:0"))
            .collect::<std::io::Result<Vec<_>>>()?;
        let ports = listeners
            .iter()
            .map(|l| l.local_addr().map(|a| a.port()))
            .collect::<std::io::Result<Vec<_>>>()?;
        drop(listeners);

        Ok(Self {
            ip: "127.0.0.1".to_string(),
            transport: "tcp".to_string(),
            shell_port: ports[0],
            iopub_port: ports[1],
            stdin_port: ports[2],
            control_port: ports[3],
            hb_port: ports[4],
            key: uuid::Uuid::new_v4().to_string(),
            signature_scheme: "hmac-sha256".to_string(),
            kernel_name: String::new(),
        })
    }

    /// ZeroMQ endpoint for one of the ports
    pub fn endpoint(&self, port: u16) -> String {
        format!("{}://{}:{}", self.transport, self.ip, port)
    }

    /// Write the connection file to a temporary location
    ///
    /// The file is deleted when the returned handle is dropped.
    pub fn write_temp(&self) -> Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("kernel-")
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer(&mut file, self)?;
        file.flush()?;
        Ok(file)
    }
}

/// How to start a kernel
#[derive(Debug, Clone)]
pub struct KernelSpec {
    argv: Vec<String>,
    env: HashMap<String, String>,
}

impl KernelSpec {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            env: HashMap::new(),
        }
    }

    pub fn from_config(config: &KernelConfig) -> Self {
        Self {
            argv: config.argv.clone(),
            env: config.env.clone(),
        }
    }

    /// Module run with `-m`, if the launcher is a Python module
    fn launcher_module(&self) -> Option<&str> {
        self.argv
            .windows(2)
            .find(|pair| pair[0] == "-m")
            .map(|pair| pair[1].as_str())
    }

    /// Resolve the launcher executable on PATH
    fn executable(&self) -> Result<PathBuf> {
        let program = self
            .argv
            .first()
            .ok_or_else(|| Error::Config("kernel.argv must not be empty".to_string()))?;
        which::which(program).map_err(|_| {
            Error::RuntimeUnavailable(format!("'{}' (kernel launcher)", program))
        })
    }

    /// Check that the kernel runtime is installed
    ///
    /// Fails with [`Error::RuntimeUnavailable`] when the launcher is missing
    /// or its Python module cannot be imported.
    pub async fn check_runtime(&self) -> Result<()> {
        let executable = self.executable()?;

        if let Some(module) = self.launcher_module() {
            let status = Command::new(&executable)
                .arg("-c")
                .arg(format!("import {}", module))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map_err(|e| {
                    Error::RuntimeUnavailable(format!("'{}' ({})", executable.display(), e))
                })?;

            if !status.success() {
                return Err(Error::RuntimeUnavailable(format!(
                    "The Python module '{}'",
                    module
                )));
            }
        }

        tracing::debug!(launcher = %executable.display(), "Kernel runtime available");
        Ok(())
    }

    /// Build the launch command for a connection file
    pub fn command(&self, connection_file: &Path) -> Result<Command> {
        let executable = self.executable()?;
        let file = connection_file.to_string_lossy();

        let mut cmd = Command::new(executable);
        cmd.args(
            self.argv[1..]
                .iter()
                .map(|arg| arg.replace(CONNECTION_FILE_PLACEHOLDER, &file)),
        )
        .envs(&self.env)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit()) // Let kernel tracebacks go to stderr
        .kill_on_drop(true);

        Ok(cmd)
    }

    /// Start the kernel process
    pub fn spawn(&self, connection_file: &Path) -> Result<Child> {
        let mut cmd = self.command(connection_file)?;
        tracing::debug!(argv = ?self.argv, "Starting kernel");
        cmd.spawn()
            .map_err(|e| Error::KernelStartFailed(format!("Failed to start {}: {}", self.argv[0], e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_distinct_ports() {
        let info = ConnectionInfo::allocate().unwrap();
        let mut ports = vec![
            info.shell_port,
            info.iopub_port,
            info.stdin_port,
            info.control_port,
            info.hb_port,
        ];
        ports.sort_unstable();
        ports.dedup();
        assert_eq!(ports.len(), 5);
        assert!(!info.key.is_empty());
        assert_eq!(info.endpoint(info.shell_port), format!("tcp://127.0.0.1:{}", info.shell_port));
    }

    #[test]
    fn test_connection_file_contents() {
        let info = ConnectionInfo::allocate().unwrap();
        let file = info.write_temp().unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        let parsed: ConnectionInfo = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, info);
        assert_eq!(parsed.signature_scheme, "hmac-sha256");
    }

    #[test]
    fn test_launcher_module() {
        let spec = KernelSpec::from_config(&KernelConfig::default());
        assert_eq!(spec.launcher_module(), Some("ipykernel_launcher"));

        let spec = KernelSpec::new(vec!["evcxr_jupyter".into(), "--control_file".into()]);
        assert_eq!(spec.launcher_module(), None);
    }

    #[tokio::test]
    async fn test_missing_launcher_is_unavailable() {
        let spec = KernelSpec::new(vec!["definitely-not-a-kernel-launcher-xyz".into()]);
        let err = spec.check_runtime().await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_command_substitutes_connection_file() {
        // `sh` exists wherever the test suite runs
        let spec = KernelSpec::new(vec![
            "sh".into(),
            "-c".into(),
            "true".into(),
            "--file={connection_file}".into(),
        ]);
        let cmd = spec.command(Path::new("/tmp/kernel-1.json")).unwrap();
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, vec!["-c", "true", "--file=/tmp/kernel-1.json"]);
    }
}
