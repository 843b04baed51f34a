//! Configuration file handling

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Placeholder substituted with the connection file path in kernel argv
pub const CONNECTION_FILE_PLACEHOLDER: &str = "{connection_file}";

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// How to launch the kernel
    #[serde(default)]
    pub kernel: KernelConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Output comparison settings
    #[serde(default)]
    pub compare: CompareConfig,
}

/// Kernel launch configuration, in the same shape as a kernelspec
#[derive(Debug, Deserialize, Clone)]
pub struct KernelConfig {
    /// Command line used to start the kernel; `{connection_file}` is replaced
    #[serde(default = "default_argv")]
    pub argv: Vec<String>,

    /// Extra environment variables for the kernel process
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            argv: default_argv(),
            env: HashMap::new(),
        }
    }
}

fn default_argv() -> Vec<String> {
    // History is kept in memory: the on-disk sqlite store yields spurious
    // lock errors when kernels run back to back.
    [
        "python3",
        "-m",
        "ipykernel_launcher",
        "-f",
        CONNECTION_FILE_PLACEHOLDER,
        "--HistoryManager.hist_file=:memory:",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Timeout settings
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Wait for a shell reply (kernel_info_reply, execute_reply)
    #[serde(default = "default_reply")]
    pub reply_secs: u64,

    /// Inactivity on iopub after which collection for a cell ends
    #[serde(default = "default_iopub_idle")]
    pub iopub_idle_ms: u64,

    /// Wait for the kernel process to come up and answer kernel_info
    #[serde(default = "default_startup")]
    pub startup_secs: u64,

    /// Grace period for the kernel to exit after shutdown_request
    #[serde(default = "default_shutdown")]
    pub shutdown_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            reply_secs: default_reply(),
            iopub_idle_ms: default_iopub_idle(),
            startup_secs: default_startup(),
            shutdown_secs: default_shutdown(),
        }
    }
}

fn default_reply() -> u64 {
    30
}
fn default_iopub_idle() -> u64 {
    1000
}
fn default_startup() -> u64 {
    60
}
fn default_shutdown() -> u64 {
    5
}

impl Timeouts {
    pub fn reply(&self) -> Duration {
        Duration::from_secs(self.reply_secs)
    }

    pub fn iopub_idle(&self) -> Duration {
        Duration::from_millis(self.iopub_idle_ms)
    }

    pub fn startup(&self) -> Duration {
        Duration::from_secs(self.startup_secs)
    }

    pub fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }
}

/// Comparison settings
#[derive(Debug, Deserialize, Default, Clone)]
pub struct CompareConfig {
    /// Regular expressions whose matches are irrelevant to equality
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path, which must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))?;
        if config.kernel.argv.is_empty() {
            return Err(super::Error::Config("kernel.argv must not be empty".to_string()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.timeouts.reply(), Duration::from_secs(30));
        assert_eq!(config.timeouts.iopub_idle(), Duration::from_secs(1));
        assert_eq!(config.kernel.argv[0], "python3");
        assert!(config
            .kernel
            .argv
            .iter()
            .any(|a| a == CONNECTION_FILE_PLACEHOLDER));
        assert!(config.compare.ignore.is_empty());
    }

    #[test]
    fn test_partial_override() {
        let config = Config::parse(
            r#"
            [timeouts]
            iopub_idle_ms = 250

            [compare]
            ignore = ["\\d+ ms"]
            "#,
        )
        .unwrap();
        assert_eq!(config.timeouts.iopub_idle(), Duration::from_millis(250));
        assert_eq!(config.timeouts.reply_secs, 30);
        assert_eq!(config.compare.ignore, vec![r"\d+ ms".to_string()]);
    }

    #[test]
    fn test_empty_argv_rejected() {
        let err = Config::parse("[kernel]\nargv = []\n").unwrap_err();
        assert!(matches!(err, crate::common::Error::Config(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = Config::parse("[timeouts\n").unwrap_err();
        assert!(matches!(err, crate::common::Error::ConfigParse(_)));
    }
}
