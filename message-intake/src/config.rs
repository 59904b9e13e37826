use std::{path::PathBuf, time::Duration};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_HTTP_PORT: u16 = 3000;
pub const DEFAULT_DATAGRAM_PORT: u16 = 5000;
pub const DEFAULT_STORAGE_PATH: &str = "storage/data.json";
pub const DEFAULT_ASSETS_DIR: &str = "front";
/// How long open HTTP connections may keep running once shutdown is
/// requested.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Startup settings. Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeConfig {
    /// Host name or address shared by both endpoints.
    pub host: String,
    /// TCP port for the HTTP endpoint. Use 0 for an ephemeral port.
    pub http_port: u16,
    /// UDP port for the datagram endpoint. Use 0 for an ephemeral port.
    pub datagram_port: u16,
    pub storage_path: PathBuf,
    pub assets_dir: PathBuf,
    pub drain_timeout: Duration,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            datagram_port: DEFAULT_DATAGRAM_PORT,
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            assets_dir: PathBuf::from(DEFAULT_ASSETS_DIR),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}
