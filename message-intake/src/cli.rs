use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::config::{
    IntakeConfig, DEFAULT_ASSETS_DIR, DEFAULT_DATAGRAM_PORT, DEFAULT_DRAIN_TIMEOUT, DEFAULT_HOST,
    DEFAULT_HTTP_PORT, DEFAULT_STORAGE_PATH,
};

/// Accept chat messages over HTTP forms and UDP datagrams and persist them
/// into one JSON document.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Host name or address both endpoints bind to.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// TCP port of the HTTP endpoint. Use 0 for an ephemeral port.
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT)]
    pub http_port: u16,

    /// UDP port of the datagram endpoint. Use 0 for an ephemeral port.
    #[arg(long, default_value_t = DEFAULT_DATAGRAM_PORT)]
    pub datagram_port: u16,

    /// JSON document that stores every accepted message.
    #[arg(long, default_value = DEFAULT_STORAGE_PATH)]
    pub storage: PathBuf,

    /// Directory holding the static front-end files.
    #[arg(long, default_value = DEFAULT_ASSETS_DIR)]
    pub assets: PathBuf,

    /// Milliseconds open HTTP connections get to finish after ctrl-c.
    #[arg(long, default_value_t = DEFAULT_DRAIN_TIMEOUT.as_millis() as u64)]
    pub drain_timeout_ms: u64,
}

impl From<Cli> for IntakeConfig {
    fn from(cli: Cli) -> Self {
        Self {
            host: cli.host,
            http_port: cli.http_port,
            datagram_port: cli.datagram_port,
            storage_path: cli.storage,
            assets_dir: cli.assets,
            drain_timeout: Duration::from_millis(cli.drain_timeout_ms),
        }
    }
}
