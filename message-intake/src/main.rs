use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use message_intake::{cli::Cli, config::IntakeConfig, dispatcher::Dispatcher};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = IntakeConfig::from(Cli::parse());
    let dispatcher = Dispatcher::bind(&config).await?;
    info!("http endpoint listening on http://{}", dispatcher.http_addr()?);
    info!("datagram endpoint listening on {}", dispatcher.datagram_addr()?);

    if let Err(err) = dispatcher.run_until_ctrl_c().await {
        warn!("dispatcher exited with error: {err:?}");
        return Err(err);
    }

    Ok(())
}
