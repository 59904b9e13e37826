//! Runs the HTTP and datagram endpoints side by side over one [`Store`].
//!
//! The endpoints are independent tokio tasks. They share nothing but the
//! `Arc<Store>`, so a stalled HTTP connection or a flood of datagrams only
//! ever delays its own loop.

use std::{future::Future, io, net::SocketAddr, sync::Arc};

use anyhow::{anyhow, Context, Result};
use tokio::{
    net::{TcpListener, UdpSocket},
    sync::watch,
    task::JoinError,
};
use tracing::{error, info, warn};

use crate::{
    assets::AssetCatalog,
    config::IntakeConfig,
    datagram::DatagramEndpoint,
    http::{AppState, HttpEndpoint},
    store::Store,
};

pub struct Dispatcher {
    store: Arc<Store>,
    http: HttpEndpoint,
    datagram: DatagramEndpoint,
}

impl Dispatcher {
    /// Opens the store and binds both endpoints without serving yet.
    pub async fn bind(config: &IntakeConfig) -> Result<Self> {
        let store = Store::open(&config.storage_path)
            .await
            .context("failed to open message store")?;
        let store = Arc::new(store);
        let assets = Arc::new(AssetCatalog::new(&config.assets_dir));
        info!(root = %assets.root().display(), "serving static assets");

        let host = config.host.as_str();
        let listener = TcpListener::bind((host, config.http_port))
            .await
            .with_context(|| {
                format!("failed to bind http endpoint on {host}:{}", config.http_port)
            })?;
        let socket = UdpSocket::bind((host, config.datagram_port))
            .await
            .with_context(|| {
                format!(
                    "failed to bind datagram endpoint on {host}:{}",
                    config.datagram_port
                )
            })?;

        let http = HttpEndpoint::new(
            listener,
            AppState {
                store: Arc::clone(&store),
                assets,
            },
        )
        .with_drain_timeout(config.drain_timeout);
        let datagram = DatagramEndpoint::new(socket, Arc::clone(&store));

        Ok(Self {
            store,
            http,
            datagram,
        })
    }

    pub fn http_addr(&self) -> io::Result<SocketAddr> {
        self.http.local_addr()
    }

    pub fn datagram_addr(&self) -> io::Result<SocketAddr> {
        self.datagram.local_addr()
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Serves both endpoints until `shutdown` resolves, then waits for both
    /// loops to finish. A loop that fails is reported but does not stop the
    /// other one.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Dispatcher {
            store,
            http,
            datagram,
        } = self;
        info!(path = %store.path().display(), "dispatching into store");

        let (stop_tx, stop_rx) = watch::channel(false);
        let http_task = tokio::spawn(http.run_until(stop_requested(stop_rx.clone())));
        let datagram_task = tokio::spawn(datagram.run_until(stop_requested(stop_rx)));

        let relay = tokio::spawn(async move {
            shutdown.await;
            info!("dispatcher shutting down");
            let _ = stop_tx.send(true);
        });

        let (http_result, datagram_result) = tokio::join!(http_task, datagram_task);
        relay.abort();

        let http_outcome = settle("http", http_result);
        let datagram_outcome = settle("datagram", datagram_result);
        http_outcome.and(datagram_outcome)
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(signal_or_pending(tokio::signal::ctrl_c())).await
    }
}

/// Resolves when `signal` fires. A signal that cannot be installed never
/// resolves, so the service keeps running instead of stopping at once.
async fn signal_or_pending<S>(signal: S)
where
    S: Future<Output = io::Result<()>>,
{
    if let Err(err) = signal.await {
        warn!(error = ?err, "failed to install shutdown signal handler, running until killed");
        std::future::pending::<()>().await;
    }
}

async fn stop_requested(mut stop: watch::Receiver<bool>) {
    // A dropped sender also ends the wait.
    let _ = stop.wait_for(|requested| *requested).await;
}

fn settle(endpoint: &'static str, joined: Result<io::Result<()>, JoinError>) -> Result<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            error!(endpoint, error = %err, "endpoint failed");
            Err(anyhow::Error::new(err).context(format!("{endpoint} endpoint failed")))
        }
        Err(err) => {
            error!(endpoint, error = %err, "endpoint task aborted");
            Err(anyhow!("{endpoint} endpoint task aborted: {err}"))
        }
    }
}
