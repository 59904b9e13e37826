use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{bail, Result};
use message_intake::{
    datagram::{DatagramEndpoint, DEFAULT_MAX_IN_FLIGHT},
    store::Store,
};
use tempfile::TempDir;
use tokio::{
    net::UdpSocket,
    sync::oneshot,
    task::JoinHandle,
    time::{sleep, timeout, Instant},
};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(3);

struct RunningEndpoint {
    addr: SocketAddr,
    store: Arc<Store>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
    _dir: TempDir,
}

impl RunningEndpoint {
    async fn start() -> Result<Self> {
        Self::start_with(DEFAULT_MAX_IN_FLIGHT).await
    }

    async fn start_with(max_in_flight: u32) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let store = Arc::new(Store::open(dir.path().join("data.json")).await?);
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        let endpoint =
            DatagramEndpoint::new(socket, Arc::clone(&store)).with_max_in_flight(max_in_flight);
        let addr = endpoint.local_addr()?;

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(endpoint.run_until(async move {
            let _ = shutdown_rx.await;
        }));

        Ok(Self {
            addr,
            store,
            shutdown,
            task,
            _dir: dir,
        })
    }

    async fn wait_for_entries(&self, expected: usize) -> Result<()> {
        let deadline = Instant::now() + SETTLE_TIMEOUT;
        loop {
            let count = self.store.snapshot().await.len();
            if count == expected {
                return Ok(());
            }
            if Instant::now() > deadline {
                bail!("expected {expected} entries, found {count}");
            }
            sleep(Duration::from_millis(20)).await;
        }
    }

    async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(());
        timeout(SETTLE_TIMEOUT, self.task).await???;
        Ok(())
    }
}

async fn sender() -> Result<UdpSocket> {
    Ok(UdpSocket::bind("127.0.0.1:0").await?)
}

#[tokio::test]
async fn well_formed_datagram_is_persisted() -> Result<()> {
    let endpoint = RunningEndpoint::start().await?;
    let client = sender().await?;

    client
        .send_to(br#"{"username":"alice","message":"over udp"}"#, endpoint.addr)
        .await?;
    endpoint.wait_for_entries(1).await?;

    let snapshot = endpoint.store.snapshot().await;
    let entry = snapshot.values().next().expect("one entry");
    assert_eq!(entry.username, "alice");
    assert_eq!(entry.message, "over udp");

    endpoint.stop().await
}

#[tokio::test]
async fn empty_username_is_still_persisted() -> Result<()> {
    let endpoint = RunningEndpoint::start().await?;
    let client = sender().await?;

    client
        .send_to(br#"{"username":"","message":"anonymous"}"#, endpoint.addr)
        .await?;
    endpoint.wait_for_entries(1).await?;

    let snapshot = endpoint.store.snapshot().await;
    assert_eq!(snapshot.values().next().map(|e| e.username.as_str()), Some(""));

    endpoint.stop().await
}

#[tokio::test]
async fn malformed_datagram_is_dropped_and_endpoint_keeps_serving() -> Result<()> {
    let endpoint = RunningEndpoint::start().await?;
    let client = sender().await?;

    client.send_to(b"{\"username\": ", endpoint.addr).await?;
    client
        .send_to(br#"{"message":"no username"}"#, endpoint.addr)
        .await?;
    client
        .send_to(br#"{"username":"bob","message":"still here"}"#, endpoint.addr)
        .await?;

    endpoint.wait_for_entries(1).await?;
    sleep(Duration::from_millis(100)).await;

    let snapshot = endpoint.store.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.values().next().map(|e| e.username.as_str()), Some("bob"));

    endpoint.stop().await
}

#[tokio::test]
async fn sender_never_receives_a_reply() -> Result<()> {
    let endpoint = RunningEndpoint::start().await?;
    let client = sender().await?;

    client
        .send_to(br#"{"username":"carol","message":"hello?"}"#, endpoint.addr)
        .await?;
    client.send_to(b"garbage", endpoint.addr).await?;
    endpoint.wait_for_entries(1).await?;

    let mut buffer = [0u8; 64];
    let reply = timeout(Duration::from_millis(200), client.recv_from(&mut buffer)).await;
    assert!(reply.is_err(), "datagram endpoint must not answer");

    endpoint.stop().await
}

async fn send_numbered(client: &UdpSocket, to: SocketAddr, count: usize) -> Result<()> {
    for n in 0..count {
        let payload = format!(r#"{{"username":"burst","message":"burst {n}"}}"#);
        client.send_to(payload.as_bytes(), to).await?;
        // Keeps timestamp keys distinct.
        sleep(Duration::from_millis(2)).await;
    }
    Ok(())
}

#[tokio::test]
async fn single_handler_limit_still_persists_every_datagram() -> Result<()> {
    let endpoint = RunningEndpoint::start_with(1).await?;
    let client = sender().await?;

    send_numbered(&client, endpoint.addr, 16).await?;
    endpoint.wait_for_entries(16).await?;

    endpoint.stop().await
}

#[tokio::test]
async fn stop_waits_for_handlers_in_flight() -> Result<()> {
    let endpoint = RunningEndpoint::start().await?;
    let store = Arc::clone(&endpoint.store);
    let client = sender().await?;

    send_numbered(&client, endpoint.addr, 16).await?;
    sleep(Duration::from_millis(50)).await;
    endpoint.stop().await?;

    assert_eq!(store.snapshot().await.len(), 16);
    Ok(())
}
