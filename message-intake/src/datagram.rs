//! Connectionless ingestion over UDP.
//!
//! Each datagram carries one JSON object with `username` and `message`
//! fields. Senders never hear back: there is no acknowledgment channel,
//! so decode and storage failures end at a log line.
//!
//! Unlike the HTTP path, empty field values are accepted and stored.

use std::{future::Future, io, net::SocketAddr, sync::Arc};

use serde::Deserialize;
use tokio::{
    net::UdpSocket,
    select,
    sync::{OwnedSemaphorePermit, Semaphore},
};
use tracing::{debug, error, info, warn};

use crate::{error::IngestError, record::Record, store::Store};

/// Largest payload read from a single datagram; longer ones are truncated
/// by the socket and then fail to decode.
pub const MAX_DATAGRAM_LEN: usize = 8192;

/// Datagrams handled at once. Further datagrams wait in the socket's
/// receive queue until a handler finishes.
pub const DEFAULT_MAX_IN_FLIGHT: u32 = 64;

#[derive(Debug, Deserialize)]
struct DatagramPayload {
    username: String,
    message: String,
}

/// Decodes a datagram payload into a freshly stamped record.
pub fn decode_datagram(payload: &[u8]) -> Result<Record, IngestError> {
    let text = std::str::from_utf8(payload)
        .map_err(|err| IngestError::Decode(format!("payload is not utf-8: {err}")))?;
    let DatagramPayload { username, message } = serde_json::from_str(text.trim())
        .map_err(|err| IngestError::Decode(format!("payload is not a submission: {err}")))?;

    Ok(Record::stamped(username, message))
}

pub struct DatagramEndpoint {
    socket: UdpSocket,
    store: Arc<Store>,
    max_in_flight: u32,
}

impl DatagramEndpoint {
    pub fn new(socket: UdpSocket, store: Arc<Store>) -> Self {
        Self {
            socket,
            store,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: u32) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receives datagrams until `shutdown` resolves. Each datagram is
    /// handled on its own task, at most `max_in_flight` at a time. Handlers
    /// already running when shutdown arrives are waited for.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let DatagramEndpoint {
            socket,
            store,
            max_in_flight,
        } = self;
        tokio::pin!(shutdown);

        info!(addr = ?socket.local_addr().ok(), max_in_flight, "datagram endpoint receiving");
        let in_flight = Arc::new(Semaphore::new(max_in_flight as usize));
        let mut buffer = vec![0u8; MAX_DATAGRAM_LEN];

        loop {
            let permit = select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&in_flight).acquire_owned() => permit,
            };
            // The semaphore is never closed.
            let Ok(permit) = permit else { break };

            select! {
                _ = &mut shutdown => break,
                received = socket.recv_from(&mut buffer) => {
                    handle_receive_result(received, &buffer, &store, permit);
                }
            }
        }

        if in_flight.available_permits() < max_in_flight as usize {
            debug!("waiting for in-flight datagrams");
        }
        let _ = in_flight.acquire_many(max_in_flight).await;

        info!("datagram endpoint stopped");
        Ok(())
    }
}

fn handle_receive_result(
    result: io::Result<(usize, SocketAddr)>,
    buffer: &[u8],
    store: &Arc<Store>,
    permit: OwnedSemaphorePermit,
) {
    match result {
        Ok((len, peer)) => spawn_datagram_handler(buffer[..len].to_vec(), peer, store, permit),
        Err(err) => warn!(error = ?err, "failed to receive datagram"),
    }
}

fn spawn_datagram_handler(
    payload: Vec<u8>,
    peer: SocketAddr,
    store: &Arc<Store>,
    permit: OwnedSemaphorePermit,
) {
    let store = Arc::clone(store);
    tokio::spawn(async move {
        handle_datagram(&payload, peer, &store).await;
        drop(permit);
    });
}

/// Decodes and stores one datagram. All outcomes are terminal here.
pub async fn handle_datagram(payload: &[u8], peer: SocketAddr, store: &Store) {
    let record = match decode_datagram(payload) {
        Ok(record) => record,
        Err(err) => {
            warn!(%peer, error = %err, "dropping datagram");
            return;
        }
    };

    let key = record.key.clone();
    match store.put(record).await {
        Ok(()) => info!(%peer, %key, "stored message from datagram"),
        Err(err) => error!(%peer, error = %err, "datagram message lost"),
    }
}
