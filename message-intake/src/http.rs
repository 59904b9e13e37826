//! Connection-oriented ingestion: form posts plus the static front-end.
//!
//! Every `POST`, whatever its path, is treated as a submission. `GET`
//! requests are answered from the [`AssetCatalog`].

use std::{
    future::{Future, IntoFuture},
    io,
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use axum::{
    extract::{FromRequest, Request, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    Form, Router,
};
use tokio::{net::TcpListener, select, sync::oneshot, time::timeout};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::{
    assets::AssetCatalog, config::DEFAULT_DRAIN_TIMEOUT, error::IngestError, record::Record,
    store::Store,
};

pub const CONFIRMATION: &str = "Message received successfully";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub assets: Arc<AssetCatalog>,
}

/// Form body of a submission. Absent fields stay empty so they fail
/// validation instead of decoding.
#[derive(Debug, Default)]
pub struct SubmitForm {
    pub username: String,
    pub message: String,
}

impl SubmitForm {
    /// Picks the first value of each field. Repeated and unknown fields are
    /// ignored.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut username = None;
        let mut message = None;
        for (name, value) in pairs {
            match name.as_str() {
                "username" if username.is_none() => username = Some(value),
                "message" if message.is_none() => message = Some(value),
                _ => {}
            }
        }
        Self {
            username: username.unwrap_or_default(),
            message: message.unwrap_or_default(),
        }
    }

    pub fn into_record(self) -> Result<Record, IngestError> {
        if self.username.is_empty() {
            return Err(IngestError::Validation("username is required"));
        }
        if self.message.is_empty() {
            return Err(IngestError::Validation("message is required"));
        }
        Ok(Record::stamped(self.username, self.message))
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(handle_request)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub struct HttpEndpoint {
    listener: TcpListener,
    router: Router,
    drain_timeout: Duration,
}

impl HttpEndpoint {
    pub fn new(listener: TcpListener, state: AppState) -> Self {
        Self {
            listener,
            router: build_router(state),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until `shutdown` resolves, then lets open connections finish
    /// for at most the drain timeout. Connections still open after that are
    /// abandoned.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let HttpEndpoint {
            listener,
            router,
            drain_timeout,
        } = self;
        info!(addr = ?listener.local_addr().ok(), "http endpoint accepting connections");

        let (requested_tx, requested_rx) = oneshot::channel::<()>();
        let signal = async move {
            shutdown.await;
            let _ = requested_tx.send(());
        };
        let serve = axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .into_future();
        tokio::pin!(serve);

        select! {
            served = &mut serve => served?,
            _ = requested_rx => match timeout(drain_timeout, &mut serve).await {
                Ok(served) => served?,
                Err(_) => warn!(?drain_timeout, "abandoning http connections still open"),
            },
        }

        info!("http endpoint stopped");
        Ok(())
    }
}

async fn handle_request(State(state): State<AppState>, request: Request) -> Response {
    let method = request.method().clone();
    match method {
        Method::GET => {
            let route = request.uri().path().to_owned();
            serve_asset(&state.assets, &route).await
        }
        Method::POST => match submit(&state, request).await {
            Ok(response) => response,
            Err(err) => {
                report_rejection(&err);
                err.into_response()
            }
        },
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

async fn serve_asset(assets: &AssetCatalog, route: &str) -> Response {
    match assets.load(route).await {
        Some(asset) => ([(header::CONTENT_TYPE, asset.content_type)], asset.bytes).into_response(),
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

async fn submit(state: &AppState, request: Request) -> Result<Response, IngestError> {
    let Form(pairs) = Form::<Vec<(String, String)>>::from_request(request, state)
        .await
        .map_err(|rejection| IngestError::Decode(rejection.body_text()))?;

    let record = SubmitForm::from_pairs(pairs).into_record()?;
    let key = record.key.clone();
    state.store.put(record).await?;
    info!(%key, "stored message from http");

    Ok(([(header::CONTENT_TYPE, "text/html")], CONFIRMATION).into_response())
}

fn report_rejection(err: &IngestError) {
    match err {
        IngestError::Store(_) => error!(error = %err, "http submission lost"),
        _ => debug!(error = %err, "rejected http submission"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_requires_both_fields() {
        let missing_user = SubmitForm {
            username: String::new(),
            message: "hi".into(),
        };
        let missing_message = SubmitForm {
            username: "alice".into(),
            message: String::new(),
        };

        assert!(matches!(missing_user.into_record(), Err(IngestError::Validation(_))));
        assert!(matches!(missing_message.into_record(), Err(IngestError::Validation(_))));
    }

    #[test]
    fn first_value_of_a_repeated_field_wins() {
        let pairs = vec![
            ("username".to_string(), "alice".to_string()),
            ("room".to_string(), "lobby".to_string()),
            ("username".to_string(), "bob".to_string()),
            ("message".to_string(), "hi".to_string()),
        ];
        let form = SubmitForm::from_pairs(pairs);

        assert_eq!(form.username, "alice");
        assert_eq!(form.message, "hi");
    }

    #[test]
    fn absent_fields_stay_empty() {
        let form = SubmitForm::from_pairs(vec![("message".to_string(), "hi".to_string())]);

        assert!(form.username.is_empty());
        assert!(matches!(form.into_record(), Err(IngestError::Validation(_))));
    }

    #[test]
    fn whitespace_fields_are_accepted_verbatim() {
        let record = SubmitForm {
            username: " ".into(),
            message: "hi there".into(),
        }
        .into_record()
        .expect("non-empty fields are valid");

        assert_eq!(record.username, " ");
        assert_eq!(record.message, "hi there");
    }
}
