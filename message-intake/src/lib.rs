//! Two-protocol message intake backed by a single JSON document.
//!
//! Messages arrive either as form posts over HTTP or as JSON datagrams
//! over UDP, and both paths persist into the same on-disk document.
//! Each module owns one concern:
//!
//! - [`record`] defines a message and its microsecond timestamp key.
//! - [`store`] owns the document and serializes every load-merge-save cycle.
//! - [`http`] decodes and validates form posts and serves the front-end.
//! - [`datagram`] decodes UDP payloads; nothing is ever sent back.
//! - [`dispatcher`] binds both endpoints and runs them as independent tasks.
//! - [`assets`], [`config`], [`cli`] and [`error`] support the above.
//!
//! Integration tests drive the router in-process and the dispatcher over
//! real sockets against a temporary store document.

pub mod assets;
pub mod cli;
pub mod config;
pub mod datagram;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod record;
pub mod store;
