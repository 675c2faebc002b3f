#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::unused_async)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::redundant_closure_for_method_calls)]

//! rc-host library — the session runtime and HTTP/WebSocket surface that
//! multiplexes shell and AI-agent engine subprocesses as resumable sessions.
//!
//! - `app` — router assembly, shared by `main` and integration tests
//! - `auth` — bearer auth middleware and single-use WS tickets
//! - `config` — CLI-flag-driven server configuration
//! - `engines` — engine binary discovery probe
//! - `error` — structured error envelope and secret redaction
//! - `events` — typed event model, ring buffer, deduper, durable tail
//! - `policy` — engine subprocess environment sanitation
//! - `rpc` — line-delimited JSON-RPC client over child stdio
//! - `routes` — REST API handlers
//! - `sessions` — engine adapters, the session object, and the manager
//! - `state` — shared application state
//! - `ws` — WebSocket upgrade handlers (typed events and legacy bytes)

pub mod app;
pub mod auth;
pub mod config;
pub mod engines;
pub mod error;
pub mod events;
pub mod policy;
pub mod routes;
pub mod rpc;
pub mod sessions;
pub mod state;
pub mod ws;

pub use config::Config;
pub use sessions::manager::SessionManager;
pub use state::AppState;
