//! Virtualis is a terminal-first clinical console for the Virtualis/ALIS
//! hospital backend, plus the privileged function server that backs it.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns conversation state, the SSE streaming transport, the
//!   scripted demo graph, configuration, and the session context.
//! - [`records`] is the typed data-access layer over the managed store's
//!   REST surface, including polling change feeds for live panels.
//! - [`audit`] debounces view events and forwards actions to the audit
//!   function.
//! - [`server`] hosts the three privileged functions: the streaming chat
//!   proxy with clinical tool dispatch, the audit writer, and admin user
//!   management.
//! - [`ui`] renders the terminal interface and runs the interactive event
//!   loop.
//! - [`api`] defines the OpenAI-compatible chat payloads shared by the
//!   console, the proxy, and the gateway.
//!
//! Runtime entrypoints live in the binary crates (`src/main.rs` and
//! `src/bin/virtualis-functions.rs`), which route through [`crate::cli`]
//! and [`crate::server::run`] respectively.

pub mod api;
pub mod audit;
pub mod auth;
pub mod cli;
pub mod core;
pub mod records;
pub mod server;
pub mod ui;
pub mod utils;
