//! Data access against the managed clinical store.
//!
//! Each submodule wraps one resource's fetch/mutate cycle; [`watch`]
//! adds the subscribe half for panels that stay live. All of it rides on
//! [`client::RecordsClient`], which carries the session's credentials.

pub mod charting;
pub mod client;
pub mod consults;
pub mod identity;
pub mod messaging;
pub mod orders;
pub mod patients;
pub mod prescriptions;
pub mod schedule;
pub mod types;
pub mod watch;

pub use client::{RecordsClient, RecordsError};
