//! Client-side engine for a live poll whose authoritative state lives in a
//! remote poll service.
//!
//! Two synchronizers keep a local read-model of the poll's status and vote
//! counts fresh, a countdown projects the end time onto the local clock, and
//! the vote coordinator submits at most one ballot per session. The
//! [`widget::LivePoll`] ties them together for one mounted view.
//!
//! The service is reached through [`remote::PollService`]; the
//! [`ledger::PollLedger`] and [`routes`] provide an in-memory stand-in for
//! development and tests.

pub mod admin;
pub mod api_models;
pub mod config;
pub mod countdown;
pub mod error;
pub mod ledger;
pub mod models;
pub mod normalize;
pub mod remote;
pub mod routes;
pub mod sync;
pub mod time;
pub mod vote;
pub mod widget;

pub use error::{Error, Result};
