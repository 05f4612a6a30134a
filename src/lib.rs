//! confluence: adaptive technical-signal alpha and conviction-weighted
//! portfolio construction.
//!
//! Hexagonal architecture: scoring logic in [`domain`], port traits in
//! [`ports`], concrete implementations in [`adapters`], and the replay host
//! in [`cli`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
