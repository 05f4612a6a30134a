//! Port traits: the seams between the scoring core and its hosts.

pub mod config_port;
pub mod data_port;
pub mod model_port;
