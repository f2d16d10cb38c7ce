//! dockerlink: delegate docker commands to the classic CLI executable, relay
//! signals to it and hyperlink container, image and volume identifiers in
//! its output.

pub mod catalog;
pub mod delegate;
pub mod enrich;
pub mod relay;
pub mod utils;
