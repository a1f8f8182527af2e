//! Core of the kroto moderation bot.
//!
//! Everything here is transport-agnostic. Telegram lives behind the ports in
//! [`messaging::port`], implemented in the adapter crate.

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod executor;
pub mod formatting;
pub mod lists;
pub mod logging;
pub mod messaging;
pub mod pipeline;
pub mod rules;
pub mod subscription;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
