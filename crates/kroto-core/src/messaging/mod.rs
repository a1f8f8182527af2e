//! Transport-facing abstractions. Telegram implements them in `kroto-telegram`.

pub mod port;
pub mod throttled;
pub mod types;
