use std::path::PathBuf;

/// Core error type for the moderation bot.
///
/// Adapter crates map their transport errors into `External` so the pipeline
/// can fold them into conservative defaults at the call site.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("list file error: {path}: {reason}")]
    ListFile { path: PathBuf, reason: String },

    #[error("external error: {0}")]
    External(String),

    #[error("handler error: {0}")]
    Handler(String),
}

pub type Result<T> = std::result::Result<T, Error>;
