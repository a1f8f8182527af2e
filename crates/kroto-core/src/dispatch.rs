//! Routes inbound updates to the moderation handler.
//!
//! New and edited messages take the same path. Every update runs in its own
//! task; handler errors and panics end up in the [`ErrorSink`] and never reach
//! the ingestion loop.

use std::{any::Any, pin::pin, sync::Arc};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::{
    domain::{Message, Update},
    errors::Error,
    Result,
};

#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle_message(&self, msg: Message) -> Result<()>;
}

/// Where faults from per-update handling are reported.
pub trait ErrorSink: Send + Sync {
    fn report_error(&self, context: &str, err: &Error);
}

/// Default sink: an `error!` line per fault.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report_error(&self, context: &str, err: &Error) {
        error!(context, error = %err, "update handling failed");
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    handler: Arc<dyn MessageHandler>,
    sink: Arc<dyn ErrorSink>,
}

impl Dispatcher {
    pub fn new(handler: Arc<dyn MessageHandler>, sink: Arc<dyn ErrorSink>) -> Self {
        Self { handler, sink }
    }

    /// Handle one update to completion. Never fails.
    pub async fn dispatch(&self, update: Update) {
        let (context, msg) = match update {
            Update::Message(msg) => ("message", msg),
            Update::EditedMessage(msg) => ("edited_message", msg),
            Update::Unknown { kind } => {
                debug!(kind = %kind, "ignoring unsupported update");
                return;
            }
        };

        let chat = msg.chat_id.0;
        let message = msg.id.0;
        let handler = Arc::clone(&self.handler);
        let outcome = tokio::spawn(async move { handler.handle_message(msg).await }).await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.sink.report_error(context, &e),
            Err(join) => {
                let reason = if join.is_panic() {
                    panic_message(join.into_panic().as_ref())
                } else {
                    "task cancelled".to_string()
                };
                self.sink.report_error(
                    context,
                    &Error::Handler(format!("chat {chat} message {message}: {reason}")),
                );
            }
        }
    }

    /// Drain an update stream, handling each update concurrently.
    ///
    /// Returns once the stream ends and every in-flight update has finished.
    pub async fn run<S>(&self, updates: S)
    where
        S: Stream<Item = Update> + Send,
    {
        let mut updates = pin!(updates);
        let mut in_flight = JoinSet::new();

        while let Some(update) = updates.next().await {
            let this = self.clone();
            in_flight.spawn(async move { this.dispatch(update).await });
            while in_flight.try_join_next().is_some() {}
        }

        while in_flight.join_next().await.is_some() {}
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
