//! Turns an [`Action`] into transport calls.
//!
//! Notices go out before the offending message is deleted; once the trigger is
//! gone some clients no longer show replies to it. Notices are themselves
//! cleaned up after a delay, tracked by the exact `MessageRef` the transport
//! returned when they were sent.

use std::{
    collections::HashMap,
    io::Write,
    ops::RangeInclusive,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    domain::{Message, MessageRef},
    formatting::{
        blacklist_notice, non_text_notice, not_subscribed_notice, spam_notice, truncate_text,
    },
    messaging::{
        port::MessagingPort,
        types::{DeleteOutcome, SendOptions},
    },
    rules::{Action, NoticeKind},
    subscription::ChannelRequirement,
    Result,
};

const LOG_TEXT_MAX: usize = 80;

#[derive(Clone, Debug)]
pub struct BulkDeleteConfig {
    /// Maximum deletions in flight at once.
    pub concurrency: usize,
    /// Random pause after each deletion, in milliseconds.
    pub jitter_ms: RangeInclusive<u64>,
}

impl Default for BulkDeleteConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            jitter_ms: 50..=150,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Reply with a notice before deleting. When off, deletions are silent.
    pub reply_notices: bool,
    /// How long a notice stays up. `None` leaves notices in place.
    pub cleanup_delay: Option<Duration>,
    pub bulk: BulkDeleteConfig,
    /// Ring the terminal bell on operator alerts.
    pub audible_alerts: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            reply_notices: true,
            cleanup_delay: Some(Duration::from_secs(5)),
            bulk: BulkDeleteConfig::default(),
            audible_alerts: true,
        }
    }
}

/// A bot-sent notice waiting for delayed removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingSelfDelete {
    pub msg: MessageRef,
    /// When the notice becomes eligible for deletion.
    pub scheduled_at: DateTime<Utc>,
}

struct PendingEntry {
    record: PendingSelfDelete,
    cancel: CancellationToken,
}

/// Notices the bot sent and still intends to delete.
#[derive(Default)]
pub struct PendingSelfDeletes {
    inner: Mutex<HashMap<MessageRef, PendingEntry>>,
}

impl PendingSelfDeletes {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<MessageRef, PendingEntry>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn track(&self, record: PendingSelfDelete, cancel: CancellationToken) {
        self.lock()
            .insert(record.msg, PendingEntry { record, cancel });
    }

    /// Stop tracking `msg` and hand back its record.
    pub fn take(&self, msg: MessageRef) -> Option<PendingSelfDelete> {
        self.lock().remove(&msg).map(|e| e.record)
    }

    /// Stop tracking `msg` and cancel its timer. The notice is left in place.
    pub fn cancel(&self, msg: MessageRef) -> bool {
        match self.lock().remove(&msg) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_tracked(&self, msg: MessageRef) -> bool {
        self.lock().contains_key(&msg)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every record, cancelling their timers.
    fn drain(&self) -> Vec<PendingSelfDelete> {
        let mut map = self.lock();
        let mut out: Vec<_> = map
            .drain()
            .map(|(_, entry)| {
                entry.cancel.cancel();
                entry.record
            })
            .collect();
        out.sort_by_key(|r| r.msg);
        out
    }
}

pub struct ActionExecutor {
    messenger: Arc<dyn MessagingPort>,
    cfg: ExecutorConfig,
    channels: Arc<[ChannelRequirement]>,
    pending: Arc<PendingSelfDeletes>,
}

impl ActionExecutor {
    pub fn new(
        messenger: Arc<dyn MessagingPort>,
        cfg: ExecutorConfig,
        channels: Arc<[ChannelRequirement]>,
    ) -> Self {
        Self {
            messenger,
            cfg,
            channels,
            pending: Arc::new(PendingSelfDeletes::default()),
        }
    }

    pub fn pending(&self) -> &PendingSelfDeletes {
        &self.pending
    }

    pub async fn execute(&self, msg: &Message, action: Action) -> Result<()> {
        let action = if self.cfg.reply_notices {
            action
        } else {
            action.silenced()
        };

        let notice = match &action {
            Action::Allow => {
                debug!(chat = msg.chat_id.0, message = msg.id.0, "message allowed");
                return Ok(());
            }
            Action::FlagConflict => {
                self.alert_conflict(msg);
                return Ok(());
            }
            Action::DeleteSilently => None,
            Action::DeleteWithNotice {
                kind: NoticeKind::Blacklist,
                ..
            } => Some(blacklist_notice(&msg.author)),
            Action::DeleteWithNotice {
                kind: NoticeKind::Spam,
                matched_terms,
            } => Some(spam_notice(&msg.author, matched_terms)),
            Action::DeleteAsNotSubscribed => {
                Some(not_subscribed_notice(&msg.author, &self.channels))
            }
            Action::DeleteAsNonText => Some(non_text_notice(&msg.author)),
        };

        self.log_deletion(msg, &action);

        if let Some(html) = notice {
            self.send_notice(msg, &html).await;
        }
        self.delete_one(msg.msg_ref()).await;
        Ok(())
    }

    /// Delete one message. Already-gone counts as success; other failures are
    /// logged and reported as `false`.
    pub async fn delete_one(&self, target: MessageRef) -> bool {
        delete_with(self.messenger.as_ref(), target).await
    }

    /// Delete many messages through a bounded worker pool with random spacing.
    /// Returns how many are gone afterwards.
    pub async fn delete_many(&self, targets: Vec<MessageRef>) -> usize {
        let done = AtomicUsize::new(0);
        let concurrency = self.cfg.bulk.concurrency.max(1);
        let jitter = &self.cfg.bulk.jitter_ms;

        futures::stream::iter(targets)
            .for_each_concurrent(concurrency, |target| {
                let done = &done;
                async move {
                    if self.delete_one(target).await {
                        done.fetch_add(1, Ordering::SeqCst);
                    }
                    sleep(jitter_pause(jitter)).await;
                }
            })
            .await;

        done.load(Ordering::SeqCst)
    }

    /// Delete every notice still waiting for cleanup, right now.
    pub async fn purge_pending(&self) -> usize {
        let records = self.pending.drain();
        if records.is_empty() {
            return 0;
        }
        info!(count = records.len(), "purging pending bot notices");
        self.delete_many(records.into_iter().map(|r| r.msg).collect())
            .await
    }

    async fn send_notice(&self, msg: &Message, html: &str) {
        match self
            .messenger
            .send_html(msg.chat_id, html, SendOptions::silent_reply(msg.id))
            .await
        {
            Ok(sent) => self.schedule_cleanup(sent),
            Err(e) => warn!(
                chat = msg.chat_id.0,
                message = msg.id.0,
                error = %e,
                "failed to send notice"
            ),
        }
    }

    fn schedule_cleanup(&self, sent: MessageRef) {
        let Some(delay) = self.cfg.cleanup_delay else {
            return;
        };

        let scheduled_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        let cancel = CancellationToken::new();
        self.pending.track(
            PendingSelfDelete {
                msg: sent,
                scheduled_at,
            },
            cancel.clone(),
        );

        let pending = Arc::clone(&self.pending);
        let messenger = Arc::clone(&self.messenger);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = sleep(delay) => {
                    if pending.take(sent).is_some() {
                        delete_with(messenger.as_ref(), sent).await;
                    }
                }
            }
        });
    }

    fn alert_conflict(&self, msg: &Message) {
        error!(
            target: "kroto::alert",
            chat = msg.chat_id.0,
            message = msg.id.0,
            author = %msg.author.identity,
            "author is on both the allow and deny lists; message left untouched"
        );
        if self.cfg.audible_alerts {
            let mut stderr = std::io::stderr();
            let _ = stderr.write_all(b"\x07");
            let _ = stderr.flush();
        }
    }

    fn log_deletion(&self, msg: &Message, action: &Action) {
        let text = truncate_text(&msg.text, LOG_TEXT_MAX);
        match action {
            Action::DeleteWithNotice {
                kind: NoticeKind::Spam,
                matched_terms,
            } => info!(
                chat = msg.chat_id.0,
                author = %msg.author.identity,
                terms = %matched_terms.join(", "),
                %text,
                "deleting spam message"
            ),
            Action::DeleteAsNonText => info!(
                chat = msg.chat_id.0,
                author = %msg.author.identity,
                kind = ?msg.kind,
                "deleting non-text message"
            ),
            other => info!(
                chat = msg.chat_id.0,
                author = %msg.author.identity,
                action = other.label(),
                %text,
                "deleting message"
            ),
        }
    }
}

fn jitter_pause(range: &RangeInclusive<u64>) -> Duration {
    if range.is_empty() {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(range.clone()))
}

async fn delete_with(messenger: &dyn MessagingPort, target: MessageRef) -> bool {
    match messenger.delete_message(target).await {
        Ok(DeleteOutcome::Deleted) => true,
        Ok(DeleteOutcome::AlreadyGone) => {
            debug!(
                chat = target.chat_id.0,
                message = target.message_id.0,
                "message already gone"
            );
            true
        }
        Err(e) => {
            warn!(
                chat = target.chat_id.0,
                message = target.message_id.0,
                error = %e,
                "failed to delete message"
            );
            false
        }
    }
}
