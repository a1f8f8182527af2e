//! Port fakes shared by the unit tests.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{DeleteOutcome, SendOptions},
    },
    Error, Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Sent {
        msg: MessageRef,
        opts: SendOptions,
        html: String,
    },
    Deleted(MessageRef),
}

/// Records every call in order. Deleting the same message twice reports
/// `AlreadyGone`, like the real API does.
pub struct RecordingMessenger {
    next_id: Mutex<i32>,
    pub events: Mutex<Vec<Event>>,
    gone: Mutex<HashSet<MessageRef>>,
    fail_sends: bool,
    fail_deletes: bool,
    delete_latency: Option<Duration>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl Default for RecordingMessenger {
    fn default() -> Self {
        Self {
            next_id: Mutex::new(1000),
            events: Mutex::new(Vec::new()),
            gone: Mutex::new(HashSet::new()),
            fail_sends: false,
            fail_deletes: false,
            delete_latency: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl RecordingMessenger {
    pub fn failing_sends() -> Self {
        Self {
            fail_sends: true,
            ..Self::default()
        }
    }

    pub fn failing_deletes() -> Self {
        Self {
            fail_deletes: true,
            ..Self::default()
        }
    }

    pub fn with_delete_latency(latency: Duration) -> Self {
        Self {
            delete_latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Deleted(m) => Some(m),
                Event::Sent { .. } => None,
            })
            .collect()
    }

    pub fn sent(&self) -> Vec<(MessageRef, SendOptions, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Sent { msg, opts, html } => Some((msg, opts, html)),
                Event::Deleted(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    async fn send_html(
        &self,
        chat_id: ChatId,
        html: &str,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        if self.fail_sends {
            return Err(Error::External("send failed".to_string()));
        }
        let id = {
            let mut guard = self.next_id.lock().unwrap();
            *guard += 1;
            *guard
        };
        let msg = MessageRef {
            chat_id,
            message_id: MessageId(id),
        };
        self.events.lock().unwrap().push(Event::Sent {
            msg,
            opts,
            html: html.to_string(),
        });
        Ok(msg)
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<DeleteOutcome> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.delete_latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_deletes {
            return Err(Error::External("not enough rights".to_string()));
        }
        if !self.gone.lock().unwrap().insert(msg) {
            return Ok(DeleteOutcome::AlreadyGone);
        }
        self.events.lock().unwrap().push(Event::Deleted(msg));
        Ok(DeleteOutcome::Deleted)
    }
}
