use chrono::{DateTime, Utc};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Who wrote a message.
///
/// `identity` is the display string allow/deny entries are matched against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Author {
    pub user_id: UserId,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub identity: String,
}

impl Author {
    /// Build an author with the platform's usual display identity:
    /// `@username (id)` when a username exists, `First Last (id)` otherwise.
    pub fn new(
        user_id: UserId,
        username: Option<String>,
        first_name: impl Into<String>,
        last_name: Option<String>,
    ) -> Self {
        let first_name = first_name.into();
        let name = match (&username, &last_name) {
            (Some(u), _) => format!("@{u}"),
            (None, Some(last)) => format!("{first_name} {last}"),
            (None, None) => first_name.clone(),
        };
        let identity = format!("{name} ({})", user_id.0);
        Self {
            user_id,
            username,
            first_name,
            last_name,
            identity,
        }
    }

    /// Name used to address the author in a notice.
    pub fn addressable_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.first_name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    /// Anything else; the label is only used in logs (`photo`, `sticker`, ...).
    NonText(String),
}

/// An inbound chat message. Immutable once received.
#[derive(Clone, Debug)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub author: Author,
    pub text: String,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn msg_ref(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id,
            message_id: self.id,
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == MessageKind::Text
    }
}

/// One inbound event from the messaging transport.
#[derive(Clone, Debug)]
pub enum Update {
    Message(Message),
    EditedMessage(Message),
    Unknown { kind: String },
}
