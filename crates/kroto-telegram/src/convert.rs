//! teloxide updates -> core updates.

use teloxide::types::{Message as TgMessage, Update as TgUpdate, UpdateKind, User};

use kroto_core::domain::{Author, ChatId, Message, MessageId, MessageKind, Update, UserId};

pub fn to_core_update(update: &TgUpdate) -> Update {
    match &update.kind {
        UpdateKind::Message(msg) => to_core_message(msg)
            .map(Update::Message)
            .unwrap_or_else(anonymous),
        UpdateKind::EditedMessage(msg) => to_core_message(msg)
            .map(Update::EditedMessage)
            .unwrap_or_else(anonymous),
        other => Update::Unknown {
            kind: update_kind_label(other).to_string(),
        },
    }
}

/// `None` when the message has no sender to judge.
pub fn to_core_message(msg: &TgMessage) -> Option<Message> {
    let user = msg.from()?;
    let (text, kind) = match msg.text() {
        Some(text) => (text.to_string(), MessageKind::Text),
        None => (String::new(), MessageKind::NonText(content_label(msg).to_string())),
    };

    Some(Message {
        id: MessageId(msg.id.0),
        chat_id: ChatId(msg.chat.id.0),
        author: author_of(user),
        text,
        kind,
        timestamp: msg.date,
    })
}

fn author_of(user: &User) -> Author {
    Author::new(
        UserId(user.id.0 as i64),
        user.username.clone(),
        user.first_name.clone(),
        user.last_name.clone(),
    )
}

fn anonymous() -> Update {
    Update::Unknown {
        kind: "message_without_sender".to_string(),
    }
}

fn content_label(msg: &TgMessage) -> &'static str {
    if msg.photo().is_some() {
        "photo"
    } else if msg.sticker().is_some() {
        "sticker"
    } else if msg.animation().is_some() {
        "animation"
    } else if msg.video().is_some() {
        "video"
    } else if msg.video_note().is_some() {
        "video_note"
    } else if msg.voice().is_some() {
        "voice"
    } else if msg.audio().is_some() {
        "audio"
    } else if msg.document().is_some() {
        "document"
    } else if msg.poll().is_some() {
        "poll"
    } else if msg.contact().is_some() {
        "contact"
    } else if msg.location().is_some() {
        "location"
    } else if msg.new_chat_members().is_some() {
        "new_chat_members"
    } else if msg.left_chat_member().is_some() {
        "left_chat_member"
    } else if msg.pinned_message().is_some() {
        "pinned_message"
    } else {
        "other"
    }
}

fn update_kind_label(kind: &UpdateKind) -> &'static str {
    match kind {
        UpdateKind::Message(_) => "message",
        UpdateKind::EditedMessage(_) => "edited_message",
        UpdateKind::ChannelPost(_) => "channel_post",
        UpdateKind::EditedChannelPost(_) => "edited_channel_post",
        UpdateKind::CallbackQuery(_) => "callback_query",
        UpdateKind::InlineQuery(_) => "inline_query",
        UpdateKind::MyChatMember(_) => "my_chat_member",
        UpdateKind::ChatMember(_) => "chat_member",
        UpdateKind::ChatJoinRequest(_) => "chat_join_request",
        _ => "other",
    }
}
