//! Required-channel subscription checks.

use std::{fmt, sync::Arc};

use tracing::{debug, warn};

use crate::{
    domain::UserId, formatting::escape_html, messaging::port::MembershipPort,
};

/// Prefix Telegram uses for supergroup/channel ids in the Bot API.
const SUPERGROUP_MARKER: &str = "-100";

/// A channel a user must belong to, as configured.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelRequirement {
    /// Public handle, including the leading `@`.
    Handle(String),
    /// Numeric id, already carrying the `-100` supergroup marker when needed.
    Id(i64),
    /// Not a handle and not a number. Kept so the check can log and fail it.
    Malformed(String),
}

impl ChannelRequirement {
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        if let Some(name) = s.strip_prefix('@') {
            if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Self::Handle(s.to_string());
            }
            return Self::Malformed(raw.to_string());
        }

        match s.parse::<i64>() {
            Ok(id) if id < 0 => Self::Id(id),
            Ok(_) => format!("{SUPERGROUP_MARKER}{s}")
                .parse::<i64>()
                .map(Self::Id)
                .unwrap_or_else(|_| Self::Malformed(raw.to_string())),
            Err(_) => Self::Malformed(raw.to_string()),
        }
    }

    /// Parse a comma-separated list, skipping empty items.
    pub fn parse_csv(raw: &str) -> Vec<Self> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse)
            .collect()
    }

    /// Link for notices: `@name` links to `t.me/name`, private ids to `t.me/c/<id>`.
    pub fn link_html(&self) -> String {
        match self {
            Self::Handle(h) => {
                let name = h.trim_start_matches('@');
                format!(
                    "<a href=\"https://t.me/{}\">{}</a>",
                    escape_html(name),
                    escape_html(h)
                )
            }
            Self::Id(id) => {
                let s = id.to_string();
                match s.strip_prefix(SUPERGROUP_MARKER) {
                    Some(internal) => {
                        format!("<a href=\"https://t.me/c/{internal}\">our channel</a>")
                    }
                    None => escape_html(&s),
                }
            }
            Self::Malformed(raw) => escape_html(raw),
        }
    }
}

impl fmt::Display for ChannelRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handle(h) => f.write_str(h),
            Self::Id(id) => write!(f, "{id}"),
            Self::Malformed(raw) => write!(f, "{raw} (malformed)"),
        }
    }
}

/// Checks membership across required channels. Fail-closed: any error or
/// malformed channel counts as "not subscribed".
#[derive(Clone)]
pub struct SubscriptionChecker {
    membership: Arc<dyn MembershipPort>,
}

impl SubscriptionChecker {
    pub fn new(membership: Arc<dyn MembershipPort>) -> Self {
        Self { membership }
    }

    /// `true` when the user belongs to every channel. Stops at the first miss.
    pub async fn is_subscribed(&self, user_id: UserId, required: &[ChannelRequirement]) -> bool {
        for channel in required {
            if !self.is_member_of(user_id, channel).await {
                return false;
            }
        }
        true
    }

    async fn is_member_of(&self, user_id: UserId, channel: &ChannelRequirement) -> bool {
        if let ChannelRequirement::Malformed(raw) = channel {
            warn!(channel = %raw, "malformed channel id, treating user as not subscribed");
            return false;
        }

        match self.membership.fetch_chat_membership(channel, user_id).await {
            Ok(status) => {
                debug!(user = user_id.0, %channel, ?status, "membership status");
                status.is_subscribed()
            }
            Err(e) => {
                warn!(
                    user = user_id.0,
                    %channel,
                    error = %e,
                    "membership check failed, treating user as not subscribed"
                );
                false
            }
        }
    }
}
