//! The per-message decision ladder.
//!
//! Order is fixed: type gate, subscription gate, allow/deny lists, spam
//! keywords. The first gate that decides ends evaluation.

use std::sync::Arc;

use tracing::debug;

use crate::{
    domain::Message,
    lists::{ListSnapshot, ListStore},
    subscription::{ChannelRequirement, SubscriptionChecker},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    Blacklist,
    Spam,
}

/// Terminal decision for one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Allow,
    DeleteSilently,
    DeleteWithNotice {
        kind: NoticeKind,
        matched_terms: Vec<String>,
    },
    DeleteAsNotSubscribed,
    DeleteAsNonText,
    /// Author is on both the allow and the deny list. Nothing is deleted.
    FlagConflict,
}

impl Action {
    pub fn deletes(&self) -> bool {
        !matches!(self, Action::Allow | Action::FlagConflict)
    }

    /// The same decision with any notice dropped.
    pub fn silenced(self) -> Self {
        if self.deletes() {
            Action::DeleteSilently
        } else {
            self
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::DeleteSilently => "delete_silently",
            Action::DeleteWithNotice {
                kind: NoticeKind::Blacklist,
                ..
            } => "delete_blacklisted",
            Action::DeleteWithNotice {
                kind: NoticeKind::Spam,
                ..
            } => "delete_spam",
            Action::DeleteAsNotSubscribed => "delete_not_subscribed",
            Action::DeleteAsNonText => "delete_non_text",
            Action::FlagConflict => "flag_conflict",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListVerdict {
    Unlisted,
    Allowed,
    Denied,
    Conflict,
}

fn any_entry_in(entries: &std::collections::BTreeSet<String>, haystack_lower: &str) -> bool {
    entries
        .iter()
        .any(|entry| haystack_lower.contains(&entry.to_lowercase()))
}

/// Allow/deny lookup: case-insensitive substring match against the identity.
pub fn list_verdict(lists: &ListSnapshot, identity: &str) -> ListVerdict {
    let identity = identity.to_lowercase();
    let in_allow = any_entry_in(&lists.allow, &identity);
    let in_deny = any_entry_in(&lists.deny, &identity);
    match (in_allow, in_deny) {
        (true, true) => ListVerdict::Conflict,
        (true, false) => ListVerdict::Allowed,
        (false, true) => ListVerdict::Denied,
        (false, false) => ListVerdict::Unlisted,
    }
}

/// Every spam entry contained in `text`, case-insensitively. Plain substring
/// containment: "cat" matches "concatenate".
pub fn spam_matches(lists: &ListSnapshot, text: &str) -> Vec<String> {
    let text = text.to_lowercase();
    lists
        .spam
        .iter()
        .filter(|entry| text.contains(&entry.to_lowercase()))
        .cloned()
        .collect()
}

/// Steps 3–5 of the ladder, for a text message that passed the subscription gate.
pub fn evaluate_content(lists: &ListSnapshot, msg: &Message) -> Action {
    match list_verdict(lists, &msg.author.identity) {
        ListVerdict::Conflict => return Action::FlagConflict,
        ListVerdict::Allowed => return Action::Allow,
        ListVerdict::Denied => {
            return Action::DeleteWithNotice {
                kind: NoticeKind::Blacklist,
                matched_terms: Vec::new(),
            }
        }
        ListVerdict::Unlisted => {}
    }

    let matched_terms = spam_matches(lists, &msg.text);
    if matched_terms.is_empty() {
        Action::Allow
    } else {
        Action::DeleteWithNotice {
            kind: NoticeKind::Spam,
            matched_terms,
        }
    }
}

pub struct RuleEngine {
    lists: Arc<ListStore>,
    subscriptions: SubscriptionChecker,
    required_channels: Arc<[ChannelRequirement]>,
}

impl RuleEngine {
    pub fn new(
        lists: Arc<ListStore>,
        subscriptions: SubscriptionChecker,
        required_channels: Arc<[ChannelRequirement]>,
    ) -> Self {
        Self {
            lists,
            subscriptions,
            required_channels,
        }
    }

    pub async fn evaluate(&self, msg: &Message) -> Action {
        let lists = self.lists.snapshot();

        if !msg.is_text() {
            return Action::DeleteAsNonText;
        }

        if !self.required_channels.is_empty()
            && !self
                .subscriptions
                .is_subscribed(msg.author.user_id, &self.required_channels)
                .await
        {
            return Action::DeleteAsNotSubscribed;
        }

        let action = evaluate_content(&lists, msg);
        debug!(
            chat = msg.chat_id.0,
            message = msg.id.0,
            action = action.label(),
            "message evaluated"
        );
        action
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::{Author, ChatId, MessageId, MessageKind, UserId};
    use crate::lists::ListPaths;
    use crate::messaging::{port::MembershipPort, types::MembershipStatus};
    use crate::Result;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    pub(crate) struct FixedMembership {
        pub status: MembershipStatus,
        pub calls: Mutex<usize>,
    }

    impl FixedMembership {
        pub fn new(status: MembershipStatus) -> Self {
            Self {
                status,
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl MembershipPort for FixedMembership {
        async fn fetch_chat_membership(
            &self,
            _channel: &ChannelRequirement,
            _user_id: UserId,
        ) -> Result<MembershipStatus> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.status)
        }
    }

    pub(crate) fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    pub(crate) fn snapshot(spam: &[&str], deny: &[&str], allow: &[&str]) -> ListSnapshot {
        ListSnapshot {
            spam: set(spam),
            deny: set(deny),
            allow: set(allow),
        }
    }

    pub(crate) fn text_message(username: &str, text: &str) -> Message {
        Message {
            id: MessageId(100),
            chat_id: ChatId(-1001),
            author: Author::new(UserId(42), Some(username.to_string()), "Test", None),
            text: text.to_string(),
            kind: MessageKind::Text,
            timestamp: Utc::now(),
        }
    }

    fn engine_with(
        lists: ListSnapshot,
        channels: &str,
        membership: Arc<FixedMembership>,
    ) -> RuleEngine {
        let paths = ListPaths {
            spam: "/nonexistent/spam".into(),
            deny: "/nonexistent/deny".into(),
            allow: "/nonexistent/allow".into(),
        };
        RuleEngine::new(
            Arc::new(ListStore::from_snapshot(paths, lists)),
            SubscriptionChecker::new(membership),
            ChannelRequirement::parse_csv(channels).into(),
        )
    }

    fn engine(lists: ListSnapshot) -> RuleEngine {
        engine_with(
            lists,
            "",
            Arc::new(FixedMembership::new(MembershipStatus::Member)),
        )
    }

    #[tokio::test]
    async fn non_text_is_deleted_regardless_of_lists() {
        let e = engine(snapshot(&[], &[], &["tester"]));
        let mut msg = text_message("tester", "");
        msg.kind = MessageKind::NonText("photo".into());
        assert_eq!(e.evaluate(&msg).await, Action::DeleteAsNonText);
    }

    #[tokio::test]
    async fn non_text_skips_membership_query() {
        let membership = Arc::new(FixedMembership::new(MembershipStatus::Left));
        let e = engine_with(ListSnapshot::default(), "@news", membership.clone());
        let mut msg = text_message("someone", "");
        msg.kind = MessageKind::NonText("sticker".into());
        assert_eq!(e.evaluate(&msg).await, Action::DeleteAsNonText);
        assert_eq!(*membership.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn conflict_is_flagged_not_acted_on() {
        let e = engine(snapshot(&["viagra"], &["spammer"], &["spammer123"]));
        let msg = text_message("spammer123", "buy viagra");
        assert_eq!(e.evaluate(&msg).await, Action::FlagConflict);
    }

    #[tokio::test]
    async fn allow_list_overrides_spam() {
        let e = engine(snapshot(&["viagra"], &[], &["trusted"]));
        let msg = text_message("trusted_admin", "Buy Viagra now");
        assert_eq!(e.evaluate(&msg).await, Action::Allow);
    }

    #[tokio::test]
    async fn deny_list_deletes_clean_text() {
        let e = engine(snapshot(&["viagra"], &["spammer123"], &[]));
        let msg = text_message("spammer123", "hello everyone");
        assert_eq!(
            e.evaluate(&msg).await,
            Action::DeleteWithNotice {
                kind: NoticeKind::Blacklist,
                matched_terms: vec![],
            }
        );
    }

    #[tokio::test]
    async fn identity_matching_ignores_case() {
        let e = engine(snapshot(&[], &["SPAMMER123"], &[]));
        let msg = text_message("Spammer123", "hi");
        assert!(matches!(
            e.evaluate(&msg).await,
            Action::DeleteWithNotice {
                kind: NoticeKind::Blacklist,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn spam_collects_every_matching_term() {
        let e = engine(snapshot(&["casino", "viagra", "crypto"], &[], &[]));
        let msg = text_message("someone", "VIAGRA and Casino deals");
        assert_eq!(
            e.evaluate(&msg).await,
            Action::DeleteWithNotice {
                kind: NoticeKind::Spam,
                matched_terms: vec!["casino".into(), "viagra".into()],
            }
        );
    }

    #[tokio::test]
    async fn spam_matching_is_substring_based() {
        let e = engine(snapshot(&["cat"], &[], &[]));
        let msg = text_message("someone", "let's concatenate strings");
        assert_eq!(
            e.evaluate(&msg).await,
            Action::DeleteWithNotice {
                kind: NoticeKind::Spam,
                matched_terms: vec!["cat".into()],
            }
        );
    }

    #[tokio::test]
    async fn mixed_case_spam_entries_match_and_keep_their_spelling() {
        let e = engine(snapshot(&["ViAgRa", "cat"], &[], &[]));
        let msg = text_message("someone", "concatenate VIAGRA");
        assert_eq!(
            e.evaluate(&msg).await,
            Action::DeleteWithNotice {
                kind: NoticeKind::Spam,
                matched_terms: vec!["ViAgRa".into(), "cat".into()],
            }
        );
    }

    #[tokio::test]
    async fn clean_message_is_allowed() {
        let e = engine(snapshot(&["viagra"], &["spammer"], &[]));
        let msg = text_message("regular", "good morning");
        assert_eq!(e.evaluate(&msg).await, Action::Allow);
    }

    #[tokio::test]
    async fn end_to_end_spam_keyword() {
        let e = engine(snapshot(&["viagra"], &[], &[]));
        let msg = text_message("buyer", "Buy Viagra now");
        assert_eq!(
            e.evaluate(&msg).await,
            Action::DeleteWithNotice {
                kind: NoticeKind::Spam,
                matched_terms: vec!["viagra".into()],
            }
        );
    }

    #[tokio::test]
    async fn end_to_end_deny_listed_identity() {
        let e = engine(snapshot(&[], &["spammer123"], &[]));
        let msg = text_message("spammer123", "totally innocent text");
        assert_eq!(msg.author.identity, "@spammer123 (42)");
        assert!(matches!(
            e.evaluate(&msg).await,
            Action::DeleteWithNotice {
                kind: NoticeKind::Blacklist,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn end_to_end_not_subscribed() {
        let e = engine_with(
            snapshot(&[], &[], &["anyone"]),
            "@news",
            Arc::new(FixedMembership::new(MembershipStatus::Left)),
        );
        let msg = text_message("anyone", "hello");
        assert_eq!(e.evaluate(&msg).await, Action::DeleteAsNotSubscribed);
    }

    #[tokio::test]
    async fn subscribed_user_falls_through_to_content_gates() {
        let e = engine_with(
            snapshot(&["viagra"], &[], &[]),
            "@news",
            Arc::new(FixedMembership::new(MembershipStatus::Administrator)),
        );
        let msg = text_message("member", "viagra");
        assert!(matches!(
            e.evaluate(&msg).await,
            Action::DeleteWithNotice {
                kind: NoticeKind::Spam,
                ..
            }
        ));
    }

    #[test]
    fn silenced_only_touches_deletions() {
        assert_eq!(Action::Allow.silenced(), Action::Allow);
        assert_eq!(Action::FlagConflict.silenced(), Action::FlagConflict);
        assert_eq!(Action::DeleteAsNonText.silenced(), Action::DeleteSilently);
        assert_eq!(
            Action::DeleteWithNotice {
                kind: NoticeKind::Spam,
                matched_terms: vec!["x".into()],
            }
            .silenced(),
            Action::DeleteSilently
        );
    }

    #[test]
    fn list_verdict_covers_all_combinations() {
        let lists = snapshot(&[], &["bad"], &["good"]);
        assert_eq!(list_verdict(&lists, "@good_bad (1)"), ListVerdict::Conflict);
        assert_eq!(list_verdict(&lists, "@good (1)"), ListVerdict::Allowed);
        assert_eq!(list_verdict(&lists, "@bad (1)"), ListVerdict::Denied);
        assert_eq!(list_verdict(&lists, "@neutral (1)"), ListVerdict::Unlisted);
    }
}
