//! Telegram HTML helpers and notice texts.

use crate::{domain::Author, subscription::ChannelRequirement};

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn blacklist_notice(author: &Author) -> String {
    format!(
        "{} you are on the blacklist. Messages from blacklisted users are deleted.",
        escape_html(&author.identity)
    )
}

pub fn spam_notice(author: &Author, matched_terms: &[String]) -> String {
    format!(
        "{} / {},\nYour message contained a banned word, so it was deleted.\n\
         If you post it again\n(<i>{}</i>)\nyou will be added to the blacklist.",
        escape_html(&author.first_name),
        escape_html(&author.identity),
        escape_html(&matched_terms.join(", "))
    )
}

pub fn not_subscribed_notice(author: &Author, channels: &[ChannelRequirement]) -> String {
    let links = channels
        .iter()
        .map(|c| format!("- {}", c.link_html()))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Dear {}, to take part in the discussion please subscribe to our channels:\n{links}\n\
         Once subscribed you will be able to post.",
        escape_html(author.addressable_name())
    )
}

pub fn non_text_notice(author: &Author) -> String {
    format!(
        "Dear {}, only text messages are allowed in this chat.",
        escape_html(author.addressable_name())
    )
}

/// Shorten `text` to `max_chars` characters for log lines.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;

    #[test]
    fn escapes_html() {
        let s = r#"<a href="x&y">"#;
        assert_eq!(escape_html(s), "&lt;a href=&quot;x&amp;y&quot;&gt;");
    }

    #[test]
    fn spam_notice_lists_every_term() {
        let a = Author::new(UserId(1), Some("bob".into()), "Bob", None);
        let html = spam_notice(&a, &["casino".into(), "viagra".into()]);
        assert!(html.contains("Bob / @bob (1)"));
        assert!(html.contains("<i>casino, viagra</i>"));
    }

    #[test]
    fn notices_escape_user_controlled_names() {
        let a = Author::new(UserId(1), None, "<script>", None);
        assert!(non_text_notice(&a).contains("&lt;script&gt;"));
        assert!(blacklist_notice(&a).contains("&lt;script&gt; (1)"));
    }

    #[test]
    fn not_subscribed_notice_links_channels() {
        let a = Author::new(UserId(1), Some("bob".into()), "Bob", None);
        let html = not_subscribed_notice(&a, &ChannelRequirement::parse_csv("@news,555"));
        assert!(html.starts_with("Dear bob,"));
        assert!(html.contains("- <a href=\"https://t.me/news\">@news</a>"));
        assert!(html.contains("- <a href=\"https://t.me/c/555\">our channel</a>"));
    }

    #[test]
    fn truncate_text_adds_ellipsis() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("привет мир", 6), "привет...");
    }
}
