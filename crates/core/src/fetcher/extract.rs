//! HTML extraction for tracker release pages.
//!
//! The forum renders the release title in `h1.maintitle` and the last edit
//! time in `p.post-time`. Both are pulled with small regexes rather than a
//! full HTML parser; the markup is stable enough and the values are treated
//! as opaque strings downstream.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex_lite::Regex;

static TOPIC_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]t=(\d+)").expect("invalid topic id regex"));

static TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<h1[^>]*class="[^"]*maintitle[^"]*"[^>]*>(.*?)</h1>"#)
        .expect("invalid title regex")
});

static POST_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<p[^>]*class="[^"]*post-time[^"]*"[^>]*>(.*?)</p>"#)
        .expect("invalid post-time regex")
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("invalid tag regex"));

/// Extract the numeric topic id from a page URL (the `t` query parameter).
pub fn extract_topic_id(url: &str) -> Option<String> {
    TOPIC_ID_RE
        .captures(url)
        .map(|caps| caps[1].to_string())
}

/// Extract the release title from page HTML.
pub fn extract_title(html: &str) -> Option<String> {
    TITLE_RE
        .captures(html)
        .map(|caps| clean_text(&caps[1]))
        .filter(|t| !t.is_empty())
}

/// Extract the update marker from page HTML.
///
/// Returns `None` when the page has no post-time element; callers fall back
/// to [`synthesized_marker`].
pub fn extract_update_marker(html: &str) -> Option<String> {
    POST_TIME_RE
        .captures(html)
        .map(|caps| clean_text(&caps[1]))
        .filter(|m| !m.is_empty())
}

/// Synthesize a marker for pages that lack an explicit one.
///
/// Current time means such a page reads as "changed" on every pass, which is
/// the safe direction: the swap is idempotent, a missed update is not.
pub fn synthesized_marker() -> String {
    Utc::now().to_rfc3339()
}

/// Strip tags and collapse whitespace.
fn clean_text(fragment: &str) -> String {
    let without_tags = TAG_RE.replace_all(fragment, " ");
    without_tags.split_whitespace().collect::<Vec<_>>().join(" ")
}
