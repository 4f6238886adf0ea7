//! Extractive summaries built from feed descriptions.
//!
//! A description is cut to its first [`RAW_SUMMARY_CHAR_LIMIT`] characters,
//! stripped of markup, split into sentences, and the first few well-formed
//! sentences that are not a copy of the headline are kept.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

/// Only the head of a description is considered.
pub const RAW_SUMMARY_CHAR_LIMIT: usize = 600;
/// Minimum length of the stripped text and of the kept sentences.
pub const MIN_SUMMARY_CHARS: usize = 150;
/// Maximum number of sentences inspected and kept.
pub const MAX_SENTENCES: usize = 3;

static SENTENCE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s").expect("sentence boundary pattern is valid"));

/// Build the extractive summary for one article.
///
/// Returns `None` when the article is rejected: the stripped text is too
/// short, the first candidate sentence is unterminated, or the kept sentences
/// add up to less than [`MIN_SUMMARY_CHARS`].
///
/// An unterminated candidate only rejects the summary when no sentence was
/// kept before it; later unterminated candidates are dropped on their own.
pub fn summarize(title: &str, raw_summary: &str) -> Option<Vec<String>> {
    let head: String = raw_summary.chars().take(RAW_SUMMARY_CHAR_LIMIT).collect();
    let text = strip_markup(&head);
    if text.chars().count() < MIN_SUMMARY_CHARS {
        return None;
    }

    let title = title.trim().to_lowercase();
    let sentences: Vec<&str> = split_sentences(&text)
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.to_lowercase() != title)
        .collect();

    let mut points: Vec<String> = Vec::new();
    for sentence in sentences.into_iter().take(MAX_SENTENCES) {
        if is_terminated(sentence) {
            points.push(sentence.to_string());
        } else if points.is_empty() {
            return None;
        }
    }

    if points.is_empty() || points.join(" ").chars().count() < MIN_SUMMARY_CHARS {
        return None;
    }
    Some(points)
}

/// Remove markup and return the text content.
///
/// Every text node is trimmed and the nodes are concatenated without a
/// separator, so adjacent block elements run together.
pub fn strip_markup(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Split text on whitespace that follows `.`, `?` or `!`.
///
/// No split happens after initials and dotted abbreviations (`e.g. `,
/// `U.S. `) or after a capitalised two-letter abbreviation (`Mr. `, `Dr. `).
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for boundary in SENTENCE_BOUNDARY.find_iter(text) {
        // Punctuation is a single byte; the whitespace may be wider.
        let punct_end = boundary.start() + 1;
        if is_abbreviation(&text[..punct_end]) {
            continue;
        }
        sentences.push(&text[start..punct_end]);
        start = boundary.end();
    }
    sentences.push(&text[start..]);
    sentences
}

fn is_terminated(sentence: &str) -> bool {
    sentence.ends_with(['.', '?', '!'])
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// `before` ends with the punctuation character of a candidate boundary.
fn is_abbreviation(before: &str) -> bool {
    let mut tail: Vec<char> = before.chars().rev().take(4).collect();
    tail.reverse();

    // `\w\.\w.`: "e.g.", "U.S.", "a.m."
    if let [a, '.', b, _] = tail.as_slice() {
        if is_word_char(*a) && is_word_char(*b) {
            return true;
        }
    }

    // `[A-Z][a-z]\.`: "Mr.", "Dr.", "St."
    let last3 = &tail[tail.len().saturating_sub(3)..];
    matches!(last3, [u, l, '.'] if u.is_ascii_uppercase() && l.is_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(word: &str, len: usize) -> String {
        let mut s = word.repeat(len / word.len());
        s.push('.');
        s
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(strip_markup("<p>Hello <b>world</b></p>"), "Helloworld");
        assert_eq!(strip_markup("plain text here"), "plain text here");
        assert_eq!(strip_markup("a &amp; b"), "a & b");
        assert_eq!(strip_markup("<p>  </p>"), "");
    }

    #[test]
    fn test_split_sentences_basic() {
        assert_eq!(
            split_sentences("One thing. Another one? Yes! Tail"),
            vec!["One thing.", "Another one?", "Yes!", "Tail"]
        );
    }

    #[test]
    fn test_split_sentences_keeps_abbreviations() {
        assert_eq!(
            split_sentences("The U.S. economy grew. Mr. Smith agreed."),
            vec!["The U.S. economy grew.", "Mr. Smith agreed."]
        );
        assert_eq!(
            split_sentences("Fruits, e.g. apples, are good. Next."),
            vec!["Fruits, e.g. apples, are good.", "Next."]
        );
    }

    #[test]
    fn test_split_sentences_unicode_whitespace() {
        assert_eq!(
            split_sentences("Первое предложение.\u{a0}Второе."),
            vec!["Первое предложение.", "Второе."]
        );
    }

    #[test]
    fn test_summarize_keeps_first_three_sentences() {
        let s1 = sentence("alpha ", 80);
        let s2 = sentence("beta ", 80);
        let s3 = sentence("gamma ", 80);
        let s4 = sentence("delta ", 80);
        let raw = format!("{s1} {s2} {s3} {s4}");

        let points = summarize("Headline", &raw).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0], s1);
        assert_eq!(points[2], s3);
    }

    #[test]
    fn test_summarize_rejects_short_text() {
        let raw = format!("<p>{}</p>", sentence("short ", 100));
        assert!(strip_markup(&raw).chars().count() < MIN_SUMMARY_CHARS);
        assert_eq!(summarize("Headline", &raw), None);
    }

    #[test]
    fn test_summarize_truncates_raw_summary() {
        // The only terminated sentence starts beyond the first 600 characters.
        let raw = format!("{} {}", "x".repeat(RAW_SUMMARY_CHAR_LIMIT), sentence("late ", 200));
        assert_eq!(summarize("Headline", &raw), None);
    }

    #[test]
    fn test_summarize_drops_title_echo() {
        let title = "Markets rally again.";
        let body = sentence("body text ", 200);
        let raw = format!("MARKETS RALLY AGAIN. {body}");

        let points = summarize(title, &raw).unwrap();
        assert_eq!(points, vec![body]);
        assert!(points.iter().all(|p| p.to_lowercase() != title.to_lowercase()));
    }

    #[test]
    fn test_summarize_rejects_unterminated_first_sentence() {
        let raw = "x".repeat(200);
        assert_eq!(summarize("Headline", &raw), None);
    }

    #[test]
    fn test_summarize_skips_later_unterminated_sentence() {
        let s1 = sentence("first ", 160);
        let raw = format!("{s1} dangling words without an end");

        let points = summarize("Headline", &raw).unwrap();
        assert_eq!(points, vec![s1]);
    }

    #[test]
    fn test_summarize_rejects_short_kept_sentences() {
        // Enough text overall, but only a short sentence is well formed.
        let raw = format!("Short one. {}", "y".repeat(200));
        assert_eq!(summarize("Headline", &raw), None);
    }

    #[test]
    fn test_summarize_html_paragraph() {
        let raw = format!("<p>{}</p>", sentence("x", 200));
        let points = summarize("Headline", &raw).unwrap();
        assert_eq!(points.len(), 1);
        assert!(points[0].chars().count() >= MIN_SUMMARY_CHARS);
    }
}
