//! Centralized slug and filename conventions.
//!
//! Every derived name in the pipeline goes through this module: pack slugs,
//! article slugs, display titles for topics, and the `YYYY-MM-DD-slug.md`
//! filename convention used by the blog directory.
//!
//! ## Slugs
//!
//! Slugs are ASCII, lowercase, and hyphen-separated:
//! - `"Café René: A Test!"` → `"cafe-rene-a-test"`
//! - `"  --Hello__World--  "` → `"hello-world"`
//! - `"Straße Ærø"` → `"strasse-aero"`
//! - `"日本語"` → `""` (callers pick a fallback via [`slug_or`])
//!
//! [`slugify`] is pure, total and idempotent. It may return an empty string;
//! the pack and item constructors always go through [`slug_or`] or
//! [`item_slug`], which never do.
//!
//! ## Article Filenames
//!
//! Published articles are written as `2025-12-04-my-article.md`. The date
//! prefix is optional when parsing:
//! - `2025-12-04-my-article.md` → date=Some(2025-12-04), slug="my-article"
//! - `my-article.md` → date=None, slug="my-article"

use chrono::{DateTime, NaiveDate, Utc};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Slug used when both the text and its fallback collapse to nothing.
const LAST_RESORT_SLUG: &str = "untitled";

/// ASCII spelling of Latin letters that NFKD leaves whole.
fn fold_letter(c: char) -> Option<&'static str> {
    Some(match c {
        'ß' | 'ẞ' => "ss",
        'æ' | 'Æ' => "ae",
        'ø' | 'Ø' => "o",
        'œ' | 'Œ' => "oe",
        'đ' | 'Đ' | 'ð' | 'Ð' => "d",
        'ł' | 'Ł' => "l",
        'þ' | 'Þ' => "th",
        _ => return None,
    })
}

/// Fold `text` into a URL-safe slug.
///
/// Letters like `ß` and `æ` are spelled out first. Unicode is then
/// decomposed (NFKD) and combining marks are dropped, so accented letters
/// fold to their base letter. Every run of characters outside `[a-z0-9]`
/// becomes a single hyphen; leading and trailing hyphens are stripped.
pub fn slugify(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for c in text.chars() {
        match fold_letter(c) {
            Some(ascii) => folded.push_str(ascii),
            None => folded.push(c),
        }
    }

    let mut slug = String::with_capacity(folded.len());
    let mut pending_dash = false;
    for c in folded.nfkd() {
        if is_combining_mark(c) {
            continue;
        }
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Slugify `text`, falling back to the slug of `fallback` when the text
/// collapses to nothing. Never returns an empty string.
pub fn slug_or(text: &str, fallback: &str) -> String {
    let slug = slugify(text);
    if !slug.is_empty() {
        return slug;
    }
    let slug = slugify(fallback);
    if slug.is_empty() {
        LAST_RESORT_SLUG.to_string()
    } else {
        slug
    }
}

/// Slug for a pack item: derived from the title, or `post-<id>`.
pub fn item_slug(title: &str, id: &str) -> String {
    slug_or(title, &format!("post-{id}"))
}

/// Human title for a topic identifier: `"fastapi-backend"` → `"Fastapi Backend"`.
pub fn display_title(topic: &str) -> String {
    topic
        .split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result of parsing an article filename like `2025-12-04-my-article.md`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleName {
    /// Publication date if the stem starts with `YYYY-MM-DD-`.
    pub date: Option<NaiveDate>,
    /// Remainder of the stem after the date prefix (or the whole stem).
    pub slug: String,
}

/// Parse an article filename (with or without the `.md` extension).
pub fn parse_article_filename(name: &str) -> ArticleName {
    let stem = name.strip_suffix(".md").unwrap_or(name);
    if let (Some(prefix), Some(rest)) = (stem.get(..10), stem.get(11..))
        && stem.as_bytes().get(10) == Some(&b'-')
        && !rest.is_empty()
        && let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
    {
        return ArticleName {
            date: Some(date),
            slug: rest.to_string(),
        };
    }
    ArticleName {
        date: None,
        slug: stem.to_string(),
    }
}

/// `YYYY-MM-DD` prefix for a timestamp.
pub fn date_prefix(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// Filename an article with this date and slug is published under.
pub fn article_filename(date: &str, slug: &str) -> String {
    format!("{date}-{slug}.md")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn slugify_folds_accents_and_punctuation() {
        assert_eq!(slugify("Café René: A Test!"), "cafe-rene-a-test");
    }

    #[test]
    fn slugify_collapses_separator_runs() {
        assert_eq!(slugify("  --Hello__World--  "), "hello-world");
        assert_eq!(slugify("a / b ? c # d"), "a-b-c-d");
    }

    #[test]
    fn slugify_keeps_digits() {
        assert_eq!(slugify("Top 10 FastAPI Tips (2025)"), "top-10-fastapi-tips-2025");
    }

    #[test]
    fn slugify_compatibility_forms() {
        // NFKD splits ligatures and full-width forms
        assert_eq!(slugify("ﬁle ＡＢＣ"), "file-abc");
    }

    #[test]
    fn slugify_spells_out_undecomposable_letters() {
        assert_eq!(slugify("Straße Ærø"), "strasse-aero");
        assert_eq!(slugify("Łódź Œuvre Þing"), "lodz-oeuvre-thing");
    }

    #[test]
    fn slugify_non_latin_collapses_to_empty() {
        assert_eq!(slugify("日本語"), "");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn slug_or_uses_fallback() {
        assert_eq!(slug_or("???", "post-42"), "post-42");
        assert_eq!(slug_or("", ""), "untitled");
        assert_eq!(slug_or("Real Title", "post-1"), "real-title");
    }

    #[test]
    fn item_slug_falls_back_to_identifier() {
        assert_eq!(item_slug("", "17"), "post-17");
        assert_eq!(item_slug("Pandas GroupBy", "17"), "pandas-groupby");
    }

    #[test]
    fn display_title_from_topic() {
        assert_eq!(display_title("fastapi-backend"), "Fastapi Backend");
        assert_eq!(display_title("ai_rag"), "Ai Rag");
        assert_eq!(display_title(""), "");
    }

    #[test]
    fn article_filename_with_date() {
        let n = parse_article_filename("2025-12-04-my-article.md");
        assert_eq!(n.date, NaiveDate::from_ymd_opt(2025, 12, 4));
        assert_eq!(n.slug, "my-article");
    }

    #[test]
    fn article_filename_without_date() {
        let n = parse_article_filename("my-article.md");
        assert_eq!(n.date, None);
        assert_eq!(n.slug, "my-article");
    }

    #[test]
    fn article_filename_with_invalid_date() {
        let n = parse_article_filename("2025-13-40-nope.md");
        assert_eq!(n.date, None);
        assert_eq!(n.slug, "2025-13-40-nope");
    }

    #[test]
    fn article_filename_roundtrip() {
        let name = article_filename("2025-01-02", "hello");
        assert_eq!(name, "2025-01-02-hello.md");
        assert_eq!(parse_article_filename(&name).slug, "hello");
    }

    proptest! {
        #[test]
        fn slugify_is_idempotent(s in ".*") {
            let once = slugify(&s);
            prop_assert_eq!(slugify(&once), once.clone());
        }

        #[test]
        fn slugify_output_is_url_safe(s in ".*") {
            let slug = slugify(&s);
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
        }

        #[test]
        fn slug_or_is_never_empty(s in ".*", id in "[0-9]{0,4}") {
            prop_assert!(!item_slug(&s, &id).is_empty());
        }
    }
}
