//! Shared types passed between pipeline stages.
//!
//! [`Pack`] doubles as the manifest schema: the synchronizer serializes it
//! verbatim to `packs/<slug>.json`, and the QA stage reads it back.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a content entry.
///
/// Transitions only move forward one step at a time:
/// `new → draft → reviewed → published`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    New,
    Draft,
    Reviewed,
    Published,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::New => "new",
            Status::Draft => "draft",
            Status::Reviewed => "reviewed",
            Status::Published => "published",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(Status::New),
            "draft" => Ok(Status::Draft),
            "reviewed" => Ok(Status::Reviewed),
            "published" => Ok(Status::Published),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// A single piece of content, as read from the content store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEntry {
    /// Store identifier. Numeric database ids are accepted and kept as text.
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Markdown body.
    #[serde(default, alias = "body_md")]
    pub body: String,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: BTreeSet<String>,
    /// Naive database timestamps are taken as UTC.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    pub status: Status,
}

impl ContentEntry {
    /// Text the classifier matches keywords against.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.body).to_lowercase()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

fn deserialize_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    RawId::deserialize(d).map(RawId::into_string)
}

/// Tags arrive either as a list or as the comma-separated column the
/// database stores them in.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTags {
    List(Vec<String>),
    Joined(String),
}

fn deserialize_tags<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeSet<String>, D::Error> {
    let tags = match RawTags::deserialize(d)? {
        RawTags::List(list) => list,
        RawTags::Joined(joined) => joined.split(',').map(str::to_string).collect(),
    };
    Ok(tags
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect())
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
}

/// Total order on entry identifiers: numeric ids by value, ahead of any
/// non-numeric id; non-numeric ids by text.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Parse the timestamp formats found in article headers and manifests:
/// RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS[.f]` (taken as UTC), or a bare
/// `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// A reference to a content entry within a pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackItem {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    /// Resolved article URL, e.g. `/blog/<slug>/`.
    pub url: String,
}

/// A named, priced bundle of content items around one topic.
///
/// Field order here is the field order of the JSON manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pack {
    pub slug: String,
    pub topic: String,
    pub title: String,
    /// One-sentence teaser, used as the product page description.
    pub description: String,
    pub long_description: String,
    pub price_label: String,
    pub generated_at: DateTime<Utc>,
    pub items: Vec<PackItem>,
}

impl Pack {
    /// Equal in everything the pipeline derives, ignoring `generated_at`.
    pub fn same_content(&self, other: &Pack) -> bool {
        self.slug == other.slug
            && self.topic == other.topic
            && self.title == other.title
            && self.description == other.description
            && self.long_description == other.long_description
            && self.price_label == other.price_label
            && self.items == other.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_orders_along_lifecycle() {
        assert!(Status::New < Status::Draft);
        assert!(Status::Draft < Status::Reviewed);
        assert!(Status::Reviewed < Status::Published);
    }

    #[test]
    fn numeric_ids_compare_by_value() {
        assert_eq!(compare_ids("9", "10"), Ordering::Less);
        assert_eq!(compare_ids("10", "9"), Ordering::Greater);
        assert_eq!(compare_ids("10", "a"), Ordering::Less);
        assert_eq!(compare_ids("post-b", "post-a"), Ordering::Greater);
        let mut ids = vec!["1a", "10", "2", "b", "9"];
        ids.sort_by(|a, b| compare_ids(a, b));
        assert_eq!(ids, vec!["2", "9", "10", "1a", "b"]);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Published".parse::<Status>(), Ok(Status::Published));
        assert!("archived".parse::<Status>().is_err());
    }

    #[test]
    fn entry_accepts_database_export_shape() {
        let json = r#"{
            "id": 42,
            "title": "FastAPI dependency injection",
            "body_md": "Use Depends.",
            "tags": "fastapi, Python ,",
            "created_at": "2025-12-04T10:17:45.367076",
            "status": "published"
        }"#;
        let entry: ContentEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.id, "42");
        assert_eq!(entry.body, "Use Depends.");
        assert_eq!(
            entry.tags.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["fastapi", "python"]
        );
    }

    #[test]
    fn entry_accepts_tag_list_and_string_id() {
        let json = r#"{"id":"a1","title":"t","body":"b","tags":["Docker"],
            "created_at":"2025-01-01T00:00:00+00:00","status":"draft"}"#;
        let entry: ContentEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.id, "a1");
        assert!(entry.tags.contains("docker"));
        assert_eq!(entry.status, Status::Draft);
    }

    #[test]
    fn parse_timestamp_formats() {
        let expected = "2025-12-04T10:17:45Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(parse_timestamp("2025-12-04T10:17:45+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-12-04T11:17:45+01:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-12-04T10:17:45"), Some(expected));
        assert_eq!(
            parse_timestamp("2025-12-04"),
            Some("2025-12-04T00:00:00Z".parse().unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn search_text_is_lowercased_title_and_body() {
        let json = r#"{"id":1,"title":"FastAPI","body":"Some BODY",
            "created_at":"2025-01-01T00:00:00Z","status":"published"}"#;
        let entry: ContentEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.search_text(), "fastapi some body");
    }
}
