//! Shared test utilities for the packwright test suite.
//!
//! Provides entry and pack builders, a throwaway site tree, and small
//! extractors so tests read as data rather than setup.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let site = setup_site();
//! let paths = site_paths(site.path());
//! let pack = sample_pack("testing", 2);
//! publish_items(&paths, &pack);
//!
//! let e = entry("1", "pytest fixtures", "", "2025-12-01T00:00:00Z");
//! assert_eq!(ids(&[e]), vec!["1"]);
//! ```

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use chrono::{DateTime, Utc};

use crate::config::{PathsConfig, SitePaths};
use crate::naming::{article_filename, date_prefix, display_title};
use crate::types::{ContentEntry, Pack, PackItem, Status};

// =========================================================================
// Entries
// =========================================================================

/// Parse an RFC 3339 timestamp. Panics on malformed input.
pub fn ts(raw: &str) -> DateTime<Utc> {
    raw.parse()
        .unwrap_or_else(|e| panic!("bad test timestamp '{raw}': {e}"))
}

/// A published entry without tags.
pub fn entry(id: &str, title: &str, body: &str, created_at: &str) -> ContentEntry {
    ContentEntry {
        id: id.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        tags: Default::default(),
        created_at: ts(created_at),
        status: Status::Published,
    }
}

pub fn with_status(mut entry: ContentEntry, status: Status) -> ContentEntry {
    entry.status = status;
    entry
}

/// Entry identifiers in order.
pub fn ids(entries: &[ContentEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.id.as_str()).collect()
}

// =========================================================================
// Packs
// =========================================================================

/// A pack for `topic` with `n` items `article-1..=n`, created on
/// consecutive days from 2025-12-01, generated 2025-12-04 noon.
pub fn sample_pack(topic: &str, n: usize) -> Pack {
    let items = (1..=n)
        .map(|i| PackItem {
            id: i.to_string(),
            title: format!("Article {i}"),
            slug: format!("article-{i}"),
            created_at: ts(&format!("2025-12-{:02}T08:00:00Z", i)),
            url: format!("/blog/article-{i}/"),
        })
        .collect();
    let title = format!("{} Pack #1", display_title(topic));
    Pack {
        slug: format!("{topic}-pack-1"),
        topic: topic.to_string(),
        description: format!("Short blurb for {title}."),
        long_description: format!("Long description for {title}."),
        title,
        price_label: "8,99 €".to_string(),
        generated_at: ts("2025-12-04T12:00:00Z"),
        items,
    }
}

// =========================================================================
// Site tree
// =========================================================================

/// Temp site root with every default directory created and empty.
pub fn setup_site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let paths = site_paths(tmp.path());
    for dir in [
        &paths.packs_dir,
        &paths.products_dir,
        &paths.downloads_dir,
        &paths.blog_dir,
        &paths.reports_dir,
    ] {
        fs::create_dir_all(dir).unwrap();
    }
    tmp
}

/// Default layout resolved against `root`.
pub fn site_paths(root: &Path) -> SitePaths {
    SitePaths::resolve(root, &PathsConfig::default())
}

/// Write a file into `dir`, creating the directory if needed.
pub fn write_article(dir: &Path, name: &str, content: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), content).unwrap();
}

/// Publish one `YYYY-MM-DD-<slug>.md` blog article per pack item.
pub fn publish_items(paths: &SitePaths, pack: &Pack) {
    for item in &pack.items {
        let date = date_prefix(&item.created_at);
        write_article(
            &paths.blog_dir,
            &article_filename(&date, &item.slug),
            &format!(
                "+++\ntitle = \"{}\"\ndate = \"{date}\"\n+++\n\nBody of {}.\n",
                item.title, item.title
            ),
        );
    }
}
