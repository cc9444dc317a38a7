//! Content store accessors.
//!
//! The pack pipeline only ever reads: entries filtered by status, newest
//! first, limited to N. Three backings implement [`ContentStore`]:
//!
//! - [`JsonFileStore`]: a JSON array exported from the content database
//! - [`MarkdownDirStore`]: published articles in the blog directory
//! - [`MemoryStore`]: entries held in memory
//!
//! ## Markdown Articles
//!
//! ```text
//! site/content/blog/
//! ├── 2025-12-04-fastapi-depends.md   # date prefix doubles as created_at
//! └── pandas-groupby.md               # needs `date` in its header
//! ```
//!
//! Header fields (`+++` or `---`): `id`/`original_id`, `title`, `date`,
//! `tags`, `status` (default `published`). Title falls back to the first
//! `# heading`, then to the filename. An article without any usable date is
//! skipped with a warning rather than failing the whole read; so is a
//! malformed record in a JSON snapshot. Skipped records come back in
//! [`Fetched::rejected`].

use crate::config::{PipelineConfig, SitePaths, StoreKind};
use crate::frontmatter::Document;
use crate::naming::{display_title, parse_article_filename};
use crate::types::{ContentEntry, Status, compare_ids, parse_timestamp};
use chrono::{DateTime, Utc};
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Content store not found: {0}")]
    NotFound(PathBuf),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Read filter applied by every store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreQuery {
    pub status: Status,
    pub limit: usize,
    /// Only entries created at or after this instant.
    pub since: Option<DateTime<Utc>>,
}

impl StoreQuery {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            status: config.store.status,
            limit: config.store.limit,
            since: None,
        }
    }
}

/// A source record that could not be read as an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    /// Record id, array index or filename.
    pub record: String,
    pub reason: String,
}

/// What a store read: usable entries plus the records it had to skip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fetched {
    pub entries: Vec<ContentEntry>,
    pub rejected: Vec<Rejected>,
}

pub trait ContentStore {
    /// Entries matching `query`, newest first (ties by identifier), at most
    /// `query.limit` of them. A malformed record is skipped and reported in
    /// [`Fetched::rejected`]; only an unreadable source is an error.
    fn fetch(&self, query: &StoreQuery) -> Result<Fetched, StoreError>;
}

/// Filter, order and limit entries the same way for every backing.
pub fn apply_query(mut entries: Vec<ContentEntry>, query: &StoreQuery) -> Vec<ContentEntry> {
    entries.retain(|e| e.status == query.status && query.since.is_none_or(|s| e.created_at >= s));
    entries.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| compare_ids(&a.id, &b.id))
    });
    entries.truncate(query.limit);
    entries
}

/// Build the store selected by `store.kind`.
pub fn open_store(config: &PipelineConfig, paths: &SitePaths) -> Box<dyn ContentStore> {
    match config.store.kind {
        StoreKind::Json => Box::new(JsonFileStore::new(paths.root.join(&config.store.path))),
        StoreKind::Markdown => Box::new(MarkdownDirStore::new(paths.blog_dir.clone())),
    }
}

// ============================================================================
// JSON snapshot
// ============================================================================

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ContentStore for JsonFileStore {
    fn fetch(&self, query: &StoreQuery) -> Result<Fetched, StoreError> {
        if !self.path.is_file() {
            return Err(StoreError::NotFound(self.path.clone()));
        }
        let content = fs::read_to_string(&self.path)?;
        let records: Vec<serde_json::Value> =
            serde_json::from_str(&content).map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            })?;

        let mut entries = Vec::with_capacity(records.len());
        let mut rejected = Vec::new();
        for (index, record) in records.into_iter().enumerate() {
            let label = record_label(&record, index);
            match serde_json::from_value::<ContentEntry>(record) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(record = %label, error = %e, "skipping malformed content record");
                    rejected.push(Rejected {
                        record: label,
                        reason: e.to_string(),
                    });
                }
            }
        }
        debug!(
            path = %self.path.display(),
            count = entries.len(),
            rejected = rejected.len(),
            "loaded content snapshot"
        );
        Ok(Fetched {
            entries: apply_query(entries, query),
            rejected,
        })
    }
}

/// `id 42` when the record carries a usable id, else `record #3` (1-based).
fn record_label(record: &serde_json::Value, index: usize) -> String {
    match record.get("id") {
        Some(serde_json::Value::String(id)) if !id.trim().is_empty() => format!("id {id}"),
        Some(serde_json::Value::Number(id)) => format!("id {id}"),
        _ => format!("record #{}", index + 1),
    }
}

// ============================================================================
// Markdown directory
// ============================================================================

pub struct MarkdownDirStore {
    dir: PathBuf,
}

impl MarkdownDirStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl ContentStore for MarkdownDirStore {
    fn fetch(&self, query: &StoreQuery) -> Result<Fetched, StoreError> {
        if !self.dir.is_dir() {
            return Err(StoreError::NotFound(self.dir.clone()));
        }
        let mut entries = Vec::new();
        let mut rejected = Vec::new();
        for path in markdown_files(&self.dir)? {
            let record = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let reason = match fs::read_to_string(&path) {
                Ok(text) => match parse_article(&path, &text) {
                    Some(entry) => {
                        entries.push(entry);
                        continue;
                    }
                    None => "article has no usable date".to_string(),
                },
                Err(e) => format!("failed to read article: {e}"),
            };
            warn!(path = %path.display(), %reason, "skipping article");
            rejected.push(Rejected { record, reason });
        }
        Ok(Fetched {
            entries: apply_query(entries, query),
            rejected,
        })
    }
}

/// Markdown files directly inside `dir`, sorted by filename.
pub fn markdown_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let path = entry.path();
        let is_md = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("md"))
            .unwrap_or(false);
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if entry.file_type().is_file() && is_md && !hidden {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

/// Build a content entry from one article file.
fn parse_article(path: &Path, text: &str) -> Option<ContentEntry> {
    let filename = path.file_name()?.to_string_lossy().to_string();
    let name = parse_article_filename(&filename);
    let doc = Document::parse(text);
    let fm = doc.front_matter.as_ref();

    let created_at = doc
        .get("date")
        .and_then(|d| parse_timestamp(&d))
        .or_else(|| {
            name.date
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })?;

    let id = doc
        .get("id")
        .or_else(|| doc.get("original_id"))
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| filename.trim_end_matches(".md").to_string());

    let title = doc
        .get("title")
        .filter(|t| !t.trim().is_empty())
        .or_else(|| h1_headings(&doc.body).into_iter().next())
        .unwrap_or_else(|| display_title(&name.slug));

    let status = match doc.get("status") {
        Some(raw) => match raw.parse::<Status>() {
            Ok(status) => status,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unknown status, treating as published");
                Status::Published
            }
        },
        None => Status::Published,
    };

    let tags = fm
        .map(|fm| fm.get_list("tags"))
        .unwrap_or_default()
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    Some(ContentEntry {
        id,
        title,
        body: doc.body,
        tags,
        created_at,
        status,
    })
}

/// Text of every non-empty level-one heading in a markdown body, in order.
pub fn h1_headings(markdown: &str) -> Vec<String> {
    let mut headings = Vec::new();
    let mut current: Option<String> = None;
    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) => current = Some(String::new()),
            Event::End(TagEnd::Heading(HeadingLevel::H1)) => {
                if let Some(text) = current.take().map(|t| t.trim().to_string())
                    && !text.is_empty()
                {
                    headings.push(text);
                }
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(heading) = current.as_mut() {
                    heading.push_str(&text);
                }
            }
            _ => {}
        }
    }
    headings
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Vec<ContentEntry>,
}

impl MemoryStore {
    pub fn new(entries: Vec<ContentEntry>) -> Self {
        Self { entries }
    }
}

impl ContentStore for MemoryStore {
    fn fetch(&self, query: &StoreQuery) -> Result<Fetched, StoreError> {
        Ok(Fetched {
            entries: apply_query(self.entries.clone(), query),
            rejected: Vec::new(),
        })
    }
}
