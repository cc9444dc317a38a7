//! Downloadable pack archives.
//!
//! Archives are built from the manifest **on disk**, never from in-memory
//! pack state, so an archive can only ever describe what the manifest next
//! to it says. If pack building failed this run, the previous manifests are
//! archived instead.
//!
//! ## Archive Layout
//!
//! ```text
//! fastapi-backend-pack-1.zip
//! ├── README.txt
//! ├── fastapi-backend-pack-1.json      # bytes of the on-disk manifest
//! └── articles/
//!     ├── 2025-12-01-fastapi-depends.md
//!     └── 2025-12-03-fastapi-settings.md
//! ```
//!
//! ## Article Resolution
//!
//! Each manifest item is matched to a blog file, first hit wins:
//!
//! 1. an article whose own header declares `slug = "<slug>"`
//! 2. `<YYYY-MM-DD>-<slug>.md`, dated by the item's `created_at`
//! 3. the first file (by name) ending in `-<slug>.md`
//!
//! Items that resolve to nothing are skipped with a warning, and so are items
//! whose article is already in the archive. When nothing resolves at all, no
//! archive is written; an archive from an earlier run is left as it is.
//!
//! ## Reproducible Bytes
//!
//! Entries carry a fixed timestamp and are written in manifest order, so the
//! same inputs always produce the same archive. The SHA-256 of the new bytes
//! is compared with the existing file, and an identical archive is left in
//! place.
//!
//! Manifests written before the current schema are still accepted:
//! `pack_slug` for `slug`, `articles` for `items`, `date` for `created_at`.

use crate::config::SitePaths;
use crate::frontmatter::Document;
use crate::naming::{article_filename, date_prefix, parse_article_filename, slug_or};
use crate::store::{StoreError, h1_headings, markdown_files};
use crate::sync::{ArtifactStatus, write_atomic};
use crate::types::parse_timestamp;
use chrono::DateTime;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("Manifest {path} is not valid JSON: {source}")]
    Manifest {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Blog directory not found: {0}")]
    BlogDirMissing(PathBuf),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

impl ArchiveError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
        move |source| ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ============================================================================
// Manifest view
// ============================================================================

/// Lenient reading of a manifest, current or legacy shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ManifestView {
    pub slug: Option<String>,
    pub pack_slug: Option<String>,
    pub title: Option<String>,
    pub topic: Option<String>,
    pub price_label: Option<String>,
    pub items: Vec<ManifestItem>,
    pub articles: Vec<ManifestItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ManifestItem {
    pub slug: Option<String>,
    pub created_at: Option<String>,
    pub date: Option<String>,
}

impl ManifestItem {
    pub fn slug(&self) -> &str {
        self.slug.as_deref().map(str::trim).unwrap_or_default()
    }

    /// `YYYY-MM-DD` of the item's timestamp as stored, in its own offset.
    pub fn date_prefix(&self) -> Option<String> {
        let raw = self.created_at.as_deref().or(self.date.as_deref())?.trim();
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Some(at.date_naive().format("%Y-%m-%d").to_string());
        }
        parse_timestamp(raw).map(|at| date_prefix(&at))
    }
}

impl ManifestView {
    pub fn parse(bytes: &[u8], path: &Path) -> Result<Self, ArchiveError> {
        serde_json::from_slice(bytes).map_err(|source| ArchiveError::Manifest {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Pack slug, falling back to the manifest's file stem.
    pub fn slug_or_stem(&self, path: &Path) -> String {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let raw = self
            .pack_slug
            .as_deref()
            .or(self.slug.as_deref())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&stem);
        slug_or(raw, &stem)
    }

    pub fn items(&self) -> &[ManifestItem] {
        if self.items.is_empty() {
            &self.articles
        } else {
            &self.items
        }
    }
}

/// Manifest files in `packs_dir`, sorted by name. A missing directory has
/// no manifests.
pub fn manifest_paths(packs_dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    if !packs_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    for entry in WalkDir::new(packs_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|e| e == "json") {
            paths.push(path.to_path_buf());
        }
    }
    Ok(paths)
}

// ============================================================================
// Article index
// ============================================================================

/// One blog article as seen by the resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedArticle {
    pub path: PathBuf,
    pub filename: String,
    /// Header `slug`, else the filename slug.
    pub slug: String,
    pub title: Option<String>,
    pub date: Option<String>,
    /// Level-one headings in the body.
    pub headings: Vec<String>,
}

/// Lookup structure over the blog directory.
#[derive(Debug, Clone, Default)]
pub struct ArticleIndex {
    articles: Vec<IndexedArticle>,
    by_header_slug: HashMap<String, usize>,
    by_filename: BTreeMap<String, usize>,
}

impl ArticleIndex {
    /// Index every markdown file directly inside `blog_dir`.
    pub fn build(blog_dir: &Path) -> Result<Self, ArchiveError> {
        if !blog_dir.is_dir() {
            return Err(ArchiveError::BlogDirMissing(blog_dir.to_path_buf()));
        }
        let mut index = Self::default();
        for path in markdown_files(blog_dir)? {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let doc = match fs::read_to_string(&path) {
                Ok(text) => Document::parse(&text),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable article, indexing by filename only");
                    Document::parse("")
                }
            };
            let header_slug = doc.get("slug").filter(|s| !s.trim().is_empty());
            let position = index.articles.len();
            if let Some(slug) = &header_slug {
                index.by_header_slug.entry(slug.clone()).or_insert(position);
            }
            index.by_filename.insert(filename.clone(), position);
            index.articles.push(IndexedArticle {
                slug: header_slug.unwrap_or_else(|| parse_article_filename(&filename).slug),
                title: doc.get("title"),
                date: doc.get("date"),
                headings: h1_headings(&doc.body),
                path,
                filename,
            });
        }
        Ok(index)
    }

    pub fn articles(&self) -> &[IndexedArticle] {
        &self.articles
    }

    /// Resolve an item slug (and optional `YYYY-MM-DD` date) to a file.
    pub fn resolve(&self, slug: &str, date: Option<&str>) -> Option<&IndexedArticle> {
        if slug.is_empty() {
            return None;
        }
        if let Some(&i) = self.by_header_slug.get(slug) {
            return Some(&self.articles[i]);
        }
        if let Some(date) = date
            && let Some(&i) = self.by_filename.get(&article_filename(date, slug))
        {
            return Some(&self.articles[i]);
        }
        let suffix = format!("-{slug}.md");
        self.by_filename
            .iter()
            .find(|(name, _)| name.ends_with(&suffix))
            .map(|(_, &i)| &self.articles[i])
    }
}

// ============================================================================
// Building
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveOutcome {
    Written {
        status: ArtifactStatus,
        articles: usize,
        /// Item slugs that resolved to no article.
        missing: Vec<String>,
        /// Item slugs whose article was already included by an earlier item.
        duplicates: Vec<String>,
    },
    /// Nothing was written; an existing archive is untouched.
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveReport {
    pub pack: String,
    pub outcome: ArchiveOutcome,
}

/// SHA-256 of `bytes` as a hex string.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 of a file's contents, `None` if it does not exist.
pub fn hash_file(path: &Path) -> io::Result<Option<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(hash_bytes(&bytes))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn readme(title: &str, slug: &str) -> String {
    format!(
        "{title}\n\
         \n\
         This archive contains every article of the pack as a Markdown file,\n\
         plus the pack definition as JSON ({slug}.json).\n\
         \n\
         Feel free to reuse the files in your own notes or documentation system.\n"
    )
}

/// Build (or refresh) the archive for the manifest at `manifest_path`.
pub fn build_archive(
    manifest_path: &Path,
    index: &ArticleIndex,
    paths: &SitePaths,
) -> Result<ArchiveReport, ArchiveError> {
    let manifest_bytes = fs::read(manifest_path).map_err(ArchiveError::io(manifest_path))?;
    let view = ManifestView::parse(&manifest_bytes, manifest_path)?;
    let slug = view.slug_or_stem(manifest_path);
    let archive_path = paths.archive_path(&slug);

    let mut arcnames = HashSet::new();
    let mut resolved = Vec::new();
    let mut missing = Vec::new();
    let mut duplicates = Vec::new();
    for item in view.items() {
        let item_slug = item.slug();
        let date = item.date_prefix();
        match index.resolve(item_slug, date.as_deref()) {
            Some(article) => {
                let arcname = format!("articles/{}", article.filename);
                if arcnames.insert(arcname.clone()) {
                    resolved.push((arcname, article.path.clone()));
                } else {
                    warn!(pack = %slug, item = %item_slug, %arcname, "article already in archive, skipping item");
                    duplicates.push(item_slug.to_string());
                }
            }
            None => {
                let shown = if item_slug.is_empty() { "(empty)" } else { item_slug };
                warn!(pack = %slug, item = %shown, "no blog article found for item");
                missing.push(shown.to_string());
            }
        }
    }

    if resolved.is_empty() {
        let reason = if view.items().is_empty() {
            "manifest has no items".to_string()
        } else {
            "no article could be resolved".to_string()
        };
        info!(pack = %slug, %reason, "skipping archive");
        return Ok(ArchiveReport {
            pack: slug,
            outcome: ArchiveOutcome::Skipped { reason },
        });
    }

    let title = view.title.as_deref().filter(|t| !t.trim().is_empty()).unwrap_or(&slug);
    let bytes = write_zip(&readme(title, &slug), &slug, &manifest_bytes, &resolved)?;

    let previous = hash_file(&archive_path).map_err(ArchiveError::io(&archive_path))?;
    let status = match previous {
        Some(hash) if hash == hash_bytes(&bytes) => ArtifactStatus::Unchanged,
        Some(_) => ArtifactStatus::Updated,
        None => ArtifactStatus::Created,
    };
    if status != ArtifactStatus::Unchanged {
        write_atomic(&archive_path, &bytes).map_err(ArchiveError::io(&archive_path))?;
    }
    info!(pack = %slug, %status, articles = resolved.len(), "archive built");

    Ok(ArchiveReport {
        pack: slug,
        outcome: ArchiveOutcome::Written {
            status,
            articles: resolved.len(),
            missing,
            duplicates,
        },
    })
}

fn write_zip(
    readme: &str,
    slug: &str,
    manifest: &[u8],
    articles: &[(String, PathBuf)],
) -> Result<Vec<u8>, ArchiveError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("README.txt", options)?;
    zip.write_all(readme.as_bytes())
        .map_err(|source| ArchiveError::Io {
            path: PathBuf::from("README.txt"),
            source,
        })?;
    zip.start_file(format!("{slug}.json"), options)?;
    zip.write_all(manifest).map_err(|source| ArchiveError::Io {
        path: PathBuf::from(format!("{slug}.json")),
        source,
    })?;
    for (arcname, path) in articles {
        let content = fs::read(path).map_err(ArchiveError::io(path))?;
        zip.start_file(arcname.as_str(), options)?;
        zip.write_all(&content).map_err(ArchiveError::io(path))?;
    }
    Ok(zip.finish()?.into_inner())
}
