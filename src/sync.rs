//! Artifact synchronization: [`Pack`] → manifest + product page.
//!
//! Every run recomputes each pack and reconciles it with what is already on
//! disk instead of blindly overwriting:
//!
//! | Artifact | Path | Ownership |
//! |---|---|---|
//! | Manifest | `packs/<slug>.json` | Fully derived; overwritten |
//! | Product page | `products/<slug>.md` | Shared with humans; merged |
//!
//! ## Manifest
//!
//! Pretty-printed JSON (two-space indent, non-ASCII kept as is, trailing
//! newline). When the existing manifest differs from the new one only in
//! `generated_at`, the old timestamp is kept and the file is left alone, so
//! running twice on the same input leaves every byte in place.
//!
//! ## Product Page
//!
//! ```text
//! +++
//! title = "FastAPI Backend Pack #1"     ← managed: updated in place
//! price_label = "8,99 €"                ← unmanaged: never touched
//! hero_body = "..."                     ← unmanaged
//! +++
//!
//! # Hand-written intro                  ← preserved byte for byte
//!
//! <!-- packwright:articles:start -->    ┐
//! ## Included articles                  │ regenerated every run
//! - <a href="/blog/x/">X</a>            │
//! <!-- packwright:articles:end -->      ┘
//!
//! Hand-written outro                    ← preserved byte for byte
//! ```
//!
//! Without markers, a `## Included articles` section (up to the next level one
//! or two heading) is replaced by the marked block; without either,
//! the block is appended. Pages written before markers existed converge to
//! the marked form on their first sync.
//!
//! All writes go through a temp file in the target directory and a rename,
//! so a crash never leaves a half-written artifact behind.

use crate::config::SitePaths;
use crate::frontmatter::{Delimiter, Document, FrontMatter};
use crate::naming::date_prefix;
use crate::types::Pack;
use maud::html;
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const ARTICLES_START: &str = "<!-- packwright:articles:start -->";
pub const ARTICLES_END: &str = "<!-- packwright:articles:end -->";
const ARTICLES_HEADING: &str = "## Included articles";

/// Header keys the synchronizer owns on product pages.
pub const MANAGED_KEYS: [&str; 6] = ["slug", "pack_slug", "title", "description", "topic", "type"];

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> SyncError + '_ {
        move |source| SyncError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What a sync did to one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStatus {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArtifactStatus::Created => "created",
            ArtifactStatus::Updated => "updated",
            ArtifactStatus::Unchanged => "unchanged",
        })
    }
}

/// Outcome of synchronizing one pack.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub pack: String,
    pub title: String,
    pub items: usize,
    pub manifest: ArtifactStatus,
    pub product_page: ArtifactStatus,
}

/// Synchronize both artifacts of one pack.
pub fn sync_pack(pack: &Pack, paths: &SitePaths) -> Result<SyncReport, SyncError> {
    let (manifest, effective) = sync_manifest(pack, &paths.manifest_path(&pack.slug))?;
    let product_page = sync_product_page(&effective, &paths.product_path(&pack.slug))?;
    info!(pack = %pack.slug, %manifest, %product_page, "synchronized pack");
    Ok(SyncReport {
        pack: pack.slug.clone(),
        title: pack.title.clone(),
        items: pack.items.len(),
        manifest,
        product_page,
    })
}

// ============================================================================
// Atomic writes
// ============================================================================

/// Replace `path` with `bytes` via a temp file in the same directory.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Write `bytes` unless the file already holds exactly them.
pub fn write_if_changed(path: &Path, bytes: &[u8]) -> io::Result<ArtifactStatus> {
    let status = match fs::read(path) {
        Ok(existing) if existing == bytes => return Ok(ArtifactStatus::Unchanged),
        Ok(_) => ArtifactStatus::Updated,
        Err(e) if e.kind() == io::ErrorKind::NotFound => ArtifactStatus::Created,
        Err(e) => return Err(e),
    };
    write_atomic(path, bytes)?;
    Ok(status)
}

// ============================================================================
// Manifest
// ============================================================================

/// Canonical manifest text for a pack.
pub fn render_manifest(pack: &Pack) -> Result<String, serde_json::Error> {
    let mut json = serde_json::to_string_pretty(pack)?;
    json.push('\n');
    Ok(json)
}

/// Write the manifest, keeping the previous `generated_at` when nothing
/// else changed. Returns the status and the pack as written.
pub fn sync_manifest(pack: &Pack, path: &Path) -> Result<(ArtifactStatus, Pack), SyncError> {
    let mut effective = pack.clone();
    match fs::read_to_string(path) {
        Ok(existing) => match serde_json::from_str::<Pack>(&existing) {
            Ok(previous) if previous.same_content(pack) => {
                effective.generated_at = previous.generated_at;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(path = %path.display(), error = %e, "existing manifest unreadable, replacing");
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(SyncError::io(path)(e)),
    }
    let json = render_manifest(&effective)?;
    let status = write_if_changed(path, json.as_bytes()).map_err(SyncError::io(path))?;
    Ok((status, effective))
}

// ============================================================================
// Product page
// ============================================================================

/// The marker-delimited article list, without a trailing newline.
pub fn render_article_block(pack: &Pack) -> String {
    let mut block = String::new();
    block.push_str(ARTICLES_START);
    block.push('\n');
    block.push_str(ARTICLES_HEADING);
    block.push_str("\n\n");
    for item in &pack.items {
        let link = html! { a href=(item.url) { (item.title) } };
        block.push_str("- ");
        block.push_str(&link.into_string());
        block.push('\n');
    }
    block.push_str(ARTICLES_END);
    block
}

/// Managed header values for a pack, in header order.
fn managed_fields(pack: &Pack) -> [(&'static str, &str); 6] {
    [
        ("title", pack.title.as_str()),
        ("slug", pack.slug.as_str()),
        ("description", pack.description.as_str()),
        ("pack_slug", pack.slug.as_str()),
        ("topic", pack.topic.as_str()),
        ("type", "products"),
    ]
}

/// Text of a brand-new product page.
pub fn render_new_page(pack: &Pack) -> String {
    let date = date_prefix(&pack.generated_at);
    let mut fields: Vec<(&str, &str)> = managed_fields(pack).to_vec();
    fields.insert(2, ("date", date.as_str()));
    fields.push(("price_label", pack.price_label.as_str()));
    let body = format!(
        "\n# {}\n\n{}\n\n{}\n",
        pack.title,
        pack.long_description,
        render_article_block(pack)
    );
    Document::with_toml_header(&fields, body).render()
}

/// Merge a pack into existing page text. Only managed header keys and the
/// article block can change.
pub fn merge_product_page(existing: &str, pack: &Pack) -> String {
    let mut doc = Document::parse(existing);
    let front_matter = doc
        .front_matter
        .get_or_insert_with(|| FrontMatter::empty(Delimiter::Toml));
    for (key, value) in managed_fields(pack) {
        front_matter.upsert(key, value);
    }
    doc.body = replace_article_block(&doc.body, &render_article_block(pack));
    doc.render()
}

/// Create or update the product page at `path`.
pub fn sync_product_page(pack: &Pack, path: &Path) -> Result<ArtifactStatus, SyncError> {
    let text = match fs::read_to_string(path) {
        Ok(existing) => merge_product_page(&existing, pack),
        Err(e) if e.kind() == io::ErrorKind::NotFound => render_new_page(pack),
        Err(e) => return Err(SyncError::io(path)(e)),
    };
    write_if_changed(path, text.as_bytes()).map_err(SyncError::io(path))
}

/// Put `block` in place of the existing article section of `body`.
pub fn replace_article_block(body: &str, block: &str) -> String {
    if let Some(start) = body.find(ARTICLES_START) {
        let after = start + ARTICLES_START.len();
        return match body[after..].find(ARTICLES_END) {
            Some(offset) => {
                let end = after + offset + ARTICLES_END.len();
                format!("{}{}{}", &body[..start], block, &body[end..])
            }
            None => {
                warn!("article start marker without end marker, replacing to end of page");
                format!("{}{}\n", &body[..start], block)
            }
        };
    }

    if let Some((start, end)) = legacy_section(body) {
        let rest = if end < body.len() {
            format!("\n{}", &body[end..])
        } else {
            String::new()
        };
        return format!("{}{}\n{}", &body[..start], block, rest);
    }

    let kept = body.trim_end();
    if kept.is_empty() {
        format!("{block}\n")
    } else {
        format!("{kept}\n\n{block}\n")
    }
}

/// Byte range of an unmarked `## Included articles` section: from its
/// heading to the next heading of level one or two, or the end of `body`.
fn legacy_section(body: &str) -> Option<(usize, usize)> {
    let mut start = None;
    let mut heading: Option<(usize, HeadingLevel, String)> = None;
    for (event, range) in Parser::new(body).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                heading = Some((range.start, level, String::new()));
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, _, title)) = heading.as_mut() {
                    title.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                let Some((offset, level, title)) = heading.take() else {
                    continue;
                };
                let major = matches!(level, HeadingLevel::H1 | HeadingLevel::H2);
                match start {
                    None if title.trim().eq_ignore_ascii_case("included articles") => {
                        start = Some(offset);
                    }
                    Some(s) if major => return Some((s, offset)),
                    _ => {}
                }
            }
            _ => {}
        }
    }
    start.map(|s| (s, body.len()))
}
