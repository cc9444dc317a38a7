//! # Packwright
//!
//! Bundles published micro-tutorials into topic packs and keeps three
//! artifacts per pack in sync on disk: a machine-readable manifest, a
//! partially hand-written product page, and a downloadable ZIP archive.
//! Every run is idempotent: when nothing changed upstream, nothing changes
//! on disk, byte for byte.
//!
//! # Architecture: Staged Run
//!
//! ```text
//! store ──► classify ──► assemble ──► sync      packs/<slug>.json
//!                                      │        products/<slug>.md
//!                                      ▼
//!              blog/*.md ──► archive            downloads/<slug>.zip
//!                                      │
//!                                      ▼
//!                                     qa        admin/pack-qa-report.md
//! ```
//!
//! The stages talk to each other only through files. The archive builder
//! reads manifests back from disk instead of taking packs from memory, so a
//! failed pack build still leaves last run's packs to archive and check.
//! [`orchestrate`] runs the stages in a fixed order and isolates failures
//! per stage and per pack.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `packwright.toml` loading, stock defaults, env overrides, validation |
//! | [`store`] | Content store seam: JSON snapshot, markdown directory, in-memory |
//! | [`types`] | Content entries, packs and their serialized forms |
//! | [`classify`] | Keyword matching of entries against topic templates |
//! | [`assemble`] | Per-topic bundling: ordering, thresholds, weekly editions |
//! | [`sync`] | Manifest and product page synchronization with atomic writes |
//! | [`frontmatter`] | Round-trippable TOML/YAML front matter for markdown files |
//! | [`archive`] | Article resolution and deterministic ZIP builds |
//! | [`qa`] | Consistency checks over manifests, archives and blog articles |
//! | [`naming`] | Slugs, display titles and `YYYY-MM-DD-slug.md` filenames |
//! | [`orchestrate`] | Stage state machine, external commands, run summaries |
//! | [`output`] | CLI output formatting of run summaries |
//!
//! # Design Decisions
//!
//! ## Hand-Written Content Survives
//!
//! Product pages are owned by two parties. The pipeline manages a fixed set
//! of front-matter keys and the block between the article markers; the rest
//! of the file belongs to whoever edits it. [`frontmatter`] keeps unknown
//! keys, their order and their formatting untouched, so a merge never
//! rewrites what it does not own.
//!
//! ## Deterministic Archives
//!
//! ZIP entries carry a fixed timestamp and are written in a fixed order, so
//! the same manifest and articles always produce the same bytes. The new
//! archive is compared by SHA-256 against the existing file and only
//! replaced on change.
//!
//! ## One Price
//!
//! Every pack's price label derives from `pricing.default_cents`. QA flags
//! manifests whose label drifted from it.

pub mod archive;
pub mod assemble;
pub mod classify;
pub mod config;
pub mod frontmatter;
pub mod naming;
pub mod orchestrate;
pub mod output;
pub mod qa;
pub mod store;
pub mod sync;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
