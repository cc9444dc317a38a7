//! Pipeline configuration.
//!
//! Handles loading, validating, and merging `packwright.toml`. The stock
//! defaults are the base layer; the user file overrides them key by key; a
//! handful of environment variables override the result. Everything is
//! resolved once in `main` and passed down by reference; no other module
//! reads the environment.
//!
//! ## Config File Location
//!
//! ```text
//! site-root/
//! ├── packwright.toml          # Pipeline config (optional)
//! ├── data/content.json        # Content store snapshot (store.kind = "json")
//! └── site/
//!     ├── content/blog/        # Published articles
//!     ├── content/products/    # Product pages (partially hand-written)
//!     ├── content/admin/       # QA reports
//!     ├── static/packs/        # Pack manifests
//!     └── static/downloads/    # Pack archives
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! [paths]
//! packs_dir = "site/static/packs"
//! products_dir = "site/content/products"
//! downloads_dir = "site/static/downloads"
//! blog_dir = "site/content/blog"
//! reports_dir = "site/content/admin"
//!
//! [pricing]
//! default_cents = 899          # Source of truth for every price label
//! currency_symbol = "€"
//! decimal_separator = ","
//!
//! [store]
//! kind = "json"                # "json" or "markdown" (reads blog_dir)
//! path = "data/content.json"
//! status = "published"
//! limit = 200
//!
//! [packs]
//! min_items = 5
//! article_url_prefix = "/blog/"
//! weekly_window_days = 7
//!
//! [stages.harvest]
//! command = ["python", "automations/harvest.py"]
//! timeout_secs = 600
//!
//! [[topics]]
//! id = "fastapi-backend"
//! keywords = ["fastapi", "api", "backend"]
//! ```
//!
//! `[[topics]]` is an ordered array: topics are classified and bundled in
//! declaration order. A user file that sets `topics` replaces the stock list
//! entirely. Unknown keys are rejected to catch typos early.
//!
//! ## Environment Overrides
//!
//! | Variable | Overrides |
//! |---|---|
//! | `PACK_PRICE_EUR_CENTS` | `pricing.default_cents` |
//! | `PACKS_STATIC_DIR` | `paths.packs_dir` |
//! | `PACKS_CONTENT_DIR` | `paths.products_dir` |
//! | `DOWNLOADS_DIR` | `paths.downloads_dir` |
//! | `MAIN_SITE_CONTENT_DIR` | `paths.blog_dir` |
//! | `PACK_MIN_ITEMS` | `packs.min_items` |
//! | `CONTENT_LIMIT` | `store.limit` |
//! | `WEEKLY_PACK_DAYS` | `packs.weekly_window_days` |

use crate::types::Status;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file looked up in the site root when `--config` is not given.
pub const CONFIG_FILENAME: &str = "packwright.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Invalid value {value:?} for environment variable {var}")]
    Env { var: &'static str, value: String },
}

/// Pipeline configuration loaded from `packwright.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Artifact and input directories, relative to the site root.
    pub paths: PathsConfig,
    /// Price label derivation.
    pub pricing: PricingConfig,
    /// Where content entries are read from.
    pub store: StoreConfig,
    /// Pack assembly defaults shared by all topics.
    pub packs: PacksConfig,
    /// External commands for the upstream stages.
    pub stages: StagesConfig,
    /// Ordered topic templates.
    pub topics: Vec<TopicTemplate>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            pricing: PricingConfig::default(),
            store: StoreConfig::default(),
            packs: PacksConfig::default(),
            stages: StagesConfig::default(),
            topics: default_topics(),
        }
    }
}

impl PipelineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.packs.min_items == 0 {
            return Err(ConfigError::Validation(
                "packs.min_items must be at least 1".into(),
            ));
        }
        if self.store.limit == 0 {
            return Err(ConfigError::Validation(
                "store.limit must be at least 1".into(),
            ));
        }
        if self.pricing.decimal_separator.is_empty() {
            return Err(ConfigError::Validation(
                "pricing.decimal_separator must not be empty".into(),
            ));
        }
        let mut seen = HashSet::new();
        for topic in &self.topics {
            if topic.id.trim().is_empty() {
                return Err(ConfigError::Validation("topics[].id must not be empty".into()));
            }
            if !seen.insert(topic.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate topic id '{}'",
                    topic.id
                )));
            }
            if topic.keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "topic '{}' needs at least one keyword",
                    topic.id
                )));
            }
            let min = topic.min_items.unwrap_or(self.packs.min_items);
            if min == 0 {
                return Err(ConfigError::Validation(format!(
                    "topic '{}': min_items must be at least 1",
                    topic.id
                )));
            }
            if let Some(max) = topic.max_items
                && max < min
            {
                return Err(ConfigError::Validation(format!(
                    "topic '{}': max_items ({max}) is below min_items ({min})",
                    topic.id
                )));
            }
        }
        for (name, stage) in self.stages.iter() {
            if let Some(stage) = stage {
                if stage.command.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "stages.{name}.command must not be empty"
                    )));
                }
                if stage.timeout_secs == 0 {
                    return Err(ConfigError::Validation(format!(
                        "stages.{name}.timeout_secs must be at least 1"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Effective minimum item count for a topic.
    pub fn min_items(&self, topic: &TopicTemplate) -> usize {
        topic.min_items.unwrap_or(self.packs.min_items)
    }

    /// Effective price in minor units for a topic.
    pub fn price_cents(&self, topic: &TopicTemplate) -> u32 {
        topic.price_cents.unwrap_or(self.pricing.default_cents)
    }

    /// Find a topic template by identifier.
    pub fn topic(&self, id: &str) -> Option<&TopicTemplate> {
        self.topics.iter().find(|t| t.id == id)
    }
}

/// Directories, relative to the site root unless absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Pack manifests (`<slug>.json`).
    pub packs_dir: PathBuf,
    /// Product pages (`<slug>.md`).
    pub products_dir: PathBuf,
    /// Pack archives (`<slug>.zip`).
    pub downloads_dir: PathBuf,
    /// Published articles.
    pub blog_dir: PathBuf,
    /// QA reports.
    pub reports_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            packs_dir: "site/static/packs".into(),
            products_dir: "site/content/products".into(),
            downloads_dir: "site/static/downloads".into(),
            blog_dir: "site/content/blog".into(),
            reports_dir: "site/content/admin".into(),
        }
    }
}

/// Absolute directories for one run, resolved against the site root.
#[derive(Debug, Clone, PartialEq)]
pub struct SitePaths {
    pub root: PathBuf,
    pub packs_dir: PathBuf,
    pub products_dir: PathBuf,
    pub downloads_dir: PathBuf,
    pub blog_dir: PathBuf,
    pub reports_dir: PathBuf,
}

impl SitePaths {
    pub fn resolve(root: &Path, paths: &PathsConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            packs_dir: root.join(&paths.packs_dir),
            products_dir: root.join(&paths.products_dir),
            downloads_dir: root.join(&paths.downloads_dir),
            blog_dir: root.join(&paths.blog_dir),
            reports_dir: root.join(&paths.reports_dir),
        }
    }

    pub fn manifest_path(&self, slug: &str) -> PathBuf {
        self.packs_dir.join(format!("{slug}.json"))
    }

    pub fn product_path(&self, slug: &str) -> PathBuf {
        self.products_dir.join(format!("{slug}.md"))
    }

    pub fn archive_path(&self, slug: &str) -> PathBuf {
        self.downloads_dir.join(format!("{slug}.zip"))
    }
}

/// Price label derivation.
///
/// One integer in minor units is the source of truth; labels are always
/// derived from it so packs can never drift apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PricingConfig {
    /// Default price in minor units (cents).
    pub default_cents: u32,
    /// Symbol appended after a space.
    pub currency_symbol: String,
    /// Separator between units and cents.
    pub decimal_separator: String,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            default_cents: 899,
            currency_symbol: "€".to_string(),
            decimal_separator: ",".to_string(),
        }
    }
}

impl PricingConfig {
    /// Display label for a price in minor units: `899` → `"8,99 €"`.
    pub fn label(&self, cents: u32) -> String {
        format!(
            "{}{}{:02} {}",
            cents / 100,
            self.decimal_separator,
            cents % 100,
            self.currency_symbol
        )
    }
}

/// Which backing store entries come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// JSON array exported from the content database.
    Json,
    /// Markdown articles in `paths.blog_dir`.
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// Snapshot file for `kind = "json"`, relative to the site root.
    pub path: PathBuf,
    /// Only entries with this status are bundled.
    pub status: Status,
    /// Maximum number of entries fetched per run (newest first).
    pub limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Json,
            path: "data/content.json".into(),
            status: Status::Published,
            limit: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacksConfig {
    /// Minimum items for a pack to be emitted (topics may override).
    pub min_items: usize,
    /// Prefix for resolved article URLs: `<prefix><slug>/`.
    pub article_url_prefix: String,
    /// How far back the weekly edition looks.
    pub weekly_window_days: u32,
}

impl Default for PacksConfig {
    fn default() -> Self {
        Self {
            min_items: 5,
            article_url_prefix: "/blog/".to_string(),
            weekly_window_days: 7,
        }
    }
}

/// External command for one upstream stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandStage {
    /// Program and arguments, run from the site root.
    pub command: Vec<String>,
    /// Wall-clock limit; the child is killed when it is exceeded.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    600
}

/// Commands for the stages this crate does not implement itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StagesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub harvest: Option<CommandStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<CommandStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<CommandStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<CommandStage>,
}

impl StagesConfig {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Option<&CommandStage>)> {
        [
            ("harvest", self.harvest.as_ref()),
            ("draft", self.draft.as_ref()),
            ("score", self.score.as_ref()),
            ("publish", self.publish.as_ref()),
        ]
        .into_iter()
    }
}

/// How a topic's items are ordered before truncation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOrder {
    /// Newest `created_at` first; ties by identifier ascending.
    #[default]
    NewestFirst,
    /// Oldest `created_at` first; ties by identifier ascending.
    OldestFirst,
}

/// Classification and bundling rules for one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopicTemplate {
    /// Topic label, also the default base of the pack slug.
    pub id: String,
    /// Explicit pack slug; defaults to `<id>-pack-1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Substrings matched against the lowercased title and body.
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_description: Option<String>,
    /// Price override in minor units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_cents: Option<u32>,
    #[serde(default)]
    pub order: ItemOrder,
}

impl TopicTemplate {
    pub fn new(id: &str, keywords: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            pack_slug: None,
            title: None,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            min_items: None,
            max_items: None,
            short_description: None,
            long_description: None,
            price_cents: None,
            order: ItemOrder::default(),
        }
    }
}

fn default_topics() -> Vec<TopicTemplate> {
    let topic = |id: &str, keywords: &[&str], title: &str, short: &str, long: &str| {
        TopicTemplate {
            title: Some(title.to_string()),
            short_description: Some(short.to_string()),
            long_description: Some(long.to_string()),
            ..TopicTemplate::new(id, keywords)
        }
    };
    vec![
        topic(
            "python-data",
            &["python", "pandas", "numpy", "dataframe"],
            "Python Data Engineering Pack #1",
            "Micro-tutorials for cleaning, transforming and automating data workflows in Python.",
            "Everyday data engineering with Python: loading, cleaning, validating and transforming data in repeatable pipelines.",
        ),
        topic(
            "fastapi-backend",
            &["fastapi", "api", "backend"],
            "FastAPI Backend Pack #1",
            "Patterns and recipes for shipping production-ready FastAPI services faster.",
            "Routing, settings, background jobs and database integration for FastAPI backends, with snippets taken from real projects.",
        ),
        topic(
            "ai-rag",
            &["rag", "langchain", "vector", "embedding", "llm"],
            "AI & RAG Troubleshooting Pack #1",
            "A curated bundle of micro-tutorials for debugging retrieval-augmented generation systems.",
            "Real-world RAG issues and their fixes: embeddings, vector search, context windows and prompting tuned to work together.",
        ),
        topic(
            "devops-docker",
            &["docker", "kubernetes", "container", "deploy"],
            "DevOps & Docker Pack #1",
            "A compact set of Docker and deployment patterns for modern backend services.",
            "Containerisation, local development environments and simple deployment setups that make services reproducible.",
        ),
        topic(
            "testing",
            &["pytest", "unit test", "testing"],
            "Testing & Pytest Pack #1",
            "Practical testing patterns with pytest to make your Python code more reliable.",
            "From plain unit tests over fixtures to structured suites for larger projects, written so the tests actually help.",
        ),
    ]
}

// =============================================================================
// Environment overrides
// =============================================================================

/// Values taken from the environment, applied on top of the file config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub price_cents: Option<u32>,
    pub packs_dir: Option<PathBuf>,
    pub products_dir: Option<PathBuf>,
    pub downloads_dir: Option<PathBuf>,
    pub blog_dir: Option<PathBuf>,
    pub min_items: Option<usize>,
    pub content_limit: Option<usize>,
    pub weekly_window_days: Option<u32>,
}

impl Overrides {
    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read overrides through an arbitrary lookup (used by tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let path = |var: &str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        };
        Ok(Self {
            price_cents: parse_var(&lookup, "PACK_PRICE_EUR_CENTS")?,
            packs_dir: path("PACKS_STATIC_DIR"),
            products_dir: path("PACKS_CONTENT_DIR"),
            downloads_dir: path("DOWNLOADS_DIR"),
            blog_dir: path("MAIN_SITE_CONTENT_DIR"),
            min_items: parse_var(&lookup, "PACK_MIN_ITEMS")?,
            content_limit: parse_var(&lookup, "CONTENT_LIMIT")?,
            weekly_window_days: parse_var(&lookup, "WEEKLY_PACK_DAYS")?,
        })
    }

    pub fn apply(self, config: &mut PipelineConfig) {
        if let Some(v) = self.price_cents {
            config.pricing.default_cents = v;
        }
        if let Some(v) = self.packs_dir {
            config.paths.packs_dir = v;
        }
        if let Some(v) = self.products_dir {
            config.paths.products_dir = v;
        }
        if let Some(v) = self.downloads_dir {
            config.paths.downloads_dir = v;
        }
        if let Some(v) = self.blog_dir {
            config.paths.blog_dir = v;
        }
        if let Some(v) = self.min_items {
            config.packs.min_items = v;
        }
        if let Some(v) = self.content_limit {
            config.store.limit = v;
        }
        if let Some(v) = self.weekly_window_days {
            config.packs.weekly_window_days = v;
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value }),
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(PipelineConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay (including arrays) replace base values.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value. `Ok(None)` if it doesn't exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<PipelineConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let mut config: PipelineConfig = merged.try_into()?;
    for topic in &mut config.topics {
        topic.keywords = topic.keywords.iter().map(|k| k.to_lowercase()).collect();
    }
    Ok(config)
}

/// Load the pipeline config for a site root.
///
/// `config_path` defaults to `<root>/packwright.toml`. User values are merged
/// on top of stock defaults, environment overrides are applied, and the
/// result is validated.
pub fn load_config(
    root: &Path,
    config_path: Option<&Path>,
    overrides: Overrides,
) -> Result<PipelineConfig, ConfigError> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.join(CONFIG_FILENAME));
    let overlay = load_raw_config(&path)?;
    let mut config = resolve_config(stock_defaults_value(), overlay)?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `packwright.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# packwright configuration
# ========================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Directories (relative to the site root)
# ---------------------------------------------------------------------------
[paths]
packs_dir = "site/static/packs"          # env: PACKS_STATIC_DIR
products_dir = "site/content/products"   # env: PACKS_CONTENT_DIR
downloads_dir = "site/static/downloads"  # env: DOWNLOADS_DIR
blog_dir = "site/content/blog"           # env: MAIN_SITE_CONTENT_DIR
reports_dir = "site/content/admin"

# ---------------------------------------------------------------------------
# Pricing: one integer in cents is the source of truth for every label.
# ---------------------------------------------------------------------------
[pricing]
default_cents = 899                      # env: PACK_PRICE_EUR_CENTS
currency_symbol = "€"
decimal_separator = ","

# ---------------------------------------------------------------------------
# Content store
# ---------------------------------------------------------------------------
[store]
# "json" reads an exported array of entries; "markdown" reads blog_dir.
kind = "json"
path = "data/content.json"
status = "published"
limit = 200                              # env: CONTENT_LIMIT

# ---------------------------------------------------------------------------
# Pack assembly
# ---------------------------------------------------------------------------
[packs]
min_items = 5                            # env: PACK_MIN_ITEMS
article_url_prefix = "/blog/"
weekly_window_days = 7                   # env: WEEKLY_PACK_DAYS

# ---------------------------------------------------------------------------
# Upstream stages run by `packwright run` (all optional).
# ---------------------------------------------------------------------------
# [stages.harvest]
# command = ["python", "automations/harvest.py"]
# timeout_secs = 600
#
# [stages.draft]
# command = ["python", "automations/bulk_generate.py"]
#
# [stages.score]
# command = ["python", "automations/quality_filter.py"]
#
# [stages.publish]
# command = ["python", "automations/publish_blog.py"]

# ---------------------------------------------------------------------------
# Topics, processed in this order. Setting `topics` replaces this list.
# Optional per topic: pack_slug, min_items, max_items, price_cents,
# order = "newest_first" | "oldest_first".
# ---------------------------------------------------------------------------
[[topics]]
id = "python-data"
title = "Python Data Engineering Pack #1"
keywords = ["python", "pandas", "numpy", "dataframe"]
short_description = "Micro-tutorials for cleaning, transforming and automating data workflows in Python."
long_description = "Everyday data engineering with Python: loading, cleaning, validating and transforming data in repeatable pipelines."

[[topics]]
id = "fastapi-backend"
title = "FastAPI Backend Pack #1"
keywords = ["fastapi", "api", "backend"]
short_description = "Patterns and recipes for shipping production-ready FastAPI services faster."
long_description = "Routing, settings, background jobs and database integration for FastAPI backends, with snippets taken from real projects."

[[topics]]
id = "ai-rag"
title = "AI & RAG Troubleshooting Pack #1"
keywords = ["rag", "langchain", "vector", "embedding", "llm"]
short_description = "A curated bundle of micro-tutorials for debugging retrieval-augmented generation systems."
long_description = "Real-world RAG issues and their fixes: embeddings, vector search, context windows and prompting tuned to work together."

[[topics]]
id = "devops-docker"
title = "DevOps & Docker Pack #1"
keywords = ["docker", "kubernetes", "container", "deploy"]
short_description = "A compact set of Docker and deployment patterns for modern backend services."
long_description = "Containerisation, local development environments and simple deployment setups that make services reproducible."

[[topics]]
id = "testing"
title = "Testing & Pytest Pack #1"
keywords = ["pytest", "unit test", "testing"]
short_description = "Practical testing patterns with pytest to make your Python code more reliable."
long_description = "From plain unit tests over fixtures to structured suites for larger projects, written so the tests actually help."
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_env() -> Overrides {
        Overrides::default()
    }

    #[test]
    fn default_config_has_five_topics_in_order() {
        let config = PipelineConfig::default();
        let ids: Vec<&str> = config.topics.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["python-data", "fastapi-backend", "ai-rag", "devops-docker", "testing"]
        );
    }

    #[test]
    fn default_config_validates() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn stock_toml_matches_defaults() {
        let parsed: PipelineConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(parsed, PipelineConfig::default());
    }

    #[test]
    fn price_label_uses_decimal_comma_and_suffix() {
        let pricing = PricingConfig::default();
        assert_eq!(pricing.label(899), "8,99 €");
        assert_eq!(pricing.label(2900), "29,00 €");
        assert_eq!(pricing.label(5), "0,05 €");
    }

    #[test]
    fn price_label_custom_locale() {
        let pricing = PricingConfig {
            default_cents: 0,
            currency_symbol: "USD".into(),
            decimal_separator: ".".into(),
        };
        assert_eq!(pricing.label(1999), "19.99 USD");
    }

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path(), None, no_env()).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn load_config_merges_partial_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILENAME),
            r#"
[pricing]
default_cents = 1299

[packs]
min_items = 2
"#,
        )
        .unwrap();
        let config = load_config(tmp.path(), None, no_env()).unwrap();
        assert_eq!(config.pricing.default_cents, 1299);
        assert_eq!(config.pricing.currency_symbol, "€");
        assert_eq!(config.packs.min_items, 2);
        assert_eq!(config.packs.article_url_prefix, "/blog/");
        assert_eq!(config.topics.len(), 5);
    }

    #[test]
    fn user_topics_replace_stock_topics_and_lowercase_keywords() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILENAME),
            r#"
[[topics]]
id = "rust"
keywords = ["Rust", "CARGO"]
max_items = 10
order = "oldest_first"
"#,
        )
        .unwrap();
        let config = load_config(tmp.path(), None, no_env()).unwrap();
        assert_eq!(config.topics.len(), 1);
        let topic = &config.topics[0];
        assert_eq!(topic.keywords, vec!["rust", "cargo"]);
        assert_eq!(topic.max_items, Some(10));
        assert_eq!(topic.order, ItemOrder::OldestFirst);
    }

    #[test]
    fn explicit_config_path_is_used() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("other.toml");
        fs::write(&path, "[store]\nkind = \"markdown\"\n").unwrap();
        let config = load_config(tmp.path(), Some(&path), no_env()).unwrap();
        assert_eq!(config.store.kind, StoreKind::Markdown);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "[pricing]\ncents = 1\n").unwrap();
        assert!(matches!(
            load_config(tmp.path(), None, no_env()),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "this is not [valid").unwrap();
        assert!(load_config(tmp.path(), None, no_env()).is_err());
    }

    #[test]
    fn duplicate_topic_ids_fail_validation() {
        let mut config = PipelineConfig::default();
        config.topics.push(TopicTemplate::new("testing", &["x"]));
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn max_below_min_fails_validation() {
        let mut config = PipelineConfig::default();
        config.topics[0].min_items = Some(3);
        config.topics[0].max_items = Some(2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_stage_command_fails_validation() {
        let mut config = PipelineConfig::default();
        config.stages.harvest = Some(CommandStage {
            command: vec![],
            timeout_secs: 10,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply_on_top_of_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "[pricing]\ndefault_cents = 100\n").unwrap();
        let overrides = Overrides::from_lookup(|var| match var {
            "PACK_PRICE_EUR_CENTS" => Some("2900".into()),
            "PACKS_STATIC_DIR" => Some("public/packs".into()),
            "WEEKLY_PACK_DAYS" => Some(" 14 ".into()),
            "CONTENT_LIMIT" => Some("".into()),
            _ => None,
        })
        .unwrap();
        let config = load_config(tmp.path(), None, overrides).unwrap();
        assert_eq!(config.pricing.default_cents, 2900);
        assert_eq!(config.paths.packs_dir, PathBuf::from("public/packs"));
        assert_eq!(config.packs.weekly_window_days, 14);
        assert_eq!(config.store.limit, 200);
    }

    #[test]
    fn malformed_env_value_is_error() {
        let err = Overrides::from_lookup(|var| (var == "PACK_MIN_ITEMS").then(|| "five".into()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "PACK_MIN_ITEMS", .. }));
    }

    #[test]
    fn site_paths_resolve_against_root() {
        let paths = SitePaths::resolve(Path::new("/srv/site"), &PathsConfig::default());
        assert_eq!(
            paths.manifest_path("x"),
            PathBuf::from("/srv/site/site/static/packs/x.json")
        );
        assert_eq!(
            paths.archive_path("x"),
            PathBuf::from("/srv/site/site/static/downloads/x.zip")
        );
    }

    #[test]
    fn topic_effective_values_fall_back_to_defaults() {
        let config = PipelineConfig::default();
        let mut topic = TopicTemplate::new("t", &["k"]);
        assert_eq!(config.min_items(&topic), 5);
        assert_eq!(config.price_cents(&topic), 899);
        topic.min_items = Some(2);
        topic.price_cents = Some(1299);
        assert_eq!(config.min_items(&topic), 2);
        assert_eq!(config.price_cents(&topic), 1299);
    }
}
