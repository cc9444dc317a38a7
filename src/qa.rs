//! Data-integrity reports over the generated artifacts.
//!
//! QA never fails a pack; it describes what it finds in two admin pages:
//!
//! - `pack-qa-report.md`: per manifest, empty item lists, price labels that
//!   drifted from the configured price, missing archives, and items with no
//!   blog article behind them
//! - `unpacked-posts.md`: blog articles that appear in no manifest, followed
//!   by articles whose level-one headings look wrong
//!
//! Both pages are dated by day, so re-running QA on the same day over the
//! same artifacts leaves them untouched.

use crate::archive::{ArchiveError, ArticleIndex, IndexedArticle, ManifestView, manifest_paths};
use crate::config::{PipelineConfig, SitePaths};
use crate::frontmatter::Document;
use crate::naming::{date_prefix, display_title};
use crate::sync::{ArtifactStatus, write_if_changed};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const QA_REPORT_FILENAME: &str = "pack-qa-report.md";
pub const UNPACKED_REPORT_FILENAME: &str = "unpacked-posts.md";

#[derive(Error, Debug)]
pub enum QaError {
    #[error("IO error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// One finding about one pack.
#[derive(Debug, Clone, PartialEq)]
pub enum QaIssue {
    Unreadable(String),
    NoItems,
    PriceDrift { found: String, expected: String },
    MissingArchive(String),
    MissingArticles(Vec<String>),
}

impl fmt::Display for QaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QaIssue::Unreadable(err) => write!(f, "Manifest could not be read: {err}"),
            QaIssue::NoItems => write!(f, "Pack contains no items."),
            QaIssue::PriceDrift { found, expected } => write!(
                f,
                "price_label = `{found}` differs from the expected `{expected}`."
            ),
            QaIssue::MissingArchive(name) => write!(f, "Download archive not found: {name}"),
            QaIssue::MissingArticles(slugs) => write!(
                f,
                "{} item slugs have no matching blog article: {}",
                slugs.len(),
                slugs.join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackCheck {
    pub pack: String,
    pub title: String,
    pub issues: Vec<QaIssue>,
}

/// Title trouble in one blog article.
#[derive(Debug, Clone, PartialEq)]
pub enum HeadingIssue {
    /// The first body H1 repeats the header title, so the page shows it twice.
    RepeatsTitle(String),
    /// The body has several H1 headings.
    Multiple(usize),
    /// Neither a header title nor a body H1.
    Missing,
}

impl fmt::Display for HeadingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadingIssue::RepeatsTitle(title) => {
                write!(f, "body H1 `{title}` repeats the header title")
            }
            HeadingIssue::Multiple(n) => write!(f, "{n} H1 headings in the body"),
            HeadingIssue::Missing => write!(f, "no title and no H1 heading"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadingCheck {
    pub slug: String,
    pub filename: String,
    pub issue: HeadingIssue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QaSummary {
    pub packs_checked: usize,
    pub packs_with_issues: usize,
    pub unpacked_posts: usize,
    pub heading_issues: usize,
    pub qa_report: ArtifactStatus,
    pub unpacked_report: ArtifactStatus,
}

/// Check every manifest in `packs_dir`.
pub fn check_packs(
    config: &PipelineConfig,
    paths: &SitePaths,
    index: &ArticleIndex,
) -> Result<Vec<PackCheck>, QaError> {
    let mut checks = Vec::new();
    for manifest_path in manifest_paths(&paths.packs_dir)? {
        checks.push(check_manifest(&manifest_path, config, paths, index));
    }
    Ok(checks)
}

fn check_manifest(
    manifest_path: &Path,
    config: &PipelineConfig,
    paths: &SitePaths,
    index: &ArticleIndex,
) -> PackCheck {
    let view = fs::read(manifest_path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| ManifestView::parse(&bytes, manifest_path).map_err(|e| e.to_string()));
    let view = match view {
        Ok(view) => view,
        Err(err) => {
            let pack = ManifestView::default().slug_or_stem(manifest_path);
            warn!(pack = %pack, error = %err, "manifest unreadable");
            return PackCheck {
                title: pack.clone(),
                pack,
                issues: vec![QaIssue::Unreadable(err)],
            };
        }
    };

    let pack = view.slug_or_stem(manifest_path);
    let title = view.title.clone().unwrap_or_else(|| pack.clone());
    let mut issues = Vec::new();

    let items = view.items();
    if items.is_empty() {
        issues.push(QaIssue::NoItems);
    }

    let cents = view
        .topic
        .as_deref()
        .and_then(|t| config.topic(t))
        .map(|t| config.price_cents(t))
        .unwrap_or(config.pricing.default_cents);
    let expected = config.pricing.label(cents);
    let found = view.price_label.clone().unwrap_or_default();
    if found != expected {
        issues.push(QaIssue::PriceDrift { found, expected });
    }

    let archive = paths.archive_path(&pack);
    if !archive.is_file() {
        let shown = archive
            .strip_prefix(&paths.root)
            .unwrap_or(&archive)
            .display()
            .to_string();
        issues.push(QaIssue::MissingArchive(shown));
    }

    let missing: Vec<String> = items
        .iter()
        .filter(|item| {
            index
                .resolve(item.slug(), item.date_prefix().as_deref())
                .is_none()
        })
        .map(|item| match item.slug() {
            "" => "(empty)".to_string(),
            slug => slug.to_string(),
        })
        .collect();
    if !missing.is_empty() {
        issues.push(QaIssue::MissingArticles(missing));
    }

    PackCheck {
        pack,
        title,
        issues,
    }
}

/// Articles whose slug is listed in no manifest.
pub fn unpacked_posts<'a>(
    paths: &SitePaths,
    index: &'a ArticleIndex,
) -> Result<Vec<&'a IndexedArticle>, QaError> {
    let mut packed = HashSet::new();
    for manifest_path in manifest_paths(&paths.packs_dir)? {
        let Ok(bytes) = fs::read(&manifest_path) else {
            continue;
        };
        let Ok(view) = ManifestView::parse(&bytes, &manifest_path) else {
            continue;
        };
        for item in view.items() {
            // Resolve so header slugs and filename slugs both count
            if let Some(article) = index.resolve(item.slug(), item.date_prefix().as_deref()) {
                packed.insert(article.path.clone());
            }
        }
    }
    Ok(index
        .articles()
        .iter()
        .filter(|a| !packed.contains(&a.path))
        .collect())
}

/// H1 problems across every indexed article, in filename order.
pub fn heading_checks(index: &ArticleIndex) -> Vec<HeadingCheck> {
    let mut checks = Vec::new();
    for article in index.articles() {
        let title = article.title.as_deref().map(str::trim).filter(|t| !t.is_empty());
        let mut issues = Vec::new();
        match (title, article.headings.first()) {
            (Some(title), Some(first)) if first.to_lowercase() == title.to_lowercase() => {
                issues.push(HeadingIssue::RepeatsTitle(first.clone()));
            }
            (None, None) => issues.push(HeadingIssue::Missing),
            _ => {}
        }
        if article.headings.len() > 1 {
            issues.push(HeadingIssue::Multiple(article.headings.len()));
        }
        for issue in issues {
            warn!(article = %article.filename, issue = %issue, "heading check");
            checks.push(HeadingCheck {
                slug: article.slug.clone(),
                filename: article.filename.clone(),
                issue,
            });
        }
    }
    checks
}

// ============================================================================
// Rendering
// ============================================================================

fn report_header(fields: &[(&str, &str)]) -> String {
    Document::with_toml_header(fields, String::new()).render()
}

pub fn render_qa_report(checks: &[PackCheck], expected_price: &str, now: DateTime<Utc>) -> String {
    let date = date_prefix(&now);
    let mut out = report_header(&[
        ("title", "Pack QA Report"),
        ("date", date.as_str()),
        ("slug", "pack-qa-report"),
        ("type", "admin"),
    ]);
    out.push_str("\n# Pack QA Report\n\n");
    out.push_str(&format!(
        "Automatically generated QA report for {} packs.\n\n",
        checks.len()
    ));
    out.push_str(&format!("*Expected default price_label: `{expected_price}`*\n\n"));

    for check in checks {
        out.push_str(&format!("## {} (`{}`)\n\n", check.title, check.pack));
        if check.issues.is_empty() {
            out.push_str("**Issues:** none found.\n");
        } else {
            out.push_str("**Issues:**\n");
            for issue in &check.issues {
                out.push_str(&format!("- {issue}\n"));
            }
        }
        out.push_str("\n---\n\n");
    }
    out
}

pub fn render_unpacked_report(
    posts: &[&IndexedArticle],
    headings: &[HeadingCheck],
    url_prefix: &str,
    now: DateTime<Utc>,
) -> String {
    let date = date_prefix(&now);
    let mut out = report_header(&[
        ("title", "Unpacked Posts Overview"),
        ("slug", "unpacked-posts"),
        ("date", date.as_str()),
    ]);
    out.push_str("\n# Blog posts not in any pack\n\n");
    out.push_str(&format!("Total: **{}** posts\n\n", posts.len()));
    if posts.is_empty() {
        out.push_str("All posts are assigned to at least one pack.\n");
    }
    for post in posts {
        let title = post
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| display_title(&post.slug));
        out.push_str(&format!("- [{title}]({url_prefix}{}/)\n", post.slug));
        match &post.date {
            Some(d) => out.push_str(&format!("  - Date: `{d}`\n")),
            None => out.push_str("  - Date: _unknown_\n"),
        }
    }
    if !headings.is_empty() {
        out.push_str("\n## Heading warnings\n\n");
        for check in headings {
            out.push_str(&format!("- `{}`: {}\n", check.filename, check.issue));
        }
    }
    out
}

/// Check all packs and write both reports.
pub fn run_qa(
    config: &PipelineConfig,
    paths: &SitePaths,
    now: DateTime<Utc>,
) -> Result<(QaSummary, Vec<PackCheck>), QaError> {
    let index = ArticleIndex::build(&paths.blog_dir)?;
    let checks = check_packs(config, paths, &index)?;
    let unpacked = unpacked_posts(paths, &index)?;
    let headings = heading_checks(&index);

    let expected = config.pricing.label(config.pricing.default_cents);
    let qa_path = paths.reports_dir.join(QA_REPORT_FILENAME);
    let qa_report = write_if_changed(
        &qa_path,
        render_qa_report(&checks, &expected, now).as_bytes(),
    )
    .map_err(|source| QaError::Io {
        path: qa_path.clone(),
        source,
    })?;

    let unpacked_path = paths.reports_dir.join(UNPACKED_REPORT_FILENAME);
    let unpacked_report = write_if_changed(
        &unpacked_path,
        render_unpacked_report(&unpacked, &headings, &config.packs.article_url_prefix, now)
            .as_bytes(),
    )
    .map_err(|source| QaError::Io {
        path: unpacked_path.clone(),
        source,
    })?;

    let summary = QaSummary {
        packs_checked: checks.len(),
        packs_with_issues: checks.iter().filter(|c| !c.issues.is_empty()).count(),
        unpacked_posts: unpacked.len(),
        heading_issues: headings.len(),
        qa_report,
        unpacked_report,
    };
    info!(
        packs = summary.packs_checked,
        with_issues = summary.packs_with_issues,
        unpacked = summary.unpacked_posts,
        heading_issues = summary.heading_issues,
        "QA reports written"
    );
    Ok((summary, checks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::sync_manifest;
    use crate::test_helpers::*;

    #[test]
    fn clean_pack_has_no_issues() {
        let site = setup_site();
        let paths = site_paths(site.path());
        let pack = sample_pack("testing", 2);
        publish_items(&paths, &pack);
        sync_manifest(&pack, &paths.manifest_path(&pack.slug)).unwrap();
        fs::write(paths.archive_path(&pack.slug), b"zip").unwrap();

        let index = ArticleIndex::build(&paths.blog_dir).unwrap();
        let checks = check_packs(&PipelineConfig::default(), &paths, &index).unwrap();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].pack, "testing-pack-1");
        assert!(checks[0].issues.is_empty(), "{:?}", checks[0].issues);
    }

    #[test]
    fn reports_drift_missing_archive_and_articles() {
        let site = setup_site();
        let paths = site_paths(site.path());
        let mut pack = sample_pack("testing", 2);
        pack.price_label = "7,99 €".into();
        publish_items(&paths, &sample_pack("testing", 1));
        sync_manifest(&pack, &paths.manifest_path(&pack.slug)).unwrap();

        let index = ArticleIndex::build(&paths.blog_dir).unwrap();
        let checks = check_packs(&PipelineConfig::default(), &paths, &index).unwrap();
        assert_eq!(
            checks[0].issues,
            vec![
                QaIssue::PriceDrift {
                    found: "7,99 €".into(),
                    expected: "8,99 €".into()
                },
                QaIssue::MissingArchive("site/static/downloads/testing-pack-1.zip".into()),
                QaIssue::MissingArticles(vec!["article-2".into()]),
            ]
        );
    }

    #[test]
    fn expected_price_follows_topic_override() {
        let site = setup_site();
        let paths = site_paths(site.path());
        let mut config = PipelineConfig::default();
        config.topics[4].price_cents = Some(1299);
        let pack = sample_pack("testing", 1);
        publish_items(&paths, &pack);
        sync_manifest(&pack, &paths.manifest_path(&pack.slug)).unwrap();
        let index = ArticleIndex::build(&paths.blog_dir).unwrap();
        let checks = check_packs(&config, &paths, &index).unwrap();
        assert!(checks[0].issues.contains(&QaIssue::PriceDrift {
            found: "8,99 €".into(),
            expected: "12,99 €".into()
        }));
    }

    #[test]
    fn empty_and_unreadable_manifests_are_reported() {
        let site = setup_site();
        let paths = site_paths(site.path());
        fs::write(paths.packs_dir.join("empty.json"), r#"{"slug": "empty", "items": []}"#).unwrap();
        fs::write(paths.packs_dir.join("zz-broken.json"), "{").unwrap();
        let index = ArticleIndex::build(&paths.blog_dir).unwrap();
        let checks = check_packs(&PipelineConfig::default(), &paths, &index).unwrap();
        assert_eq!(checks.len(), 2);
        assert!(checks[0].issues.contains(&QaIssue::NoItems));
        assert_eq!(checks[1].pack, "zz-broken");
        assert!(matches!(checks[1].issues[0], QaIssue::Unreadable(_)));
    }

    #[test]
    fn unpacked_posts_lists_articles_in_no_manifest() {
        let site = setup_site();
        let paths = site_paths(site.path());
        let pack = sample_pack("testing", 1);
        publish_items(&paths, &pack);
        write_article(
            &paths.blog_dir,
            "2025-10-01-lonely.md",
            "+++\ntitle = \"Lonely post\"\ndate = \"2025-10-01\"\n+++\n",
        );
        sync_manifest(&pack, &paths.manifest_path(&pack.slug)).unwrap();

        let index = ArticleIndex::build(&paths.blog_dir).unwrap();
        let unpacked = unpacked_posts(&paths, &index).unwrap();
        let slugs: Vec<&str> = unpacked.iter().map(|a| a.slug.as_str()).collect();
        assert_eq!(slugs, vec!["lonely"]);

        let report = render_unpacked_report(&unpacked, &[], "/blog/", ts("2025-12-04T09:00:00Z"));
        assert!(report.contains("Total: **1** posts"));
        assert!(report.contains("- [Lonely post](/blog/lonely/)\n  - Date: `2025-10-01`\n"));
        assert!(!report.contains("Heading warnings"));
    }

    #[test]
    fn heading_checks_flag_repeated_multiple_and_missing_titles() {
        let site = setup_site();
        let paths = site_paths(site.path());
        write_article(
            &paths.blog_dir,
            "2025-10-01-clean.md",
            "+++\ntitle = \"Clean post\"\n+++\n\nJust text.\n\n## Section\n",
        );
        write_article(
            &paths.blog_dir,
            "2025-10-02-echo.md",
            "+++\ntitle = \"Echo Post\"\n+++\n\n# echo post\n\nBody.\n",
        );
        write_article(
            &paths.blog_dir,
            "2025-10-03-twins.md",
            "+++\ntitle = \"Twins\"\n+++\n\n# First half\n\n# Second half\n",
        );
        write_article(&paths.blog_dir, "2025-10-04-bare.md", "No header, no heading.\n");

        let index = ArticleIndex::build(&paths.blog_dir).unwrap();
        let checks = heading_checks(&index);
        let found: Vec<(&str, &HeadingIssue)> =
            checks.iter().map(|c| (c.filename.as_str(), &c.issue)).collect();
        assert_eq!(
            found,
            vec![
                ("2025-10-02-echo.md", &HeadingIssue::RepeatsTitle("echo post".into())),
                ("2025-10-03-twins.md", &HeadingIssue::Multiple(2)),
                ("2025-10-04-bare.md", &HeadingIssue::Missing),
            ]
        );

        let unpacked = unpacked_posts(&paths, &index).unwrap();
        let report = render_unpacked_report(&unpacked, &checks, "/blog/", ts("2025-12-04T09:00:00Z"));
        assert!(report.contains(
            "\n## Heading warnings\n\n\
             - `2025-10-02-echo.md`: body H1 `echo post` repeats the header title\n\
             - `2025-10-03-twins.md`: 2 H1 headings in the body\n\
             - `2025-10-04-bare.md`: no title and no H1 heading\n"
        ));
    }

    #[test]
    fn qa_report_renders_issues_and_clean_packs() {
        let checks = vec![
            PackCheck {
                pack: "a".into(),
                title: "A".into(),
                issues: vec![],
            },
            PackCheck {
                pack: "b".into(),
                title: "B".into(),
                issues: vec![QaIssue::NoItems],
            },
        ];
        let report = render_qa_report(&checks, "8,99 €", ts("2025-12-04T09:00:00Z"));
        let doc = Document::parse(&report);
        assert_eq!(doc.get("date").as_deref(), Some("2025-12-04"));
        assert_eq!(doc.get("type").as_deref(), Some("admin"));
        assert!(report.contains("## A (`a`)\n\n**Issues:** none found.\n"));
        assert!(report.contains("## B (`b`)\n\n**Issues:**\n- Pack contains no items.\n"));
    }

    #[test]
    fn run_qa_is_stable_within_a_day() {
        let site = setup_site();
        let paths = site_paths(site.path());
        let pack = sample_pack("testing", 1);
        publish_items(&paths, &pack);
        sync_manifest(&pack, &paths.manifest_path(&pack.slug)).unwrap();
        let config = PipelineConfig::default();

        let (first, _) = run_qa(&config, &paths, ts("2025-12-04T09:00:00Z")).unwrap();
        assert_eq!(first.qa_report, ArtifactStatus::Created);
        assert_eq!(first.packs_with_issues, 1);
        let (second, _) = run_qa(&config, &paths, ts("2025-12-04T18:00:00Z")).unwrap();
        assert_eq!(second.qa_report, ArtifactStatus::Unchanged);
        assert_eq!(second.unpacked_report, ArtifactStatus::Unchanged);
        assert!(paths.reports_dir.join(QA_REPORT_FILENAME).is_file());
    }
}
