//! Pack assembly: classified entries → [`Pack`]s.
//!
//! Topics are processed in the order they are declared in the config, and
//! each topic yields exactly one [`Assembly`]:
//!
//! ```text
//! entries ──classify──▶ bucket per topic ──order, truncate──▶ Pack
//!                                │
//!                                └── fewer than min_items ──▶ Skipped
//! ```
//!
//! A skipped topic produces no artifacts and touches none: a pack that was
//! published on an earlier run stays on disk as it was.
//!
//! ## Editions
//!
//! The rolling edition is the default, with slug `<topic>-pack-1`. The
//! weekly edition only considers entries from the last
//! `packs.weekly_window_days` and names slug and title after the ISO week:
//!
//! ```text
//! rolling  fastapi-backend-pack-1          FastAPI Backend Pack #1
//! weekly   fastapi-backend-pack-2025-w49   FastAPI Backend Pack #1 – Week 49/2025
//! ```
//!
//! A topic with an explicit `pack_slug` keeps it and appends `-<year>-w<week>`.

use crate::classify::classify;
use crate::config::{ItemOrder, PipelineConfig, TopicTemplate};
use crate::naming::{display_title, item_slug, slug_or, slugify};
use crate::types::{ContentEntry, Pack, PackItem, compare_ids};
use chrono::{DateTime, Datelike, Duration, Utc};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Which variant of a topic's pack is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Edition {
    #[default]
    Rolling,
    /// ISO year and week.
    Weekly { year: i32, week: u32 },
}

impl Edition {
    /// Weekly edition for the ISO week containing `now`.
    pub fn weekly_at(now: DateTime<Utc>) -> Self {
        let iso = now.iso_week();
        Edition::Weekly {
            year: iso.year(),
            week: iso.week(),
        }
    }

    /// Pack slug for `topic` in this edition.
    pub fn pack_slug(self, topic: &TopicTemplate) -> String {
        match (self, &topic.pack_slug) {
            (Edition::Rolling, _) => pack_slug(topic),
            (Edition::Weekly { year, week }, Some(explicit)) => {
                format!("{}-{year}-w{week:02}", slug_or(explicit, &topic.id))
            }
            (Edition::Weekly { year, week }, None) => {
                format!("{}-pack-{year}-w{week:02}", slug_or(&topic.id, "topic"))
            }
        }
    }

    fn title_suffix(self) -> String {
        match self {
            Edition::Rolling => String::new(),
            Edition::Weekly { year, week } => format!(" \u{2013} Week {week}/{year}"),
        }
    }
}

/// Result of assembling one topic.
#[derive(Debug, Clone, PartialEq)]
pub enum Assembly {
    Assembled(Pack),
    Skipped { topic: String, reason: String },
}

impl Assembly {
    pub fn topic(&self) -> &str {
        match self {
            Assembly::Assembled(pack) => &pack.topic,
            Assembly::Skipped { topic, .. } => topic,
        }
    }
}

/// Rolling pack slug for a topic.
pub fn pack_slug(topic: &TopicTemplate) -> String {
    match &topic.pack_slug {
        Some(explicit) => slug_or(explicit, &format!("{}-pack-1", topic.id)),
        None => format!("{}-pack-1", slug_or(&topic.id, "topic")),
    }
}

/// Assemble one pack per configured topic.
///
/// `now` stamps `generated_at` and anchors the weekly window.
pub fn assemble_packs(
    entries: &[ContentEntry],
    config: &PipelineConfig,
    edition: Edition,
    now: DateTime<Utc>,
) -> Vec<Assembly> {
    let window_start = match edition {
        Edition::Rolling => None,
        Edition::Weekly { .. } => {
            Some(now - Duration::days(i64::from(config.packs.weekly_window_days)))
        }
    };

    let mut seen = HashSet::new();
    let mut usable = Vec::new();
    for entry in entries {
        if entry.title.trim().is_empty() {
            warn!(id = %entry.id, "entry has no title, leaving it out of every pack");
            continue;
        }
        if !seen.insert(entry.id.as_str()) {
            warn!(id = %entry.id, "duplicate entry id, keeping the first");
            continue;
        }
        if window_start.is_some_and(|start| entry.created_at < start) {
            continue;
        }
        usable.push(entry);
    }

    // Buckets in topic declaration order
    let mut buckets: Vec<(&TopicTemplate, Vec<&ContentEntry>)> =
        config.topics.iter().map(|t| (t, Vec::new())).collect();
    for entry in usable {
        let labels = classify(entry, &config.topics);
        for (topic, bucket) in &mut buckets {
            if labels.contains(&topic.id) {
                bucket.push(entry);
            }
        }
    }

    buckets
        .into_iter()
        .map(|(topic, bucket)| assemble_topic(topic, bucket, config, edition, now))
        .collect()
}

/// Decide whether `topic` yields a pack from its classified entries.
pub fn assemble_topic(
    topic: &TopicTemplate,
    mut entries: Vec<&ContentEntry>,
    config: &PipelineConfig,
    edition: Edition,
    now: DateTime<Utc>,
) -> Assembly {
    let min = config.min_items(topic);
    if entries.len() < min {
        let reason = format!("{} of {} required items", entries.len(), min);
        info!(topic = %topic.id, %reason, "not enough items, skipping topic");
        return Assembly::Skipped {
            topic: topic.id.clone(),
            reason,
        };
    }

    entries.sort_by(|a, b| {
        let by_date = match topic.order {
            ItemOrder::NewestFirst => b.created_at.cmp(&a.created_at),
            ItemOrder::OldestFirst => a.created_at.cmp(&b.created_at),
        };
        by_date.then_with(|| compare_ids(&a.id, &b.id))
    });
    if let Some(max) = topic.max_items {
        entries.truncate(max);
    }

    let items: Vec<PackItem> = entries
        .iter()
        .map(|e| {
            let slug = item_slug(&e.title, &e.id);
            PackItem {
                id: e.id.clone(),
                title: e.title.trim().to_string(),
                url: format!("{}{}/", config.packs.article_url_prefix, slug),
                slug,
                created_at: e.created_at,
            }
        })
        .collect();

    let description = topic
        .short_description
        .clone()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| fallback_description(&topic.id, items.len()));
    let long_description = topic
        .long_description
        .clone()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| description.clone());
    let title = topic
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| format!("{} Pack #1", display_title(&topic.id)));

    let pack = Pack {
        slug: edition.pack_slug(topic),
        topic: topic.id.clone(),
        title: format!("{title}{}", edition.title_suffix()),
        description,
        long_description,
        price_label: config.pricing.label(config.price_cents(topic)),
        generated_at: now,
        items,
    };
    debug!(pack = %pack.slug, items = pack.items.len(), "assembled pack");
    Assembly::Assembled(pack)
}

fn fallback_description(topic: &str, count: usize) -> String {
    let words = slugify(topic).replace('-', " ");
    format!("A curated bundle of {count} micro-tutorials on {words}.")
}
