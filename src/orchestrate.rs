//! Stage orchestration for one pipeline run.
//!
//! A run walks a fixed sequence of stages exactly once, with no retries:
//!
//! ```text
//! Idle → Harvesting → Drafting → Scoring → Publishing
//!      → PackBuilding → ArchiveBuilding → Qa → Idle
//! ```
//!
//! Every stage ends in a [`StageOutcome`] and the run moves on whatever it
//! was. A failed pack build leaves last run's manifests on disk, which the
//! archive stage then packages; nothing downstream needs in-memory state
//! from upstream.
//!
//! The first four stages are external programs (`[stages.<name>]` in the
//! config). An unconfigured stage is skipped; a non-zero exit or a timeout
//! fails it, and a timed-out child is killed. Within the in-process stages,
//! failures are isolated per pack and counted in the stage report.

use crate::archive::{self, ArchiveError, ArchiveOutcome, ArchiveReport, ArticleIndex};
use crate::assemble::{Assembly, Edition, assemble_packs};
use crate::config::{CommandStage, PipelineConfig, SitePaths};
use crate::qa::{self, PackCheck, QaError, QaSummary};
use crate::store::{ContentStore, Rejected, StoreError, StoreQuery};
use crate::sync::{SyncReport, sync_pack};
use chrono::{DateTime, Utc};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

/// Interval between child status checks while a stage command runs.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum StageError {
    #[error("failed to start '{program}': {source}")]
    Spawn { program: String, source: io::Error },
    #[error("command exited with {0}")]
    Exit(ExitStatus),
    #[error("command timed out after {0}s")]
    Timeout(u64),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Qa(#[from] QaError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Harvesting,
    Drafting,
    Scoring,
    Publishing,
    PackBuilding,
    ArchiveBuilding,
    Qa,
}

impl Stage {
    /// Every stage, in run order.
    pub const ALL: [Stage; 7] = [
        Stage::Harvesting,
        Stage::Drafting,
        Stage::Scoring,
        Stage::Publishing,
        Stage::PackBuilding,
        Stage::ArchiveBuilding,
        Stage::Qa,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Stage::Harvesting => "Harvesting",
            Stage::Drafting => "Drafting",
            Stage::Scoring => "Scoring",
            Stage::Publishing => "Publishing",
            Stage::PackBuilding => "Pack building",
            Stage::ArchiveBuilding => "Archive building",
            Stage::Qa => "QA",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where the orchestrator is in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running(Stage),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Completed(String),
    Skipped(String),
    Failed(String),
}

impl StageOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed(_))
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutcome::Completed(detail) => write!(f, "completed ({detail})"),
            StageOutcome::Skipped(reason) => write!(f, "skipped ({reason})"),
            StageOutcome::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// Result for one pack (or manifest) inside a stage.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Synced(SyncReport),
    Archived(ArchiveReport),
    Checked(PackCheck),
    /// A store record that could not be read.
    Rejected(Rejected),
    Skipped { name: String, reason: String },
    Failed { name: String, error: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemCounts {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: Stage,
    pub outcome: StageOutcome,
    pub items: Vec<ItemOutcome>,
}

impl StageReport {
    fn new(stage: Stage, outcome: StageOutcome) -> Self {
        Self {
            stage,
            outcome,
            items: Vec::new(),
        }
    }

    pub fn counts(&self) -> ItemCounts {
        let mut counts = ItemCounts::default();
        for item in &self.items {
            match item {
                ItemOutcome::Synced(_) | ItemOutcome::Checked(_) => counts.succeeded += 1,
                ItemOutcome::Archived(report) => match report.outcome {
                    ArchiveOutcome::Written { .. } => counts.succeeded += 1,
                    ArchiveOutcome::Skipped { .. } => counts.skipped += 1,
                },
                ItemOutcome::Skipped { .. } => counts.skipped += 1,
                ItemOutcome::Rejected(_) | ItemOutcome::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }
}

/// Ordered stage reports of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub reports: Vec<StageReport>,
}

impl RunSummary {
    pub fn report(&self, stage: Stage) -> Option<&StageReport> {
        self.reports.iter().find(|r| r.stage == stage)
    }

    pub fn failed_stages(&self) -> Vec<Stage> {
        self.reports
            .iter()
            .filter(|r| r.outcome.is_failed())
            .map(|r| r.stage)
            .collect()
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator<'a> {
    config: &'a PipelineConfig,
    paths: &'a SitePaths,
    store: &'a dyn ContentStore,
    state: RunState,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a PipelineConfig, paths: &'a SitePaths, store: &'a dyn ContentStore) -> Self {
        Self {
            config,
            paths,
            store,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// The full daily cycle.
    pub fn run(&mut self, now: DateTime<Utc>) -> RunSummary {
        self.run_stages(&Stage::ALL, Edition::Rolling, now)
    }

    /// Run `stages` in the given order, each exactly once.
    pub fn run_stages(&mut self, stages: &[Stage], edition: Edition, now: DateTime<Utc>) -> RunSummary {
        let mut summary = RunSummary::default();
        for &stage in stages {
            self.state = RunState::Running(stage);
            info!(%stage, "stage started");
            let report = self.run_stage(stage, edition, now);
            match &report.outcome {
                StageOutcome::Failed(err) => error!(%stage, error = %err, "stage failed"),
                outcome => info!(%stage, %outcome, "stage finished"),
            }
            summary.reports.push(report);
        }
        self.state = RunState::Idle;
        summary
    }

    fn run_stage(&self, stage: Stage, edition: Edition, now: DateTime<Utc>) -> StageReport {
        let commands = &self.config.stages;
        let root = &self.paths.root;
        match stage {
            Stage::Harvesting => run_command_stage(stage, commands.harvest.as_ref(), root),
            Stage::Drafting => run_command_stage(stage, commands.draft.as_ref(), root),
            Stage::Scoring => run_command_stage(stage, commands.score.as_ref(), root),
            Stage::Publishing => run_command_stage(stage, commands.publish.as_ref(), root),
            Stage::PackBuilding => build_packs(self.config, self.paths, self.store, edition, now),
            Stage::ArchiveBuilding => build_archives(self.paths),
            Stage::Qa => run_qa_stage(self.config, self.paths, now),
        }
    }
}

// ============================================================================
// External command stages
// ============================================================================

pub fn run_command_stage(stage: Stage, command: Option<&CommandStage>, root: &Path) -> StageReport {
    let Some(command) = command else {
        return StageReport::new(stage, StageOutcome::Skipped("no command configured".into()));
    };
    let outcome = match run_command(stage, command, root) {
        Ok(status) => StageOutcome::Completed(status.to_string()),
        Err(err) => StageOutcome::Failed(err.to_string()),
    };
    StageReport::new(stage, outcome)
}

/// Run a stage command from `root`, killing it once `timeout_secs` pass.
pub fn run_command(stage: Stage, command: &CommandStage, root: &Path) -> Result<ExitStatus, StageError> {
    let Some((program, args)) = command.command.split_first() else {
        return Err(StageError::Spawn {
            program: String::new(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
        });
    };

    // Files rather than pipes, so a chatty child can't block on a full pipe
    let mut stdout = tempfile::tempfile()?;
    let mut stderr = tempfile::tempfile()?;
    let mut child = Command::new(program)
        .args(args)
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout.try_clone()?))
        .stderr(Stdio::from(stderr.try_clone()?))
        .spawn()
        .map_err(|source| StageError::Spawn {
            program: program.clone(),
            source,
        })?;

    let timeout = Duration::from_secs(command.timeout_secs);
    let started = Instant::now();
    let result = loop {
        if let Some(status) = child.try_wait()? {
            break Ok(status);
        }
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            warn!(%stage, timeout_secs = command.timeout_secs, "stage command timed out, killing it");
            child.kill()?;
            child.wait()?;
            break Err(StageError::Timeout(command.timeout_secs));
        }
        std::thread::sleep(POLL_INTERVAL.min(timeout - elapsed));
    };

    log_output(stage, &mut stdout, false)?;
    log_output(stage, &mut stderr, true)?;

    match result? {
        status if status.success() => Ok(status),
        status => Err(StageError::Exit(status)),
    }
}

fn log_output(stage: Stage, file: &mut File, is_stderr: bool) -> io::Result<()> {
    file.rewind()?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    for line in String::from_utf8_lossy(&bytes).lines() {
        if line.trim().is_empty() {
            continue;
        }
        if is_stderr {
            warn!(%stage, "{line}");
        } else {
            info!(%stage, "{line}");
        }
    }
    Ok(())
}

// ============================================================================
// In-process stages
// ============================================================================

/// Fetch, classify, assemble and synchronize every topic's pack.
pub fn build_packs(
    config: &PipelineConfig,
    paths: &SitePaths,
    store: &dyn ContentStore,
    edition: Edition,
    now: DateTime<Utc>,
) -> StageReport {
    let mut query = StoreQuery::from_config(config);
    if let Edition::Weekly { .. } = edition {
        query.since = Some(now - chrono::Duration::days(i64::from(config.packs.weekly_window_days)));
    }
    let fetched = match store.fetch(&query) {
        Ok(fetched) => fetched,
        Err(err) => {
            return StageReport::new(Stage::PackBuilding, StageOutcome::Failed(err.to_string()));
        }
    };
    let entries = fetched.entries;
    info!(
        entries = entries.len(),
        rejected = fetched.rejected.len(),
        "fetched content entries"
    );

    let mut report = StageReport::new(Stage::PackBuilding, StageOutcome::Completed(String::new()));
    for assembly in assemble_packs(&entries, config, edition, now) {
        let item = match assembly {
            Assembly::Assembled(pack) => match sync_pack(&pack, paths) {
                Ok(synced) => ItemOutcome::Synced(synced),
                Err(err) => {
                    error!(pack = %pack.slug, error = %err, "pack sync failed");
                    ItemOutcome::Failed {
                        name: pack.slug,
                        error: err.to_string(),
                    }
                }
            },
            Assembly::Skipped { topic, reason } => ItemOutcome::Skipped { name: topic, reason },
        };
        report.items.push(item);
    }
    let packs = report.counts();
    report
        .items
        .extend(fetched.rejected.iter().cloned().map(ItemOutcome::Rejected));
    report.outcome = StageOutcome::Completed(format!(
        "{} entries, {} rejected records, {} packs synced, {} skipped, {} failed",
        entries.len(),
        fetched.rejected.len(),
        packs.succeeded,
        packs.skipped,
        packs.failed
    ));
    report
}

/// Build an archive for every manifest on disk.
pub fn build_archives(paths: &SitePaths) -> StageReport {
    let prepared = ArticleIndex::build(&paths.blog_dir)
        .and_then(|index| Ok((index, archive::manifest_paths(&paths.packs_dir)?)));
    let (index, manifests) = match prepared {
        Ok(prepared) => prepared,
        Err(err) => {
            return StageReport::new(Stage::ArchiveBuilding, StageOutcome::Failed(err.to_string()));
        }
    };

    let mut report = StageReport::new(Stage::ArchiveBuilding, StageOutcome::Completed(String::new()));
    for manifest in manifests {
        let item = match archive::build_archive(&manifest, &index, paths) {
            Ok(built) => ItemOutcome::Archived(built),
            Err(err) => {
                let name = manifest
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                error!(manifest = %manifest.display(), error = %err, "archive build failed");
                ItemOutcome::Failed {
                    name,
                    error: err.to_string(),
                }
            }
        };
        report.items.push(item);
    }
    let counts = report.counts();
    report.outcome = StageOutcome::Completed(format!(
        "{} archives built, {} skipped, {} failed",
        counts.succeeded, counts.skipped, counts.failed
    ));
    report
}

pub fn run_qa_stage(config: &PipelineConfig, paths: &SitePaths, now: DateTime<Utc>) -> StageReport {
    match qa::run_qa(config, paths, now) {
        Ok((summary, checks)) => {
            let mut report = StageReport::new(Stage::Qa, StageOutcome::Completed(qa_detail(&summary)));
            report.items = checks.into_iter().map(ItemOutcome::Checked).collect();
            report
        }
        Err(err) => StageReport::new(Stage::Qa, StageOutcome::Failed(err.to_string())),
    }
}

fn qa_detail(summary: &QaSummary) -> String {
    format!(
        "{} packs checked, {} with issues, {} unpacked posts, {} heading warnings",
        summary.packs_checked,
        summary.packs_with_issues,
        summary.unpacked_posts,
        summary.heading_issues
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_helpers::*;
    use std::fs;

    fn fastapi_store() -> MemoryStore {
        MemoryStore::new(
            (1..=5)
                .map(|i| {
                    entry(
                        &i.to_string(),
                        &format!("FastAPI recipe {i}"),
                        "",
                        &format!("2025-12-0{i}T08:00:00Z"),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn full_run_visits_every_stage_in_order() {
        let site = setup_site();
        let paths = site_paths(site.path());
        let config = PipelineConfig::default();
        let store = fastapi_store();
        let mut orchestrator = Orchestrator::new(&config, &paths, &store);
        assert_eq!(orchestrator.state(), RunState::Idle);

        let summary = orchestrator.run(ts("2025-12-06T00:00:00Z"));
        let stages: Vec<Stage> = summary.reports.iter().map(|r| r.stage).collect();
        assert_eq!(stages, Stage::ALL.to_vec());
        assert_eq!(orchestrator.state(), RunState::Idle);
        for stage in [Stage::Harvesting, Stage::Drafting, Stage::Scoring, Stage::Publishing] {
            assert!(matches!(
                summary.report(stage).unwrap().outcome,
                StageOutcome::Skipped(_)
            ));
        }
        let packs = summary.report(Stage::PackBuilding).unwrap();
        assert_eq!(
            packs.counts(),
            ItemCounts {
                succeeded: 1,
                skipped: 4,
                failed: 0
            }
        );
        assert!(paths.manifest_path("fastapi-backend-pack-1").is_file());
        assert!(summary.failed_stages().is_empty());
    }

    #[test]
    fn store_failure_fails_pack_building_but_run_continues() {
        let site = setup_site();
        let paths = site_paths(site.path());
        let config = PipelineConfig::default();
        let store = crate::store::JsonFileStore::new(site.path().join("missing.json"));
        let summary = Orchestrator::new(&config, &paths, &store).run(ts("2025-12-06T00:00:00Z"));
        assert_eq!(summary.failed_stages(), vec![Stage::PackBuilding]);
        assert!(matches!(
            summary.report(Stage::Qa).unwrap().outcome,
            StageOutcome::Completed(_)
        ));
    }

    #[test]
    fn malformed_store_records_are_reported_not_fatal() {
        let site = setup_site();
        let paths = site_paths(site.path());
        let config = PipelineConfig::default();
        let snapshot = site.path().join("content.json");
        let mut records: Vec<String> = (1..=5)
            .map(|i| {
                format!(
                    r#"{{"id": {i}, "title": "FastAPI recipe {i}", "created_at": "2025-12-0{i}T08:00:00Z", "status": "published"}}"#
                )
            })
            .collect();
        records.push(r#"{"id": 6, "title": "FastAPI broken", "body_md": null, "created_at": "2025-12-06T08:00:00Z", "status": "published"}"#.into());
        fs::write(&snapshot, format!("[{}]", records.join(","))).unwrap();
        let store = crate::store::JsonFileStore::new(snapshot);

        let report = build_packs(&config, &paths, &store, Edition::Rolling, ts("2025-12-07T00:00:00Z"));
        assert!(matches!(report.outcome, StageOutcome::Completed(_)));
        assert!(report.items.iter().any(|item| matches!(
            item,
            ItemOutcome::Rejected(Rejected { record, .. }) if record == "id 6"
        )));
        assert_eq!(
            report.counts(),
            ItemCounts {
                succeeded: 1,
                skipped: 4,
                failed: 1
            }
        );
        assert!(paths.manifest_path("fastapi-backend-pack-1").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn configured_command_stage_runs_inside_a_run() {
        let site = setup_site();
        let paths = site_paths(site.path());
        let mut config = PipelineConfig::default();
        config.stages.publish = Some(CommandStage {
            command: vec!["sh".into(), "-c".into(), "touch published.flag".into()],
            timeout_secs: 10,
        });
        let store = MemoryStore::default();
        let summary = Orchestrator::new(&config, &paths, &store).run_stages(
            &[Stage::Harvesting, Stage::Publishing],
            Edition::Rolling,
            ts("2025-12-06T00:00:00Z"),
        );
        assert!(matches!(summary.reports[0].outcome, StageOutcome::Skipped(_)));
        assert!(matches!(summary.reports[1].outcome, StageOutcome::Completed(_)));
        assert!(site.path().join("published.flag").is_file());
    }

    #[test]
    fn archive_stage_fails_without_blog_dir() {
        let site = setup_site();
        let paths = site_paths(site.path());
        fs::remove_dir_all(&paths.blog_dir).unwrap();
        let report = build_archives(&paths);
        assert!(report.outcome.is_failed());
    }

    #[test]
    fn archive_stage_isolates_bad_manifest() {
        let site = setup_site();
        let paths = site_paths(site.path());
        let pack = sample_pack("testing", 1);
        publish_items(&paths, &pack);
        crate::sync::sync_manifest(&pack, &paths.manifest_path(&pack.slug)).unwrap();
        fs::write(paths.packs_dir.join("broken.json"), "{").unwrap();

        let report = build_archives(&paths);
        assert_eq!(
            report.counts(),
            ItemCounts {
                succeeded: 1,
                skipped: 0,
                failed: 1
            }
        );
        assert!(paths.archive_path("testing-pack-1").is_file());
    }

    #[test]
    fn unconfigured_command_is_skipped() {
        let report = run_command_stage(Stage::Harvesting, None, Path::new("."));
        assert_eq!(
            report.outcome,
            StageOutcome::Skipped("no command configured".into())
        );
    }

    #[cfg(unix)]
    #[test]
    fn command_exit_codes_map_to_outcomes() {
        let site = setup_site();
        let ok = CommandStage {
            command: vec!["sh".into(), "-c".into(), "echo hello; echo oops >&2".into()],
            timeout_secs: 10,
        };
        let report = run_command_stage(Stage::Drafting, Some(&ok), site.path());
        assert!(matches!(report.outcome, StageOutcome::Completed(_)));

        let failing = CommandStage {
            command: vec!["sh".into(), "-c".into(), "exit 3".into()],
            timeout_secs: 10,
        };
        let report = run_command_stage(Stage::Scoring, Some(&failing), site.path());
        assert!(report.outcome.is_failed());
    }

    #[cfg(unix)]
    #[test]
    fn command_runs_in_site_root() {
        let site = setup_site();
        let touch = CommandStage {
            command: vec!["sh".into(), "-c".into(), "touch ran.flag".into()],
            timeout_secs: 10,
        };
        run_command(Stage::Publishing, &touch, site.path()).unwrap();
        assert!(site.path().join("ran.flag").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn slow_command_is_killed_on_timeout() {
        let site = setup_site();
        let slow = CommandStage {
            command: vec!["sleep".into(), "30".into()],
            timeout_secs: 1,
        };
        let started = Instant::now();
        let err = run_command(Stage::Harvesting, &slow, site.path()).unwrap_err();
        assert!(matches!(err, StageError::Timeout(1)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let site = setup_site();
        let missing = CommandStage {
            command: vec!["definitely-not-a-real-program-xyz".into()],
            timeout_secs: 5,
        };
        let err = run_command(Stage::Harvesting, &missing, site.path()).unwrap_err();
        assert!(matches!(err, StageError::Spawn { .. }));
    }

    #[test]
    fn weekly_run_builds_suffixed_packs() {
        let site = setup_site();
        let paths = site_paths(site.path());
        let config = PipelineConfig::default();
        let store = fastapi_store();
        let now = ts("2025-12-06T00:00:00Z");
        let summary = Orchestrator::new(&config, &paths, &store).run_stages(
            &[Stage::PackBuilding],
            Edition::weekly_at(now),
            now,
        );
        assert_eq!(summary.reports.len(), 1);
        assert!(paths.manifest_path("fastapi-backend-pack-2025-w49").is_file());
    }
}
