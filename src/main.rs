use chrono::Utc;
use clap::{Parser, Subcommand};
use packwright::assemble::Edition;
use packwright::config::{self, Overrides, SitePaths};
use packwright::orchestrate::{Orchestrator, Stage};
use packwright::{output, store};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "packwright")]
#[command(about = "Bundle published micro-tutorials into downloadable content packs")]
#[command(long_about = "\
Bundle published micro-tutorials into downloadable content packs

Entries from the content store are classified by topic keywords and bundled
per topic. Each pack is kept in sync as three artifacts:

  site/
  ├── static/packs/<slug>.json         # Manifest (fully generated)
  ├── content/products/<slug>.md       # Product page (managed keys + article block)
  └── static/downloads/<slug>.zip      # README, manifest and article sources

Product pages may be edited by hand. Only the managed front-matter keys and
the block between the packwright:articles markers are rewritten.

Run 'packwright gen-config' to generate a documented packwright.toml.")]
#[command(version)]
struct Cli {
    /// Site root; all configured paths resolve against it
    #[arg(long, env = "PACKWRIGHT_ROOT", default_value = ".", global = true)]
    root: PathBuf,

    /// Config file (defaults to <root>/packwright.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble packs and sync manifests and product pages
    BuildPacks,
    /// Build a ZIP archive for every manifest
    BuildArchives,
    /// Check packs against archives and articles, write QA reports
    Qa,
    /// Run every stage: harvest → draft → score → publish → packs → archives → qa
    Run,
    /// Build this week's packs and their archives
    Weekly,
    /// Print a stock packwright.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let now = Utc::now();
    let (stages, edition): (&[Stage], Edition) = match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            return Ok(());
        }
        Command::BuildPacks => (&[Stage::PackBuilding], Edition::Rolling),
        Command::BuildArchives => (&[Stage::ArchiveBuilding], Edition::Rolling),
        Command::Qa => (&[Stage::Qa], Edition::Rolling),
        Command::Run => (&Stage::ALL, Edition::Rolling),
        Command::Weekly => (
            &[Stage::PackBuilding, Stage::ArchiveBuilding],
            Edition::weekly_at(now),
        ),
    };

    let config = config::load_config(&cli.root, cli.config.as_deref(), Overrides::from_env()?)?;
    let paths = SitePaths::resolve(&cli.root, &config.paths);
    let store = store::open_store(&config, &paths);
    let summary = Orchestrator::new(&config, &paths, store.as_ref()).run_stages(stages, edition, now);

    // Failed stages are reported, not fatal: the next run starts from disk
    output::print_run_summary(&summary);
    Ok(())
}
