mod cli;
pub mod daemon;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod ingest;
pub mod models;
pub mod settings;
pub mod sync;
pub mod upload;
mod utils;

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use db::{Database, SampleLogSource, SqliteStateStore};
use settings::SettingsStore;
use sync::{BudgetGrantor, SyncDeps, SyncScheduler};
use upload::HttpUploadClient;

pub use error::SyncError;
pub use models::{MeasurementSnapshot, ProjectId, SyncBatch, UserProfile};
pub use sync::{SchedulerConfig, SchedulerState, SyncEvent, SyncStatus};

const DB_FILE: &str = "healthsync.sqlite3";
const SETTINGS_FILE: &str = "settings.json";

struct AppPaths {
    data_dir: PathBuf,
    settings_path: PathBuf,
}

impl AppPaths {
    fn resolve(cli: &Cli) -> Self {
        let data_dir = cli.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|dir| dir.join("healthsync"))
                .unwrap_or_else(|| PathBuf::from(".healthsync"))
        });
        let settings_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join(SETTINGS_FILE));
        Self {
            data_dir,
            settings_path,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }
}

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let paths = AppPaths::resolve(&cli);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("healthsync-rt")
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Commands::Init => init(&paths),
            Commands::Run { project } => run_daemon(&paths, project.map(ProjectId)).await,
            Commands::Projects => list_projects(&paths).await,
            Commands::Status { limit } => print_status(&paths, limit).await,
            Commands::Import { file } => import_file(&paths, &file).await,
        }
    })
}

fn init(paths: &AppPaths) -> Result<()> {
    let store = SettingsStore::new(paths.settings_path.clone())?;
    if store.write_if_missing()? {
        println!("wrote default settings to {}", store.path().display());
    } else {
        println!("settings already present at {}", store.path().display());
    }

    let db = Database::new(paths.db_path())?;
    println!("database ready at {}", db.path().display());
    Ok(())
}

async fn run_daemon(paths: &AppPaths, project: Option<ProjectId>) -> Result<()> {
    log::info!("healthsync starting up...");

    let settings = SettingsStore::new(paths.settings_path.clone())?.effective();
    let db = Database::new(paths.db_path())?;

    let source = Arc::new(SampleLogSource::new(db.clone()));
    let uploader = Arc::new(HttpUploadClient::from_settings(&settings)?);
    let store = Arc::new(SqliteStateStore::new(db.clone()));

    let mut deps = SyncDeps::new(source.clone(), uploader, store).with_location(source);
    if let Some(budget) = settings.grant_budget() {
        deps = deps.with_grantor(Arc::new(BudgetGrantor::new(budget)));
    }

    let scheduler = SyncScheduler::spawn(deps, settings.scheduler_config());

    let journal_token = CancellationToken::new();
    let journal = tokio::spawn(diagnostics::journal_loop(
        scheduler.subscribe(),
        db.clone(),
        journal_token.clone(),
    ));

    log::info!(
        "syncing to {} every {}s",
        settings.server_url,
        settings.tick_interval_secs
    );

    // Handlers go in before the first cycle starts.
    let (signal_tx, signal_rx) = tokio::sync::mpsc::unbounded_channel();
    let listener = daemon::listen_for_host_signals(signal_tx)?;
    let supervised = daemon::supervise(&scheduler, project, signal_rx).await;
    listener.abort();

    log::info!(
        "shutting down sync loop after {} cycles",
        scheduler.status().cycles_finished()
    );
    scheduler.stop().await?;
    journal_token.cancel();
    if let Err(err) = journal.await {
        log::warn!("cycle journal task failed: {err}");
    }
    supervised
}

async fn list_projects(paths: &AppPaths) -> Result<()> {
    let settings = SettingsStore::new(paths.settings_path.clone())?.effective();
    let client = HttpUploadClient::from_settings(&settings)?;
    let projects = client.fetch_projects().await?;

    if projects.is_empty() {
        println!("no projects on {}", client.base_url());
    }
    for project in projects {
        println!("{:>6}  {}", project.id.0, project.project_name);
        if !project.description.is_empty() {
            println!("        {}", project.description);
        }
    }
    Ok(())
}

async fn print_status(paths: &AppPaths, limit: usize) -> Result<()> {
    let db = Database::new(paths.db_path())?;
    let state = db.get_sync_state().await?;

    match state.last_sync {
        Some(watermark) => println!("last sync:   {}", watermark.to_rfc3339()),
        None => println!("last sync:   never"),
    }
    match state.last_project_id {
        Some(project) => println!("project:     {project}"),
        None => println!("project:     none"),
    }

    let cycles = db.list_recent_sync_cycles(limit).await?;
    if cycles.is_empty() {
        println!("no cycles recorded");
        return Ok(());
    }
    println!();
    for cycle in cycles {
        println!(
            "{}  {:<13} {:>4}/{:<4} {}",
            cycle.started_at.format("%Y-%m-%d %H:%M:%S"),
            cycle.outcome,
            cycle.uploaded,
            cycle.planned,
            cycle.error.unwrap_or_default()
        );
    }
    Ok(())
}

async fn import_file(paths: &AppPaths, file: &Path) -> Result<()> {
    let reader = BufReader::new(
        File::open(file).with_context(|| format!("failed to open {}", file.display()))?,
    );
    let records = ingest::parse_records(reader)?;

    let db = Database::new(paths.db_path())?;
    let summary = ingest::import_records(&db, records).await?;
    println!(
        "imported {} samples, {} locations, {} profiles",
        summary.samples, summary.locations, summary.profiles
    );
    Ok(())
}
