use clap::{Parser, Subcommand};
use rusqlite::Connection;
use crate::config::Config;
use crate::db::DbConnection;
use crate::models::{Entity, EntityId, PipelineKind};
use crate::pipeline::{
    ControllerConfig, DragOutcome, DragRejection, DragTransitionController, LogNotifier, Notifier, Settled,
    ToastQueue,
};
use crate::repo::{EntityRepo, SqliteBackend};
use crate::cli::error::{user_error, validate_entity_id, validate_non_empty, validate_value};
use crate::cli::output::{
    format_board, format_entity_list, format_stage_table, format_toast, get_terminal_width, is_tty,
};
use crate::cli::session::{run_session, SessionOptions};
use std::sync::Arc;
use std::time::Duration;
use anyhow::{anyhow, bail, Context, Result};

#[derive(Parser)]
#[command(name = "pipeboard")]
#[command(about = "Pipeboard - deal and broker pipeline boards with optimistic stage moves")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Pipeline to operate on (deals or brokers); defaults to pipeline.default from the rc file
    #[arg(short = 'p', long, global = true)]
    pub pipeline: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database
    Init {
        /// Seed sample deals and brokers
        #[arg(long)]
        sample: bool,
    },
    /// Add an entity to the pipeline
    Add {
        /// Display name
        name: String,
        /// Initial backend stage (defaults to the pipeline's default stage)
        #[arg(long)]
        stage: Option<String>,
        /// Deal value in whole currency units
        #[arg(long)]
        value: Option<String>,
        /// Explicit ID (defaults to a random 8-digit hex id)
        #[arg(long)]
        id: Option<String>,
    },
    /// Remove an entity from the pipeline
    Remove {
        /// Entity ID
        id: String,
    },
    /// List entities with their server-side stage
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Show the pipeline's columns and the stages they map to
    Stages,
    /// Show the pipeline board
    Board {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
        /// Only show cards whose name contains this text (case-insensitive)
        #[arg(long)]
        search: Option<String>,
    },
    /// Drag an entity onto a column and wait for the move to settle
    Move {
        /// Entity ID
        id: String,
        /// Target column key (see `pipeboard stages`)
        column: String,
        /// Give up on the backend after this many milliseconds
        #[arg(long = "timeout-ms")]
        timeout_ms: Option<u64>,
    },
    /// Interactive board session reading drag commands from stdin
    Session {
        /// Delay every backend mutation by this many milliseconds
        #[arg(long = "latency-ms", default_value_t = 0)]
        latency_ms: u64,
        /// Make every mutation of this entity fail (repeatable)
        #[arg(long = "fail")]
        fail: Vec<String>,
        /// Give up on the backend after this many milliseconds
        #[arg(long = "timeout-ms")]
        timeout_ms: Option<u64>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    let pipeline = match &cli.pipeline {
        Some(name) => PipelineKind::from_str(name)
            .unwrap_or_else(|| user_error(&format!("Unknown pipeline '{}'. Use 'deals' or 'brokers'.", name))),
        None => config.default_pipeline,
    };

    match cli.command {
        Commands::Init { sample } => handle_init(&config, sample),
        Commands::Add { name, stage, value, id } => {
            let conn = DbConnection::connect(&config.data_location)?;
            handle_add(&conn, pipeline, &name, stage.as_deref(), value.as_deref(), id.as_deref())
        }
        Commands::Remove { id } => {
            let conn = DbConnection::connect(&config.data_location)?;
            handle_remove(&conn, &id)
        }
        Commands::List { json } => {
            let conn = DbConnection::connect(&config.data_location)?;
            handle_list(&conn, pipeline, json)
        }
        Commands::Stages => {
            print!("{}", format_stage_table(pipeline.table()));
            Ok(())
        }
        Commands::Board { json, search } => handle_board(&config, pipeline, json, search.as_deref()),
        Commands::Move { id, column, timeout_ms } => handle_move(&config, pipeline, &id, &column, timeout_ms),
        Commands::Session { latency_ms, fail, timeout_ms } => {
            DbConnection::connect(&config.data_location)?;
            let mut backend = SqliteBackend::new(config.data_location.clone())
                .with_latency(Duration::from_millis(latency_ms));
            for id in &fail {
                validate_entity_id(id).map_err(|e| anyhow!(e))?;
                backend = backend.with_failure(EntityId::new(id.clone()));
            }
            let options = SessionOptions {
                pipeline,
                mutation_timeout: timeout_ms.map(Duration::from_millis).unwrap_or(config.mutation_timeout),
                is_tty: is_tty(),
                width: get_terminal_width(),
            };
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            run_session(Arc::new(backend), &options, stdin.lock(), stdout.lock())
        }
    }
}

fn handle_init(config: &Config, sample: bool) -> Result<()> {
    let conn = DbConnection::connect(&config.data_location)?;
    println!("Database ready at {}", config.data_location.display());

    if sample {
        let mut created = 0;
        for entity in sample_entities() {
            if EntityRepo::get(&conn, &entity.id)?.is_none() {
                EntityRepo::create(&conn, &entity)?;
                created += 1;
            }
        }
        println!("Seeded {} sample entities.", created);
    }
    Ok(())
}

/// Sample deals and brokers for a fresh board
pub fn sample_entities() -> Vec<Entity> {
    vec![
        Entity::new(PipelineKind::Deals, "Company 1").with_id("d1").with_stage("prospect").with_value(Some(5_000_000)),
        Entity::new(PipelineKind::Deals, "Company 2").with_id("d2").with_stage("due-diligence").with_value(Some(3_000_000)),
        Entity::new(PipelineKind::Deals, "Company 3").with_id("d3").with_stage("term-sheet").with_value(Some(8_000_000)),
        Entity::new(PipelineKind::Deals, "Company 4").with_id("d4").with_stage("closing").with_value(Some(2_000_000)),
        Entity::new(PipelineKind::Brokers, "Broker 1").with_id("b1").with_stage("all"),
        Entity::new(PipelineKind::Brokers, "Broker 2").with_id("b2").with_stage("response-received"),
        Entity::new(PipelineKind::Brokers, "Broker 3").with_id("b3").with_stage("closing"),
    ]
}

fn handle_add(
    conn: &Connection,
    pipeline: PipelineKind,
    name: &str,
    stage: Option<&str>,
    value: Option<&str>,
    id: Option<&str>,
) -> Result<()> {
    if let Err(e) = validate_non_empty(name, "Name") {
        user_error(&e);
    }

    let mut entity = Entity::new(pipeline, name.trim());
    if let Some(id) = id {
        if let Err(e) = validate_entity_id(id) {
            user_error(&e);
        }
        entity = entity.with_id(id);
    }
    if let Some(stage) = stage {
        entity = entity.with_stage(stage);
    }
    if let Some(value) = value {
        match validate_value(value) {
            Ok(v) => entity = entity.with_value(Some(v)),
            Err(e) => user_error(&e),
        }
    }

    if EntityRepo::get(conn, &entity.id)?.is_some() {
        bail!("An entity with id '{}' already exists", entity.id);
    }
    EntityRepo::create(conn, &entity)?;
    println!("Added {} '{}' ({}) in stage {}", pipeline, entity.name, entity.id, entity.stage);
    Ok(())
}

fn handle_remove(conn: &Connection, id: &str) -> Result<()> {
    let id = EntityId::new(id);
    if !EntityRepo::delete(conn, &id)? {
        bail!("No entity with id '{}'", id);
    }
    println!("Removed {}", id);
    Ok(())
}

fn handle_list(conn: &Connection, pipeline: PipelineKind, json: bool) -> Result<()> {
    let entities = EntityRepo::list(conn, pipeline)
        .with_context(|| format!("Failed to list {}", pipeline))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entities)?);
    } else {
        print!("{}", format_entity_list(&entities, pipeline.table()));
    }
    Ok(())
}

fn open_controller(
    config: &Config,
    pipeline: PipelineKind,
    notifier: Box<dyn Notifier>,
    timeout: Duration,
) -> Result<DragTransitionController> {
    DbConnection::connect(&config.data_location)?;
    let backend = SqliteBackend::new(config.data_location.clone());
    let mut controller = DragTransitionController::new(
        pipeline.table(),
        Arc::new(backend),
        notifier,
        ControllerConfig { mutation_timeout: timeout },
    );
    controller
        .refresh()
        .map_err(|e| anyhow!("Failed to load the {} board: {}", pipeline, e))?;
    Ok(controller)
}

fn handle_board(config: &Config, pipeline: PipelineKind, json: bool, search: Option<&str>) -> Result<()> {
    // Read-only: nothing here produces toasts
    let controller = open_controller(config, pipeline, Box::new(LogNotifier), config.mutation_timeout)?;
    let mut board = controller.board();
    if let Some(term) = search {
        board = board.filtered(term);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&board)?);
    } else {
        print!("{}", format_board(&board, is_tty(), get_terminal_width()));
    }
    Ok(())
}

fn handle_move(config: &Config, pipeline: PipelineKind, id: &str, column: &str, timeout_ms: Option<u64>) -> Result<()> {
    if let Err(e) = validate_entity_id(id) {
        user_error(&e);
    }
    let timeout = timeout_ms.map(Duration::from_millis).unwrap_or(config.mutation_timeout);
    let toasts = ToastQueue::new();
    let mut controller = open_controller(config, pipeline, Box::new(toasts.clone()), timeout)?;
    let tty = is_tty();
    let id = EntityId::new(id);

    let outcome = match controller.on_drag_end(&id, column) {
        Ok(outcome) => outcome,
        Err(DragRejection::UnknownColumn(key)) => {
            let keys: Vec<&str> = pipeline.table().ordered().map(|c| c.key()).collect();
            bail!("Unknown column '{}'. Columns: {}", key, keys.join(", "));
        }
        Err(DragRejection::UnknownEntity) => bail!("No entity with id '{}' on the {} board", id, pipeline),
        Err(rejection) => bail!("Nothing to do: {}", rejection),
    };

    for toast in toasts.drain() {
        println!("{}", format_toast(&toast, tty));
    }

    if outcome == DragOutcome::Pinned {
        println!("Pinned {} to {} (view only, not saved)", id, pipeline.table().catch_all.label);
        return Ok(());
    }

    // Allow the worker a little past the deadline so a timeout is reported as such
    let settled = controller.wait_idle(timeout + Duration::from_millis(250));
    for toast in toasts.drain() {
        println!("{}", format_toast(&toast, tty));
    }

    match settled.first() {
        Some(Settled::Confirmed { .. }) => {
            if let Err(e) = controller.refresh() {
                log::warn!("Refresh after move failed: {}", e);
            }
            let stage = controller
                .state()
                .store()
                .get(&id)
                .map(|e| e.stage.to_string())
                .unwrap_or_default();
            let column = controller.state().column_of(&id).map(|c| c.label()).unwrap_or("?");
            println!("Saved: {} is in {} (stage {})", id, column, stage);
            Ok(())
        }
        Some(Settled::RolledBack { reason, .. }) => Err(anyhow!("Move of '{}' was rolled back: {}", id, reason)),
        None => Err(anyhow!("Move of '{}' did not settle", id)),
    }
}
