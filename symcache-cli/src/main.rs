//! symcache CLI: define, cache, and inspect Symbols in a file store.
//!
//! Commands:
//! - `define`: install Symbols from a TOML catalog
//! - `cache`: cache some or all Symbols, in parallel by default
//! - `override` / `failsafe`: log a manual datapoint
//! - `feed`: switch a feed on or off
//! - `validate`: run validators against the stored table
//! - `show`: describe a Symbol and print its cached data
//! - `list`: list stored Symbols
//! - `handles`: print the dblog handle log

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use symcache_core::domain::{FeedState, OrfDraft};
use symcache_core::handling::CheckpointHandler;
use symcache_core::{Pipeline, Settings, Storage, SymbolManager};
use symcache_runner::{install, registries_with_csv, BatchCache, Catalog, FileStore, HandleLog};

const HANDLE_LOG: &str = "handles.jsonl";

#[derive(Parser)]
#[command(name = "symcache", about = "symcache: feed/symbol caching pipeline")]
struct Cli {
    /// Store directory.
    #[arg(long, global = true, default_value = "symcache-data")]
    store: PathBuf,

    /// Settings TOML (raise_by_default, sourcing overrides).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install Symbols and feeds from a catalog file.
    Define {
        catalog: PathBuf,

        /// Replace Symbols that already exist.
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
    /// Cache Symbols.
    Cache {
        symbols: Vec<String>,

        /// Cache every stored Symbol.
        #[arg(long, default_value_t = false)]
        all: bool,

        /// Run one Symbol at a time.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Skip validators after caching.
        #[arg(long, default_value_t = false)]
        no_validity: bool,

        /// Print the batch report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Log an override datapoint.
    Override {
        symbol: String,
        index: String,
        value: f64,
        #[command(flatten)]
        entry: EntryArgs,
    },
    /// Log a failsafe datapoint.
    Failsafe {
        symbol: String,
        index: String,
        value: f64,
        #[command(flatten)]
        entry: EntryArgs,
    },
    /// Switch a feed on or off.
    Feed {
        symbol: String,
        fnum: u32,
        /// `on` or `off`.
        state: String,
    },
    /// Run validators against the stored table.
    Validate {
        symbol: String,

        /// Validator names to run. Defaults to all.
        #[arg(long = "check")]
        checks: Vec<String>,
    },
    /// Describe a Symbol and print its final series.
    Show {
        symbol: String,

        /// Print every column, not just `final`.
        #[arg(long, default_value_t = false)]
        raw: bool,
    },
    /// List stored Symbols.
    List,
    /// Print logged handle records.
    Handles {
        /// Only records owned by this Symbol or its feeds.
        #[arg(long)]
        symbol: Option<String>,
    },
}

#[derive(clap::Args)]
struct EntryArgs {
    /// Who logged the value.
    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    comment: Option<String>,

    /// Timestamp (YYYY-MM-DDTHH:MM:SS). Defaults to now.
    #[arg(long)]
    at: Option<String>,
}

struct App {
    store: PathBuf,
    manager: SymbolManager,
    pipeline: Pipeline,
}

fn open(store: &Path, settings: Option<&Path>) -> Result<App> {
    let settings = match settings {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    let storage: Arc<dyn Storage> = Arc::new(
        FileStore::open(store).with_context(|| format!("opening store {}", store.display()))?,
    );
    let registries = registries_with_csv().shared();
    let manager = SymbolManager::new(
        storage.clone(),
        registries.clone(),
        settings.handle_defaults(),
    );
    let handler = CheckpointHandler::new(Arc::new(HandleLog::new(store.join(HANDLE_LOG))));
    let pipeline = Pipeline::new(storage, registries, settings).with_handler(handler);
    Ok(App {
        store: store.to_path_buf(),
        manager,
        pipeline,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let app = open(&cli.store, cli.settings.as_deref())?;

    match cli.command {
        Commands::Define { catalog, overwrite } => run_define(&app, &catalog, overwrite),
        Commands::Cache {
            symbols,
            all,
            sequential,
            no_validity,
            json,
        } => run_cache(&app, symbols, all, sequential, !no_validity, json),
        Commands::Override {
            symbol,
            index,
            value,
            entry,
        } => run_datapoint(&app, &symbol, &index, value, entry, false),
        Commands::Failsafe {
            symbol,
            index,
            value,
            entry,
        } => run_datapoint(&app, &symbol, &index, value, entry, true),
        Commands::Feed {
            symbol,
            fnum,
            state,
        } => run_feed_state(&app, &symbol, fnum, &state),
        Commands::Validate { symbol, checks } => run_validate(&app, &symbol, &checks),
        Commands::Show { symbol, raw } => run_show(&app, &symbol, raw),
        Commands::List => run_list(&app),
        Commands::Handles { symbol } => run_handles(&app, symbol.as_deref()),
    }
}

fn run_define(app: &App, catalog: &Path, overwrite: bool) -> Result<()> {
    let catalog = Catalog::from_file(catalog)?;
    let definitions = catalog.definitions(app.manager.defaults(), app.pipeline.registries())?;
    let created = install(definitions, &app.manager, overwrite)?;
    for name in &created {
        println!("defined {name}");
    }
    Ok(())
}

fn run_cache(
    app: &App,
    symbols: Vec<String>,
    all: bool,
    sequential: bool,
    check_validity: bool,
    json: bool,
) -> Result<()> {
    if all && !symbols.is_empty() {
        bail!("--all and explicit symbols are mutually exclusive");
    }
    if !all && symbols.is_empty() {
        bail!("name at least one symbol, or pass --all");
    }

    let batch = BatchCache::new(app.pipeline.clone())
        .with_parallelism(!sequential)
        .with_validity(check_validity);
    let report = if all {
        batch.run_all("cache")?
    } else {
        batch.run("cache", &symbols)
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.summary());
    }
    if !report.failures.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_datapoint(
    app: &App,
    symbol: &str,
    index: &str,
    value: f64,
    entry: EntryArgs,
    failsafe: bool,
) -> Result<()> {
    let index = app.manager.parse_index(symbol, index)?;
    let mut draft = OrfDraft::new(index, value);
    if let Some(user) = entry.user {
        draft = draft.by(user);
    }
    if let Some(comment) = entry.comment {
        draft = draft.comment(comment);
    }
    if let Some(at) = entry.at {
        let at = NaiveDateTime::parse_from_str(&at, "%Y-%m-%dT%H:%M:%S")
            .with_context(|| format!("bad --at '{at}'"))?;
        draft = draft.at(at);
    }

    let logged = if failsafe {
        app.manager.add_failsafe(symbol, draft)?
    } else {
        app.manager.add_override(symbol, draft)?
    };
    println!(
        "{} {} #{}: {} = {}",
        symbol, logged.kind, logged.seq, logged.index, logged.value
    );
    Ok(())
}

fn run_feed_state(app: &App, symbol: &str, fnum: u32, state: &str) -> Result<()> {
    let state = match state.to_ascii_lowercase().as_str() {
        "on" => FeedState::On,
        "off" => FeedState::Off,
        other => bail!("unknown feed state '{other}'. Valid: on, off"),
    };
    let feed = app.manager.set_feed_state(symbol, fnum, state)?;
    println!("{} is {}", feed.owner(), feed.state);
    Ok(())
}

fn run_validate(app: &App, symbol: &str, checks: &[String]) -> Result<()> {
    let (valid, points) = app.pipeline.check_validity(symbol, checks)?;
    for point in &points {
        match &point.extra {
            Some(extra) => println!("  {} = {} ({extra})", point.name, point.value),
            None => println!("  {} = {}", point.name, point.value),
        }
    }
    println!("{symbol}: {}", if valid { "valid" } else { "INVALID" });
    if !valid {
        std::process::exit(1);
    }
    Ok(())
}

fn run_show(app: &App, symbol: &str, raw: bool) -> Result<()> {
    println!("{}", app.manager.describe(symbol)?);
    let table = match app.manager.raw_data(symbol) {
        Ok(table) => table,
        Err(e) => {
            println!("  no cached data: {e}");
            return Ok(());
        }
    };

    let columns: Vec<String> = if raw {
        table.column_names().into_iter().skip(1).collect()
    } else {
        vec!["final".to_string()]
    };
    println!("\n{:<20} {}", "index", columns.join("  "));
    for (row, index) in table.index.iter().enumerate() {
        let cells: Vec<String> = columns
            .iter()
            .map(|name| match table.column_by_name(name).and_then(|c| c[row]) {
                Some(v) => format!("{v:>10.6}"),
                None => format!("{:>10}", "-"),
            })
            .collect();
        println!("{:<20} {}", index.to_string(), cells.join("  "));
    }
    Ok(())
}

fn run_list(app: &App) -> Result<()> {
    let names = app.manager.list()?;
    if names.is_empty() {
        println!("No symbols in {}", app.store.display());
    }
    for name in names {
        let feeds = app.manager.feeds(&name)?;
        let on = feeds.iter().filter(|f| f.is_on()).count();
        println!("{name:<16} {} feeds ({on} on)", feeds.len());
    }
    Ok(())
}

fn run_handles(app: &App, symbol: Option<&str>) -> Result<()> {
    let log = HandleLog::new(app.store.join(HANDLE_LOG));
    let entries = log.read_all()?;
    let owned_by = |owner: &str, symbol: &str| {
        owner == symbol || owner.starts_with(&format!("{symbol}/"))
    };
    for entry in entries
        .iter()
        .filter(|e| symbol.map_or(true, |s| owned_by(&e.record.owner, s)))
    {
        println!(
            "{} [{}] {}: {} ({})",
            entry.logged_at.format("%Y-%m-%d %H:%M:%S"),
            entry.record.checkpoint,
            entry.record.owner,
            entry.record.message,
            entry.record.cause
        );
    }
    Ok(())
}
