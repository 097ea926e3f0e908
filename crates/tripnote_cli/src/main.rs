//! Command-line entry point for the trip store.
//!
//! # Responsibility
//! - Compose config, logging, storage and the trip store.
//! - Map subcommands onto trip store operations and print results.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::path::PathBuf;
use tripnote_core::db::open_db;
use tripnote_core::{
    init_logging, ContentKind, CoreConfig, LocalAssetStore, ReleaseReport, SqliteTripRepository,
    Trip, TripStore,
};

#[derive(Parser)]
#[command(name = "tripnote", version, about = "Plan trips day by day")]
struct Cli {
    /// Data directory (overrides TRIPNOTE_DATA_DIR)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (overrides TRIPNOTE_LOG_LEVEL)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List all trips
    List,
    /// Print one trip with its days, uploads and checklist
    Show { trip_id: String },
    /// Create a trip with one day per date in the range
    Create {
        title: String,
        /// YYYY-MM-DD
        start: String,
        /// YYYY-MM-DD
        end: String,
    },
    /// Delete a trip and its stored assets
    DeleteTrip { trip_id: String },
    /// Copy a file into the asset store and attach it to a day
    Attach {
        trip_id: String,
        day_id: String,
        source: PathBuf,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        memo: Option<String>,
        #[arg(long, value_enum, default_value_t = KindArg::Photo)]
        kind: KindArg,
    },
    /// Set or clear the memo of an upload
    Memo {
        trip_id: String,
        day_id: String,
        item_id: String,
        /// New memo; omit to clear
        text: Option<String>,
    },
    /// Remove an upload and its stored asset
    RemoveItem {
        trip_id: String,
        day_id: String,
        item_id: String,
    },
    /// Append a day after the last one
    AddDay { trip_id: String },
    /// Delete a day and its uploads
    DeleteDay { trip_id: String, day_id: String },
    /// Set a day's title
    RenameDay {
        trip_id: String,
        day_id: String,
        title: String,
    },
    /// Manage the packing checklist
    Checklist {
        #[command(subcommand)]
        cmd: ChecklistCmd,
    },
}

#[derive(Subcommand)]
enum ChecklistCmd {
    Add { trip_id: String, text: String },
    Toggle { trip_id: String, item_id: String },
    Remove { trip_id: String, item_id: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Photo,
    File,
}

impl From<KindArg> for ContentKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Photo => ContentKind::Photo,
            KindArg::File => ContentKind::File,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.data_dir {
        Some(dir) => CoreConfig::from_data_dir(dir),
        None => CoreConfig::from_env(),
    };
    if let Some(level) = cli.log_level {
        config = config.with_log_level(level);
    }
    config
        .ensure_data_dir()
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;

    init_logging(&config.log_level, &config.log_dir).context("starting logs")?;

    let conn = open_db(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let mut store = TripStore::new(
        SqliteTripRepository::new(&conn),
        LocalAssetStore::new(&config.assets_dir),
    );
    store.load_trips().context("loading trips")?;
    info!(
        "event=cli_start module=cli status=ok trips={}",
        store.trips().len()
    );

    run(&mut store, cli.cmd)
}

fn run(
    store: &mut TripStore<SqliteTripRepository<'_>, LocalAssetStore>,
    cmd: Cmd,
) -> Result<()> {
    match cmd {
        Cmd::List => {
            for trip in store.trips() {
                println!(
                    "{}  {}  {} ~ {}  ({} days)",
                    trip.id,
                    trip.title,
                    trip.start_date,
                    trip.end_date,
                    trip.days.len()
                );
            }
        }
        Cmd::Show { trip_id } => {
            let trip = store
                .snapshot()
                .trip(&trip_id)
                .ok_or_else(|| anyhow!("trip not found: {trip_id}"))?;
            print_trip(trip);
        }
        Cmd::Create { title, start, end } => {
            let trip = store.add_trip(title, &start, &end)?;
            println!("created {} with {} days", trip.id, trip.days.len());
        }
        Cmd::DeleteTrip { trip_id } => {
            let report = store.delete_trip(&trip_id)?;
            print_release("deleted trip", &report);
        }
        Cmd::Attach {
            trip_id,
            day_id,
            source,
            title,
            memo,
            kind,
        } => {
            let source = source.to_string_lossy().into_owned();
            let title = title.unwrap_or_else(|| default_title(&source));
            let created =
                store.attach_content(&trip_id, &day_id, &source, title, memo, kind.into())?;
            println!("attached {} as {}", created.id, created.uri);
        }
        Cmd::Memo {
            trip_id,
            day_id,
            item_id,
            text,
        } => {
            store.update_content_memo(&trip_id, &day_id, &item_id, text)?;
            println!("updated memo of {item_id}");
        }
        Cmd::RemoveItem {
            trip_id,
            day_id,
            item_id,
        } => {
            let removed = store.remove_content_item(&trip_id, &day_id, &item_id)?;
            println!("removed {}", removed.title);
        }
        Cmd::AddDay { trip_id } => {
            let day = store.add_day(&trip_id)?;
            println!("added {} ({}) on {}", day.id, day.label(), day.date);
        }
        Cmd::DeleteDay { trip_id, day_id } => {
            let report = store.delete_day(&trip_id, &day_id)?;
            print_release("deleted day", &report);
        }
        Cmd::RenameDay {
            trip_id,
            day_id,
            title,
        } => {
            store.update_day_title(&trip_id, &day_id, title)?;
            println!("renamed {day_id}");
        }
        Cmd::Checklist { cmd } => match cmd {
            ChecklistCmd::Add { trip_id, text } => {
                let item = store.add_checklist_item(&trip_id, text)?;
                println!("added {}", item.id);
            }
            ChecklistCmd::Toggle { trip_id, item_id } => {
                let checked = store.toggle_checklist_item(&trip_id, &item_id)?;
                println!("{item_id} checked={checked}");
            }
            ChecklistCmd::Remove { trip_id, item_id } => {
                store.remove_checklist_item(&trip_id, &item_id)?;
                println!("removed {item_id}");
            }
        },
    }
    Ok(())
}

fn print_trip(trip: &Trip) {
    println!("{} ({})", trip.title, trip.id);
    println!("{} ~ {}", trip.start_date, trip.end_date);
    for day in &trip.days {
        println!("  [{}] {} {}", day.id, day.label(), day.date);
        for item in &day.items {
            let memo = item.memo.as_deref().unwrap_or("");
            println!(
                "    - {} {} {} {}",
                item.id,
                item.kind.as_str(),
                item.title,
                memo
            );
        }
    }
    if !trip.checklist.is_empty() {
        println!("  checklist:");
        for item in &trip.checklist {
            let mark = if item.is_checked { "x" } else { " " };
            println!("    [{mark}] {} {}", item.id, item.text);
        }
    }
}

fn print_release(prefix: &str, report: &ReleaseReport) {
    println!(
        "{prefix}: released {} assets, {} failed",
        report.released,
        report.failed.len()
    );
}

fn default_title(source: &str) -> String {
    std::path::Path::new(source)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string())
}
