//! # jods counter
//!
//! A standalone CLI counter tracker built on jods.
//! Counters live in a single store, are saved to a JSON file after every
//! change, and can be stepped back and forth in the interactive REPL.
//!
//! ## State layout
//!
//! ```text
//! counters.<name>   →  integer value
//! total             →  computed: sum of all counters
//! busiest           →  computed: name of the largest counter
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::*;
use jods_core::{computed, diff, Change, Store, StoreError};
use jods_history::{History, HistoryOptions};
use jods_persist::{
    clear_persisted, persist, KeyFilter, PersistError, PersistHandle, PersistOptions, SyncStorage,
};
use serde_json::{json, Value};

const STORAGE_KEY: &str = "counters";

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "jods-counter")]
#[command(about = "Persistent counter tracker with undo/redo (jods)")]
#[command(version)]
struct Cli {
    /// Directory the counters are saved in
    #[arg(long, default_value = ".jods")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Increment a counter
    Inc {
        name: String,
        #[arg(default_value_t = 1)]
        amount: i64,
    },
    /// Decrement a counter
    Dec {
        name: String,
        #[arg(default_value_t = 1)]
        amount: i64,
    },
    /// Remove a counter
    Remove { name: String },
    /// Show all counters
    Show,
    /// Delete the saved counters
    Clear,
    /// Interactive REPL with undo/redo
    Interactive,
}

// ─── File storage ──────────────────────────────────────────────────────────

/// Keeps each key in `<dir>/<key>.json`.
struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl SyncStorage for FileStorage {
    fn get_item_sync(&self, key: &str) -> jods_persist::Result<Option<String>> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PersistError::storage(err)),
        }
    }

    fn set_item_sync(&self, key: &str, value: String) -> jods_persist::Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(PersistError::storage)?;
        std::fs::write(self.path(key), value).map_err(PersistError::storage)
    }

    fn remove_item_sync(&self, key: &str) -> jods_persist::Result<()> {
        match std::fs::remove_file(self.path(key)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(PersistError::storage(err)),
            _ => Ok(()),
        }
    }
}

// ─── Tracker: a persisted store with history ───────────────────────────────

struct Tracker {
    store: Store,
    history: History,
    persistence: PersistHandle,
}

impl Tracker {
    async fn open(storage: Arc<FileStorage>) -> Self {
        let store = Store::named("counters", json!({"counters": {}}));
        // Definitions are fixed, so these cannot fail on a fresh store.
        let _ = store.set(
            "total",
            computed(|ctx| {
                ctx.get("counters")
                    .as_object()
                    .map(|m| m.values().filter_map(Value::as_i64).sum::<i64>())
                    .unwrap_or(0)
            }),
        );
        let _ = store.set(
            "busiest",
            computed(|ctx| {
                ctx.get("counters")
                    .as_object()
                    .and_then(|m| {
                        m.iter()
                            .filter_map(|(k, v)| v.as_i64().map(|n| (k.clone(), n)))
                            .max_by_key(|(_, n)| *n)
                    })
                    .map(|(k, _)| Value::String(k))
                    .unwrap_or(Value::Null)
            }),
        );

        let options = PersistOptions::builder(STORAGE_KEY)
            .partial(KeyFilter::keys(["counters"]))
            .on_error(|err, op| {
                eprintln!("  {} {} failed: {}", "!".bright_red(), op, err);
            })
            .build();
        let persistence = persist(storage, &store, options).await;
        let history = History::attach(&store, HistoryOptions::builder().max_entries(100).build());

        Self {
            store,
            history,
            persistence,
        }
    }

    fn value(&self, name: &str) -> i64 {
        self.store
            .get(format!("counters.{}", name))
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    }

    fn add(&self, name: &str, delta: i64) -> Result<i64, StoreError> {
        check_name(name)?;
        let value = self.value(name) + delta;
        self.store.set(format!("counters.{}", name), json!(value))?;
        Ok(value)
    }

    fn remove(&self, name: &str) -> Result<bool, StoreError> {
        check_name(name)?;
        self.store.delete(format!("counters.{}", name))
    }

    fn counters(&self) -> Vec<(String, i64)> {
        let mut counters: Vec<(String, i64)> = match self.store.get("counters") {
            Some(Value::Object(map)) => map
                .into_iter()
                .map(|(k, v)| (k, v.as_i64().unwrap_or(0)))
                .collect(),
            _ => Vec::new(),
        };
        counters.sort();
        counters
    }

    async fn save(&self) {
        self.persistence.flush().await;
    }
}

fn check_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.contains('.') {
        return Err(StoreError::PathNotFound(format!(
            "invalid counter name '{}'",
            name
        )));
    }
    Ok(())
}

// ─── Pretty printing ──────────────────────────────────────────────────────

fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("\n{}", bar.bright_cyan());
    println!("  {}", text.bold().bright_white());
    println!("{}", bar.bright_cyan());
}

fn step(text: &str) {
    println!("  {} {}", "•".bright_green(), text);
}

fn failure(err: impl std::fmt::Display) {
    println!("  {} {}", "!".bright_red(), err);
}

fn show_counters(tracker: &Tracker) {
    let border = "─".repeat(44);
    println!("  ┌{}┐", border);
    println!("  │ {:^42} │", "Counters".bright_yellow().to_string());
    println!("  ├{}┤", border);

    let counters = tracker.counters();
    if counters.is_empty() {
        println!("  │ {:^42} │", "(no counters)".dimmed().to_string());
    } else {
        for (name, value) in &counters {
            let line = format!("{:<28} {:>13}", name, value);
            println!("  │ {} │", line);
        }
    }
    println!("  ├{}┤", border);
    let total = tracker.store.get("total").unwrap_or(Value::Null);
    let busiest = match tracker.store.get("busiest") {
        Some(Value::String(name)) => name,
        _ => "-".to_string(),
    };
    println!("  │ {:<28} {:>13} │", "total".bold(), total.to_string());
    println!("  │ {:<28} {:>13} │", "busiest".bold(), busiest);
    println!("  └{}┘", border);
}

fn describe_change(change: &Value) -> String {
    match (change.get("__old"), change.get("__new")) {
        (Some(old), Some(new)) => format!("{} → {}", old, new),
        (None, Some(new)) => format!("added {}", new),
        (Some(old), None) => format!("removed {}", old),
        (None, None) => "changed".to_string(),
    }
}

fn show_history(tracker: &Tracker) {
    let current = tracker.history.current_index();
    for (i, entry) in tracker.history.entries().iter().enumerate() {
        let marker = if i == current { "▶".bright_green() } else { " ".normal() };
        let time = entry
            .recorded_at()
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_default();
        let summary: Vec<String> = match entry.diff.root() {
            Some(Change::Object(_)) => {
                let json = entry.diff.to_json();
                entry
                    .diff
                    .changed_paths()
                    .into_iter()
                    .filter(|p| p.top_key().as_deref() == Some("counters"))
                    .map(|p| {
                        let change = p.resolve(&json).cloned().unwrap_or(Value::Null);
                        format!("{} {}", p, describe_change(&change))
                    })
                    .collect()
            }
            _ => vec!["(start)".dimmed().to_string()],
        };
        println!(
            "  {} {:>3} {} {}",
            marker,
            i,
            time.dimmed(),
            summary.join(", ")
        );
    }
}

// ─── Interactive REPL ──────────────────────────────────────────────────────

async fn run_interactive(tracker: &Tracker) {
    header("INTERACTIVE REPL - jods Counter Tracker");

    println!();
    println!("  {}", "Commands:".bold().underline());
    println!(
        "    {} <counter> [n]      Increment counter by n (default 1)",
        "inc".bright_cyan()
    );
    println!(
        "    {} <counter> [n]      Decrement counter by n (default 1)",
        "dec".bright_cyan()
    );
    println!("    {} <counter>           Remove a counter", "rm".bright_cyan());
    println!("    {}                    Show all counters", "show".bright_cyan());
    println!("    {}                    Step back one change", "undo".bright_cyan());
    println!("    {}                    Step forward one change", "redo".bright_cyan());
    println!("    {}                 List recorded changes", "history".bright_cyan());
    println!("    {} <index>             Jump to a recorded change", "goto".bright_cyan());
    println!("    {}                    Exit", "quit".bright_cyan());
    println!();

    loop {
        print!("{}", "jods> ".bright_cyan().bold());
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() || input.is_empty() {
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0] {
            "inc" | "+" | "dec" | "-" => {
                if parts.len() < 2 {
                    println!("  {} Usage: {} <counter> [amount]", "!".bright_red(), parts[0]);
                    continue;
                }
                let amount: i64 = parts.get(2).and_then(|s| s.parse().ok()).unwrap_or(1);
                let delta = if matches!(parts[0], "dec" | "-") { -amount } else { amount };
                match tracker.add(parts[1], delta) {
                    Ok(value) => step(&format!("{} = {}", parts[1], value)),
                    Err(err) => failure(err),
                }
            }

            "rm" | "remove" => {
                if parts.len() < 2 {
                    println!("  {} Usage: rm <counter>", "!".bright_red());
                    continue;
                }
                match tracker.remove(parts[1]) {
                    Ok(true) => step(&format!("removed '{}'", parts[1])),
                    Ok(false) => println!("  {} Unknown counter '{}'", "!".bright_yellow(), parts[1]),
                    Err(err) => failure(err),
                }
            }

            "show" | "s" => show_counters(tracker),

            "undo" | "u" => {
                if tracker.history.back() {
                    step(&format!("at change {}", tracker.history.current_index()));
                } else {
                    println!("  {}", "nothing to undo".dimmed());
                }
            }

            "redo" | "r" => {
                if tracker.history.forward() {
                    step(&format!("at change {}", tracker.history.current_index()));
                } else {
                    println!("  {}", "nothing to redo".dimmed());
                }
            }

            "history" | "h" => show_history(tracker),

            "goto" | "g" => match parts.get(1).and_then(|s| s.parse::<usize>().ok()) {
                Some(index) => {
                    let reached = tracker.history.travel_to(index);
                    step(&format!("at change {}", reached));
                }
                None => println!("  {} Usage: goto <index>", "!".bright_red()),
            },

            "quit" | "exit" | "q" => {
                println!("  {}", "Goodbye!".dimmed());
                break;
            }

            "help" | "?" => {
                println!("  inc <c> [n] | dec <c> [n] | rm <c> | show");
                println!("  undo | redo | history | goto <i> | quit");
            }

            other => {
                println!(
                    "  {} Unknown command '{}', type 'help'",
                    "?".bright_yellow(),
                    other
                );
            }
        }

        tracker.save().await;
    }
}

// ─── Entry point ───────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    let storage = Arc::new(FileStorage::new(cli.dir.clone()));

    if let Commands::Clear = cli.command {
        match clear_persisted(storage.as_ref(), STORAGE_KEY).await {
            Ok(()) => step("saved counters deleted"),
            Err(err) => failure(err),
        }
        return;
    }

    let tracker = Tracker::open(storage).await;
    let before = tracker.store.plain_state();

    match &cli.command {
        Commands::Inc { name, amount } => match tracker.add(name, *amount) {
            Ok(value) => step(&format!("{} = {}", name, value)),
            Err(err) => failure(err),
        },
        Commands::Dec { name, amount } => match tracker.add(name, -*amount) {
            Ok(value) => step(&format!("{} = {}", name, value)),
            Err(err) => failure(err),
        },
        Commands::Remove { name } => match tracker.remove(name) {
            Ok(true) => step(&format!("removed '{}'", name)),
            Ok(false) => println!("  {} Unknown counter '{}'", "!".bright_yellow(), name),
            Err(err) => failure(err),
        },
        Commands::Show => show_counters(&tracker),
        Commands::Interactive => run_interactive(&tracker).await,
        Commands::Clear => {}
    }

    if !diff(&before, &tracker.store.plain_state()).is_empty() {
        tracker.save().await;
    }
}
