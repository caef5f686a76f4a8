pub mod catalog;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod model;
pub mod runtime;
pub mod search;
pub mod storage;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use itertools::Itertools;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use catalog::{Catalog, CatalogIndex, FileCatalog};
use config::EngineConfig;
use engine::{Engine, EngineEvent, Execution};
use model::types::Pane;
use search::context::ContextView;
use search::relevance::{RelevanceStore, SharedRelevance};
use storage::{RelevanceFile, RelevanceSaver};

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "qlaunch",
    version,
    about = "Type-ahead launcher engine: fuzzy abbreviation matching with learned relevance"
)]
pub struct Cli {
    /// Directory holding relevance.bin (defaults to platform data dir)
    #[arg(long, env = "QUICKLAUNCH_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rank a catalog against abbreviations typed into up to three panes
    Query {
        /// JSON catalog file
        #[arg(long)]
        catalog: PathBuf,

        /// Abbreviation for the first pane
        first: String,

        /// Abbreviation for the second pane (action or direct object)
        second: Option<String>,

        /// Abbreviation for the third pane (modifier item)
        third: Option<String>,

        /// Text mode: the first pane takes free text
        #[arg(long, default_value_t = false)]
        text: bool,

        /// Results shown per pane
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Emit JSON instead of a table
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Execute the resulting command and learn from the choice
        #[arg(long, default_value_t = false)]
        commit: bool,
    },
    /// Record that UID was chosen after typing ABBREV in the first pane
    Learn {
        #[arg(long)]
        catalog: PathBuf,
        abbrev: String,
        uid: String,
        /// Number of times to record the choice
        #[arg(long, default_value_t = 1)]
        times: u32,
    },
    /// Show what the relevance store has learned
    Stats {
        /// Records listed, most used first
        #[arg(long, default_value_t = 20)]
        top: usize,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Drop everything learned about UID
    Forget { uid: String },
    /// Interactive session reading pane input from stdin
    Repl {
        #[arg(long)]
        catalog: PathBuf,
    },
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    let config = EngineConfig::from_env();

    match cli.command {
        Commands::Query {
            catalog,
            first,
            second,
            third,
            text,
            limit,
            json,
            commit,
        } => {
            let panes = [Some(first), second, third];
            run_query(&data_dir, &config, &catalog, &panes, text, limit, json, commit)
        }
        Commands::Learn {
            catalog,
            abbrev,
            uid,
            times,
        } => run_learn(&data_dir, &config, &catalog, &abbrev, &uid, times),
        Commands::Stats { top, json } => run_stats(&data_dir, &config, top, json),
        Commands::Forget { uid } => run_forget(&data_dir, &config, &uid),
        Commands::Repl { catalog } => run_repl(&data_dir, config, &catalog).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "qlaunch", &mut std::io::stdout());
            Ok(())
        }
    }
}

pub fn default_data_dir() -> Result<PathBuf> {
    directories::ProjectDirs::from("com", "quicklaunch", "quicklaunch")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .context("no home directory to derive a data dir from; pass --data-dir")
}

/// Install the stderr subscriber. `QUICKLAUNCH_LOG` wins over `RUST_LOG`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("QUICKLAUNCH_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load the persisted store for `data_dir`, honoring config overrides.
pub fn open_store(data_dir: &Path, config: &EngineConfig) -> (RelevanceFile, SharedRelevance) {
    let file = RelevanceFile::in_data_dir(data_dir);
    let mut store = RelevanceStore::from_snapshot(file.load());
    if let Some(popular) = &config.popular {
        store = store.with_popular(popular.iter().cloned());
    }
    (file, store.into_shared())
}

fn open_catalog(path: &Path) -> Result<Arc<CatalogIndex>> {
    let source: Arc<dyn Catalog> = Arc::new(FileCatalog::load(path)?);
    Ok(Arc::new(CatalogIndex::build(vec![source])))
}

#[derive(Serialize)]
struct QueryReport<'a> {
    panes: Vec<PaneReport>,
    execution: Option<&'a Execution>,
}

#[derive(Serialize)]
struct PaneReport {
    pane: Pane,
    #[serde(flatten)]
    context: ContextView,
}

#[allow(clippy::too_many_arguments)]
fn run_query(
    data_dir: &Path,
    config: &EngineConfig,
    catalog: &Path,
    abbrevs: &[Option<String>; 3],
    text: bool,
    limit: usize,
    json: bool,
    commit: bool,
) -> Result<()> {
    let catalog = open_catalog(catalog)?;
    let (file, store) = open_store(data_dir, config);
    let mut engine = Engine::new(catalog, store.clone(), config.clone());
    engine.set_text_mode(text);

    for (pane, abbrev) in Pane::ALL.into_iter().zip(abbrevs) {
        engine.flush_all();
        if let Some(abbrev) = abbrev {
            engine.set_string(pane, abbrev);
        }
    }
    engine.flush_all();

    let panes: Vec<PaneReport> = Pane::ALL
        .into_iter()
        .filter(|pane| engine.controller(*pane).is_enabled())
        .map(|pane| {
            let mut context = engine.current_context(pane);
            context.results.truncate(limit);
            PaneReport { pane, context }
        })
        .collect();

    let execution = if commit { engine.commit() } else { None };
    if commit {
        file.save(&store.read().snapshot())?;
    }

    if json {
        let report = QueryReport {
            panes,
            execution: execution.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for report in &panes {
        print_context(report.pane, &report.context);
    }
    match (commit, &execution) {
        (true, Some(execution)) => print_execution(execution),
        (true, None) => println!("nothing to execute"),
        _ => {}
    }
    Ok(())
}

fn print_context(pane: Pane, context: &ContextView) {
    println!("{pane:?} [{}]", context.query);
    for (idx, candidate) in context.results.iter().enumerate() {
        let marker = if context.cursor == Some(idx) { '>' } else { ' ' };
        println!(
            "{marker} {:>6.3} {:>6.3}  {:<32} {} ({})",
            candidate.relevance, candidate.score, candidate.name, candidate.uid, candidate.kind
        );
    }
}

fn print_execution(execution: &Execution) {
    let items = execution.items.iter().map(|c| c.name.as_str()).join(", ");
    let modifiers = execution.modifiers.iter().map(|c| c.name.as_str()).join(", ");
    println!("executed {} on [{items}] with [{modifiers}]", execution.action.name);
    if let Some(error) = &execution.error {
        println!("  failed: {error}");
    }
}

fn run_learn(
    data_dir: &Path,
    config: &EngineConfig,
    catalog: &Path,
    abbrev: &str,
    uid: &str,
    times: u32,
) -> Result<()> {
    let catalog = open_catalog(catalog)?;
    let snapshot = catalog.snapshot();
    let candidate = snapshot
        .candidates
        .iter()
        .find(|c| c.uid == uid)
        .with_context(|| format!("{uid} is not in the catalog"))?;
    let (file, store) = open_store(data_dir, config);
    {
        let mut store = store.write();
        for _ in 0..times {
            store.increase(candidate, abbrev, None);
        }
    }
    file.save(&store.read().snapshot())?;
    println!("recorded {times} choice(s) of {uid} for \"{abbrev}\"");
    Ok(())
}

fn run_stats(data_dir: &Path, config: &EngineConfig, top: usize, json: bool) -> Result<()> {
    let (_, store) = open_store(data_dir, config);
    let store = store.read();
    let stats = store.stats();
    let records: Vec<_> = store
        .records()
        .sorted_by(|a, b| b.1.hits.cmp(&a.1.hits).then_with(|| a.0.cmp(b.0)))
        .take(top)
        .collect();

    if json {
        let out = serde_json::json!({ "stats": stats, "records": records });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!(
        "{} records, {} hits (max item {}, max action {})",
        stats.records, stats.total_hits, stats.max_item_hits, stats.max_action_hits
    );
    for (uid, record) in records {
        println!(
            "{:>5} {:>5}  [{}]  {uid}",
            record.hits,
            record.first_pane_hits,
            record.first_chars.iter().collect::<String>()
        );
    }
    Ok(())
}

fn run_forget(data_dir: &Path, config: &EngineConfig, uid: &str) -> Result<()> {
    let (file, store) = open_store(data_dir, config);
    if store.write().forget(uid) {
        file.save(&store.read().snapshot())?;
        println!("forgot {uid}");
    } else {
        println!("nothing recorded for {uid}");
    }
    Ok(())
}

/// Parsed REPL line.
#[derive(Debug, PartialEq)]
enum ReplInput {
    Type(Pane, String),
    Commit,
    DrillIn(Pane),
    DrillOut(Pane),
    Move(Pane, isize),
    Toggle(Pane, usize),
    Refresh,
    Reset,
    Quit,
}

/// `text` types into pane 1, `>text` into pane 2, `>>text` into pane 3.
/// Colon commands (`:in`, `:out`, `:down`, `:up`, `:mark N`) apply to the
/// pane given by the same `>` prefix.
fn parse_repl_line(line: &str) -> ReplInput {
    let line = line.trim_end_matches(['\r', '\n']);
    match line {
        "!" => return ReplInput::Commit,
        ":quit" | ":q" => return ReplInput::Quit,
        ":refresh" => return ReplInput::Refresh,
        ":reset" => return ReplInput::Reset,
        _ => {}
    }
    let (pane, rest) = if let Some(rest) = line.strip_prefix(">>") {
        (Pane::Third, rest)
    } else if let Some(rest) = line.strip_prefix('>') {
        (Pane::Second, rest)
    } else {
        (Pane::First, line)
    };
    match rest.split_whitespace().collect::<Vec<_>>().as_slice() {
        [":in"] => ReplInput::DrillIn(pane),
        [":out"] => ReplInput::DrillOut(pane),
        [":down"] => ReplInput::Move(pane, 1),
        [":up"] => ReplInput::Move(pane, -1),
        [":mark", n] => match n.parse() {
            Ok(idx) => ReplInput::Toggle(pane, idx),
            Err(_) => ReplInput::Type(pane, rest.to_string()),
        },
        _ => ReplInput::Type(pane, rest.to_string()),
    }
}

/// Forward lines from `input` on a dedicated thread.
///
/// The thread is detached so a read blocked on a terminal never holds up
/// runtime shutdown.
fn spawn_line_reader<R>(input: R) -> Result<tokio::sync::mpsc::UnboundedReceiver<String>>
where
    R: std::io::BufRead + Send + 'static,
{
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("repl-stdin".into())
        .spawn(move || {
            for line in input.lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("starting stdin reader")?;
    Ok(rx)
}

async fn run_repl(data_dir: &Path, config: EngineConfig, catalog: &Path) -> Result<()> {
    use runtime::Command;

    let catalog = open_catalog(catalog)?;
    let (file, store) = open_store(data_dir, &config);
    let saver = RelevanceSaver::spawn(store.clone(), file, config.save_interval)
        .context("starting relevance saver")?;
    let engine = Engine::new(catalog, store, config);

    let (events_tx, events_rx) = crossbeam_channel::unbounded::<EngineEvent>();
    let printer = std::thread::Builder::new()
        .name("repl-events".into())
        .spawn(move || {
            for event in events_rx {
                if let EngineEvent::SearchFinished {
                    pane,
                    selection,
                    query,
                    ..
                } = event
                {
                    let shown = selection.map(|c| c.name).unwrap_or_else(|| "-".into());
                    println!("{pane:?} [{query}] -> {shown}");
                }
            }
        })?;
    let (handle, task) = runtime::spawn(engine, events_tx);

    let mut lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()))?;
    loop {
        let line = tokio::select! {
            line = lines.recv() => line,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(line) = line else { break };
        let sent = match parse_repl_line(&line) {
            ReplInput::Quit => break,
            ReplInput::Commit => {
                match handle.commit().await {
                    Some(execution) => print_execution(&execution),
                    None => println!("nothing to execute"),
                }
                true
            }
            ReplInput::Type(pane, text) => handle.send(Command::SetString(pane, text)),
            ReplInput::DrillIn(pane) => handle.send(Command::DrillIn(pane)),
            ReplInput::DrillOut(pane) => handle.send(Command::DrillOut(pane)),
            ReplInput::Move(pane, delta) => handle.send(Command::MoveCursor(pane, delta)),
            ReplInput::Toggle(pane, idx) => handle.send(Command::ToggleSecondary(pane, idx)),
            ReplInput::Refresh => handle.send(Command::RefreshCatalog),
            ReplInput::Reset => handle.send(Command::Reset(Pane::First)),
        };
        if !sent {
            break;
        }
    }

    handle.shutdown();
    drop(handle);
    let _engine = task.await?;
    if printer.join().is_err() {
        tracing::warn!("event printer panicked");
    }
    saver.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn repl_lines_route_to_panes() {
        assert_eq!(parse_repl_line("fire\n"), ReplInput::Type(Pane::First, "fire".into()));
        assert_eq!(parse_repl_line(">op"), ReplInput::Type(Pane::Second, "op".into()));
        assert_eq!(parse_repl_line(">>doc"), ReplInput::Type(Pane::Third, "doc".into()));
        assert_eq!(parse_repl_line(">:in"), ReplInput::DrillIn(Pane::Second));
        assert_eq!(parse_repl_line(":mark 2"), ReplInput::Toggle(Pane::First, 2));
        assert_eq!(parse_repl_line("!"), ReplInput::Commit);
        assert_eq!(parse_repl_line(":q"), ReplInput::Quit);
    }

    #[test]
    fn line_reader_forwards_until_eof() {
        let mut lines = spawn_line_reader(std::io::Cursor::new("fir\n>open\n!\n")).unwrap();
        assert_eq!(lines.blocking_recv().as_deref(), Some("fir"));
        assert_eq!(lines.blocking_recv().as_deref(), Some(">open"));
        assert_eq!(lines.blocking_recv().as_deref(), Some("!"));
        assert_eq!(lines.blocking_recv(), None);
    }

    /// Blocks every read until the paired sender is dropped.
    struct Stalled(std::sync::mpsc::Receiver<()>);

    impl std::io::Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[test]
    fn stalled_input_does_not_hold_runtime_shutdown() {
        let (release, stalled) = std::sync::mpsc::channel::<()>();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut lines = runtime
            .block_on(async { spawn_line_reader(std::io::BufReader::new(Stalled(stalled))) })
            .unwrap();

        let started = std::time::Instant::now();
        drop(runtime);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));

        drop(release);
        assert_eq!(lines.blocking_recv(), None);
    }
}
