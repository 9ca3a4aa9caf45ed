pub mod aggregate;
pub mod cache;
pub mod classify;
pub mod combine;
pub mod config;
pub mod error;
pub mod identity;
pub mod log_store;
pub mod parser;
pub mod report;
pub mod segment;
pub mod session;
pub mod stats;
pub mod store;

use anyhow::{bail, Context};
use clap::Parser;
use combine::CombineView;
use segment::Segment;
use session::LogSession;
use std::path::{Path, PathBuf};
use store::{KvStore, MemoryStore, SqliteStore};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Debug, Parser)]
#[command(name = "combat-ledger", version, about = "Per-ability damage breakdown for combat logs")]
pub struct Cli {
    /// Decompressed combat log.
    #[arg(long)]
    pub log: PathBuf,

    /// Unit table JSON. May be omitted once the table is in the cache store.
    #[arg(long)]
    pub units: Option<PathBuf>,

    /// Encounter file JSON: `{ "name": [[start, end], ...] }`.
    #[arg(long)]
    pub encounters: Option<PathBuf>,

    /// Encounter to report; requires --encounters.
    #[arg(long, requires = "encounters")]
    pub encounter: Option<String>,

    /// Explicit line range `START:END`; repeatable.
    #[arg(long = "segment", value_parser = parse_segment, conflicts_with = "encounter")]
    pub segments: Vec<Segment>,

    /// Player id or name.
    #[arg(long, required_unless_present = "unit_totals")]
    pub player: Option<String>,

    /// Only count targets whose id contains this text.
    #[arg(long)]
    pub target: Option<String>,

    /// Merge pet abilities into the owner's.
    #[arg(long)]
    pub by_player: bool,

    /// Print damage per unit instead of a player breakdown.
    #[arg(long)]
    pub unit_totals: bool,

    /// Directory holding config.toml.
    #[arg(long, default_value = ".")]
    pub config_dir: PathBuf,
}

fn parse_segment(raw: &str) -> Result<Segment, String> {
    let (start, end) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected START:END, got '{}'", raw))?;
    let start = start.trim().parse().map_err(|e| format!("bad start '{}': {}", start, e))?;
    let end   = end.trim().parse().map_err(|e| format!("bad end '{}': {}", end, e))?;
    Ok(Segment::new(start, end))
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config_dir)?;

    // Dropping the guard flushes the file writer
    let _guard = init_logging(&cfg.log_dir);
    install_panic_hook();

    tracing::info!("combat-ledger {} starting", env!("CARGO_PKG_VERSION"));

    let store: Box<dyn KvStore> = if cfg.cache_db_path.as_os_str().is_empty() {
        Box::new(MemoryStore::new())
    } else {
        Box::new(SqliteStore::open(&cfg.cache_db_path).context("opening cache store")?)
    };

    let session = LogSession::open(&cli.log, cli.units.as_deref(), store.as_ref(), &cfg)
        .with_context(|| format!("loading {}", cli.log.display()))?;
    let segments = select_segments(&cli, &session)?;

    let stdout = std::io::stdout();
    if cli.unit_totals {
        let totals = session.unit_damage_all(&segments, cli.by_player);
        let rows = report::unit_rows(&totals, session.identity());
        serde_json::to_writer_pretty(stdout.lock(), &rows)?;
    } else {
        let Some(player) = cli.player.as_deref() else {
            bail!("--player is required");
        };
        let view = if cli.by_player { CombineView::ByPlayer } else { CombineView::ByPet };
        let report = report::BreakdownReport::build(&session, &segments, player, cli.target.as_deref(), view)?;
        serde_json::to_writer_pretty(stdout.lock(), &report)?;
    }
    println!();

    tracing::info!("Done: {} cached computations", session.cache_misses());
    Ok(())
}

/// Explicit segments win; then the named encounter; then the whole log.
fn select_segments(cli: &Cli, session: &LogSession) -> anyhow::Result<Vec<Segment>> {
    if !cli.segments.is_empty() {
        return Ok(cli.segments.clone());
    }
    if let (Some(path), Some(name)) = (&cli.encounters, &cli.encounter) {
        let mut encounters = log_store::load_encounters(path)
            .with_context(|| format!("reading {}", path.display()))?;
        return match encounters.remove(name) {
            Some(attempts) => Ok(attempts),
            None => bail!("encounter '{}' not found in {}", name, path.display()),
        };
    }
    Ok(vec![Segment::new(0, session.line_count())])
}

// ---------------------------------------------------------------------------
// Logging: rolling file when a log directory is configured, stderr otherwise.
// RUST_LOG overrides the default level.
// ---------------------------------------------------------------------------

fn init_logging(log_dir: &Path) -> Option<WorkerGuard> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("combat_ledger=info"))
    };

    if log_dir.as_os_str().is_empty() {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
        return None;
    }

    let _ = std::fs::create_dir_all(log_dir);
    let file_appender = tracing_appender::rolling::daily(log_dir, "combat-ledger.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    tracing::info!("Logging to {}", log_dir.display());
    Some(guard)
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());
        let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        tracing::error!("PANIC at {}: {}", location, message);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_segments() {
        assert_eq!(parse_segment("10:20").unwrap(), Segment::new(10, 20));
        assert!(parse_segment("10-20").is_err());
        assert!(parse_segment("a:20").is_err());
    }

    #[test]
    fn cli_accepts_repeated_segments() {
        let cli = Cli::try_parse_from([
            "combat-ledger", "--log", "raid.txt", "--player", "Stonebraid",
            "--segment", "0:10", "--segment", "20:30", "--by-player",
        ])
        .unwrap();
        assert_eq!(cli.segments, vec![Segment::new(0, 10), Segment::new(20, 30)]);
        assert!(cli.by_player);
        assert!(cli.units.is_none());
    }

    #[test]
    fn cli_requires_player_unless_unit_totals() {
        assert!(Cli::try_parse_from(["combat-ledger", "--log", "raid.txt"]).is_err());
        assert!(Cli::try_parse_from(["combat-ledger", "--log", "raid.txt", "--unit-totals"]).is_ok());
        assert!(Cli::try_parse_from(["combat-ledger", "--log", "x", "--player", "p", "--encounter", "Boss"]).is_err());
    }
}
