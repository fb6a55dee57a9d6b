//! Export: row tables (CSV) and full reports (JSON).
//!
//! Row tables come in two shapes, one row per closed trade or one row per
//! candle. Both start with a metadata line naming the engine version, run id,
//! dataset hash and the resolved configuration, and both end with the
//! `open_crossDist_bars` column. Every float is written through `fmt2`, so it
//! is truncated (never rounded) to two decimals.
//!
//! JSON reports carry a `schema_version` and are truncated the same way.
//! Unknown versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use tricross_core::domain::{format_time, Side};
use tricross_core::format::{fmt2, truncate_json};

use crate::config::RowMode;
use crate::runner::{RunReport, SCHEMA_VERSION};

/// Name of the trailing column in every table.
pub const CROSS_DIST_COLUMN: &str = "open_crossDist_bars";

// ─── Row tables ─────────────────────────────────────────────────────

/// A rendered export: one metadata line, a header and string cells.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTable {
    pub meta: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExportTable {
    pub fn from_report(report: &RunReport, mode: RowMode) -> Result<Self> {
        let meta = meta_line(report)?;
        let (header, rows) = match mode {
            RowMode::Trades => trade_rows(report),
            RowMode::Bars => bar_rows(report),
        };
        Ok(Self {
            meta,
            header: header.iter().map(|h| h.to_string()).collect(),
            rows,
        })
    }

    /// The metadata line followed by RFC 4180 CSV.
    pub fn to_csv(&self) -> Result<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        wtr.write_record(&self.header)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        let data = wtr.into_inner().context("failed to flush CSV writer")?;
        let body = String::from_utf8(data).context("CSV output is not valid UTF-8")?;
        Ok(format!("{}\n{body}", self.meta))
    }
}

/// `# tricross v<version> run_id=<id> dataset=<hash> config=<json>`
pub fn meta_line(report: &RunReport) -> Result<String> {
    let config = serde_json::to_string(&report.config).context("failed to serialize config")?;
    Ok(format!(
        "# tricross v{} run_id={} dataset={} config={config}",
        report.fingerprint.engine_version, report.run_id, report.fingerprint.dataset_hash
    ))
}

const TRADE_COLUMNS: &[&str] = &[
    "side",
    "entry_index",
    "entry_time",
    "entry_price",
    "exit_index",
    "exit_time",
    "exit_price",
    "exit_reason",
    "bars_held",
    "size_equity",
    "notional",
    "gross_return_pct",
    "pnl_before_fees",
    "fees",
    "pnl_net",
    "equity_after",
    "first_pair",
    "first_index",
    "confirm_pair",
    "confirm_index",
    "last_fast_slow_cross",
    "last_fast_mid_cross",
    CROSS_DIST_COLUMN,
];

fn opt_index(index: Option<usize>) -> String {
    index.map(|i| i.to_string()).unwrap_or_default()
}

fn trade_rows(report: &RunReport) -> (&'static [&'static str], Vec<Vec<String>>) {
    let rows = report
        .result
        .trades
        .iter()
        .map(|t| {
            vec![
                t.side.label().to_string(),
                t.entry_index.to_string(),
                format_time(t.entry_time),
                fmt2(t.entry_price),
                t.exit_index.to_string(),
                format_time(t.exit_time),
                fmt2(t.exit_price),
                t.exit_reason.label().to_string(),
                t.bars_held().to_string(),
                fmt2(t.size_equity),
                fmt2(t.notional),
                fmt2(t.gross_return * 100.0),
                fmt2(t.pnl_before_fees),
                fmt2(t.fees),
                fmt2(t.pnl_net),
                fmt2(t.equity_after),
                t.signal.first_pair.label().to_string(),
                t.signal.first_index.to_string(),
                t.signal.confirm_pair.label().to_string(),
                t.signal.confirm_index.to_string(),
                opt_index(t.last_fast_slow_cross),
                opt_index(t.last_fast_mid_cross),
                t.signal.cross_dist_bars().to_string(),
            ]
        })
        .collect();
    (TRADE_COLUMNS, rows)
}

const BAR_COLUMNS: &[&str] = &[
    "index",
    "time",
    "open",
    "high",
    "low",
    "close",
    "ema_fast",
    "ema_slow",
    "sma_mid",
    "cross_fast_slow",
    "cross_fast_mid",
    "position",
    "action",
    "equity",
    "pending_opposite",
    CROSS_DIST_COLUMN,
];

/// Per-bar holdings and actions reconstructed from the trades.
struct BarBook {
    position: Vec<Option<Side>>,
    actions: Vec<Vec<String>>,
    cross_dist: Vec<Option<usize>>,
}

impl BarBook {
    fn new(report: &RunReport) -> Self {
        let n = report.result.candles.len();
        let mut book = Self {
            position: vec![None; n],
            actions: vec![Vec::new(); n],
            cross_dist: vec![None; n],
        };

        // Exits are listed before entries so a flip reads `exit_flip+enter_short`.
        for t in &report.result.trades {
            book.hold(t.side, t.entry_index, t.exit_index);
            if let Some(actions) = book.actions.get_mut(t.exit_index) {
                actions.push(format!("exit_{}", t.exit_reason.label()));
            }
        }
        let entries = report
            .result
            .trades
            .iter()
            .map(|t| (t.side, t.entry_index, t.signal.cross_dist_bars()))
            .chain(
                report
                    .result
                    .open_position
                    .iter()
                    .map(|p| (p.side, p.entry_index, p.signal.cross_dist_bars())),
            );
        for (side, index, dist) in entries {
            if let Some(actions) = book.actions.get_mut(index) {
                actions.push(format!("enter_{}", side.label()));
            }
            if let Some(slot) = book.cross_dist.get_mut(index) {
                *slot = Some(dist);
            }
        }
        if let Some(open) = &report.result.open_position {
            book.hold(open.side, open.entry_index, n);
        }
        book
    }

    fn hold(&mut self, side: Side, from: usize, to: usize) {
        let to = to.min(self.position.len());
        for slot in self.position.iter_mut().take(to).skip(from) {
            *slot = Some(side);
        }
    }
}

fn bar_rows(report: &RunReport) -> (&'static [&'static str], Vec<Vec<String>>) {
    let result = &report.result;
    let book = BarBook::new(report);
    let rows = result
        .candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let sample = result.samples.get(i);
            let signal = result.signals.get(i);
            let crosses = signal.map(|s| s.crosses).unwrap_or_default();
            let pending = signal.is_some_and(|s| s.pending_opposite);
            vec![
                i.to_string(),
                format_time(c.time),
                fmt2(c.open),
                fmt2(c.high),
                fmt2(c.low),
                fmt2(c.close),
                sample.map(|s| fmt2(s.ema_fast)).unwrap_or_default(),
                sample.map(|s| fmt2(s.ema_slow)).unwrap_or_default(),
                sample.map(|s| fmt2(s.sma_mid)).unwrap_or_default(),
                crosses.fast_slow.map(|d| d.label()).unwrap_or_default().to_string(),
                crosses.fast_mid.map(|d| d.label()).unwrap_or_default().to_string(),
                book.position[i].map(|s| s.label()).unwrap_or("flat").to_string(),
                book.actions[i].join("+"),
                result.equity_curve.get(i).map(|&e| fmt2(e)).unwrap_or_default(),
                pending.to_string(),
                opt_index(book.cross_dist[i]),
            ]
        })
        .collect();
    (BAR_COLUMNS, rows)
}

/// Destination for export tables.
pub trait RowSink {
    fn write_rows(&mut self, table: &ExportTable) -> Result<()>;
}

/// Writes one CSV file, creating parent directories as needed.
#[derive(Debug, Clone)]
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RowSink for CsvFileSink {
    fn write_rows(&mut self, table: &ExportTable) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let csv = table.to_csv()?;
        std::fs::write(&self.path, csv)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        tracing::info!(path = %self.path.display(), rows = table.rows.len(), "wrote CSV");
        Ok(())
    }
}

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `RunReport` to pretty JSON. Every float goes through
/// `truncate2`, the same policy as the CSV tables.
pub fn export_json(report: &RunReport) -> Result<String> {
    let mut value =
        serde_json::to_value(report).context("failed to serialize RunReport to JSON")?;
    truncate_json(&mut value);
    serde_json::to_string_pretty(&value).context("failed to render RunReport JSON")
}

/// Deserialize a `RunReport` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<RunReport> {
    let report: RunReport =
        serde_json::from_str(json).context("failed to deserialize RunReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

pub fn save_json(report: &RunReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, export_json(report)?)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn load_json(path: &Path) -> Result<RunReport> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}
