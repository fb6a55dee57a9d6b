//! Multi-symbol live monitoring.
//!
//! One pass fetches a window of recent candles per symbol and evaluates the
//! proximity state machine against the symbol's prior `SignalState`. Symbols
//! are independent, so a pass fans out with rayon. The book of states is a
//! plain value the caller persists between passes.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use tricross_core::signals::{LiveMonitor, SignalState};

use crate::data_loader::load_from;
use crate::runner::SCHEMA_VERSION;
use crate::sources::CandleSource;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Latest state per symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorBook {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Completed passes.
    #[serde(default)]
    pub passes: u64,
    #[serde(default)]
    pub states: BTreeMap<String, SignalState>,
}

impl MonitorBook {
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            ..Default::default()
        }
    }

    /// Prior state for a symbol; a fresh `idle` state if it was never seen.
    pub fn prior(&self, symbol: &str) -> SignalState {
        self.states.get(symbol).cloned().unwrap_or_default()
    }

    pub fn apply(&mut self, updates: Vec<SymbolUpdate>) {
        for update in updates {
            self.states.insert(update.symbol, update.state);
        }
        self.passes += 1;
    }

    /// Load a saved book. A missing file is an empty book.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let book: MonitorBook = serde_json::from_str(&json)
            .with_context(|| format!("failed to parse monitor state {}", path.display()))?;
        if book.schema_version > SCHEMA_VERSION {
            bail!(
                "unsupported schema version {} (max supported: {})",
                book.schema_version,
                SCHEMA_VERSION
            );
        }
        Ok(book)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("failed to serialize monitor state")?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
    }
}

/// One symbol's new state after a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolUpdate {
    pub symbol: String,
    pub state: SignalState,
}

/// Evaluate every symbol once, in parallel. A fetch failure becomes an
/// `error` state for that symbol only.
pub fn monitor_symbols(
    source: &dyn CandleSource,
    monitor: &LiveMonitor,
    book: &MonitorBook,
    symbols: &[String],
    timeframe: &str,
    limit: usize,
) -> Vec<SymbolUpdate> {
    symbols
        .par_iter()
        .map(|symbol| {
            let prior = book.prior(symbol);
            let state = match load_from(source, symbol, timeframe, limit) {
                Ok(loaded) => monitor.evaluate(&prior, &loaded.candles),
                Err(e) => {
                    tracing::warn!(%symbol, error = %e, "monitor fetch failed");
                    SignalState::error(&prior, 0, format!("fetch failed: {e}"))
                }
            };
            tracing::debug!(%symbol, state = state.state.label(), "evaluated");
            SymbolUpdate {
                symbol: symbol.clone(),
                state,
            }
        })
        .collect()
}
