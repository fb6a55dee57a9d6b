//! Tricross CLI: crossover backtests and live cross monitoring.
//!
//! Commands:
//! - `backtest`: fetch candles, replay a cross policy, print a summary, export rows
//! - `monitor`: poll symbols and report how close each is to a confirmed cross
//!
//! Flags override values from `--config <file.toml>`; anything unset falls back
//! to the file, then to the built-in defaults.

mod logging;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use tricross_core::engine::ExecutionTiming;
use tricross_core::format::{fmt2, fmt2_opt};
use tricross_core::position_management::SideFilter;
use tricross_core::signals::{CrossDetector, LiveMonitor};
use tricross_core::ENGINE_VERSION;
use tricross_runner::export::save_json;
use tricross_runner::{
    monitor_symbols, normalize_symbol, run_backtest, short_id, source_for, CsvFileSink,
    Exchange, ExportTable, MarketKind, MonitorBook, PolicyKind, RowMode, RowSink, RunConfig,
    RunReport, SizingMode, TakeProfitMode,
};

#[derive(Parser)]
#[command(
    name = "tricross",
    version,
    about = "Tricross: EMA/SMA crossover backtester and cross monitor"
)]
struct Cli {
    /// Debug-level logging (RUST_LOG still wins).
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[allow(clippy::large_enum_variant)]
enum Commands {
    /// Replay a crossover policy over recent candles.
    Backtest(BacktestArgs),
    /// Report cross proximity for a set of symbols, once or on an interval.
    Monitor(MonitorArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum ExecArg {
    /// Fill at the next candle's open.
    NextBar,
    /// Fill at the signal candle's close.
    Close,
}

#[derive(Clone, Copy, ValueEnum)]
enum SideArg {
    Both,
    Long,
    Short,
}

#[derive(Clone, Copy, ValueEnum)]
enum TpModeArg {
    Price,
    Equity,
}

#[derive(Clone, Copy, ValueEnum)]
enum SizingArg {
    Compounding,
    FixedEquity,
    FixedUnits,
}

/// Market selection shared by both commands.
#[derive(Args)]
struct MarketArgs {
    /// binance, bybit, csv or synthetic.
    #[arg(long)]
    exchange: Option<Exchange>,

    /// spot or perp.
    #[arg(long)]
    market: Option<MarketKind>,

    /// Candle interval, e.g. 1m, 5m, 1h.
    #[arg(long)]
    timeframe: Option<String>,

    /// Number of most recent candles.
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Args)]
struct BacktestArgs {
    /// TOML run configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    market: MarketArgs,

    /// Symbol; `ETH` is read as `ETHUSDT`.
    #[arg(long)]
    symbol: Option<String>,

    /// Read candles from a CSV file instead of an exchange.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// single_cross, dual_cross, second_evidence or live_proximity.
    #[arg(long)]
    policy: Option<PolicyKind>,

    /// Dual-cross window in bars (0 = both pairs on the same bar).
    #[arg(long = "open_window")]
    open_window: Option<usize>,

    /// Starting capital.
    #[arg(long)]
    cap: Option<f64>,

    /// Position fraction, percent of equity.
    #[arg(long)]
    alloc: Option<f64>,

    /// Leverage multiplier.
    #[arg(long)]
    lev: Option<f64>,

    /// Round-trip fee in basis points, charged once per trade.
    #[arg(long)]
    fee: Option<f64>,

    /// Adverse slippage per fill, in basis points.
    #[arg(long)]
    slip: Option<f64>,

    /// When fills happen.
    #[arg(long, value_enum)]
    exec: Option<ExecArg>,

    /// Which directions may open.
    #[arg(long, value_enum)]
    side: Option<SideArg>,

    /// Sizing mode.
    #[arg(long, value_enum)]
    sizing: Option<SizingArg>,

    /// Units per trade; implies `--sizing fixed-units`.
    #[arg(long)]
    qty: Option<f64>,

    /// Candles required before simulating.
    #[arg(long = "min_bars")]
    min_bars: Option<usize>,

    /// Let equity go negative instead of flooring at zero.
    #[arg(long = "allow_liquidation", default_value_t = false)]
    allow_liquidation: bool,

    /// Stop-loss percent from entry (0 disables).
    #[arg(long)]
    sl: Option<f64>,

    /// Take-profit percent (0 disables).
    #[arg(long)]
    tp: Option<f64>,

    /// Whether `--tp` measures price or leveraged equity.
    #[arg(long = "tp_mode", value_enum)]
    tp_mode: Option<TpModeArg>,

    /// Arm the trailing stop after this favourable move, percent.
    #[arg(long = "trail_arm")]
    trail_arm: Option<f64>,

    /// Arm the trailing stop when price reaches this level.
    #[arg(long = "trail_arm_px")]
    trail_arm_px: Option<f64>,

    /// Trailing stop distance from the best price, percent (0 disables).
    #[arg(long = "trail_step")]
    trail_step: Option<f64>,

    /// CSV export path.
    #[arg(long)]
    outfile: Option<PathBuf>,

    /// Export one row per trade or per bar.
    #[arg(long)]
    rows: Option<RowMode>,

    /// Full JSON report path.
    #[arg(long)]
    json: Option<PathBuf>,
}

#[derive(Args)]
struct MonitorArgs {
    /// TOML run configuration; `[monitor]` and `[strategy]` periods are used.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated symbols.
    #[arg(long, value_delimiter = ',', required = true)]
    symbols: Vec<String>,

    #[command(flatten)]
    market: MarketArgs,

    /// Distance in bps at or below which a symbol is `watch`.
    #[arg(long = "watch_bps")]
    watch_bps: Option<f64>,

    /// Distance in bps at or below which a symbol is `imminent`.
    #[arg(long = "imminent_bps")]
    imminent_bps: Option<f64>,

    /// Candles needed before a state other than `error`.
    #[arg(long = "min_bars")]
    min_bars: Option<usize>,

    /// Where states persist between passes and invocations.
    #[arg(long = "state_file")]
    state_file: Option<PathBuf>,

    /// Passes to run; 0 runs until interrupted.
    #[arg(long, default_value_t = 1)]
    iterations: u64,

    /// Seconds between passes.
    #[arg(long = "interval_secs", default_value_t = 60)]
    interval_secs: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Backtest(args) => run_backtest_cmd(args),
        Commands::Monitor(args) => run_monitor_cmd(args),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<RunConfig> {
    match path {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(RunConfig::default()),
    }
}

fn apply_market(args: &MarketArgs, config: &mut RunConfig) {
    let market = &mut config.market;
    if let Some(exchange) = args.exchange {
        market.exchange = exchange;
    }
    if let Some(kind) = args.market {
        market.market = kind;
    }
    if let Some(tf) = &args.timeframe {
        market.timeframe = tf.clone();
    }
    if let Some(limit) = args.limit {
        market.limit = limit;
    }
}

/// Fold command-line flags over a file configuration.
fn apply_backtest_flags(args: &BacktestArgs, config: &mut RunConfig) {
    apply_market(&args.market, config);
    if let Some(symbol) = &args.symbol {
        config.market.symbol = symbol.clone();
    }
    if let Some(path) = &args.csv {
        config.market.exchange = Exchange::Csv;
        config.market.csv_path = Some(path.clone());
    }

    if let Some(policy) = args.policy {
        config.strategy.policy = policy;
    }
    if let Some(window) = args.open_window {
        config.strategy.open_window = window;
    }

    let bt = &mut config.backtest;
    let numeric = [
        (args.cap, &mut bt.cap),
        (args.alloc, &mut bt.alloc_pct),
        (args.lev, &mut bt.leverage),
        (args.fee, &mut bt.fee_bps),
        (args.slip, &mut bt.slippage_bps),
    ];
    for (flag, slot) in numeric {
        if let Some(value) = flag {
            *slot = value;
        }
    }
    if let Some(exec) = args.exec {
        bt.execution = match exec {
            ExecArg::NextBar => ExecutionTiming::NextBar,
            ExecArg::Close => ExecutionTiming::Close,
        };
    }
    if let Some(side) = args.side {
        bt.side = match side {
            SideArg::Both => SideFilter::Both,
            SideArg::Long => SideFilter::LongOnly,
            SideArg::Short => SideFilter::ShortOnly,
        };
    }
    if let Some(sizing) = args.sizing {
        bt.sizing = match sizing {
            SizingArg::Compounding => SizingMode::Compounding,
            SizingArg::FixedEquity => SizingMode::FixedEquity,
            SizingArg::FixedUnits => SizingMode::FixedUnits,
        };
    }
    if let Some(qty) = args.qty {
        bt.qty = qty;
        bt.sizing = SizingMode::FixedUnits;
    }
    if let Some(min_bars) = args.min_bars {
        bt.min_bars = min_bars;
    }
    if args.allow_liquidation {
        bt.allow_liquidation = true;
    }

    let risk = &mut config.risk;
    let risk_flags = [
        (args.sl, &mut risk.sl_pct),
        (args.tp, &mut risk.tp_pct),
        (args.trail_arm, &mut risk.trail_arm_pct),
        (args.trail_arm_px, &mut risk.trail_arm_px),
        (args.trail_step, &mut risk.trail_step_pct),
    ];
    for (flag, slot) in risk_flags {
        if let Some(value) = flag {
            *slot = value;
        }
    }
    if let Some(mode) = args.tp_mode {
        risk.tp_mode = match mode {
            TpModeArg::Price => TakeProfitMode::Price,
            TpModeArg::Equity => TakeProfitMode::Equity,
        };
    }

    if let Some(outfile) = &args.outfile {
        config.output.outfile = Some(outfile.clone());
    }
    if let Some(rows) = args.rows {
        config.output.rows = rows;
    }
    if let Some(json) = &args.json {
        config.output.json = Some(json.clone());
    }
}

fn run_backtest_cmd(args: BacktestArgs) -> Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    apply_backtest_flags(&args, &mut config);
    config
        .backtest_config()
        .validate()
        .context("invalid backtest settings")?;

    let report = run_backtest(&config).context("backtest failed")?;
    print_summary(&report);

    if let Some(path) = &config.output.outfile {
        let table = ExportTable::from_report(&report, config.output.rows)?;
        CsvFileSink::new(path).write_rows(&table)?;
        println!("Rows written to: {}", path.display());
    }
    if let Some(path) = &config.output.json {
        save_json(&report, path)?;
        println!("Report written to: {}", path.display());
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    let result = &report.result;
    let stats = &result.stats;

    println!();
    println!(
        "tricross v{ENGINE_VERSION}  {}  {}/{} {}  run {}",
        report.symbol,
        report.exchange,
        report.market,
        report.timeframe,
        short_id(&report.run_id)
    );
    println!(
        "candles {} (warmup {}, {} duplicates dropped)  policy {}",
        result.candles.len(),
        report.warmup_bars(),
        result.duplicates_dropped,
        report.config.policy.name()
    );
    if let Some(note) = &result.skipped {
        println!("skipped: {note}");
        return;
    }
    println!("{}", "-".repeat(64));
    println!(
        "trades {:<6} long {:<5} short {:<5} wins {:<5} losses {:<5} win rate {}%",
        stats.trade_count,
        stats.long_count,
        stats.short_count,
        stats.win_count,
        stats.loss_count,
        fmt2(stats.win_rate_pct)
    );
    println!(
        "total pnl {}  avg pnl {}  fees {}  profit factor {}",
        fmt2(stats.total_pnl),
        fmt2(stats.avg_trade_pnl),
        fmt2(stats.total_fees),
        match stats.profit_factor {
            Some(pf) => fmt2(pf),
            None => "-".into(),
        }
    );
    println!(
        "equity {} -> {}  return {}%  max drawdown {} ({}%)  avg bars held {}",
        fmt2(stats.start_equity),
        fmt2(stats.final_equity),
        fmt2(stats.total_return_pct),
        fmt2(stats.max_drawdown),
        fmt2(stats.max_drawdown_pct),
        fmt2(stats.avg_bars_held)
    );
    if let Some(open) = &result.open_position {
        println!(
            "open {} from #{} @ {}  stop {}  target {}{}",
            open.side.label(),
            open.entry_index,
            fmt2(open.entry_price),
            fmt2_opt(open.effective_stop()),
            fmt2_opt(open.take_profit_price),
            if open.pending_opposite {
                "  (reversal pending)"
            } else {
                ""
            }
        );
    }
}

fn run_monitor_cmd(args: MonitorArgs) -> Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    apply_market(&args.market, &mut config);
    if args.market.limit.is_none() && args.config.is_none() {
        config.market.limit = 120;
    }
    if let Some(v) = args.watch_bps {
        config.monitor.watch_bps = v;
    }
    if let Some(v) = args.imminent_bps {
        config.monitor.imminent_bps = v;
    }
    if let Some(v) = args.min_bars {
        config.monitor.min_bars = v;
    }
    if config.market.exchange == Exchange::Csv {
        bail!("monitor needs a live source: binance, bybit or synthetic");
    }

    let monitor = LiveMonitor::new(config.monitor.clone(), config.periods())
        .context("invalid monitor settings")?;
    if config.market.limit < monitor.required_bars() {
        tracing::warn!(
            limit = config.market.limit,
            required = monitor.required_bars(),
            "limit is below the bars the monitor needs; every symbol will report error"
        );
    }
    let source = source_for(&config.market)?;
    let symbols: Vec<String> = args.symbols.iter().map(|s| normalize_symbol(s)).collect();

    let mut book = match &args.state_file {
        Some(path) => MonitorBook::load(path)?,
        None => MonitorBook::new(),
    };

    let mut pass = 0u64;
    loop {
        let updates = monitor_symbols(
            source.as_ref(),
            &monitor,
            &book,
            &symbols,
            &config.market.timeframe,
            config.market.limit,
        );
        for update in &updates {
            println!(
                "{:<12} {:>9} bps  {}",
                update.symbol,
                fmt2_opt(update.state.distance_bps),
                update.state
            );
        }
        book.apply(updates);
        if let Some(path) = &args.state_file {
            book.save(path)?;
        }

        pass += 1;
        if args.iterations != 0 && pass >= args.iterations {
            break;
        }
        std::thread::sleep(Duration::from_secs(args.interval_secs));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn backtest_args(argv: &[&str]) -> BacktestArgs {
        let mut full = vec!["tricross", "backtest"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Backtest(args) => args,
            Commands::Monitor(_) => panic!("expected backtest"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_defaults() {
        let args = backtest_args(&[
            "--cap", "250", "--alloc", "50", "--sl", "0.5", "--trail_step", "0.3",
            "--open_window", "2", "--exchange", "bybit", "--market", "perp", "--symbol", "eth",
            "--exec", "close", "--qty", "3",
        ]);
        let mut config = RunConfig::default();
        apply_backtest_flags(&args, &mut config);

        assert_eq!(config.backtest.cap, 250.0);
        assert_eq!(config.backtest.alloc_pct, 50.0);
        assert_eq!(config.risk.sl_pct, 0.5);
        assert_eq!(config.risk.trail_step_pct, 0.3);
        assert_eq!(config.strategy.open_window, 2);
        assert_eq!(config.market.exchange, Exchange::Bybit);
        assert_eq!(config.market.market, MarketKind::Perp);
        assert_eq!(config.backtest.execution, ExecutionTiming::Close);
        assert_eq!(config.backtest.sizing, SizingMode::FixedUnits);

        let engine = config.backtest_config();
        assert_eq!(engine.position_fraction, 0.5);
        assert!(engine.validate().is_ok());
    }

    #[test]
    fn unset_flags_keep_file_values() {
        let args = backtest_args(&[]);
        let mut config = RunConfig::default();
        config.backtest.leverage = 3.0;
        config.risk.tp_pct = 4.0;
        apply_backtest_flags(&args, &mut config);
        assert_eq!(config.backtest.leverage, 3.0);
        assert_eq!(config.risk.tp_pct, 4.0);
    }

    #[test]
    fn csv_flag_switches_exchange() {
        let args = backtest_args(&["--csv", "data/eth.csv", "--rows", "bars"]);
        let mut config = RunConfig::default();
        apply_backtest_flags(&args, &mut config);
        assert_eq!(config.market.exchange, Exchange::Csv);
        assert_eq!(config.market.csv_path, Some(PathBuf::from("data/eth.csv")));
        assert_eq!(config.output.rows, RowMode::Bars);
    }

    #[test]
    fn monitor_symbols_split_on_commas() {
        let cli = Cli::try_parse_from([
            "tricross", "monitor", "--symbols", "eth,btc,sol", "--watch_bps", "10",
        ])
        .unwrap();
        match cli.command {
            Commands::Monitor(args) => {
                assert_eq!(args.symbols, vec!["eth", "btc", "sol"]);
                assert_eq!(args.watch_bps, Some(10.0));
                assert_eq!(args.iterations, 1);
            }
            Commands::Backtest(_) => panic!("expected monitor"),
        }
    }
}
