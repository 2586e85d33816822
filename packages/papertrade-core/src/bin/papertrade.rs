//! Papertrade CLI - command line interface for the paper brokerage.
//!
//! Every command prints an `ApiResponse` JSON envelope on stdout. Logs go to
//! stderr.

use anyhow::{anyhow, bail, Context};
use chrono::NaiveTime;
use clap::{Parser, Subcommand, ValueEnum};
use papertrade_core::session::{
    list_strategies, AutoTrader, ExecutionMode, MarketData, PositionSizing, QuoteFile,
    RunnerIntervals, SessionConfig, SessionRunner, SessionStore, StaticMarket,
};
use papertrade_core::{
    ApiResponse, AppConfig, LedgerStore, OrderEngine, OrderRequest, OrderSize, PaperBroker,
    PerformanceReport, ProductType, ProtectiveExit, Side, SubmitOutcome,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "papertrade")]
#[command(about = "Paper trading CLI - simulated brokerage and automated sessions")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.papertrade/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a price tick
    Price {
        symbol: String,
        price: f64,
    },
    /// Buy an instrument
    Buy(OrderArgs),
    /// Sell an instrument
    Sell(OrderArgs),
    /// Set absolute stop-loss / take-profit on a held position
    Protect {
        symbol: String,
        #[arg(long)]
        stop_loss: Option<f64>,
        #[arg(long)]
        take_profit: Option<f64>,
    },
    /// Account status
    Status,
    /// Order history, newest first
    Orders {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Add a symbol to the watchlist
    Watch { symbol: String },
    /// Remove a symbol from the watchlist
    Unwatch { symbol: String },
    /// Performance report
    Report,
    /// Export the ledger as JSON
    Export {
        /// Write to a file instead of the response
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replace the ledger with an exported document
    Import { path: PathBuf },
    /// Reset wallet, positions, orders and equity history
    Reset,
    /// List session strategies
    Strategies,
    /// Automated session commands
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(clap::Args)]
struct OrderArgs {
    symbol: String,
    /// Number of units
    #[arg(short = 'n', long, conflicts_with = "amount", required_unless_present = "amount")]
    quantity: Option<f64>,
    /// Cash amount, converted at the cached price
    #[arg(short, long)]
    amount: Option<f64>,
    #[arg(long)]
    stop_loss: Option<f64>,
    #[arg(long)]
    take_profit: Option<f64>,
    #[arg(long, value_enum)]
    product: Option<ProductArg>,
    #[arg(long)]
    tag: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProductArg {
    Delivery,
    Intraday,
}

impl From<ProductArg> for ProductType {
    fn from(arg: ProductArg) -> Self {
        match arg {
            ProductArg::Delivery => ProductType::Delivery,
            ProductArg::Intraday => ProductType::Intraday,
        }
    }
}

#[derive(Subcommand)]
enum SessionAction {
    /// Start a session
    Start {
        #[command(flatten)]
        settings: SessionArgs,
        /// Keep running the scheduler until Ctrl-C
        #[arg(long)]
        run: bool,
    },
    /// Stop the session and sell what it opened
    Stop,
    /// Session stage, log and opened positions
    Status,
    /// Drive a persisted session until Ctrl-C
    Run,
}

#[derive(clap::Args)]
struct SessionArgs {
    /// JSON session config; flags below are ignored when set
    #[arg(long)]
    file: Option<PathBuf>,
    /// Comma-separated symbols (default universe when omitted)
    #[arg(long)]
    universe: Option<String>,
    #[arg(long, default_value = "balanced")]
    strategy: String,
    #[arg(long, default_value = "10000")]
    budget: f64,
    /// Cap per instrument as a percentage of the budget
    #[arg(long)]
    percent: Option<f64>,
    /// Cap per instrument as a cash amount
    #[arg(long, conflicts_with = "percent")]
    fixed_amount: Option<f64>,
    #[arg(long, default_value = "5")]
    max_trades: usize,
    #[arg(long)]
    stop_loss_pct: Option<f64>,
    #[arg(long)]
    take_profit_pct: Option<f64>,
    /// Entry time (HH:MM or HH:MM:SS, local)
    #[arg(long, value_parser = parse_time, default_value = "09:20")]
    entry: NaiveTime,
    /// Exit time (HH:MM or HH:MM:SS, local)
    #[arg(long, value_parser = parse_time, default_value = "15:10")]
    exit: NaiveTime,
    #[arg(long, value_enum, default_value = "intraday")]
    product: ProductArg,
    /// Log the orders instead of placing them
    #[arg(long)]
    dry_run: bool,
}

fn parse_time(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|e| format!("invalid time '{}': {}", s, e))
}

impl SessionArgs {
    fn into_config(self) -> anyhow::Result<SessionConfig> {
        if let Some(path) = self.file {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            return serde_json::from_str(&contents)
                .with_context(|| format!("parsing {}", path.display()));
        }

        let defaults = SessionConfig::default();
        let sizing = match (self.fixed_amount, self.percent) {
            (Some(amount), _) => PositionSizing::FixedAmount(amount),
            (None, Some(pct)) => PositionSizing::Percent(pct),
            (None, None) => defaults.sizing,
        };

        Ok(SessionConfig {
            universe: self
                .universe
                .map(|u| u.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),
            strategy: self.strategy,
            mode: if self.dry_run {
                ExecutionMode::DryRun
            } else {
                ExecutionMode::Paper
            },
            budget: self.budget,
            sizing,
            max_trades_per_day: self.max_trades,
            stop_loss_pct: self.stop_loss_pct.or(defaults.stop_loss_pct),
            take_profit_pct: self.take_profit_pct.or(defaults.take_profit_pct),
            entry_time: self.entry,
            exit_time: self.exit,
            product: self.product.into(),
            ..defaults
        })
    }
}

/// Command output: the payload plus whether it represents success.
struct Output {
    ok: bool,
    data: Value,
    error: Option<String>,
}

impl Output {
    fn ok(data: impl Serialize) -> anyhow::Result<Self> {
        Ok(Self {
            ok: true,
            data: serde_json::to_value(data)?,
            error: None,
        })
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            print_response(ApiResponse::<Value>::err(format!("Config error: {}", e)));
            std::process::exit(1);
        }
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let response = match run(cli.command, &config).await {
        Ok(output) => ApiResponse {
            ok: output.ok,
            data: Some(output.data),
            error: output.error,
        },
        Err(e) => ApiResponse::err(format!("{:#}", e)),
    };
    let ok = response.ok;
    print_response(response);
    if !ok {
        std::process::exit(1);
    }
}

fn print_response(response: ApiResponse<Value>) {
    match serde_json::to_string_pretty(&response) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("failed to render response: {}", e),
    }
}

fn open_broker(config: &AppConfig) -> anyhow::Result<Arc<PaperBroker>> {
    let path = config.ledger_path();
    let store = LedgerStore::open(&path, config.engine.clone())
        .with_context(|| format!("opening ledger {}", path.display()))?;
    let engine = OrderEngine::default().with_fees(config.fees);
    Ok(Arc::new(PaperBroker::new(store, engine)))
}

async fn run(command: Commands, config: &AppConfig) -> anyhow::Result<Output> {
    let broker = open_broker(config)?;

    match command {
        Commands::Price { symbol, price } => {
            let exit = broker.set_price(&symbol, price)?;
            Output::ok(json!({
                "symbol": symbol.trim().to_uppercase(),
                "price": price,
                "protectiveExit": exit.as_ref().map(exit_json),
            }))
        }
        Commands::Buy(args) => submit(&broker, Side::Buy, args),
        Commands::Sell(args) => submit(&broker, Side::Sell, args),
        Commands::Protect {
            symbol,
            stop_loss,
            take_profit,
        } => {
            let exit = broker.set_protection(&symbol, stop_loss, take_profit)?;
            Output::ok(json!({
                "position": broker.position(&symbol),
                "protectiveExit": exit.as_ref().map(exit_json),
            }))
        }
        Commands::Status => Output::ok(broker.status()),
        Commands::Orders { limit } => {
            let orders: Vec<_> = broker.orders().into_iter().take(limit).collect();
            Output::ok(json!({ "orders": orders }))
        }
        Commands::Watch { symbol } => {
            let added = broker.watch(&symbol);
            Output::ok(json!({ "added": added, "watchlist": broker.watchlist() }))
        }
        Commands::Unwatch { symbol } => {
            let removed = broker.unwatch(&symbol);
            Output::ok(json!({ "removed": removed, "watchlist": broker.watchlist() }))
        }
        Commands::Report => Output::ok(broker.store().with_ledger(PerformanceReport::from_ledger)),
        Commands::Export { output } => {
            let json = broker.export_snapshot()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    Output::ok(json!({ "exported": path }))
                }
                None => Output::ok(serde_json::from_str::<Value>(&json)?),
            }
        }
        Commands::Import { path } => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            broker.import_snapshot(&json)?;
            Output::ok(broker.status())
        }
        Commands::Reset => {
            broker.reset_session()?;
            Output::ok(broker.status())
        }
        Commands::Strategies => Output::ok(json!({ "strategies": list_strategies() })),
        Commands::Session { action } => {
            let store = SessionStore::open(config.session_path());
            match config.paths.quotes_file.clone() {
                Some(path) => {
                    let trader = AutoTrader::new(broker, QuoteFile::new(path), store);
                    session(action, Arc::new(trader), config).await
                }
                None => {
                    if matches!(action, SessionAction::Start { .. } | SessionAction::Run) {
                        bail!("No quotes file configured; set paths.quotes_file in the config");
                    }
                    let trader = AutoTrader::new(broker, StaticMarket::new(), store);
                    session(action, Arc::new(trader), config).await
                }
            }
        }
    }
}

fn submit(broker: &PaperBroker, side: Side, args: OrderArgs) -> anyhow::Result<Output> {
    let size = match (args.quantity, args.amount) {
        (Some(quantity), _) => OrderSize::Quantity(quantity),
        (None, Some(amount)) => OrderSize::Amount(amount),
        (None, None) => return Err(anyhow!("either --quantity or --amount is required")),
    };

    let mut request = OrderRequest::new(&args.symbol, side, size);
    request.stop_loss = args.stop_loss;
    request.take_profit = args.take_profit;
    request.product = args.product.map(ProductType::from);
    request.tag = args.tag;

    let result = broker.submit(request);
    let error = result.as_ref().err().map(|e| e.to_string());
    let outcome = SubmitOutcome::from(result);
    Ok(Output {
        ok: outcome.success,
        data: serde_json::to_value(outcome)?,
        error,
    })
}

async fn session<M: MarketData + 'static>(
    action: SessionAction,
    trader: Arc<AutoTrader<M>>,
    config: &AppConfig,
) -> anyhow::Result<Output> {
    match action {
        SessionAction::Start { settings, run } => {
            let snapshot = trader.start_session(settings.into_config()?).await?;
            if run {
                drive(&trader, config).await?;
                return Output::ok(trader.state());
            }
            Output::ok(snapshot)
        }
        SessionAction::Stop => Output::ok(trader.stop_session()?),
        SessionAction::Status => Output::ok(trader.state()),
        SessionAction::Run => {
            drive(&trader, config).await?;
            Output::ok(trader.state())
        }
    }
}

async fn drive<M: MarketData + 'static>(
    trader: &Arc<AutoTrader<M>>,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let handle = SessionRunner::spawn(trader.clone(), RunnerIntervals::from(&config.runner));
    tracing::info!("Runner started, press Ctrl-C to stop");
    let signal = tokio::signal::ctrl_c().await;
    handle.shutdown().await;
    signal.context("waiting for Ctrl-C")
}

fn exit_json(exit: &ProtectiveExit) -> Value {
    json!({
        "symbol": exit.symbol,
        "trigger": exit.trigger,
        "triggerPrice": exit.trigger_price,
        "order": exit.result.as_ref().ok(),
        "error": exit.result.as_ref().err().map(|e| e.to_string()),
    })
}
