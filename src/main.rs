use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use forexbot::api::{self, AppState};
use forexbot::chaos::{ChaosConfig, ChaosEngine, CycleReason};
use forexbot::liquidity::{LiquidityConfig, TickConfig, TickEngine};
use forexbot::oanda::OandaClient;
use forexbot::{Broker, PaperBroker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BrokerMode {
    Paper,
    Oanda,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OandaEnv {
    Practice,
    Live,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Venue both engines run against
    #[arg(long, env = "BROKER_MODE", value_enum, default_value = "paper")]
    broker_mode: BrokerMode,

    /// OANDA personal access token
    #[arg(long, env = "OANDA_API_KEY", default_value = "")]
    oanda_api_key: String,

    /// OANDA account ID
    #[arg(long, env = "OANDA_ACCOUNT_ID", default_value = "")]
    oanda_account_id: String,

    /// OANDA environment
    #[arg(long, env = "OANDA_ENV", value_enum, default_value = "practice")]
    oanda_env: OandaEnv,

    /// Port to run the web server on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    port: u16,

    /// Seconds between background ChaosEngine-FX cycles
    #[arg(long, env = "LOOP_INTERVAL_SECONDS", default_value = "60")]
    loop_interval_seconds: u64,

    /// Equity fraction risked per ChaosEngine-FX trade
    #[arg(long, env = "RISK_PER_TRADE", default_value = "0.01")]
    risk_per_trade: f64,

    /// Daily drawdown fraction that halts new entries
    #[arg(long, env = "MAX_DRAWDOWN_PER_DAY", default_value = "0.03")]
    max_drawdown_per_day: f64,

    /// Base cap on open trades
    #[arg(long, env = "MAX_OPEN_TRADES", default_value = "2")]
    max_open_trades: usize,

    /// ChaosEngine-FX instruments (comma-separated, OANDA spelling)
    #[arg(long, env = "FOREX_PAIRS", default_value = "EUR_USD,GBP_USD,USD_JPY,XAU_USD,AUD_USD,USD_CHF")]
    forex_pairs: String,

    /// Send liquidity tick orders to the broker instead of planning only
    #[arg(long, env = "EXECUTE_ORDERS")]
    execute_orders: bool,

    /// Run ChaosEngine-FX in the background on a fixed cadence
    #[arg(long, env = "RUN_CHAOS_LOOP")]
    run_chaos_loop: bool,
}

fn build_broker(args: &Args) -> Result<Broker> {
    match args.broker_mode {
        BrokerMode::Paper => Ok(Broker::Paper(PaperBroker::default())),
        BrokerMode::Oanda => {
            let key = args.oanda_api_key.clone();
            let account = args.oanda_account_id.clone();
            let client = match args.oanda_env {
                OandaEnv::Practice => OandaClient::practice(key, account),
                OandaEnv::Live => OandaClient::live(key, account),
            }
            .context("Failed to configure OANDA client")?;
            info!("OANDA {} at {}", client.account_id(), client.base_url());
            Ok(Broker::Oanda(client))
        }
    }
}

fn chaos_config(args: &Args) -> ChaosConfig {
    let instruments: Vec<String> = args
        .forex_pairs
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let defaults = ChaosConfig::default();
    ChaosConfig {
        instruments,
        loop_interval: Duration::from_secs(args.loop_interval_seconds.max(1)),
        risk_per_trade: args.risk_per_trade,
        max_drawdown_per_day: args.max_drawdown_per_day,
        max_open_trades: args.max_open_trades,
        max_open_trades_extended: defaults.max_open_trades_extended.max(args.max_open_trades),
        ..defaults
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("forexbot=info".parse().context("Invalid log directive")?),
        )
        .init();

    let args = Args::parse();

    info!("Starting ForexBot");
    info!("Broker: {:?}", args.broker_mode);
    info!("Port: {}", args.port);
    info!("Pairs: {}", args.forex_pairs);

    let broker = Arc::new(build_broker(&args)?);
    if args.execute_orders && matches!(*broker, Broker::Oanda(_)) {
        warn!("EXECUTE_ORDERS enabled: liquidity ticks will place real orders");
    }

    let tick_config = TickConfig {
        execute_orders: args.execute_orders,
        ..TickConfig::default()
    };
    let tick = TickEngine::new(broker.clone(), LiquidityConfig::default(), tick_config);

    let chaos_config = chaos_config(&args);
    let loop_interval = chaos_config.loop_interval;
    let chaos = Arc::new(Mutex::new(ChaosEngine::new(broker.clone(), chaos_config)));

    let state = Arc::new(AppState {
        broker_name: broker.name(),
        tick: Arc::new(Mutex::new(tick)),
        chaos: chaos.clone(),
    });

    // Spawn ChaosEngine-FX loop
    if args.run_chaos_loop {
        info!("ChaosEngine-FX loop every {:?}", loop_interval);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(loop_interval);
            loop {
                interval.tick().await;
                let summary = chaos.lock().await.run_once().await;
                if summary.reason == CycleReason::AccountUnavailable {
                    error!("ChaosEngine-FX cycle ended without account data");
                }
            }
        });
    }

    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Server running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
