use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{debug, error, info};

use common::actors::ActorType;
use common::config::AppConfig;
use common::logger;
use market_data::{CandleSink, MarketGateway, ReconnectPolicy};
use storage::{CandlesRepository, WalletRepository, db};
use strategy::StrategyService;

use executor::actors::supervisor::Supervisor;
use executor::services::paper_trading::PaperTradingEngine;
use executor::services::pipeline::Pipeline;
use executor::services::publisher::BroadcastPublisher;
use executor::services::ws_server::FanoutServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    logger::setup_logger();
    debug!("System starting up...");

    let config = AppConfig::from_env()?;

    let pool = db::connect(&config.database_url).await?;
    let candles = Arc::new(CandlesRepository::new(pool.clone(), config.db_timeout));
    let wallets = Arc::new(WalletRepository::new(pool, config.db_timeout));

    let wallet = wallets
        .ensure_wallet(&config.account_id, config.seed_usdt)
        .await?;
    info!(
        "Paper account {}: usdt={:.2} coin={:.8}",
        wallet.id, wallet.usdt_balance, wallet.coin_balance
    );

    let publisher = BroadcastPublisher::new();
    let engine = Arc::new(PaperTradingEngine::new(wallets, &config.account_id));
    let pipeline = Arc::new(Pipeline::new(
        candles,
        StrategyService::new(config.strategy_period)?,
        engine,
        Arc::new(publisher.clone()),
        config.window_size,
    ));

    let fanout = FanoutServer::bind(&config.ws_bind_addr, publisher).await?;
    let fanout_handle = tokio::spawn(fanout.run());

    let policy = ReconnectPolicy::new(
        config.reconnect_base,
        config.reconnect_max,
        config.reconnect_max_failures,
    );

    let mut supervisor = Supervisor::new();
    for symbol in &config.symbols {
        let sink: Arc<dyn CandleSink> = pipeline.clone();
        let policy = policy.clone();
        let symbol_for_gateway = symbol.clone();
        let interval = config.kline_interval.clone();
        let base_url = config.ws_base_url.clone();

        supervisor.register_actor(
            ActorType::MarketGateway(symbol.clone()),
            Box::new(move || {
                Box::new(MarketGateway::new(
                    &symbol_for_gateway,
                    &interval,
                    &base_url,
                    policy.clone(),
                    sink.clone(),
                ))
            }),
        );
    }

    let result = tokio::select! {
        result = supervisor.start() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            Ok(())
        }
    };

    // Gateways first, so nothing submits while the pipeline drains.
    supervisor.abort_all();
    fanout_handle.abort();
    pipeline.shutdown().await;

    if let Err(e) = &result {
        error!("Stopped: {}", e);
    }
    result
}
