use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

use common::models::{Candle, TradeSignal, WalletUpdate};
use market_data::{CandleSink, SinkClosed};
use storage::{CandleStore, StorageError};
use strategy::{Evaluation, IndicatorSnapshot, StrategyService};

use crate::services::paper_trading::{PaperTradingEngine, TradeError};
use crate::services::publisher::{EventPublisher, PublishError};

/// Queued candles per symbol before the worker starts warning.
const BACKLOG_WARN: usize = 100;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("[Persist] {0}")]
    Persist(#[source] StorageError),

    #[error("[Trade] {0}")]
    Trade(#[from] TradeError),
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Persist(_) => "persist",
            Self::Trade(_) => "trade",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    InsufficientHistory,
    Hold(IndicatorSnapshot),
    /// `wallet` is `None` when the engine declined to trade.
    Signalled {
        signal: TradeSignal,
        wallet: Option<WalletUpdate>,
    },
}

/// The per-candle reaction, shared by every symbol worker.
struct Reactor {
    candles: Arc<dyn CandleStore>,
    strategy: StrategyService,
    engine: Arc<PaperTradingEngine>,
    publisher: Arc<dyn EventPublisher>,
    window_size: usize,
}

impl Reactor {
    /// save, publish, window, evaluate, then trade. Earlier steps are never
    /// rolled back when a later one fails.
    async fn on_candle(&self, candle: Candle) -> Result<Outcome, PipelineError> {
        let symbol = candle.symbol.as_str();

        self.candles.save(&candle).await.map_err(PipelineError::Persist)?;
        log_publish(symbol, "publish_candle", self.publisher.publish_candle(&candle));

        let window = match self.candles.window(symbol, self.window_size).await {
            Ok(window) => window,
            Err(e) => {
                warn!(symbol, stage = "window", "Skipping evaluation: {}", e);
                return Ok(Outcome::InsufficientHistory);
            }
        };

        let (snapshot, signal) = match self.strategy.evaluate(&candle, &window) {
            Evaluation::Warmup {
                available,
                required,
            } => {
                debug!(symbol, "Warming up: {}/{} candles", available, required);
                return Ok(Outcome::InsufficientHistory);
            }
            Evaluation::Decided { snapshot, signal } => (snapshot, signal),
        };

        if !signal.is_actionable() {
            return Ok(Outcome::Hold(snapshot));
        }

        info!(symbol, "SIGNAL {} at {:.2}: {}", signal.action, signal.price, signal.reason);
        log_publish(symbol, "publish_signal", self.publisher.publish_signal(&signal));

        let wallet = self.engine.apply(&signal).await?;
        if let Some(update) = &wallet {
            log_publish(symbol, "publish_wallet", self.publisher.publish_wallet(update));
        }

        Ok(Outcome::Signalled { signal, wallet })
    }
}

fn log_publish(symbol: &str, stage: &'static str, result: Result<(), PublishError>) {
    if let Err(e) = result {
        warn!(symbol, stage, "Publish failed: {}", e);
    }
}

struct Worker {
    tx: mpsc::UnboundedSender<Candle>,
    pending: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

/// Worker table and the closed flag live behind one lock, so a submit either
/// lands in a queue that shutdown will drain or is refused.
#[derive(Default)]
struct Workers {
    closed: bool,
    by_symbol: HashMap<String, Worker>,
}

/// Candle orchestrator. Each symbol gets a single worker fed by an unbounded
/// queue, so reactions for one symbol run strictly in arrival order while
/// different symbols proceed in parallel.
pub struct Pipeline {
    reactor: Arc<Reactor>,
    workers: Mutex<Workers>,
}

impl Pipeline {
    pub fn new(
        candles: Arc<dyn CandleStore>,
        strategy: StrategyService,
        engine: Arc<PaperTradingEngine>,
        publisher: Arc<dyn EventPublisher>,
        window_size: usize,
    ) -> Self {
        Self {
            reactor: Arc::new(Reactor {
                candles,
                strategy,
                engine,
                publisher,
                window_size,
            }),
            workers: Mutex::new(Workers::default()),
        }
    }

    /// Runs one reaction on the caller's task, bypassing the worker queues.
    pub async fn process(&self, candle: Candle) -> Result<Outcome, PipelineError> {
        self.reactor.on_candle(candle).await
    }

    /// Stops accepting candles and waits for every queued reaction to finish.
    pub async fn shutdown(&self) {
        let workers: Vec<(String, Worker)> = {
            let mut guard = match self.workers.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.closed = true;
            guard.by_symbol.drain().collect()
        };

        for (symbol, worker) in workers {
            drop(worker.tx);
            if let Err(e) = worker.handle.await {
                error!(symbol = %symbol, "Worker ended abnormally: {}", e);
            }
        }
        info!("Pipeline drained");
    }

    fn spawn_worker(&self, symbol: &str) -> Worker {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let handle = tokio::spawn(run_worker(
            self.reactor.clone(),
            symbol.to_string(),
            rx,
            pending.clone(),
        ));
        debug!(symbol, "Started pipeline worker");
        Worker {
            tx,
            pending,
            handle,
        }
    }
}

impl CandleSink for Pipeline {
    fn submit(&self, candle: Candle) -> Result<(), SinkClosed> {
        let Ok(mut workers) = self.workers.lock() else {
            return Err(SinkClosed);
        };
        if workers.closed {
            return Err(SinkClosed);
        }

        let worker = workers
            .by_symbol
            .entry(candle.symbol.clone())
            .or_insert_with(|| self.spawn_worker(&candle.symbol));

        worker.pending.fetch_add(1, Ordering::SeqCst);
        if worker.tx.send(candle).is_err() {
            worker.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(SinkClosed);
        }
        Ok(())
    }
}

async fn run_worker(
    reactor: Arc<Reactor>,
    symbol: String,
    mut rx: mpsc::UnboundedReceiver<Candle>,
    pending: Arc<AtomicUsize>,
) {
    while let Some(candle) = rx.recv().await {
        let backlog = pending.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        if backlog >= BACKLOG_WARN && backlog % BACKLOG_WARN == 0 {
            warn!(symbol = %symbol, stage = "queue", "{} candles waiting", backlog);
        }

        match reactor.on_candle(candle).await {
            Ok(outcome) => debug!(symbol = %symbol, "Reaction finished: {:?}", outcome),
            Err(e) => error!(symbol = %symbol, stage = e.stage(), "Reaction aborted: {}", e),
        }
    }
    debug!(symbol = %symbol, "Pipeline worker stopped");
}
