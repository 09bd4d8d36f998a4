use std::{collections::HashMap, time::Duration};
use tracing::{error, info, warn};

use anyhow::anyhow;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant},
};

use crate::actors::{Actor, ActorType, ControlMessage};

pub type ActorFactory = Box<dyn Fn() -> Box<dyn Actor> + Send + Sync>;

pub struct Supervisor {
    actor_factories: HashMap<ActorType, ActorFactory>,
    pulses: HashMap<ActorType, Instant>,
    handles: HashMap<ActorType, JoinHandle<()>>,
    check_every: Duration,
    heartbeat_timeout: Duration,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            actor_factories: HashMap::new(),
            pulses: HashMap::new(),
            handles: HashMap::new(),
            check_every: Duration::from_secs(1),
            heartbeat_timeout: Duration::from_secs(3),
        }
    }

    pub fn with_timeouts(mut self, check_every: Duration, heartbeat_timeout: Duration) -> Self {
        self.check_every = check_every;
        self.heartbeat_timeout = heartbeat_timeout;
        self
    }

    pub fn register_actor(&mut self, actor_type: ActorType, factory: ActorFactory) {
        self.actor_factories.insert(actor_type, factory);
    }

    /// Runs until every actor has shut down (`Ok`) or one reports a fatal
    /// failure (`Err`). Unresponsive actors are rebuilt from their factory.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        let mut check_interval = time::interval(self.check_every);

        let (supervisor_tx, mut supervisor_rx) = mpsc::channel::<ControlMessage>(512);

        let actors: Vec<ActorType> = self.actor_factories.keys().cloned().collect();
        actors.into_iter().for_each(|actor| {
            self.spawn_actor(actor, supervisor_tx.clone());
        });

        if self.handles.is_empty() {
            return Ok(());
        }

        loop {
            tokio::select! {
                Some(msg) = supervisor_rx.recv() => {
                    match msg {
                        ControlMessage::Heartbeat(actor_type) => {
                            // Late beats from an actor that already shut down are ignored.
                            if self.handles.contains_key(&actor_type) {
                                self.pulses.insert(actor_type, Instant::now());
                            }
                        }
                        ControlMessage::Shutdown(actor_type) => {
                            warn!(actor = %actor_type, "Shutting down gracefully.");
                            self.forget(&actor_type);

                            if self.handles.is_empty() {
                                info!("All actors finished.");
                                return Ok(());
                            }
                        },
                        ControlMessage::Fatal(actor_type, error_msg) => {
                            error!(actor = %actor_type, "Fatal failure: {}", error_msg);
                            self.abort_all();
                            return Err(anyhow!("{} failed: {}", actor_type, error_msg));
                        },
                    }
                }

                _ = check_interval.tick() => {
                    let dead_timeout = Instant::now() - self.heartbeat_timeout;

                    let mut dead_actors = Vec::new();

                    for (key, &value) in self.pulses.iter() {
                        if value < dead_timeout {
                            warn!(actor = %key, "Unresponsive, restarting.");
                            dead_actors.push(key.clone());
                            if let Some(handle) = self.handles.get(key) {
                                handle.abort();
                            }
                        }
                    }

                    dead_actors.into_iter().for_each(|i| {
                        self.spawn_actor(i, supervisor_tx.clone());
                    });
                }
            }
        }
    }

    fn spawn_actor(&mut self, actor_type: ActorType, tx: mpsc::Sender<ControlMessage>) {
        let Some(factory) = self.actor_factories.get(&actor_type) else {
            return;
        };
        let mut new_actor = factory();
        let name = actor_type.clone();
        let new_actor_handle = tokio::spawn(async move {
            if let Err(e) = new_actor.run(tx).await {
                error!(actor = %name, "Actor crashed: {}", e);
            }
        });
        if let Some(old) = self.handles.insert(actor_type.clone(), new_actor_handle) {
            old.abort();
        }
        self.pulses.insert(actor_type, Instant::now());
    }

    fn forget(&mut self, actor_type: &ActorType) {
        self.pulses.remove(actor_type);
        self.actor_factories.remove(actor_type);
        if let Some(handle) = self.handles.remove(actor_type) {
            handle.abort();
        }
    }

    /// Aborts every running actor. `start` leaves its actors running when its
    /// future is dropped, so callers that race it against a shutdown signal
    /// must call this afterwards.
    pub fn abort_all(&mut self) {
        self.pulses.clear();
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.abort_all();
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;

    #[derive(Clone, Copy)]
    enum Script {
        Hang,
        Finish,
        Fail,
    }

    struct ScriptedActor {
        symbol: &'static str,
        script: Script,
    }

    #[async_trait]
    impl Actor for ScriptedActor {
        fn name(&self) -> ActorType {
            ActorType::MarketGateway(self.symbol.to_string())
        }

        async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
            match self.script {
                Script::Hang => std::future::pending().await,
                Script::Finish => {
                    supervisor_tx.send(ControlMessage::Shutdown(self.name())).await?;
                    Ok(())
                }
                Script::Fail => {
                    supervisor_tx
                        .send(ControlMessage::Fatal(self.name(), "boom".to_string()))
                        .await?;
                    anyhow::bail!("boom")
                }
            }
        }
    }

    fn register(
        supervisor: &mut Supervisor,
        symbol: &'static str,
        script: Script,
        spawns: Arc<AtomicUsize>,
    ) {
        supervisor.register_actor(
            ActorType::MarketGateway(symbol.to_string()),
            Box::new(move || {
                spawns.fetch_add(1, Ordering::SeqCst);
                Box::new(ScriptedActor { symbol, script })
            }),
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restarts_actor_without_heartbeat() {
        let spawns = Arc::new(AtomicUsize::new(0));
        let mut supervisor = Supervisor::new();
        register(&mut supervisor, "btcusdt", Script::Hang, spawns.clone());

        let run = time::timeout(Duration::from_secs(10), supervisor.start()).await;

        assert!(run.is_err(), "supervisor should still be running");
        assert!(spawns.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_once_every_actor_shut_down() {
        let spawns = Arc::new(AtomicUsize::new(0));
        let mut supervisor = Supervisor::new();
        register(&mut supervisor, "btcusdt", Script::Finish, spawns.clone());
        register(&mut supervisor, "ethusdt", Script::Finish, spawns.clone());

        supervisor.start().await.unwrap();
        assert_eq!(spawns.load(Ordering::SeqCst), 2);
    }

    struct Alive(Arc<AtomicUsize>);

    impl Drop for Alive {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct Lingering {
        live: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Actor for Lingering {
        fn name(&self) -> ActorType {
            ActorType::MarketGateway("btcusdt".to_string())
        }

        async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
            self.live.fetch_add(1, Ordering::SeqCst);
            let _alive = Alive(self.live.clone());
            let _heartbeat = self.spawn_heartbeat(supervisor_tx);
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn abort_all_stops_actors_left_by_a_cancelled_start() {
        let live = Arc::new(AtomicUsize::new(0));
        let mut supervisor = Supervisor::new();
        let factory_live = live.clone();
        supervisor.register_actor(
            ActorType::MarketGateway("btcusdt".to_string()),
            Box::new(move || {
                Box::new(Lingering {
                    live: factory_live.clone(),
                })
            }),
        );

        let run = time::timeout(Duration::from_secs(2), supervisor.start()).await;
        assert!(run.is_err());
        assert_eq!(live.load(Ordering::SeqCst), 1);

        supervisor.abort_all();
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn beating_actor_is_never_restarted() {
        let live = Arc::new(AtomicUsize::new(0));
        let spawns = Arc::new(AtomicUsize::new(0));
        let mut supervisor = Supervisor::new();
        let (factory_live, factory_spawns) = (live.clone(), spawns.clone());
        supervisor.register_actor(
            ActorType::MarketGateway("btcusdt".to_string()),
            Box::new(move || {
                factory_spawns.fetch_add(1, Ordering::SeqCst);
                Box::new(Lingering {
                    live: factory_live.clone(),
                })
            }),
        );

        let run = time::timeout(Duration::from_secs(10), supervisor.start()).await;

        assert!(run.is_err());
        assert_eq!(spawns.load(Ordering::SeqCst), 1);
        assert_eq!(live.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_report_stops_everything() {
        let spawns = Arc::new(AtomicUsize::new(0));
        let mut supervisor = Supervisor::new();
        register(&mut supervisor, "btcusdt", Script::Hang, spawns.clone());
        register(&mut supervisor, "ethusdt", Script::Fail, spawns.clone());

        let err = supervisor.start().await.unwrap_err();
        assert!(err.to_string().contains("MarketGateway(ethusdt)"));
        assert!(err.to_string().contains("boom"));
    }
}
