use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::{sync::mpsc, time};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use common::actors::{Actor, ActorType, ControlMessage};

use crate::backoff::ReconnectPolicy;
use crate::error::GatewayError;
use crate::remote::{decode_kline_message, kline_stream_url};
use crate::traits::CandleSink;

enum SessionEnd {
    SinkClosed,
}

/// Kline subscription for one symbol. Closed bars go to the sink, transport
/// failures reconnect under `policy`.
pub struct MarketGateway {
    symbol: String,
    interval: String,
    base_url: String,
    policy: ReconnectPolicy,
    sink: Arc<dyn CandleSink>,
}

#[async_trait]
impl Actor for MarketGateway {
    fn name(&self) -> ActorType {
        ActorType::MarketGateway(self.symbol.clone())
    }

    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
        let heartbeat = self.spawn_heartbeat(supervisor_tx.clone());
        let result = self.connect().await;
        drop(heartbeat);

        match result {
            Ok(()) => {
                supervisor_tx.send(ControlMessage::Shutdown(self.name())).await?;
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                supervisor_tx
                    .send(ControlMessage::Fatal(self.name(), err_msg.clone()))
                    .await?;
                bail!(err_msg);
            }
        }
    }
}

impl MarketGateway {
    pub fn new(
        symbol: &str,
        interval: &str,
        base_url: &str,
        policy: ReconnectPolicy,
        sink: Arc<dyn CandleSink>,
    ) -> Self {
        Self {
            symbol: symbol.to_lowercase(),
            interval: interval.to_string(),
            base_url: base_url.to_string(),
            policy,
            sink,
        }
    }

    /// Streams the gateway's symbol until the sink closes (`Ok`) or the
    /// reconnect circuit opens.
    pub async fn connect(&self) -> Result<(), GatewayError> {
        let symbol = self.symbol.as_str();
        let url = kline_stream_url(&self.base_url, symbol, &self.interval);
        let mut failures: u32 = 0;

        loop {
            info!(symbol, "Connecting to: {}", url);

            let err = match self.session(&url, &mut failures).await {
                Ok(SessionEnd::SinkClosed) => {
                    info!(symbol, "Candle sink closed, stopping stream");
                    return Ok(());
                }
                Err(e) => e,
            };

            failures += 1;
            if self.policy.is_exhausted(failures) {
                return Err(GatewayError::CircuitOpen {
                    failures,
                    last_error: err.to_string(),
                });
            }

            let delay = self.policy.delay_for(failures);
            warn!(
                symbol,
                stage = "transport",
                "{}. Reconnect {}/{} in {:?}",
                err,
                failures,
                self.policy.max_consecutive_failures(),
                delay
            );
            time::sleep(delay).await;
        }
    }

    async fn session(&self, url: &str, failures: &mut u32) -> Result<SessionEnd, GatewayError> {
        let symbol = self.symbol.as_str();
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut write, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            let msg = msg?;
            *failures = 0;

            match msg {
                Message::Text(text) => match decode_kline_message(text.as_str()) {
                    Ok(Some(candle)) => {
                        debug!(symbol, "Closed bar at {}", candle.event_time);
                        if self.sink.submit(candle).is_err() {
                            return Ok(SessionEnd::SinkClosed);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(symbol, stage = "decode", "Dropping message: {}", e);
                    }
                },
                Message::Ping(payload) => {
                    write.send(Message::Pong(payload)).await?;
                }
                Message::Close(frame) => {
                    debug!(symbol, "Close message received: {:?}", frame);
                    return Err(GatewayError::Disconnected);
                }
                _ => {}
            }
        }

        Err(GatewayError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use common::models::Candle;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use tokio_tungstenite::{accept_async, accept_hdr_async};

    const OPEN_BAR: &str = r#"{"stream":"btcusdt@kline_1m","data":{"e":"kline","E":1700000030000,"s":"BTCUSDT","k":{"t":1700000000000,"T":1700000059999,"s":"BTCUSDT","i":"1m","L":10,"o":"100.0","c":"101.0","h":"102.0","l":"99.0","v":"3.5","x":false}}}"#;
    const CLOSED_BAR: &str = r#"{"stream":"btcusdt@kline_1m","data":{"e":"kline","E":1700000060000,"s":"BTCUSDT","k":{"t":1700000000000,"T":1700000059999,"s":"BTCUSDT","i":"1m","L":20,"o":"100.0","c":"101.5","h":"102.0","l":"99.0","v":"4.0","x":true}}}"#;

    /// Serves `frames` to exactly one client, then refuses further connections.
    async fn one_shot_server(frames: Vec<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(listener);

            let mut ws = accept_async(stream).await.unwrap();
            for frame in frames {
                ws.send(Message::Text(frame.into())).await.unwrap();
            }
            let _ = ws.close(None).await;
            while let Some(Ok(_)) = ws.next().await {}
        });

        format!("ws://{}/", addr)
    }

    fn quick_policy() -> ReconnectPolicy {
        ReconnectPolicy::new(Duration::from_millis(10), Duration::from_millis(20), 3)
            .with_jitter(0.0)
    }

    #[tokio::test]
    async fn forwards_closed_bars_and_opens_circuit() {
        let base_url = one_shot_server(vec![OPEN_BAR, "{garbage", CLOSED_BAR]).await;
        let (tx, mut rx) = mpsc::unbounded_channel::<Candle>();
        let gateway = MarketGateway::new("BTCUSDT", "1m", &base_url, quick_policy(), Arc::new(tx));

        let err = gateway.connect().await.unwrap_err();
        assert!(matches!(err, GatewayError::CircuitOpen { failures: 3, .. }));

        let candle = rx.try_recv().unwrap();
        assert_eq!(candle.symbol, "BTCUSDT");
        assert_eq!(candle.close, 101.5);
        assert_eq!(candle.event_time_ms(), 1_700_000_060_000);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_sink_ends_stream_cleanly() {
        let base_url = one_shot_server(vec![CLOSED_BAR]).await;
        let (tx, rx) = mpsc::unbounded_channel::<Candle>();
        drop(rx);
        let gateway = MarketGateway::new("btcusdt", "1m", &base_url, quick_policy(), Arc::new(tx));

        assert!(gateway.connect().await.is_ok());
    }

    #[tokio::test]
    async fn subscribes_to_the_symbol_it_was_built_for() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("ws://{}/", listener.local_addr().unwrap());
        let (path_tx, path_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let record_path = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let _ = path_tx.send(req.uri().path().to_string());
                Ok(resp)
            };
            let mut ws = accept_hdr_async(stream, record_path).await.unwrap();
            ws.send(Message::Text(CLOSED_BAR.into())).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (tx, rx) = mpsc::unbounded_channel::<Candle>();
        drop(rx);
        let gateway = MarketGateway::new("ETHUSDT", "5m", &base_url, quick_policy(), Arc::new(tx));

        assert!(gateway.connect().await.is_ok());
        assert_eq!(path_rx.await.unwrap(), "/ethusdt@kline_5m");
    }

    #[tokio::test]
    async fn unreachable_venue_is_fatal_to_actor() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("ws://{}/", listener.local_addr().unwrap());
        drop(listener);

        let (tx, _rx) = mpsc::unbounded_channel::<Candle>();
        let mut gateway =
            MarketGateway::new("btcusdt", "1m", &base_url, quick_policy(), Arc::new(tx));
        let (supervisor_tx, mut supervisor_rx) = mpsc::channel(64);

        assert!(gateway.run(supervisor_tx).await.is_err());

        let mut fatal = None;
        while let Ok(msg) = supervisor_rx.try_recv() {
            if let ControlMessage::Fatal(actor, reason) = msg {
                fatal = Some((actor, reason));
            }
        }
        let (actor, reason) = fatal.expect("fatal report");
        assert_eq!(actor, ActorType::MarketGateway("btcusdt".to_string()));
        assert!(reason.contains("circuit open"), "{reason}");
    }
}
