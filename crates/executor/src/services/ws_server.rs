use std::io;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::services::publisher::{BroadcastPublisher, Topic};

/// Streams every published envelope to each connected websocket client.
pub struct FanoutServer {
    listener: TcpListener,
    publisher: BroadcastPublisher,
}

impl FanoutServer {
    pub async fn bind(addr: &str, publisher: BroadcastPublisher) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            publisher,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!("Fan-out server listening on {}", self.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let publisher = self.publisher.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_client(stream, publisher).await {
                            debug!("Client {} dropped: {}", peer, e);
                        }
                    });
                }
                Err(e) => warn!("Accept failed: {}", e),
            }
        }
    }
}

async fn serve_client(stream: TcpStream, publisher: BroadcastPublisher) -> anyhow::Result<()> {
    let ws = accept_async(stream).await?;
    let (mut write, mut read) = ws.split();

    let mut klines = publisher.subscribe(Topic::Kline);
    let mut signals = publisher.subscribe(Topic::Signals);
    let mut wallet = publisher.subscribe(Topic::Wallet);

    loop {
        let outgoing = tokio::select! {
            inbound = read.next() => {
                match inbound {
                    Some(Ok(Message::Ping(payload))) => write.send(Message::Pong(payload)).await?,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => return Err(e.into()),
                    // Clients have nothing to say.
                    Some(Ok(_)) => {}
                }
                continue;
            }
            msg = klines.recv() => msg,
            msg = signals.recv() => msg,
            msg = wallet.recv() => msg,
        };

        match outgoing {
            Ok(text) => write.send(Message::Text(text.into())).await?,
            Err(RecvError::Lagged(n)) => warn!("Client lagged, skipped {} events", n),
            Err(RecvError::Closed) => break,
        }
    }

    Ok(())
}
