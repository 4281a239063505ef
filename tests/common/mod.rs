//! In-memory sockets for driving the client without a server.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::{sink, stream};
use librascli::{Connector, Error, LifecycleEvent, Result, Socket};
use serde_json::Value;
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use url::Url;

/// Route library logs to the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Server side of one accepted mock connection. Dropping it closes the socket.
pub struct MockPeer {
    /// Frames delivered to the client
    pub to_client: mpsc::UnboundedSender<std::result::Result<Message, WsError>>,

    /// Frames written by the client
    pub from_client: mpsc::UnboundedReceiver<Message>,
}

impl MockPeer {
    /// Push a text frame to the client
    pub fn send_text(&self, text: &str) {
        let _ = self.to_client.send(Ok(Message::text(text.to_string())));
    }

    /// Next text frame from the client, decoded as JSON
    pub async fn recv_json(&mut self) -> Option<Value> {
        loop {
            match self.from_client.recv().await? {
                Message::Text(text) => return serde_json::from_str(text.as_str()).ok(),
                _ => continue,
            }
        }
    }

    /// Every text frame the client has written so far
    pub fn drain_json(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(message) = self.from_client.try_recv() {
            if let Message::Text(text) = message {
                if let Ok(value) = serde_json::from_str(text.as_str()) {
                    frames.push(value);
                }
            }
        }
        frames
    }
}

/// Connector handing out in-memory sockets
pub struct MockConnector {
    attempts: AtomicU32,
    refuse_first: u32,
    peers: mpsc::UnboundedSender<MockPeer>,
}

impl MockConnector {
    /// Accept every connection
    pub fn accepting() -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        Self::failing_first(0)
    }

    /// Refuse every connection
    pub fn refusing() -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        Self::failing_first(u32::MAX)
    }

    /// Refuse the first `count` connections, then accept
    pub fn failing_first(count: u32) -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            attempts: AtomicU32::new(0),
            refuse_first: count,
            peers: tx,
        });
        (connector, rx)
    }

    /// Connections attempted so far
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &Url) -> Result<Socket> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.refuse_first {
            return Err(Error::Connection("connection refused".to_string()));
        }

        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();

        let stream = stream::unfold(client_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        });
        let sink = sink::unfold(client_tx, |tx, message: Message| async move {
            let _ = tx.send(message);
            Ok::<_, WsError>(tx)
        });

        let _ = self.peers.send(MockPeer {
            to_client,
            from_client,
        });

        Ok(Socket {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

/// Wait for the first lifecycle event matching `pred`
pub async fn next_matching<F>(
    events: &mut broadcast::Receiver<LifecycleEvent>,
    mut pred: F,
) -> LifecycleEvent
where
    F: FnMut(&LifecycleEvent) -> bool,
{
    time::timeout(Duration::from_secs(300), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("Lifecycle channel failed: {}", e),
            }
        }
    })
    .await
    .expect("Timed out waiting for lifecycle event")
}

/// Every lifecycle event already queued
pub fn drain_events(events: &mut broadcast::Receiver<LifecycleEvent>) -> Vec<LifecycleEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Connector whose connects never complete
pub struct StalledConnector;

#[async_trait]
impl Connector for StalledConnector {
    async fn connect(&self, _url: &Url) -> Result<Socket> {
        futures_util::future::pending().await
    }
}
