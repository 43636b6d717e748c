//! Persistent event-stream channel for one subscribed workload.
//!
//! The channel owns its websocket connection, a heartbeat task, and a
//! bounded human-readable log. Pushed events are merged into a local
//! [`watch`] cell for the owning view; the entity store is never touched
//! from here. Closed is terminal: there is no reconnection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use shared::protocol::{DeploymentEvent, HEARTBEAT_FRAME};

use crate::error::ChannelError;

/// Retained log entries per channel; oldest evicted first.
pub const CHANNEL_LOG_CAPACITY: usize = 50;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: u64,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub heartbeat_interval: Duration,
    /// Suppress a message equal to the last appended one.
    pub dedup_consecutive: bool,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            dedup_consecutive: false,
        }
    }
}

/// Bounded, ordered channel history. Ids start at 1 and keep increasing
/// across evictions.
#[derive(Debug)]
pub struct ChannelLog {
    entries: Vec<LogEntry>,
    next_id: u64,
    dedup_consecutive: bool,
}

impl ChannelLog {
    pub fn new(dedup_consecutive: bool) -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
            dedup_consecutive,
        }
    }

    /// Append a message; returns false when the duplicate-suppressing
    /// variant dropped it.
    pub fn push(&mut self, message: impl Into<String>) -> bool {
        let message = message.into();
        if self.dedup_consecutive {
            if let Some(last) = self.entries.last() {
                if last.message == message {
                    return false;
                }
            }
        }
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(LogEntry { id, message });
        if self.entries.len() > CHANNEL_LOG_CAPACITY {
            let excess = self.entries.len() - CHANNEL_LOG_CAPACITY;
            self.entries.drain(..excess);
        }
        true
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }
}

pub struct EventChannel {
    log: Arc<Mutex<ChannelLog>>,
    revision: Arc<watch::Sender<u64>>,
    latest: watch::Receiver<Option<DeploymentEvent>>,
    writer: Arc<Mutex<WsSink>>,
    closed: Arc<AtomicBool>,
    heartbeat: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl EventChannel {
    /// Connect to `events/kube/{name}` under `base_url`, mirroring its
    /// transport security (https becomes wss).
    pub async fn connect(
        base_url: &str,
        name: &str,
        options: ChannelOptions,
    ) -> Result<Self, ChannelError> {
        let url = events_url(base_url, name)?;
        debug!(%url, "connecting events channel");
        let (socket, _) = connect_async(url.as_str()).await?;
        let (writer, source) = socket.split();
        let writer = Arc::new(Mutex::new(writer));

        let log = Arc::new(Mutex::new(ChannelLog::new(options.dedup_consecutive)));
        let revision = Arc::new(watch::channel(0u64).0);
        let (latest_tx, latest) = watch::channel(None);
        let closed = Arc::new(AtomicBool::new(false));

        append(&log, &revision, "connected").await;

        let heartbeat = tokio::spawn(run_heartbeat(
            Arc::clone(&writer),
            options.heartbeat_interval,
        ));
        let reader = tokio::spawn(run_reader(
            source,
            Arc::clone(&log),
            Arc::clone(&revision),
            latest_tx,
            Arc::clone(&closed),
            heartbeat.abort_handle(),
        ));

        Ok(Self {
            log,
            revision,
            latest,
            writer,
            closed,
            heartbeat,
            reader,
        })
    }

    pub async fn log_entries(&self) -> Vec<LogEntry> {
        self.log.lock().await.entries().to_vec()
    }

    /// Bumps on every appended entry; poll with `changed()`.
    pub fn log_updates(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// The most recently parsed event, for merging into local detail state.
    pub fn latest_event(&self) -> watch::Receiver<Option<DeploymentEvent>> {
        self.latest.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Explicit teardown. Idempotent, and safe at any lifecycle point.
    pub async fn close(&mut self) {
        self.heartbeat.abort();
        if !self.closed.swap(true, Ordering::SeqCst) {
            let mut writer = self.writer.lock().await;
            let _ = writer.send(Message::Close(None)).await;
            drop(writer);
            append(&self.log, &self.revision, "connection closed").await;
        }
        self.reader.abort();
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        // No periodic task may outlive its owner.
        self.heartbeat.abort();
        self.reader.abort();
    }
}

fn events_url(base_url: &str, name: &str) -> Result<Url, ChannelError> {
    let mut url = Url::parse(base_url)?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        _ => return Err(ChannelError::UnsupportedUrl(base_url.to_string())),
    };
    if url.set_scheme(scheme).is_err() {
        return Err(ChannelError::UnsupportedUrl(base_url.to_string()));
    }
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| ChannelError::UnsupportedUrl(base_url.to_string()))?;
        segments.pop_if_empty().extend(["events", "kube", name]);
    }
    Ok(url)
}

fn format_event(event: &DeploymentEvent) -> String {
    format!(
        "[{}] {} replicas: {}/{}/{}",
        event.action,
        event.event,
        event.status.updated_replicas,
        event.status.ready_replicas,
        event.status.replicas
    )
}

async fn append(log: &Mutex<ChannelLog>, revision: &watch::Sender<u64>, message: &str) {
    if log.lock().await.push(message) {
        revision.send_modify(|r| *r += 1);
    }
}

async fn run_heartbeat(writer: Arc<Mutex<WsSink>>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // the first tick completes immediately; the first heartbeat belongs one
    // full period after open
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let mut writer = writer.lock().await;
        if writer
            .send(Message::Text(HEARTBEAT_FRAME.to_string()))
            .await
            .is_err()
        {
            break;
        }
    }
}

async fn run_reader(
    mut source: WsSource,
    log: Arc<Mutex<ChannelLog>>,
    revision: Arc<watch::Sender<u64>>,
    latest: watch::Sender<Option<DeploymentEvent>>,
    closed: Arc<AtomicBool>,
    heartbeat: AbortHandle,
) {
    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if text == HEARTBEAT_FRAME {
                    continue;
                }
                match serde_json::from_str::<DeploymentEvent>(&text) {
                    Ok(event) => {
                        append(&log, &revision, &format_event(&event)).await;
                        let _ = latest.send(Some(event));
                    }
                    Err(err) => {
                        warn!("events channel frame is not a deployment event: {err}");
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => break,
            Err(err) => {
                // Not terminal by itself; the transport reports the actual
                // close on a later read.
                warn!("events channel transport error: {err}");
                append(&log, &revision, "connection error").await;
            }
        }
    }
    heartbeat.abort();
    if !closed.swap(true, Ordering::SeqCst) {
        append(&log, &revision, "connection closed").await;
    }
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod tests;
