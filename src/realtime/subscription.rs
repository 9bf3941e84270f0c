use std::time::Duration;

use futures::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::protocol::{self, ChangeEvent, ChannelSpec, Frame, Incoming};
use crate::config::Config;
use crate::error::{AppError, Result};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const JOIN_REF: &str = "1";
const EVENT_BUFFER: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Live subscription to the realtime channel. Dropping the handle (or calling
/// [`RealtimeSubscription::unsubscribe`]) leaves the channel and closes the socket.
pub struct RealtimeSubscription {
    events: mpsc::Receiver<ChangeEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeSubscription {
    /// Join `spec` with the token currently in `tokens`. Later tokens are forwarded to the
    /// channel as they arrive.
    pub async fn subscribe(
        config: &Config,
        tokens: watch::Receiver<String>,
        spec: ChannelSpec,
    ) -> Result<Self> {
        let endpoint = websocket_url(config)?;
        let mut ws = connect(&endpoint, CONNECT_TIMEOUT).await?;

        let access_token = tokens.borrow().clone();
        send(&mut ws, &protocol::join_frame(&spec, &access_token, JOIN_REF)).await?;
        tracing::info!("Joined realtime channel {}", spec.topic());

        let (events_tx, events) = mpsc::channel(EVENT_BUFFER);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(ws, spec, tokens, events_tx, shutdown_rx));

        Ok(Self {
            events,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Next buffered event, without waiting.
    pub fn try_next(&mut self) -> Option<ChangeEvent> {
        self.events.try_recv().ok()
    }

    /// True once the background task has stopped and every buffered event was taken.
    pub fn is_closed(&self) -> bool {
        self.events.is_closed() && self.events.is_empty()
    }

    /// Wait for the next event. `None` once the channel has stopped.
    #[cfg(test)]
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// Leave the channel and wait for the socket to close.
    pub async fn unsubscribe(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// `wss://<project>/realtime/v1/websocket?apikey=...&vsn=1.0.0`
pub fn websocket_url(config: &Config) -> Result<Url> {
    let mut url = Url::parse(config.project_url())?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(AppError::Realtime(format!(
                "unsupported project URL scheme: {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| AppError::Realtime("cannot build websocket URL".to_string()))?;
    url.set_path("/realtime/v1/websocket");
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", &config.supabase_anon_key)
        .append_pair("vsn", "1.0.0");
    Ok(url)
}

async fn connect(endpoint: &Url, limit: Duration) -> Result<WsStream> {
    let connecting = tokio_tungstenite::connect_async(endpoint.as_str());
    match tokio::time::timeout(limit, connecting).await {
        Ok(connected) => Ok(connected?.0),
        Err(_) => Err(AppError::Realtime(format!(
            "no answer from the realtime endpoint within {limit:?}"
        ))),
    }
}

async fn send<S>(ws: &mut S, frame: &Frame) -> Result<()>
where
    S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(frame)?;
    ws.send(Message::Text(text.into())).await?;
    Ok(())
}

async fn run(
    ws: WsStream,
    spec: ChannelSpec,
    mut tokens: watch::Receiver<String>,
    events: mpsc::Sender<ChangeEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let topic = spec.topic();
    let (mut sink, mut stream) = ws.split();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    // The first tick completes immediately.
    heartbeat.tick().await;
    let mut next_ref: u64 = 2;
    let mut tokens_open = true;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let leave = protocol::leave_frame(&spec, &next_ref.to_string());
                if let Err(e) = send(&mut sink, &leave).await {
                    tracing::debug!("Failed to leave {}: {}", topic, e);
                }
                let _ = sink.close().await;
                tracing::info!("Left realtime channel {}", topic);
                break;
            }
            _ = heartbeat.tick() => {
                let frame = protocol::heartbeat_frame(&next_ref.to_string());
                next_ref += 1;
                if let Err(e) = send(&mut sink, &frame).await {
                    tracing::warn!("Realtime heartbeat failed: {}", e);
                    break;
                }
            }
            changed = tokens.changed(), if tokens_open => {
                if changed.is_err() {
                    tokens_open = false;
                    continue;
                }
                let access_token = tokens.borrow_and_update().clone();
                let frame = protocol::access_token_frame(&spec, &access_token, &next_ref.to_string());
                next_ref += 1;
                if let Err(e) = send(&mut sink, &frame).await {
                    tracing::warn!("Failed to pass renewed token to {}: {}", topic, e);
                    break;
                }
                tracing::debug!("Renewed token sent to {}", topic);
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    match protocol::decode(text.as_str(), &topic, JOIN_REF) {
                        Ok(Incoming::Change(event)) => {
                            tracing::debug!("Realtime change: {:?}", event);
                            if events.send(event).await.is_err() {
                                break;
                            }
                        }
                        Ok(Incoming::Joined(Ok(()))) => {
                            tracing::debug!("Realtime join acknowledged");
                        }
                        Ok(Incoming::Joined(Err(reason))) | Ok(Incoming::Closed(reason)) => {
                            tracing::warn!("Realtime channel {} stopped: {}", topic, reason);
                            break;
                        }
                        Ok(Incoming::Other) => {}
                        Err(e) => tracing::debug!("Ignoring undecodable realtime frame: {}", e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::warn!("Realtime connection closed");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("Realtime connection error: {}", e);
                    break;
                }
            }
        }
    }
}
