//! Worker side of the channel.
//!
//! One long-lived connection to the scheduler: pings on an interval,
//! terminates on a missed pong, reconnects with exponential backoff. Proof
//! execution runs on its own task so heartbeats keep flowing while the
//! witness and prover grind.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::infra::{Backoff, ProverError, Result};
use crate::prover::ProofBackend;

use super::protocol::{ProofTaskPayload, ServerFrame, WorkerFrame};

/// Worker runtime tuning knobs.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Scheduler WebSocket endpoint.
    pub server_url: String,
    /// Heartbeat cadence.
    pub ping_interval: Duration,
    /// How long to wait for the answering pong.
    pub pong_timeout: Duration,
    /// Base reconnect delay; doubles per failed attempt.
    pub reconnect_base: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8080/ws".to_string(),
            ping_interval: Duration::from_millis(30_000),
            pong_timeout: Duration::from_millis(5_000),
            reconnect_base: Duration::from_millis(5_000),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment.
    pub fn from_env() -> Self {
        let server_url = std::env::var("PROOF_SERVER_WS_URL")
            .unwrap_or_else(|_| "ws://127.0.0.1:8080/ws".to_string());

        let ping_interval = env_millis("PING_INTERVAL_MS", 30_000);
        let pong_timeout = env_millis("PONG_TIMEOUT_MS", 5_000);
        let reconnect_base = env_millis("RECONNECT_BASE_MS", 5_000);

        Self {
            server_url,
            ping_interval,
            pong_timeout,
            reconnect_base,
        }
    }
}

fn env_millis(name: &str, default: u64) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(default))
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The worker process main loop.
pub struct WorkerRuntime {
    config: WorkerConfig,
    backend: Arc<dyn ProofBackend>,
}

impl WorkerRuntime {
    pub fn new(config: WorkerConfig, backend: Arc<dyn ProofBackend>) -> Self {
        Self { config, backend }
    }

    /// Connect, serve, reconnect; never returns.
    pub async fn run(self) {
        let mut backoff = Backoff::new(self.config.reconnect_base);
        loop {
            match connect_async(self.config.server_url.as_str()).await {
                Ok((ws, _)) => {
                    info!(url = %self.config.server_url, "Connected to proof server");
                    backoff.reset();
                    if let Err(e) = self.serve(ws).await {
                        warn!(error = %e, "Channel terminated");
                    }
                }
                Err(e) => {
                    warn!(url = %self.config.server_url, error = %e, "Connect failed");
                }
            }
            let delay = backoff.next_delay();
            info!(delay_ms = delay.as_millis() as u64, "Reconnecting");
            tokio::time::sleep(delay).await;
        }
    }

    /// Drive one live connection until it breaks.
    async fn serve(&self, ws: WsStream) -> Result<()> {
        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::channel::<WorkerFrame>(16);

        let mut ping_timer = interval(self.config.ping_interval);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut pong_deadline: Option<Instant> = None;

        loop {
            // A dummy far-off deadline keeps the select arm well-formed
            // while no pong is owed.
            let pong_at = pong_deadline
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400));

            tokio::select! {
                _ = ping_timer.tick() => {
                    send_frame(&mut sink, &WorkerFrame::Ping).await?;
                    if pong_deadline.is_none() {
                        pong_deadline = Some(Instant::now() + self.config.pong_timeout);
                    }
                }
                _ = tokio::time::sleep_until(pong_at), if pong_deadline.is_some() => {
                    return Err(ProverError::ChannelUnhealthy(
                        "pong deadline missed".to_string(),
                    ));
                }
                Some(frame) = out_rx.recv() => {
                    send_frame(&mut sink, &frame).await?;
                }
                inbound = stream.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_frame(&text, &out_tx, &mut sink, &mut pong_deadline)
                                .await?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(ProverError::ChannelUnhealthy(
                                "server closed the channel".to_string(),
                            ));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(ProverError::ChannelUnhealthy(e.to_string()));
                        }
                    }
                }
            }
        }
    }

    async fn handle_frame(
        &self,
        text: &str,
        out_tx: &mpsc::Sender<WorkerFrame>,
        sink: &mut futures_util::stream::SplitSink<WsStream, Message>,
        pong_deadline: &mut Option<Instant>,
    ) -> Result<()> {
        let frame: ServerFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Discarding unknown server message");
                return Ok(());
            }
        };

        match frame {
            ServerFrame::Ping => send_frame(sink, &WorkerFrame::Pong).await?,
            ServerFrame::Pong => *pong_deadline = None,
            ServerFrame::GenerateProof { proof_id, payload } => {
                info!(job_id = %proof_id, "Proof task received");
                self.spawn_execution(proof_id, payload, out_tx.clone());
            }
        }
        Ok(())
    }

    /// Run witness+prover off the channel loop. On failure no reply is
    /// sent; the scheduler timeout converts the job.
    fn spawn_execution(
        &self,
        proof_id: uuid::Uuid,
        payload: ProofTaskPayload,
        out_tx: mpsc::Sender<WorkerFrame>,
    ) {
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            match backend.prove(payload).await {
                Ok(results) => {
                    debug!(job_id = %proof_id, "Proof complete");
                    let reply = WorkerFrame::GenerateProof {
                        proof_id,
                        results,
                    };
                    if out_tx.send(reply).await.is_err() {
                        warn!(job_id = %proof_id, "Channel gone before reply");
                    }
                }
                Err(e) => {
                    warn!(job_id = %proof_id, error = %e, "Proof execution failed, not replying");
                }
            }
        });
    }
}

async fn send_frame(
    sink: &mut futures_util::stream::SplitSink<WsStream, Message>,
    frame: &WorkerFrame,
) -> Result<()> {
    let text = serde_json::to_string(frame)
        .map_err(|e| ProverError::Internal(format!("unencodable frame: {e}")))?;
    sink.send(Message::Text(text))
        .await
        .map_err(|e| ProverError::ChannelUnhealthy(e.to_string()))
}
