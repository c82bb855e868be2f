//! Unix domain socket server for IPC
//!
//! Provides request-response communication for control surfaces, pushes
//! broadcasts to subscribed clients, and carries bridge calls to the browser
//! peer. Each connection has a dedicated writer task so pushed frames never
//! interleave with responses.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bridge::{Bridge, PeerId};
use crate::coordinator::CoordinatorInput;
use crate::events::{Broadcaster, PublishError};
use crate::state::SessionSnapshot;

use super::protocol::{Incoming, Outgoing, Request, Response, MAX_FRAME_LEN};

/// Frames a connection may have queued before writers wait
const OUTGOING_QUEUE_DEPTH: usize = 64;

/// Handles the server needs to reach the rest of the daemon
#[derive(Clone)]
pub struct ServerContext {
    pub coordinator: mpsc::Sender<CoordinatorInput>,
    pub snapshot: watch::Receiver<SessionSnapshot>,
    pub events: Broadcaster,
    pub bridge: Arc<Bridge>,
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    ctx: Arc<ServerContext>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, ctx: ServerContext) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
                .context("failed to restrict socket permissions")?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            ctx: Arc::new(ctx),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let ctx = Arc::clone(&self.ctx);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, ctx) => {
                                if let Err(e) = result {
                                    warn!(error = %e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Per-connection state
struct Connection {
    ctx: Arc<ServerContext>,
    out: mpsc::Sender<Outgoing>,
    peer: Option<PeerId>,
    forwarders: Vec<JoinHandle<()>>,
    subscribed: bool,
}

async fn handle_client(stream: UnixStream, ctx: Arc<ServerContext>) -> Result<()> {
    let (mut reader, writer) = stream.into_split();
    let (out, out_rx) = mpsc::channel(OUTGOING_QUEUE_DEPTH);
    let writer_task = tokio::spawn(write_loop(writer, out_rx));

    let mut conn = Connection {
        ctx,
        out,
        peer: None,
        forwarders: Vec::new(),
        subscribed: false,
    };

    let result = conn.serve(&mut reader).await;
    conn.close().await;
    writer_task.abort();
    result
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<Outgoing>) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            let failure = PublishError::Transport(e.to_string());
            match &frame {
                Outgoing::Event(event) => failure.log(event),
                _ => warn!(error = %e, "failed to write frame"),
            }
            break;
        }
    }
}

impl Connection {
    async fn serve<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> Result<()> {
        while let Some(body) = read_frame(reader).await? {
            match serde_json::from_slice::<Incoming>(&body) {
                Ok(Incoming::Request(request)) => {
                    debug!(?request, "received request");
                    let response = self.process_request(request).await;
                    self.send(response.into()).await?;
                }
                Ok(Incoming::Capture(event)) => {
                    if self.is_peer().await {
                        self.forward(CoordinatorInput::Capture(event)).await?;
                    } else {
                        warn!(?event, "capture event from a connection that is not the browser peer");
                    }
                }
                Ok(Incoming::Reply(reply)) => {
                    let (id, result) = reply.into_parts();
                    match self.peer {
                        Some(peer) => self.ctx.bridge.resolve(peer, id, result).await,
                        None => {
                            warn!(id, "bridge reply from a connection that is not the browser peer")
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to parse frame");
                    self.send(Response::error("invalid_request", e.to_string()).into())
                        .await?;
                }
            }
        }

        debug!("client disconnected");
        Ok(())
    }

    /// Process a request and return a response
    async fn process_request(&mut self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetState => {
                let snapshot = *self.ctx.snapshot.borrow();
                Response::State {
                    success: true,
                    listening: snapshot.listening,
                    credential_set: snapshot.credential_set,
                }
            }

            Request::Toggle => {
                let (reply, ack) = oneshot::channel();
                if self.forward(CoordinatorInput::Toggle { reply }).await.is_err() {
                    return coordinator_gone();
                }
                Response::Ack {
                    success: ack.await.is_ok(),
                }
            }

            Request::SetCredential { value } => {
                let (reply, result) = oneshot::channel();
                if self
                    .forward(CoordinatorInput::Configure { value, reply })
                    .await
                    .is_err()
                {
                    return coordinator_gone();
                }
                match result.await {
                    Ok(Ok(())) => Response::Credential {
                        success: true,
                        credential_set: Some(true),
                        message: None,
                    },
                    Ok(Err(e)) => Response::Credential {
                        success: false,
                        credential_set: None,
                        message: Some(e.to_string()),
                    },
                    Err(_) => coordinator_gone(),
                }
            }

            Request::Subscribe => {
                if !self.subscribed {
                    self.subscribed = true;
                    self.forwarders.push(forward_events(
                        self.ctx.events.subscribe(),
                        self.out.clone(),
                    ));
                    debug!("client subscribed to broadcasts");
                }
                Response::Subscribed
            }

            Request::AttachBridge => {
                if let Some(previous) = self.peer.take() {
                    self.ctx.bridge.detach(previous).await;
                }
                let (peer, calls) = self.ctx.bridge.attach().await;
                self.peer = Some(peer);
                self.forwarders.push(forward_calls(calls, self.out.clone()));

                // Leftover capture contexts are closed once the peer can serve calls
                if self.forward(CoordinatorInput::BridgeAttached).await.is_err() {
                    return coordinator_gone();
                }
                Response::BridgeAttached
            }
        }
    }

    async fn is_peer(&self) -> bool {
        match self.peer {
            Some(peer) => self.ctx.bridge.is_attached(peer).await,
            None => false,
        }
    }

    async fn forward(&self, input: CoordinatorInput) -> Result<()> {
        self.ctx
            .coordinator
            .send(input)
            .await
            .context("coordinator is not running")
    }

    async fn send(&self, frame: Outgoing) -> Result<()> {
        self.out
            .send(frame)
            .await
            .context("connection writer stopped")
    }

    async fn close(&mut self) {
        if let Some(peer) = self.peer.take() {
            self.ctx.bridge.detach(peer).await;
        }
        for forwarder in self.forwarders.drain(..) {
            forwarder.abort();
        }
    }
}

fn coordinator_gone() -> Response {
    Response::error("unavailable", "coordinator is not running")
}

fn forward_events(
    mut events: broadcast::Receiver<crate::events::ControlEvent>,
    out: mpsc::Sender<Outgoing>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if out.send(event.clone().into()).await.is_err() {
                        PublishError::Transport("subscriber disconnected".into()).log(&event);
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "subscriber lagged behind broadcasts");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn forward_calls(
    mut calls: mpsc::Receiver<crate::bridge::BridgeCall>,
    out: mpsc::Sender<Outgoing>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(call) = calls.recv().await {
            if out.send(call.into()).await.is_err() {
                break;
            }
        }
    })
}

/// Read one length-prefixed frame; `None` on a clean disconnect
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        bail!("frame of {len} bytes exceeds limit");
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Send a length-prefixed JSON message
async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = u32::try_from(msg_bytes.len())
        .context("frame too large")?
        .to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}
