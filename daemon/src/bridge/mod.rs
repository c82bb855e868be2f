//! Bridge to the browser-side peer
//!
//! The browser shim attaches over the IPC socket and serves tab, scripting
//! and capture-context operations on the daemon's behalf. Each operation is
//! a [`BridgeCall`] with an id; the peer answers with a reply carrying the
//! same id. Calls wait on a one-shot reply with no timeout and fail only when
//! the peer rejects them or goes away.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::browser::{BrowserHost, HostError, Tab, TabId};
use crate::capture::{CaptureCommand, CaptureHost};

/// Outstanding calls a peer may have queued before sends wait
const CALL_QUEUE_DEPTH: usize = 32;

/// Identifies one attachment of a peer
pub type PeerId = u64;

/// Operations the daemon asks the browser peer to perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum BrowserOp {
    OpenTab {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    ActiveTab,
    WindowTabs,
    CloseTab {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
    ActivateTab {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
    ScrollByViewport {
        #[serde(rename = "tabId")]
        tab_id: TabId,
        fraction: f64,
    },
    HasCaptureContext {
        address: String,
    },
    CreateCaptureContext {
        address: String,
    },
    CloseCaptureContext {
        address: String,
    },
    StartCapture,
    StopCapture,
}

/// A single request to the peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeCall {
    pub id: u64,
    pub op: BrowserOp,
}

struct Peer {
    id: PeerId,
    tx: mpsc::Sender<BridgeCall>,
}

/// A call waiting on the peer it was sent to
struct PendingCall {
    peer: PeerId,
    reply: oneshot::Sender<Result<Value, String>>,
}

/// Routes calls to the attached browser peer
///
/// Lock order is `peer` then `pending`. A call registers itself while holding
/// the peer lock, so a replacement or detach always sees it and fails it.
#[derive(Default)]
pub struct Bridge {
    peer: Mutex<Option<Peer>>,
    pending: Mutex<HashMap<u64, PendingCall>>,
    next_call: AtomicU64,
    next_peer: AtomicU64,
}

impl Bridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new peer, replacing any previous one. Calls still waiting on
    /// the previous peer fail with [`HostError::Disconnected`].
    pub async fn attach(&self) -> (PeerId, mpsc::Receiver<BridgeCall>) {
        let (tx, rx) = mpsc::channel(CALL_QUEUE_DEPTH);
        let id = self.next_peer.fetch_add(1, Ordering::Relaxed) + 1;

        let mut current = self.peer.lock().await;
        if let Some(previous) = current.replace(Peer { id, tx }) {
            warn!(previous = previous.id, peer = id, "replacing attached browser peer");
            self.fail_pending(previous.id).await;
        }
        drop(current);

        info!(peer = id, "browser peer attached");
        (id, rx)
    }

    /// Detach `peer` if it is still the attached one
    pub async fn detach(&self, peer: PeerId) {
        let mut current = self.peer.lock().await;
        if current.as_ref().map(|p| p.id) != Some(peer) {
            return;
        }
        *current = None;
        self.fail_pending(peer).await;
        drop(current);

        info!(peer, "browser peer detached");
    }

    pub async fn is_attached(&self, peer: PeerId) -> bool {
        self.peer.lock().await.as_ref().map(|p| p.id) == Some(peer)
    }

    /// Complete the call `id` with the answer from `peer`. Replies for calls
    /// that were sent to a different peer are dropped.
    pub async fn resolve(&self, peer: PeerId, id: u64, result: Result<Value, String>) {
        let mut pending = self.pending.lock().await;
        match pending.get(&id) {
            Some(call) if call.peer == peer => {
                if let Some(call) = pending.remove(&id) {
                    // The caller may have given up; nothing to do then
                    let _ = call.reply.send(result);
                }
            }
            Some(call) => warn!(id, peer, owner = call.peer, "reply from a peer the call was not sent to"),
            None => warn!(id, peer, "reply for unknown bridge call"),
        }
    }

    /// Drop every call sent to `peer`, waking its caller with a disconnect.
    /// Callers hold the peer lock.
    async fn fail_pending(&self, peer: PeerId) {
        let mut pending = self.pending.lock().await;
        let before = pending.len();
        pending.retain(|_, call| call.peer != peer);
        let dropped = before - pending.len();
        if dropped > 0 {
            warn!(peer, count = dropped, "failing bridge calls left without a peer");
        }
    }

    async fn call(&self, op: BrowserOp) -> Result<Value, HostError> {
        let id = self.next_call.fetch_add(1, Ordering::Relaxed) + 1;
        let (reply_tx, reply_rx) = oneshot::channel();

        let tx = {
            let current = self.peer.lock().await;
            let peer = current.as_ref().ok_or(HostError::NotAttached)?;
            self.pending.lock().await.insert(
                id,
                PendingCall {
                    peer: peer.id,
                    reply: reply_tx,
                },
            );
            peer.tx.clone()
        };

        debug!(id, ?op, "bridge call");
        if tx.send(BridgeCall { id, op }).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(HostError::Disconnected);
        }

        match reply_rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(reason)) => Err(HostError::Rejected(reason)),
            Err(_) => Err(HostError::Disconnected),
        }
    }

    async fn call_decoded<T: DeserializeOwned>(&self, op: BrowserOp) -> Result<T, HostError> {
        let value = self.call(op).await?;
        serde_json::from_value(value).map_err(|e| HostError::Decode(e.to_string()))
    }
}

#[async_trait]
impl BrowserHost for Bridge {
    async fn open_tab(&self, url: Option<&str>) -> Result<(), HostError> {
        self.call(BrowserOp::OpenTab {
            url: url.map(str::to_string),
        })
        .await
        .map(drop)
    }

    async fn active_tab(&self) -> Result<Option<Tab>, HostError> {
        self.call_decoded(BrowserOp::ActiveTab).await
    }

    async fn window_tabs(&self) -> Result<Vec<Tab>, HostError> {
        self.call_decoded(BrowserOp::WindowTabs).await
    }

    async fn close_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.call(BrowserOp::CloseTab { tab_id }).await.map(drop)
    }

    async fn activate_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.call(BrowserOp::ActivateTab { tab_id }).await.map(drop)
    }

    async fn scroll_by_viewport(&self, tab_id: TabId, fraction: f64) -> Result<(), HostError> {
        self.call(BrowserOp::ScrollByViewport { tab_id, fraction })
            .await
            .map(drop)
    }
}

#[async_trait]
impl CaptureHost for Bridge {
    async fn has_context(&self, address: &str) -> Result<bool, HostError> {
        self.call_decoded(BrowserOp::HasCaptureContext {
            address: address.to_string(),
        })
        .await
    }

    async fn create_context(&self, address: &str) -> Result<(), HostError> {
        self.call(BrowserOp::CreateCaptureContext {
            address: address.to_string(),
        })
        .await
        .map(drop)
    }

    async fn close_context(&self, address: &str) -> Result<(), HostError> {
        self.call(BrowserOp::CloseCaptureContext {
            address: address.to_string(),
        })
        .await
        .map(drop)
    }

    async fn send(&self, command: CaptureCommand) -> Result<(), HostError> {
        let op = match command {
            CaptureCommand::StartCapture => BrowserOp::StartCapture,
            CaptureCommand::StopCapture => BrowserOp::StopCapture,
        };
        self.call(op).await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    /// Answer every call on `rx` with `answer(op)`
    fn serve(
        bridge: Arc<Bridge>,
        peer: PeerId,
        mut rx: mpsc::Receiver<BridgeCall>,
        answer: impl Fn(&BrowserOp) -> Result<Value, String> + Send + 'static,
    ) -> tokio::task::JoinHandle<Vec<BrowserOp>> {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(call) = rx.recv().await {
                bridge.resolve(peer, call.id, answer(&call.op)).await;
                seen.push(call.op);
            }
            seen
        })
    }

    #[tokio::test]
    async fn test_call_without_peer() {
        let bridge = Bridge::new();
        assert_eq!(bridge.open_tab(None).await, Err(HostError::NotAttached));
    }

    #[tokio::test]
    async fn test_calls_round_trip_through_peer() {
        let bridge = Arc::new(Bridge::new());
        let (peer, rx) = bridge.attach().await;
        let server = serve(bridge.clone(), peer, rx, |op| match op {
            BrowserOp::ActiveTab => Ok(json!({"id": 7, "index": 0, "active": true})),
            BrowserOp::WindowTabs => Ok(json!([
                {"id": 7, "index": 0},
                {"id": 8, "index": 1}
            ])),
            _ => Ok(Value::Null),
        });

        let active = bridge.active_tab().await.unwrap().unwrap();
        assert_eq!(active.id, 7);
        assert_eq!(bridge.window_tabs().await.unwrap().len(), 2);
        bridge.scroll_by_viewport(7, -0.8).await.unwrap();

        drop(bridge.attach().await);
        let seen = server.await.unwrap();
        assert_eq!(
            seen.last(),
            Some(&BrowserOp::ScrollByViewport {
                tab_id: 7,
                fraction: -0.8
            })
        );
    }

    #[tokio::test]
    async fn test_rejected_call() {
        let bridge = Arc::new(Bridge::new());
        let (peer, rx) = bridge.attach().await;
        serve(bridge.clone(), peer, rx, |_| Err("Cannot access a chrome:// URL".into()));

        let result = bridge.scroll_by_viewport(1, 0.8).await;
        assert_eq!(
            result,
            Err(HostError::Rejected("Cannot access a chrome:// URL".into()))
        );
    }

    #[tokio::test]
    async fn test_bad_reply_shape() {
        let bridge = Arc::new(Bridge::new());
        let (peer, rx) = bridge.attach().await;
        serve(bridge.clone(), peer, rx, |_| Ok(json!("yes")));

        let result = bridge.has_context("/capture.html").await;
        assert!(matches!(result, Err(HostError::Decode(_))));
    }

    #[tokio::test]
    async fn test_detach_fails_pending_calls() {
        let bridge = Arc::new(Bridge::new());
        let (peer, mut rx) = bridge.attach().await;

        let caller = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.close_tab(3).await })
        };

        // Wait until the call reaches the peer, then drop the peer
        let call = rx.recv().await.unwrap();
        assert_eq!(call.op, BrowserOp::CloseTab { tab_id: 3 });
        bridge.detach(peer).await;

        assert_eq!(caller.await.unwrap(), Err(HostError::Disconnected));
        assert!(!bridge.is_attached(peer).await);
    }

    #[tokio::test]
    async fn test_reply_from_other_peer_is_dropped() {
        let bridge = Arc::new(Bridge::new());
        let (peer, mut rx) = bridge.attach().await;

        let caller = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.has_context("/capture.html").await })
        };
        let call = rx.recv().await.unwrap();

        bridge.resolve(peer + 1, call.id, Ok(json!(true))).await;
        tokio::task::yield_now().await;
        assert!(!caller.is_finished());

        bridge.resolve(peer, call.id, Ok(json!(false))).await;
        assert_eq!(caller.await.unwrap(), Ok(false));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_calls_racing_reattach_never_hang() {
        let bridge = Arc::new(Bridge::new());

        // Replaced peers never answer but keep their queues open
        let mut replaced = Vec::new();
        let (_, rx) = bridge.attach().await;
        replaced.push(rx);

        // Fewer calls than a peer queue holds, so no send waits on a stalled peer
        let callers: Vec<_> = (0..24)
            .map(|i| {
                let bridge = bridge.clone();
                tokio::spawn(async move { bridge.activate_tab(i).await })
            })
            .collect();

        for _ in 0..16 {
            let (_, rx) = bridge.attach().await;
            replaced.push(rx);
            tokio::task::yield_now().await;
        }

        let (peer, rx) = bridge.attach().await;
        serve(bridge.clone(), peer, rx, |_| Ok(Value::Null));

        for caller in callers {
            let result = tokio::time::timeout(std::time::Duration::from_secs(5), caller)
                .await
                .expect("call was stranded on a replaced peer")
                .unwrap();
            assert!(
                matches!(result, Ok(()) | Err(HostError::Disconnected)),
                "unexpected result: {result:?}"
            );
        }
        drop(replaced);
    }

    #[tokio::test]
    async fn test_stale_detach_keeps_new_peer() {
        let bridge = Bridge::new();
        let (first, _rx1) = bridge.attach().await;
        let (second, _rx2) = bridge.attach().await;

        bridge.detach(first).await;
        assert!(bridge.is_attached(second).await);
    }

    #[test]
    fn test_call_serialization() {
        let call = BridgeCall {
            id: 4,
            op: BrowserOp::ScrollByViewport {
                tab_id: 12,
                fraction: 0.8,
            },
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(
            json,
            json!({"id": 4, "op": {"name": "scroll_by_viewport", "tabId": 12, "fraction": 0.8}})
        );
    }
}
