//! In-memory stand-ins for the daemon's collaborators

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::browser::{BrowserHost, Command, HostError, Tab, TabId};
use crate::capture::{CaptureCommand, CaptureHost};
use crate::credential::{CredentialError, CredentialStore};
use crate::events::ControlEvent;
use crate::interpreter::{Interpret, InterpretError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Every event currently queued on `rx`
pub fn drain_events(rx: &mut broadcast::Receiver<ControlEvent>) -> Vec<ControlEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Messages of the error events currently queued on `rx`
pub fn error_messages(rx: &mut broadcast::Receiver<ControlEvent>) -> Vec<String> {
    drain_events(rx)
        .into_iter()
        .filter_map(|event| match event {
            ControlEvent::Error { message, .. } => Some(message),
            _ => None,
        })
        .collect()
}

/// Side effects recorded by [`FakeBrowser`]
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserCall {
    OpenTab(Option<String>),
    CloseTab(TabId),
    ActivateTab(TabId),
    Scroll(TabId, f64),
}

#[derive(Default)]
struct BrowserState {
    tabs: Vec<Tab>,
    calls: Vec<BrowserCall>,
    scroll_rejection: Option<String>,
    detached: bool,
}

/// A window of tabs with ids starting at 100; the first tab is active
#[derive(Default)]
pub struct FakeBrowser {
    state: Mutex<BrowserState>,
}

impl FakeBrowser {
    pub fn with_tabs(count: u32) -> Self {
        let tabs = (0..count)
            .map(|index| Tab {
                id: 100 + i64::from(index),
                index,
                active: index == 0,
                url: Some(format!("https://example.com/{index}")),
            })
            .collect();
        Self {
            state: Mutex::new(BrowserState {
                tabs,
                ..Default::default()
            }),
        }
    }

    pub fn calls(&self) -> Vec<BrowserCall> {
        lock(&self.state).calls.clone()
    }

    pub fn reject_scroll(&self, reason: &str) {
        lock(&self.state).scroll_rejection = Some(reason.to_string());
    }

    pub fn detach(&self) {
        lock(&self.state).detached = true;
    }

    fn check_attached(&self) -> Result<MutexGuard<'_, BrowserState>, HostError> {
        let state = lock(&self.state);
        if state.detached {
            return Err(HostError::NotAttached);
        }
        Ok(state)
    }
}

#[async_trait]
impl BrowserHost for FakeBrowser {
    async fn open_tab(&self, url: Option<&str>) -> Result<(), HostError> {
        let mut state = self.check_attached()?;
        state.calls.push(BrowserCall::OpenTab(url.map(str::to_string)));
        Ok(())
    }

    async fn active_tab(&self) -> Result<Option<Tab>, HostError> {
        let state = self.check_attached()?;
        Ok(state.tabs.iter().find(|t| t.active).cloned())
    }

    async fn window_tabs(&self) -> Result<Vec<Tab>, HostError> {
        let state = self.check_attached()?;
        // Reported out of order; callers sort by index
        Ok(state.tabs.iter().rev().cloned().collect())
    }

    async fn close_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        let mut state = self.check_attached()?;
        state.calls.push(BrowserCall::CloseTab(tab_id));
        Ok(())
    }

    async fn activate_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        let mut state = self.check_attached()?;
        state.calls.push(BrowserCall::ActivateTab(tab_id));
        Ok(())
    }

    async fn scroll_by_viewport(&self, tab_id: TabId, fraction: f64) -> Result<(), HostError> {
        let mut state = self.check_attached()?;
        if let Some(reason) = state.scroll_rejection.clone() {
            return Err(HostError::Rejected(reason));
        }
        state.calls.push(BrowserCall::Scroll(tab_id, fraction));
        Ok(())
    }
}

#[derive(Default)]
struct CaptureState {
    live: u32,
    created: u32,
    sent: Vec<CaptureCommand>,
    fail_create: bool,
    fail_send: bool,
}

/// Capture host that tracks how many contexts exist
#[derive(Default)]
pub struct FakeCapture {
    state: Mutex<CaptureState>,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host that already has a context from an earlier session
    pub fn with_live_context() -> Self {
        let host = Self::default();
        lock(&host.state).live = 1;
        host
    }

    pub fn created_count(&self) -> u32 {
        lock(&self.state).created
    }

    pub fn live_contexts(&self) -> u32 {
        lock(&self.state).live
    }

    pub fn sent(&self) -> Vec<CaptureCommand> {
        lock(&self.state).sent.clone()
    }

    pub fn fail_create(&self, fail: bool) {
        lock(&self.state).fail_create = fail;
    }

    pub fn fail_send(&self, fail: bool) {
        lock(&self.state).fail_send = fail;
    }
}

#[async_trait]
impl CaptureHost for FakeCapture {
    async fn has_context(&self, _address: &str) -> Result<bool, HostError> {
        Ok(lock(&self.state).live > 0)
    }

    async fn create_context(&self, _address: &str) -> Result<(), HostError> {
        // Suspend once so overlapping callers can interleave
        tokio::task::yield_now().await;

        let mut state = lock(&self.state);
        if state.fail_create {
            return Err(HostError::Rejected("offscreen documents unavailable".into()));
        }
        state.live += 1;
        state.created += 1;
        Ok(())
    }

    async fn close_context(&self, _address: &str) -> Result<(), HostError> {
        let mut state = lock(&self.state);
        state.live = state.live.saturating_sub(1);
        Ok(())
    }

    async fn send(&self, command: CaptureCommand) -> Result<(), HostError> {
        let mut state = lock(&self.state);
        if state.fail_send {
            return Err(HostError::Disconnected);
        }
        state.sent.push(command);
        Ok(())
    }
}

/// Interpreter answering from a script of replies
#[derive(Default)]
pub struct FakeInterpreter {
    replies: Mutex<VecDeque<Result<Command, InterpretError>>>,
    transcripts: Mutex<Vec<String>>,
}

impl FakeInterpreter {
    pub fn replying(replies: Vec<Result<Command, InterpretError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            transcripts: Mutex::default(),
        }
    }

    pub fn transcripts(&self) -> Vec<String> {
        lock(&self.transcripts).clone()
    }
}

#[async_trait]
impl Interpret for FakeInterpreter {
    async fn interpret(&self, _credential: &str, transcript: &str) -> Result<Command, InterpretError> {
        lock(&self.transcripts).push(transcript.to_string());
        lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| Err(InterpretError::Malformed("no scripted reply".into())))
    }
}

/// Credential store kept in memory
#[derive(Default)]
pub struct MemoryStore {
    value: Mutex<Option<String>>,
    fail_save: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stored(&self) -> Option<String> {
        lock(&self.value).clone()
    }

    pub fn fail_save(&self, fail: bool) {
        *lock(&self.fail_save) = fail;
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load(&self) -> Result<Option<String>, CredentialError> {
        Ok(self.stored())
    }

    async fn save(&self, value: &str) -> Result<(), CredentialError> {
        if *lock(&self.fail_save) {
            return Err(CredentialError::Io {
                path: "memory".into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        *lock(&self.value) = Some(value.to_string());
        Ok(())
    }
}
