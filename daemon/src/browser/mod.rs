//! Browser primitives and the action dispatcher
//!
//! The daemon never touches a browser directly. Tab and scripting operations
//! go through a [`BrowserHost`], normally the attached bridge peer.

mod command;
mod dispatcher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use command::{ActionKind, Command, ScrollDirection, TabTarget, SCROLL_VIEWPORT_FRACTION};
pub use dispatcher::{ActionError, ActionOutcome, Dispatcher};

/// Browser-assigned tab identifier
pub type TabId = i64;

/// A tab as reported by the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    /// Position within its window
    pub index: u32,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Failures talking to whatever hosts the browser primitives
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("no browser peer attached")]
    NotAttached,

    #[error("browser peer disconnected before replying")]
    Disconnected,

    #[error("{0}")]
    Rejected(String),

    #[error("unexpected reply from browser peer: {0}")]
    Decode(String),
}

/// Tab and window operations used by the dispatcher
#[async_trait]
pub trait BrowserHost: Send + Sync {
    /// Open a new tab, blank when `url` is `None`
    async fn open_tab(&self, url: Option<&str>) -> Result<(), HostError>;

    /// The active tab of the current window, if any
    async fn active_tab(&self) -> Result<Option<Tab>, HostError>;

    /// All tabs of the current window
    async fn window_tabs(&self) -> Result<Vec<Tab>, HostError>;

    async fn close_tab(&self, tab_id: TabId) -> Result<(), HostError>;

    async fn activate_tab(&self, tab_id: TabId) -> Result<(), HostError>;

    /// Scroll the page in `tab_id` by `fraction` of its viewport height.
    /// Negative values scroll up.
    async fn scroll_by_viewport(&self, tab_id: TabId, fraction: f64) -> Result<(), HostError>;
}
