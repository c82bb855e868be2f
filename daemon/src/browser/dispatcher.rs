//! Maps interpreted commands onto browser side effects
//!
//! Each action kind runs in its own branch and reports its own failure. A
//! failed command produces exactly one error broadcast and never stops the
//! coordinator from returning to Idle.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::events::Broadcaster;

use super::command::{ActionKind, Command, ScrollDirection, TabTarget};
use super::{BrowserHost, HostError, TabId};

/// What a successfully dispatched command did
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Opened { url: String },
    OpenedBlank,
    Closed { tab_id: TabId },
    Scrolled { tab_id: TabId, direction: ScrollDirection },
    Switched { tab_id: TabId },
    /// close_tab or scroll found no active tab
    NoActiveTab,
    /// switch_tab in a window with a single tab
    SingleTab,
}

/// Per-action failures, displayed as the message shown to the user
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    #[error("No URL provided.")]
    MissingUrl,

    #[error("Scroll direction missing.")]
    MissingDirection,

    #[error("Invalid scroll direction: {0}.")]
    InvalidDirection(String),

    #[error("Tab target missing.")]
    MissingTarget,

    #[error("Invalid tab target: {0}.")]
    InvalidTarget(String),

    #[error("Cannot scroll on this page ({reason}).")]
    Injection { tab_id: TabId, reason: String },

    #[error("Unknown action: {0}.")]
    UnknownAction(String),

    #[error("Failed to execute '{action}'.")]
    Host { action: String, source: HostError },
}

/// Executes commands against a [`BrowserHost`]
pub struct Dispatcher {
    browser: Arc<dyn BrowserHost>,
    events: Broadcaster,
}

impl Dispatcher {
    pub fn new(browser: Arc<dyn BrowserHost>, events: Broadcaster) -> Self {
        Self { browser, events }
    }

    /// Execute `command`, broadcasting any failure
    pub async fn dispatch(&self, command: &Command) -> Result<ActionOutcome, ActionError> {
        info!(action = %command.action, "executing command");

        let result = self.execute(command).await;
        match &result {
            Ok(outcome) => debug!(action = %command.action, ?outcome, "command executed"),
            Err(e) => {
                warn!(action = %command.action, error = ?e, "command failed");
                self.events.error(e.to_string());
            }
        }
        result
    }

    async fn execute(&self, command: &Command) -> Result<ActionOutcome, ActionError> {
        let host_error = |source: HostError| ActionError::Host {
            action: command.action.clone(),
            source,
        };

        match command.kind() {
            ActionKind::OpenUrl => {
                let url = command.str_param("url").ok_or(ActionError::MissingUrl)?;
                let url = with_scheme(url);
                self.browser
                    .open_tab(Some(&url))
                    .await
                    .map_err(host_error)?;
                Ok(ActionOutcome::Opened { url })
            }

            ActionKind::NewTab => {
                self.browser.open_tab(None).await.map_err(host_error)?;
                Ok(ActionOutcome::OpenedBlank)
            }

            ActionKind::CloseTab => {
                let Some(tab) = self.browser.active_tab().await.map_err(host_error)? else {
                    warn!("no active tab to close");
                    return Ok(ActionOutcome::NoActiveTab);
                };
                self.browser.close_tab(tab.id).await.map_err(host_error)?;
                Ok(ActionOutcome::Closed { tab_id: tab.id })
            }

            ActionKind::Scroll => {
                let raw = command
                    .str_param("direction")
                    .ok_or(ActionError::MissingDirection)?;
                let direction = ScrollDirection::parse(raw)
                    .ok_or_else(|| ActionError::InvalidDirection(raw.to_string()))?;

                let Some(tab) = self.browser.active_tab().await.map_err(host_error)? else {
                    warn!("no active tab to scroll");
                    return Ok(ActionOutcome::NoActiveTab);
                };

                debug!(tab_id = tab.id, %direction, "injecting scroll");
                self.browser
                    .scroll_by_viewport(tab.id, direction.viewport_fraction())
                    .await
                    .map_err(|e| match e {
                        HostError::Rejected(reason) => ActionError::Injection {
                            tab_id: tab.id,
                            reason,
                        },
                        other => host_error(other),
                    })?;
                Ok(ActionOutcome::Scrolled {
                    tab_id: tab.id,
                    direction,
                })
            }

            ActionKind::SwitchTab => {
                let raw = command.param("target").ok_or(ActionError::MissingTarget)?;

                let mut tabs = self.browser.window_tabs().await.map_err(host_error)?;
                if tabs.len() <= 1 {
                    return Ok(ActionOutcome::SingleTab);
                }
                tabs.sort_by_key(|t| t.index);

                let index = TabTarget::parse(raw)
                    .and_then(|target| target.resolve(tabs.len()))
                    .ok_or_else(|| ActionError::InvalidTarget(display_value(raw)))?;

                let tab_id = tabs[index].id;
                self.browser
                    .activate_tab(tab_id)
                    .await
                    .map_err(host_error)?;
                Ok(ActionOutcome::Switched { tab_id })
            }

            ActionKind::Unknown => Err(ActionError::UnknownAction(command.action.clone())),
        }
    }
}

/// Prefix `https://` unless the URL already names an http(s) scheme
pub fn with_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::events::ControlEvent;
    use crate::test_support::{error_messages as errors, BrowserCall, FakeBrowser};

    fn dispatcher(browser: Arc<FakeBrowser>) -> (Dispatcher, tokio::sync::broadcast::Receiver<ControlEvent>) {
        let events = Broadcaster::new(16, Duration::from_secs(5));
        let rx = events.subscribe();
        (Dispatcher::new(browser, events), rx)
    }

    #[tokio::test]
    async fn test_open_url_adds_scheme() {
        let browser = Arc::new(FakeBrowser::with_tabs(1));
        let (dispatcher, mut rx) = dispatcher(browser.clone());

        let command = Command::new("open_url").with_param("url", "example.com");
        let outcome = dispatcher.dispatch(&command).await.unwrap();

        assert_eq!(
            outcome,
            ActionOutcome::Opened {
                url: "https://example.com".into()
            }
        );
        assert_eq!(
            browser.calls(),
            vec![BrowserCall::OpenTab(Some("https://example.com".into()))]
        );
        assert!(errors(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_open_url_keeps_http_scheme() {
        let browser = Arc::new(FakeBrowser::with_tabs(1));
        let (dispatcher, _rx) = dispatcher(browser.clone());

        let command = Command::new("open_url").with_param("url", "http://localhost:8080");
        dispatcher.dispatch(&command).await.unwrap();

        assert_eq!(
            browser.calls(),
            vec![BrowserCall::OpenTab(Some("http://localhost:8080".into()))]
        );
    }

    #[tokio::test]
    async fn test_open_url_without_url() {
        let browser = Arc::new(FakeBrowser::with_tabs(1));
        let (dispatcher, mut rx) = dispatcher(browser.clone());

        let result = dispatcher.dispatch(&Command::new("open_url")).await;

        assert_eq!(result, Err(ActionError::MissingUrl));
        assert!(browser.calls().is_empty());
        assert_eq!(errors(&mut rx), vec!["No URL provided.".to_string()]);
    }

    #[tokio::test]
    async fn test_new_tab_opens_blank() {
        let browser = Arc::new(FakeBrowser::with_tabs(1));
        let (dispatcher, _rx) = dispatcher(browser.clone());

        let outcome = dispatcher.dispatch(&Command::new("new_tab")).await.unwrap();
        assert_eq!(outcome, ActionOutcome::OpenedBlank);
        assert_eq!(browser.calls(), vec![BrowserCall::OpenTab(None)]);
    }

    #[tokio::test]
    async fn test_close_tab_closes_active() {
        let browser = Arc::new(FakeBrowser::with_tabs(3));
        let (dispatcher, _rx) = dispatcher(browser.clone());

        let outcome = dispatcher.dispatch(&Command::new("close_tab")).await.unwrap();
        assert_eq!(outcome, ActionOutcome::Closed { tab_id: 100 });
        assert_eq!(browser.calls(), vec![BrowserCall::CloseTab(100)]);
    }

    #[tokio::test]
    async fn test_close_tab_without_active_tab_is_not_an_error() {
        let browser = Arc::new(FakeBrowser::with_tabs(0));
        let (dispatcher, mut rx) = dispatcher(browser.clone());

        let outcome = dispatcher.dispatch(&Command::new("close_tab")).await.unwrap();
        assert_eq!(outcome, ActionOutcome::NoActiveTab);
        assert!(errors(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_scroll_down_once() {
        let browser = Arc::new(FakeBrowser::with_tabs(2));
        let (dispatcher, mut rx) = dispatcher(browser.clone());

        let command = Command::new("scroll").with_param("direction", "down");
        dispatcher.dispatch(&command).await.unwrap();

        assert_eq!(browser.calls(), vec![BrowserCall::Scroll(100, 0.8)]);
        assert!(errors(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_scroll_up_is_negative() {
        let browser = Arc::new(FakeBrowser::with_tabs(1));
        let (dispatcher, _rx) = dispatcher(browser.clone());

        let command = Command::new("scroll").with_param("direction", "up");
        dispatcher.dispatch(&command).await.unwrap();

        assert_eq!(browser.calls(), vec![BrowserCall::Scroll(100, -0.8)]);
    }

    #[tokio::test]
    async fn test_scroll_invalid_direction() {
        let browser = Arc::new(FakeBrowser::with_tabs(1));
        let (dispatcher, mut rx) = dispatcher(browser.clone());

        let command = Command::new("scroll").with_param("direction", "sideways");
        let result = dispatcher.dispatch(&command).await;

        assert_eq!(result, Err(ActionError::InvalidDirection("sideways".into())));
        assert!(browser.calls().is_empty());
        assert_eq!(errors(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_scroll_injection_failure_is_reported() {
        let browser = Arc::new(FakeBrowser::with_tabs(1));
        browser.reject_scroll("Cannot access a chrome:// URL");
        let (dispatcher, mut rx) = dispatcher(browser.clone());

        let command = Command::new("scroll").with_param("direction", "down");
        let result = dispatcher.dispatch(&command).await;

        assert!(matches!(result, Err(ActionError::Injection { tab_id: 100, .. })));
        assert_eq!(
            errors(&mut rx),
            vec!["Cannot scroll on this page (Cannot access a chrome:// URL).".to_string()]
        );
    }

    #[tokio::test]
    async fn test_switch_tab_out_of_range() {
        let browser = Arc::new(FakeBrowser::with_tabs(3));
        let (dispatcher, mut rx) = dispatcher(browser.clone());

        let command = Command::new("switch_tab").with_param("target", 5);
        let result = dispatcher.dispatch(&command).await;

        assert_eq!(result, Err(ActionError::InvalidTarget("5".into())));
        assert!(!browser
            .calls()
            .iter()
            .any(|c| matches!(c, BrowserCall::ActivateTab(_))));
        assert_eq!(errors(&mut rx), vec!["Invalid tab target: 5.".to_string()]);
    }

    #[tokio::test]
    async fn test_switch_tab_first_last_and_number() {
        let browser = Arc::new(FakeBrowser::with_tabs(4));
        let (dispatcher, _rx) = dispatcher(browser.clone());

        for (target, expected) in [
            (serde_json::json!("first"), 100),
            (serde_json::json!("last"), 103),
            (serde_json::json!(2), 101),
        ] {
            let command = Command::new("switch_tab").with_param("target", target);
            let outcome = dispatcher.dispatch(&command).await.unwrap();
            assert_eq!(outcome, ActionOutcome::Switched { tab_id: expected });
        }
    }

    #[tokio::test]
    async fn test_switch_tab_single_tab_is_silent() {
        let browser = Arc::new(FakeBrowser::with_tabs(1));
        let (dispatcher, mut rx) = dispatcher(browser.clone());

        let command = Command::new("switch_tab").with_param("target", 7);
        let outcome = dispatcher.dispatch(&command).await.unwrap();

        assert_eq!(outcome, ActionOutcome::SingleTab);
        assert!(errors(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_switch_tab_missing_target() {
        let browser = Arc::new(FakeBrowser::with_tabs(3));
        let (dispatcher, _rx) = dispatcher(browser);

        let result = dispatcher.dispatch(&Command::new("switch_tab")).await;
        assert_eq!(result, Err(ActionError::MissingTarget));
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let browser = Arc::new(FakeBrowser::with_tabs(1));
        let (dispatcher, mut rx) = dispatcher(browser.clone());

        let result = dispatcher.dispatch(&Command::new("reload")).await;

        assert_eq!(result, Err(ActionError::UnknownAction("reload".into())));
        assert!(browser.calls().is_empty());
        assert_eq!(errors(&mut rx), vec!["Unknown action: reload.".to_string()]);
    }

    #[tokio::test]
    async fn test_detached_host_is_reported_per_action() {
        let browser = Arc::new(FakeBrowser::with_tabs(1));
        browser.detach();
        let (dispatcher, mut rx) = dispatcher(browser);

        let result = dispatcher.dispatch(&Command::new("new_tab")).await;

        assert!(matches!(
            result,
            Err(ActionError::Host {
                source: HostError::NotAttached,
                ..
            })
        ));
        assert_eq!(errors(&mut rx), vec!["Failed to execute 'new_tab'.".to_string()]);
    }
}
