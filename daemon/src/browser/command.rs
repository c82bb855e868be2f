//! Interpreted commands and their parameter shapes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Portion of the viewport height moved by one scroll command
pub const SCROLL_VIEWPORT_FRACTION: f64 = 0.8;

/// Highest tab number a spoken command may address
const MAX_TAB_NUMBER: u64 = 8;

/// A command produced by the interpretation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub action: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Command {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn kind(&self) -> ActionKind {
        ActionKind::parse(&self.action)
    }

    /// A string parameter, treating empty strings as absent
    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key).filter(|v| !v.is_null())
    }
}

/// The closed set of actions the dispatcher understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    OpenUrl,
    NewTab,
    CloseTab,
    Scroll,
    SwitchTab,
    Unknown,
}

impl ActionKind {
    pub fn parse(action: &str) -> Self {
        match action {
            "open_url" => ActionKind::OpenUrl,
            "new_tab" => ActionKind::NewTab,
            "close_tab" => ActionKind::CloseTab,
            "scroll" => ActionKind::Scroll,
            "switch_tab" => ActionKind::SwitchTab,
            _ => ActionKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "up" => Some(ScrollDirection::Up),
            "down" => Some(ScrollDirection::Down),
            _ => None,
        }
    }

    /// Viewport fraction to scroll by, signed by direction
    pub fn viewport_fraction(self) -> f64 {
        match self {
            ScrollDirection::Up => -SCROLL_VIEWPORT_FRACTION,
            ScrollDirection::Down => SCROLL_VIEWPORT_FRACTION,
        }
    }
}

impl std::fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScrollDirection::Up => write!(f, "up"),
            ScrollDirection::Down => write!(f, "down"),
        }
    }
}

/// Which tab a `switch_tab` command addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabTarget {
    First,
    Last,
    /// 1-based position, already limited to 1..=8
    Number(u32),
}

impl TabTarget {
    /// Parse `first`, `last`, or a tab number given as a JSON number or a
    /// numeric string
    pub fn parse(value: &Value) -> Option<Self> {
        let number = match value {
            Value::String(s) => match s.as_str() {
                "first" => return Some(TabTarget::First),
                "last" => return Some(TabTarget::Last),
                other => other.trim().parse::<u64>().ok()?,
            },
            Value::Number(n) => n.as_u64()?,
            _ => return None,
        };

        if (1..=MAX_TAB_NUMBER).contains(&number) {
            Some(TabTarget::Number(number as u32))
        } else {
            None
        }
    }

    /// Position in a window holding `tab_count` tabs, if it exists
    pub fn resolve(self, tab_count: usize) -> Option<usize> {
        match self {
            TabTarget::First if tab_count > 0 => Some(0),
            TabTarget::Last if tab_count > 0 => Some(tab_count - 1),
            TabTarget::Number(n) if (n as usize) <= tab_count => Some(n as usize - 1),
            _ => None,
        }
    }
}
