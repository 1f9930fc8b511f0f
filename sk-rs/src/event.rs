//! Event kinds and event specifiers.
//!
//! A trigger header such as `on join` names an *event kind*.  The grammar
//! resolves it to an [`EventInfo`] (which runtime event types the kind
//! listens to, and whether it manages its own subscription) and an
//! [`EventSpec`] (the parsed header, stored on the trigger and cached).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::item::{Payload, Trigger};

// ── EventType ─────────────────────────────────────────────────────────────────

/// A concrete runtime event type, the key of the dispatch table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventType(String);

impl EventType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ── EventSpec ─────────────────────────────────────────────────────────────────

/// A parsed event header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSpec {
    /// Name of the event kind; looked up again in the grammar's catalog when
    /// a cached trigger is re-bound.
    pub kind: String,
    /// Header text after option substitution and without the `on ` prefix.
    pub text: String,
    /// Grammar-specific data (literals parsed out of the header).
    pub payload: Payload,
}

impl EventSpec {
    pub fn new(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            text: text.into(),
            payload: Payload::None,
        }
    }
}

// ── Self-registering events ───────────────────────────────────────────────────

/// An event kind that manages its own subscription lifecycle instead of
/// going through the shared dispatch table (e.g. timers, periodic events).
pub trait SelfRegistering: Send + Sync {
    fn register(&self, trigger: &Arc<Trigger>);
    fn unregister(&self, trigger: &Trigger);
}

// ── EventInfo ─────────────────────────────────────────────────────────────────

/// Catalog entry for one event kind.
#[derive(Clone)]
pub struct EventInfo {
    pub kind: String,
    /// Runtime event types a trigger of this kind is dispatched on.
    pub event_types: Vec<EventType>,
    /// Present when the kind manages its own subscription.
    pub self_registering: Option<Arc<dyn SelfRegistering>>,
}

impl EventInfo {
    /// A table-dispatched kind.
    pub fn dispatched(kind: impl Into<String>, event_types: Vec<EventType>) -> Self {
        Self {
            kind: kind.into(),
            event_types,
            self_registering: None,
        }
    }

    /// A kind that registers its triggers itself.
    pub fn self_managed(kind: impl Into<String>, hooks: Arc<dyn SelfRegistering>) -> Self {
        Self {
            kind: kind.into(),
            event_types: Vec::new(),
            self_registering: Some(hooks),
        }
    }

    pub fn is_self_managing(&self) -> bool {
        self.self_registering.is_some()
    }
}

impl fmt::Debug for EventInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventInfo")
            .field("kind", &self.kind)
            .field("event_types", &self.event_types)
            .field("self_managing", &self.is_self_managing())
            .finish()
    }
}

// ── ActiveEvent ───────────────────────────────────────────────────────────────

/// The event whose body is being compiled; nested expression parsing uses it
/// to decide which event values are available.
#[derive(Debug, Clone)]
pub struct ActiveEvent {
    /// `None` while a command body is being compiled.
    pub spec: Option<EventSpec>,
    pub event_types: Vec<EventType>,
}

/// Runtime event type used while compiling `command` sections.
pub const COMMAND_EVENT: &str = "command";

impl ActiveEvent {
    pub fn trigger(spec: EventSpec, event_types: Vec<EventType>) -> Self {
        Self {
            spec: Some(spec),
            event_types,
        }
    }

    pub fn command() -> Self {
        Self {
            spec: None,
            event_types: vec![EventType::new(COMMAND_EVENT)],
        }
    }

    /// `true` if values of runtime event type `ty` are available.
    pub fn provides(&self, ty: &str) -> bool {
        self.event_types.iter().any(|t| t.as_str() == ty)
    }
}
