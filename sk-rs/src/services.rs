//! Collaborators the compiler depends on.
//!
//! The compiler turns a node tree into a trigger graph but does not own the
//! expression grammar, command definitions, class registry, variable storage,
//! the host's event subscriptions, or the text-to-tree reader.  Each of those
//! is reached through a narrow trait here and bundled in [`Services`].

use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::context::CompileContext;
use crate::event::{EventInfo, EventSpec, EventType};
use crate::item::{Command, Condition, Expression, Statement};
use crate::node::Node;
use crate::value::{ClassInfo, ItemType, MemoryVariables, Value};

/// Expression, condition, statement and event-header grammar.
///
/// Parse failures return a short reason; the compiler reports it and skips
/// the line.  Implementations may read the active event and the delay state
/// from `ctx`.
pub trait Grammar: Send + Sync {
    fn parse_event(
        &self,
        text: &str,
        ctx: &CompileContext,
    ) -> Result<(Arc<EventInfo>, EventSpec), String>;

    /// Catalog lookup used to re-bind cached triggers.
    fn event_info(&self, kind: &str) -> Option<Arc<EventInfo>>;

    fn parse_condition(&self, text: &str, ctx: &CompileContext) -> Result<Condition, String>;

    fn parse_expression(
        &self,
        text: &str,
        expected_type: &str,
        ctx: &CompileContext,
    ) -> Result<Expression, String>;

    fn parse_statement(&self, text: &str, ctx: &CompileContext) -> Result<Statement, String>;
}

/// Compiles and registers `command ...` sections.
pub trait CommandCompiler: Send + Sync {
    /// Compile and register a command.
    fn compile_command(&self, section: &Node, ctx: &mut CompileContext)
        -> Result<Command, String>;

    /// Register a command restored from the cache.
    fn register_command(&self, command: &Arc<Command>) -> Result<(), String>;

    /// Remove every command defined in `file`; returns how many were removed.
    fn unregister_commands(&self, file: &Path) -> usize;
}

/// Aliases, classes and literal parsing for the `aliases` and `variables`
/// sections.
pub trait ClassRegistry: Send + Sync {
    fn resolve_alias(&self, text: &str) -> Result<ItemType, String>;

    /// Look up a class by a user-facing name (`player`, `players`).
    fn class_info_for(&self, name: &str) -> Option<ClassInfo>;

    /// Parse a literal of any class.
    fn parse_value(&self, text: &str) -> Option<Value>;

    /// Class of an already parsed value.
    fn class_of(&self, value: &Value) -> Option<ClassInfo> {
        self.class_info_for(value.class_name())
    }

    fn convert(&self, value: &Value, to: &ClassInfo) -> Option<Value>;
}

/// Persistent variable storage.
pub trait VariableStore: Send + Sync {
    fn get(&self, name: &str) -> Option<Value>;
    fn set(&self, name: &str, value: Value);
}

/// The host's event subscription API.  A subscription cannot be revoked, so
/// it is requested at most once per event type.
pub trait EventHost: Send + Sync {
    fn subscribe(&self, event_type: &EventType);
}

/// Turns a script file into its node tree.
pub trait NodeReader: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Node>;
}

// ── Services ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Services {
    pub grammar: Arc<dyn Grammar>,
    pub commands: Arc<dyn CommandCompiler>,
    pub classes: Arc<dyn ClassRegistry>,
    pub variables: Arc<dyn VariableStore>,
    pub host: Arc<dyn EventHost>,
    pub reader: Arc<dyn NodeReader>,
}

impl Services {
    /// Services with a grammar and reader; everything else rejects or
    /// ignores what it is given.
    pub fn new(grammar: Arc<dyn Grammar>, reader: Arc<dyn NodeReader>) -> Self {
        Self {
            grammar,
            commands: Arc::new(NoCommands),
            classes: Arc::new(NoClasses),
            variables: Arc::new(MemoryVariables::new()),
            host: Arc::new(NullHost),
            reader,
        }
    }

    pub fn with_commands(mut self, commands: Arc<dyn CommandCompiler>) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_classes(mut self, classes: Arc<dyn ClassRegistry>) -> Self {
        self.classes = classes;
        self
    }

    pub fn with_variables(mut self, variables: Arc<dyn VariableStore>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_host(mut self, host: Arc<dyn EventHost>) -> Self {
        self.host = host;
        self
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Rejects every command section.
pub struct NoCommands;

impl CommandCompiler for NoCommands {
    fn compile_command(&self, section: &Node, _ctx: &mut CompileContext) -> Result<Command, String> {
        Err(format!("commands are not supported: '{}'", section.name()))
    }

    fn register_command(&self, command: &Arc<Command>) -> Result<(), String> {
        Err(format!("commands are not supported: '{}'", command.name))
    }

    fn unregister_commands(&self, _file: &Path) -> usize {
        0
    }
}

/// Knows no aliases and no classes.
pub struct NoClasses;

impl ClassRegistry for NoClasses {
    fn resolve_alias(&self, text: &str) -> Result<ItemType, String> {
        Err(format!("unknown alias '{text}'"))
    }

    fn class_info_for(&self, _name: &str) -> Option<ClassInfo> {
        None
    }

    fn parse_value(&self, _text: &str) -> Option<Value> {
        None
    }

    fn convert(&self, _value: &Value, _to: &ClassInfo) -> Option<Value> {
        None
    }
}

/// Accepts subscriptions and drops them.
pub struct NullHost;

impl EventHost for NullHost {
    fn subscribe(&self, event_type: &EventType) {
        debug!(target: "script::registry", %event_type, "subscription ignored");
    }
}
