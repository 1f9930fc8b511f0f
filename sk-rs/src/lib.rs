//! Trigger script compiler and loader.
//!
//! Turns pre-tokenized script trees into trigger graphs bound to runtime
//! events, with a per-file compiled cache and an unload/reload lifecycle.
//! The expression grammar, command definitions, class registry, variable
//! storage, the host's event API and the tokenizer are collaborators behind
//! the traits in [`services`].

pub mod block;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod context;
pub mod delay;
pub mod diag;
pub mod error;
pub mod event;
pub mod item;
pub mod loader;
pub mod node;
pub mod options;
pub mod registry;
pub mod services;
pub mod value;

pub use compiler::ScriptCompiler;
pub use config::LoaderConfig;
pub use context::CompileContext;
pub use delay::DelayState;
pub use error::{CacheError, LoadError};
pub use item::{Block, CompiledUnit, ItemKind, Trigger, TriggerItem};
pub use loader::{LoadSummary, ScriptLoader};
pub use node::Node;
pub use registry::{Registry, ScriptInfo};
pub use services::Services;
