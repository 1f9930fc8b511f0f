//! Executable trigger graph.
//!
//! A trigger body is a [`Block`]: a singly linked chain of [`TriggerItem`]s
//! where each item owns its successor.  Control-flow items own the heads of
//! their nested blocks, so the whole graph is a tree of chains.
//!
//! Blocks serialize as plain sequences of item kinds and are re-linked on
//! deserialization, so neither encoding nor dropping walks the chain
//! recursively.

use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::de::Deserializer;
use serde::ser::{Error as _, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

use crate::event::EventSpec;

// ── Payload ───────────────────────────────────────────────────────────────────

/// Data a collaborator attaches to a compiled element.
///
/// `Opaque` holds an arbitrary in-memory value that has no serialized form;
/// a unit containing one cannot be written to the script cache.
#[derive(Clone, Default)]
pub enum Payload {
    #[default]
    None,
    Text(String),
    Words(Vec<String>),
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Payload {
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Payload::Opaque(Arc::new(value))
    }

    /// Borrow an opaque payload as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Payload::Opaque(v) => v.downcast_ref(),
            _ => None,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::None => f.write_str("None"),
            Payload::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Payload::Words(w) => f.debug_tuple("Words").field(w).finish(),
            Payload::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Payload::None, Payload::None) => true,
            (Payload::Text(a), Payload::Text(b)) => a == b,
            (Payload::Words(a), Payload::Words(b)) => a == b,
            (Payload::Opaque(a), Payload::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Serialized shape of [`Payload`]; `Opaque` has no counterpart.
#[derive(Serialize, Deserialize)]
enum StoredPayload {
    None,
    Text(String),
    Words(Vec<String>),
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let stored = match self {
            Payload::None => StoredPayload::None,
            Payload::Text(s) => StoredPayload::Text(s.clone()),
            Payload::Words(w) => StoredPayload::Words(w.clone()),
            Payload::Opaque(_) => {
                return Err(S::Error::custom("opaque payload has no serialized form"))
            }
        };
        stored.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match StoredPayload::deserialize(deserializer)? {
            StoredPayload::None => Payload::None,
            StoredPayload::Text(s) => Payload::Text(s),
            StoredPayload::Words(w) => Payload::Words(w),
        })
    }
}

// ── Compiled elements ─────────────────────────────────────────────────────────

/// A compiled effect or condition line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub source: String,
    /// The statement is a suspension point (`delay 1 second`).
    pub suspends: bool,
    pub payload: Payload,
}

impl Statement {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            suspends: false,
            payload: Payload::None,
        }
    }

    pub fn suspending(source: impl Into<String>) -> Self {
        Self {
            suspends: true,
            ..Self::new(source)
        }
    }
}

/// A compiled boolean condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub source: String,
    pub payload: Payload,
}

impl Condition {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            payload: Payload::None,
        }
    }
}

/// A compiled expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub source: String,
    /// Yields at most one value; such an expression cannot be looped.
    pub single: bool,
    pub return_type: String,
    pub payload: Payload,
}

impl Expression {
    pub fn new(source: impl Into<String>, single: bool) -> Self {
        Self {
            source: source.into(),
            single,
            return_type: "object".to_owned(),
            payload: Payload::None,
        }
    }
}

/// A script command compiled by the command collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    pub file: Option<PathBuf>,
    pub payload: Payload,
}

impl Command {
    pub fn new(name: impl Into<String>, file: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            file,
            payload: Payload::None,
        }
    }
}

// ── TriggerItem ───────────────────────────────────────────────────────────────

/// What an item does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemKind {
    Statement(Statement),
    Conditional {
        condition: Condition,
        then_block: Block,
        /// `None` until an `else` section is attached.
        else_block: Option<Block>,
    },
    Loop {
        iterable: Expression,
        body: Block,
    },
    While {
        condition: Condition,
        body: Block,
    },
}

/// A node of the trigger graph.
pub struct TriggerItem {
    pub kind: ItemKind,
    next: Option<Box<TriggerItem>>,
}

impl TriggerItem {
    /// The following item in the same block; `None` for the last one.
    pub fn next(&self) -> Option<&TriggerItem> {
        self.next.as_deref()
    }
}

impl fmt::Debug for TriggerItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerItem")
            .field("kind", &self.kind)
            .field("has_next", &self.next.is_some())
            .finish()
    }
}

// ── Block ─────────────────────────────────────────────────────────────────────

/// A linked sequence of items.
#[derive(Default)]
pub struct Block {
    head: Option<Box<TriggerItem>>,
    len: usize,
}

impl Block {
    /// Link `kinds` in order: every item's `next` is its following sibling.
    pub fn link(kinds: Vec<ItemKind>) -> Self {
        let len = kinds.len();
        let mut head: Option<Box<TriggerItem>> = None;
        for kind in kinds.into_iter().rev() {
            head = Some(Box::new(TriggerItem { kind, next: head }));
        }
        Self { head, len }
    }

    pub fn head(&self) -> Option<&TriggerItem> {
        self.head.as_deref()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Walk the chain through the `next` links.
    pub fn iter(&self) -> BlockIter<'_> {
        BlockIter { cur: self.head() }
    }
}

pub struct BlockIter<'a> {
    cur: Option<&'a TriggerItem>,
}

impl<'a> Iterator for BlockIter<'a> {
    type Item = &'a TriggerItem;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.cur?;
        self.cur = item.next();
        Some(item)
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        let mut cur = self.head.take();
        while let Some(mut item) = cur {
            cur = item.next.take();
        }
    }
}

impl Clone for Block {
    fn clone(&self) -> Self {
        Block::link(self.iter().map(|i| i.kind.clone()).collect())
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().zip(other.iter()).all(|(a, b)| a.kind == b.kind)
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter().map(|i| &i.kind)).finish()
    }
}

impl Serialize for Block {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len))?;
        for item in self.iter() {
            seq.serialize_element(&item.kind)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Block {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Block::link(Vec::<ItemKind>::deserialize(deserializer)?))
    }
}

// ── Trigger & CompiledUnit ────────────────────────────────────────────────────

/// A named entry point bound to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    /// Script the trigger was compiled from; `None` for standalone compiles.
    pub file: Option<PathBuf>,
    /// Header text the trigger was declared with.
    pub name: String,
    pub event: EventSpec,
    pub body: Block,
}

impl Trigger {
    pub fn is_from(&self, file: &std::path::Path) -> bool {
        self.file.as_deref() == Some(file)
    }
}

/// Everything compiled from one script file; the unit the cache persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    pub triggers: Vec<Arc<Trigger>>,
    pub commands: Vec<Arc<Command>>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
