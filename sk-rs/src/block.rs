//! Block compiler.
//!
//! Recursive descent over a section's children.  Plain lines become
//! statements; `loop …`, `while …`, `if …` (or a bare condition) and `else`
//! sections become control-flow items whose bodies are compiled by a nested
//! call.  The delay state in the [`CompileContext`] is threaded through the
//! whole walk:
//!
//! | Construct | Delay state afterwards |
//! |-----------|------------------------|
//! | suspending statement | `Yes` |
//! | `loop` / `while` body | [`DelayState::merge_optional`] of entry and body-exit state |
//! | `if` without `else` | same as a loop, applied once the `if` is known to have no `else` |
//! | `if` + `else` | [`DelayState::merge_branches`] |
//!
//! Every problem is reported on the context and the offending child is
//! skipped; a block always compiles.

use tracing::debug;

use crate::context::CompileContext;
use crate::delay::DelayState;
use crate::item::{Block, ItemKind};
use crate::node::Node;
use crate::options::substitute;
use crate::services::Grammar;

/// Expected type for `loop` expressions.
const LOOPABLE: &str = "object";

pub struct BlockCompiler<'g> {
    grammar: &'g dyn Grammar,
}

impl<'g> BlockCompiler<'g> {
    pub fn new(grammar: &'g dyn Grammar) -> Self {
        Self { grammar }
    }

    /// Compile the children of `section` into a linked block.
    pub fn compile(&self, section: &Node, ctx: &mut CompileContext) -> Block {
        ctx.enter_block();
        let mut items: Vec<ItemKind> = Vec::new();
        // Entry state of the last `if` while it may still receive an `else`.
        let mut open_if: Option<DelayState> = None;

        for node in section.children() {
            ctx.set_line(node.line_number());
            let is_else = node.is_section() && node.name().trim().eq_ignore_ascii_case("else");
            if !is_else {
                if let Some(before_if) = open_if.take() {
                    ctx.delay = DelayState::merge_optional(before_if, ctx.delay);
                }
            }

            match node {
                Node::Line { text, .. } => self.statement(text, ctx, &mut items),
                Node::Entry { key, value, .. } => {
                    self.statement(&format!("{key}: {value}"), ctx, &mut items)
                }
                Node::Section { name, .. } => {
                    if is_else {
                        self.else_branch(node, open_if.take(), ctx, &mut items);
                    } else if let Some(rest) = strip_keyword(name, "loop ") {
                        self.loop_section(node, rest, ctx, &mut items);
                    } else if let Some(rest) = strip_keyword(name, "while ") {
                        self.while_section(node, rest, ctx, &mut items);
                    } else {
                        let cond = strip_keyword(name, "if ").unwrap_or(name);
                        if let Some(before_if) = self.conditional(node, cond, ctx, &mut items) {
                            open_if = Some(before_if);
                        }
                    }
                }
            }
        }

        if let Some(before_if) = open_if {
            ctx.delay = DelayState::merge_optional(before_if, ctx.delay);
        }
        ctx.set_line(section.line_number());
        ctx.leave_block();
        Block::link(items)
    }

    fn statement(&self, text: &str, ctx: &mut CompileContext, items: &mut Vec<ItemKind>) {
        let Some(text) = substitute(text, ctx) else { return };
        match self.grammar.parse_statement(&text, ctx) {
            Ok(stmt) => {
                debug!(target: "script", "{}{}", ctx.indent(), stmt.source);
                if stmt.suspends {
                    ctx.delay = DelayState::Yes;
                }
                items.push(ItemKind::Statement(stmt));
            }
            Err(reason) => ctx.error(unparsable("condition/effect", &text, &reason)),
        }
    }

    fn loop_section(
        &self,
        node: &Node,
        header: &str,
        ctx: &mut CompileContext,
        items: &mut Vec<ItemKind>,
    ) {
        let Some(text) = substitute(header, ctx) else { return };
        let iterable = match self.grammar.parse_expression(&text, LOOPABLE, ctx) {
            Ok(expr) => expr,
            Err(reason) => {
                ctx.error(unparsable("expression", &text, &reason));
                return;
            }
        };
        if iterable.single {
            ctx.error(format!("Can't loop {}", iterable.source));
            return;
        }
        debug!(target: "script", "{}loop {}:", ctx.indent(), iterable.source);
        let before = ctx.delay;
        let body = self.compile(node, ctx);
        ctx.delay = DelayState::merge_optional(before, ctx.delay);
        items.push(ItemKind::Loop { iterable, body });
    }

    fn while_section(
        &self,
        node: &Node,
        header: &str,
        ctx: &mut CompileContext,
        items: &mut Vec<ItemKind>,
    ) {
        let Some(text) = substitute(header, ctx) else { return };
        let condition = match self.grammar.parse_condition(&text, ctx) {
            Ok(c) => c,
            Err(reason) => {
                ctx.error(unparsable("condition", &text, &reason));
                return;
            }
        };
        debug!(target: "script", "{}while {}:", ctx.indent(), condition.source);
        let before = ctx.delay;
        let body = self.compile(node, ctx);
        ctx.delay = DelayState::merge_optional(before, ctx.delay);
        items.push(ItemKind::While { condition, body });
    }

    /// Compile an `if` section.  Returns the entry delay state when a
    /// conditional was added; the caller merges it once no `else` follows.
    fn conditional(
        &self,
        node: &Node,
        header: &str,
        ctx: &mut CompileContext,
        items: &mut Vec<ItemKind>,
    ) -> Option<DelayState> {
        let text = substitute(header, ctx)?;
        let condition = match self.grammar.parse_condition(&text, ctx) {
            Ok(c) => c,
            Err(reason) => {
                ctx.error(unparsable("condition", &text, &reason));
                return None;
            }
        };
        debug!(target: "script", "{}{}:", ctx.indent(), condition.source);
        let before_if = ctx.delay;
        let then_block = self.compile(node, ctx);
        items.push(ItemKind::Conditional {
            condition,
            then_block,
            else_block: None,
        });
        Some(before_if)
    }

    fn else_branch(
        &self,
        node: &Node,
        before_if: Option<DelayState>,
        ctx: &mut CompileContext,
        items: &mut [ItemKind],
    ) {
        let target = match (before_if, items.last_mut()) {
            (Some(before_if), Some(ItemKind::Conditional { else_block: slot @ None, .. })) => {
                Some((before_if, slot))
            }
            _ => None,
        };
        let Some((before_if, slot)) = target else {
            ctx.error("'else' has to be placed just after the end of a conditional section");
            return;
        };
        debug!(target: "script", "{}else:", ctx.indent());
        let after_if = ctx.delay;
        ctx.delay = before_if;
        let else_block = self.compile(node, ctx);
        *slot = Some(else_block);
        ctx.delay = DelayState::merge_branches(before_if, after_if, ctx.delay);
    }
}

/// Case-insensitive keyword prefix strip.
fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    head.eq_ignore_ascii_case(keyword)
        .then(|| &text[keyword.len()..])
}

fn unparsable(what: &str, text: &str, reason: &str) -> String {
    if reason.is_empty() {
        format!("can't understand this {what}: '{text}'")
    } else {
        format!("can't understand this {what}: '{text}' ({reason})")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
