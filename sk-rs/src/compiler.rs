//! Script compiler.
//!
//! Top-level driver for one script's node tree.  The `aliases`, `options`
//! and `variables` sections are consumed wholesale; every other top-level
//! section is either a `command …` (handed to the command compiler) or an
//! event trigger whose body goes through the [`BlockCompiler`].
//!
//! Nothing here aborts the file: a bad section or entry is reported on the
//! context and skipped.  Binding the resulting triggers is the registry's
//! job once the whole unit is built.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::block::BlockCompiler;
use crate::context::CompileContext;
use crate::delay::DelayState;
use crate::diag::Diagnostics;
use crate::event::ActiveEvent;
use crate::item::{CompiledUnit, Trigger};
use crate::node::Node;
use crate::options::substitute;
use crate::services::Services;

const ALIASES: &str = "aliases";
const OPTIONS: &str = "options";
const VARIABLES: &str = "variables";

pub struct ScriptCompiler<'s> {
    services: &'s Services,
}

impl<'s> ScriptCompiler<'s> {
    pub fn new(services: &'s Services) -> Self {
        Self { services }
    }

    /// Compile `file`'s tree with a fresh context.
    pub fn compile_file(&self, file: &Path, root: &Node) -> (CompiledUnit, Diagnostics) {
        let mut ctx = CompileContext::for_file(file);
        let unit = self.compile(root, &mut ctx);
        (unit, ctx.into_diagnostics())
    }

    /// Compile every top-level section of `root` into a unit.
    pub fn compile(&self, root: &Node, ctx: &mut CompileContext) -> CompiledUnit {
        ctx.aliases.clear();
        ctx.options.clear();
        let mut unit = CompiledUnit::default();

        for node in root.children() {
            ctx.set_line(node.line_number());
            if !node.is_section() {
                ctx.error("invalid line - all code has to be put into triggers");
                continue;
            }
            let name = node.name().trim();
            if name.eq_ignore_ascii_case(ALIASES) {
                self.aliases_section(node, ctx);
            } else if name.eq_ignore_ascii_case(OPTIONS) {
                options_section(node, ctx);
            } else if name.eq_ignore_ascii_case(VARIABLES) {
                self.variables_section(node, ctx);
            } else if name.matches('"').count() % 2 != 0 {
                ctx.error("invalid use of quotes");
            } else if name
                .get(..8)
                .is_some_and(|head| head.eq_ignore_ascii_case("command "))
            {
                ctx.event = Some(ActiveEvent::command());
                let result = self.services.commands.compile_command(node, ctx);
                ctx.event = None;
                match result {
                    Ok(mut command) => {
                        if command.file.is_none() {
                            command.file = ctx.file.clone();
                        }
                        unit.commands.push(Arc::new(command));
                    }
                    Err(reason) => {
                        ctx.set_line(node.line_number());
                        ctx.error(reason);
                    }
                }
            } else if let Some(trigger) = self.event_section(node, ctx) {
                unit.triggers.push(Arc::new(trigger));
            }
        }

        debug!(
            target: "script",
            file = ?ctx.file.as_deref().map(Path::display),
            "loaded {} and {}",
            plural(unit.triggers.len(), "trigger"),
            plural(unit.commands.len(), "command"),
        );
        unit
    }

    /// Compile a single event section outside of any file.
    pub fn compile_trigger(&self, section: &Node) -> (Option<Trigger>, Diagnostics) {
        let mut ctx = CompileContext::new(None);
        ctx.set_line(section.line_number());
        let trigger = self.event_section(section, &mut ctx);
        (trigger, ctx.into_diagnostics())
    }

    fn event_section(&self, section: &Node, ctx: &mut CompileContext) -> Option<Trigger> {
        let header = section.name().trim();
        let stripped = match header.get(..3) {
            Some(head) if head.eq_ignore_ascii_case("on ") => &header[3..],
            _ => header,
        };
        let text = substitute(stripped, ctx)?;
        let (info, spec) = match self.services.grammar.parse_event(&text, ctx) {
            Ok(parsed) => parsed,
            Err(reason) if reason.is_empty() => {
                ctx.error(format!("can't understand this event: '{header}'"));
                return None;
            }
            Err(reason) => {
                ctx.error(format!("can't understand this event: '{header}' ({reason})"));
                return None;
            }
        };
        debug!(target: "script", "{} ({}):", text, spec.kind);

        ctx.event = Some(ActiveEvent::trigger(spec.clone(), info.event_types.clone()));
        ctx.delay = DelayState::No;
        let body = BlockCompiler::new(self.services.grammar.as_ref()).compile(section, ctx);
        ctx.event = None;
        ctx.delay = DelayState::No;

        Some(Trigger {
            file: ctx.file.clone(),
            name: header.to_owned(),
            event: spec,
            body,
        })
    }

    // ── Special sections ──────────────────────────────────────────────────────

    fn aliases_section(&self, section: &Node, ctx: &mut CompileContext) {
        for node in section.children() {
            ctx.set_line(node.line_number());
            let Some((key, value)) = node.as_entry("=") else {
                ctx.error("invalid line in alias section");
                continue;
            };
            match self.services.classes.resolve_alias(&value) {
                Ok(item_type) => {
                    ctx.aliases.insert(key.to_lowercase(), item_type);
                }
                Err(reason) => ctx.error(reason),
            }
        }
    }

    fn variables_section(&self, section: &Node, ctx: &mut CompileContext) {
        for node in section.children() {
            ctx.set_line(node.line_number());
            let Some((key, value)) = node.as_entry("=") else {
                ctx.error("invalid line in variables");
                continue;
            };
            self.default_variable(&key, &value, ctx);
        }
    }

    /// Store one default variable unless it already exists.
    fn default_variable(&self, key: &str, value: &str, ctx: &mut CompileContext) {
        let classes = &self.services.classes;
        let var = key
            .strip_prefix('{')
            .and_then(|k| k.strip_suffix('}'))
            .unwrap_or(key);

        // At most one `%type%` placeholder, spanning the first to the last `%`.
        let name = match (var.find('%'), var.rfind('%')) {
            (Some(open), Some(close)) if close > open + 1 => {
                let ty = &var[open + 1..close];
                if ty.contains(['{', '}', '%']) {
                    ctx.error(format!("'{var}' is not a valid name for a default variable"));
                    return;
                }
                let Some(class) = classes.class_info_for(ty) else {
                    ctx.error(format!("Can't understand the type '{ty}'"));
                    return;
                };
                format!("{}<{}>{}", &var[..open], class.code_name, &var[close + 1..])
            }
            _ => var.to_owned(),
        };
        if name.contains('%') {
            return;
        }
        if self.services.variables.get(&name).is_some() {
            return;
        }

        let Some(mut parsed) = classes.parse_value(value) else {
            ctx.error(format!("Can't understand the value '{value}'"));
            return;
        };
        if let Some(target) = classes.class_of(&parsed).and_then(|ci| ci.serialize_as.clone()) {
            let Some(as_class) = classes.class_info_for(&target) else {
                ctx.error(format!(
                    "Missing class info for {target}, the class to serialize {} as",
                    parsed.class_name()
                ));
                return;
            };
            let Some(converted) = classes.convert(&parsed, &as_class) else {
                ctx.error(format!("Can't save '{value}' in a variable"));
                return;
            };
            parsed = converted;
        }
        debug!(target: "script", variable = %name, value = %parsed, "default variable");
        self.services.variables.set(&name, parsed);
    }
}

fn options_section(section: &Node, ctx: &mut CompileContext) {
    for node in section.children() {
        ctx.set_line(node.line_number());
        match node.as_entry(":") {
            Some((key, value)) => {
                ctx.options.insert(key, value);
            }
            None => ctx.error("invalid line in options"),
        }
    }
}

/// `1 trigger`, `2 triggers`.
pub(crate) fn plural(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
