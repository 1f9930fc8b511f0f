//! `{@name}` option substitution.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::context::CompileContext;

fn option_ref() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{@(.+?)\}").expect("static option regex"))
}

/// Replace every `{@name}` in `text` with the value from the `options`
/// section.
///
/// An undefined name reports one error and yields `None`; the caller skips
/// the line.
pub fn substitute(text: &str, ctx: &mut CompileContext) -> Option<String> {
    if !text.contains("{@") {
        return Some(text.to_owned());
    }
    let mut missing: Option<String> = None;
    let out = option_ref().replace_all(text, |caps: &Captures<'_>| {
        match ctx.options.get(&caps[1]) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| caps[0].to_owned());
                String::new()
            }
        }
    });
    if let Some(reference) = missing {
        ctx.error(format!("undefined option {reference}"));
        return None;
    }
    Some(out.into_owned())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
