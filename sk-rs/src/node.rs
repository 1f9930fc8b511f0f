//! Script node tree.
//!
//! A script file arrives already split into an ordered tree: sections (a
//! header line ending in `:` followed by an indented body), `key: value`
//! entries, and plain lines.  Comments and blank lines are gone by the time
//! the tree reaches the compiler.  Turning text into this tree is the job of
//! a [`NodeReader`](crate::services::NodeReader).

/// One node of a script's tree.  Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// `name:` followed by an indented block.
    Section {
        name: String,
        children: Vec<Node>,
        line: usize,
    },
    /// `key: value`
    Entry {
        key: String,
        value: String,
        line: usize,
    },
    /// Any other line.
    Line { text: String, line: usize },
}

impl Node {
    pub fn section(name: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Section {
            name: name.into(),
            children,
            line: 0,
        }
    }

    pub fn entry(key: impl Into<String>, value: impl Into<String>) -> Self {
        Node::Entry {
            key: key.into(),
            value: value.into(),
            line: 0,
        }
    }

    pub fn line(text: impl Into<String>) -> Self {
        Node::Line {
            text: text.into(),
            line: 0,
        }
    }

    /// Set the node's line number (builder style).
    pub fn at(mut self, lineno: usize) -> Self {
        match &mut self {
            Node::Section { line, .. } | Node::Entry { line, .. } | Node::Line { line, .. } => {
                *line = lineno
            }
        }
        self
    }

    /// Section header, entry key, or line text.
    pub fn name(&self) -> &str {
        match self {
            Node::Section { name, .. } => name,
            Node::Entry { key, .. } => key,
            Node::Line { text, .. } => text,
        }
    }

    pub fn line_number(&self) -> usize {
        match self {
            Node::Section { line, .. } | Node::Entry { line, .. } | Node::Line { line, .. } => *line,
        }
    }

    /// Children of a section; empty for every other node.
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Section { children, .. } => children,
            _ => &[],
        }
    }

    pub fn is_section(&self) -> bool {
        matches!(self, Node::Section { .. })
    }

    pub fn is_entry(&self) -> bool {
        matches!(self, Node::Entry { .. })
    }

    /// View this node as a `(key, value)` pair.
    ///
    /// Entries are returned as-is.  A plain line is split at the first
    /// `separator` with both halves trimmed, which is how the `aliases` and
    /// `variables` sections read their `name = value` lines.  Sections and
    /// lines without the separator yield `None`.
    pub fn as_entry(&self, separator: &str) -> Option<(String, String)> {
        match self {
            Node::Entry { key, value, .. } => Some((key.clone(), value.clone())),
            Node::Line { text, .. } => {
                let (k, v) = text.split_once(separator)?;
                let k = k.trim();
                if k.is_empty() {
                    return None;
                }
                Some((k.to_owned(), v.trim().to_owned()))
            }
            Node::Section { .. } => None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_passes_through() {
        let n = Node::entry("color", "red");
        assert_eq!(n.as_entry("="), Some(("color".into(), "red".into())));
    }

    #[test]
    fn line_split_at_separator() {
        let n = Node::line("  sword = diamond sword ");
        assert_eq!(
            n.as_entry("="),
            Some(("sword".into(), "diamond sword".into()))
        );
    }

    #[test]
    fn line_without_separator_is_not_an_entry() {
        assert_eq!(Node::line("just text").as_entry("="), None);
        assert_eq!(Node::line(" = value").as_entry("="), None);
    }

    #[test]
    fn section_is_not_an_entry() {
        let n = Node::section("on join", vec![]);
        assert!(n.as_entry(":").is_none());
        assert!(n.is_section());
    }

    #[test]
    fn line_numbers() {
        let n = Node::line("x").at(12);
        assert_eq!(n.line_number(), 12);
        assert!(Node::line("y").children().is_empty());
    }
}
