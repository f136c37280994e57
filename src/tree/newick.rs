//! Newick reader and writer with NHX annotations.
//!
//! Accepted input: internal node names, single-quoted names (`''` escapes a
//! quote), branch lengths and bracketed comments. Comments of the form
//! `[&&NHX:key=value:...]` or `[&key=value,...]` become node features; any
//! other comment is skipped.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::path::Path;

use crate::error::{read_text, RecordError, RecordResult};

use super::{Node, NodeId, Tree};

/// Parse one tree terminated by `;`.
pub fn parse_newick(text: &str) -> Result<Tree, String> {
    let mut parser = Parser {
        src: text,
        bytes: text.as_bytes(),
        pos: 0,
    };
    if parser.peek().is_none() {
        return Err("empty tree".to_string());
    }
    let tree = parser.parse_tree()?;
    match parser.peek() {
        Some(b';') => parser.pos += 1,
        Some(c) => return Err(parser.error(format!("unexpected '{}'", c as char))),
        None => return Err(parser.error("missing ';'")),
    }
    if parser.peek().is_some() {
        return Err(parser.error("trailing data after ';'"));
    }
    Ok(tree)
}

/// Read and parse the tree file at `path`.
pub fn read_tree(path: &Path) -> RecordResult<Tree> {
    let text = read_text(path)?;
    parse_newick(&text).map_err(|msg| RecordError::format(path, msg))
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

fn is_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b',' | b':' | b';' | b'[' | b']') || c.is_ascii_whitespace()
}

impl<'a> Parser<'a> {
    fn skip_ws(&mut self) {
        while self.bytes.get(self.pos).is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.bytes.get(self.pos).copied()
    }

    fn error(&self, msg: impl std::fmt::Display) -> String {
        format!("{msg} at byte {}", self.pos)
    }

    /// Nodes are created in preorder. Nesting depth is bounded by memory
    /// only: groups are tracked through the parent links of the tree itself.
    fn parse_tree(&mut self) -> Result<Tree, String> {
        let mut tree = Tree::new(Node::default());
        let mut current = tree.root();
        loop {
            while self.peek() == Some(b'(') {
                self.pos += 1;
                current = tree.add_child(current, Node::default());
            }
            self.parse_label(tree.node_mut(current))?;

            // close groups until a sibling follows or the root is labelled
            loop {
                let Some(parent) = tree.parent(current) else {
                    return Ok(tree);
                };
                match self.peek() {
                    Some(b',') => {
                        self.pos += 1;
                        current = tree.add_child(parent, Node::default());
                        break;
                    }
                    Some(b')') => {
                        self.pos += 1;
                        current = parent;
                        self.parse_label(tree.node_mut(current))?;
                    }
                    Some(c) => return Err(self.error(format!("unexpected '{}'", c as char))),
                    None => return Err(self.error("unbalanced '('")),
                }
            }
        }
    }

    fn parse_label(&mut self, node: &mut Node) -> Result<(), String> {
        node.name = self.parse_name()?;
        loop {
            match self.peek() {
                Some(b':') => {
                    self.pos += 1;
                    node.length = Some(self.parse_length()?);
                }
                Some(b'[') => self.parse_comment(node)?,
                _ => return Ok(()),
            }
        }
    }

    fn parse_name(&mut self) -> Result<String, String> {
        if self.peek() != Some(b'\'') {
            return Ok(self.take_token().to_string());
        }
        self.pos += 1;
        let src = self.src;
        let mut name = String::new();
        loop {
            let rest = &src[self.pos..];
            let end = rest
                .find('\'')
                .ok_or_else(|| self.error("unterminated quoted name"))?;
            name.push_str(&rest[..end]);
            self.pos += end + 1;
            if self.bytes.get(self.pos) == Some(&b'\'') {
                name.push('\'');
                self.pos += 1;
            } else {
                return Ok(name);
            }
        }
    }

    fn take_token(&mut self) -> &'a str {
        let src = self.src;
        let start = self.pos;
        while self.bytes.get(self.pos).is_some_and(|&c| !is_delimiter(c)) {
            self.pos += 1;
        }
        &src[start..self.pos]
    }

    fn parse_length(&mut self) -> Result<f64, String> {
        self.skip_ws();
        let start = self.pos;
        let tok = self.take_token();
        tok.parse::<f64>()
            .map_err(|_| format!("invalid branch length '{tok}' at byte {start}"))
    }

    fn parse_comment(&mut self, node: &mut Node) -> Result<(), String> {
        let src = self.src;
        let open = self.pos;
        let end = src[open..]
            .find(']')
            .map(|i| open + i)
            .ok_or_else(|| self.error("unterminated '['"))?;
        let body = &src[open + 1..end];
        self.pos = end + 1;

        let (pairs, sep) = if let Some(rest) = body.strip_prefix("&&NHX") {
            (rest, ':')
        } else if let Some(rest) = body.strip_prefix('&') {
            (rest, ',')
        } else {
            return Ok(());
        };
        for pair in pairs.split(sep).map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("malformed annotation '{pair}' at byte {open}"))?;
            node.features
                .insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Newick text with every node name; NHX features when `with_features`.
pub fn to_newick(tree: &Tree, with_features: bool) -> String {
    to_newick_with(tree, with_features, |_, node| node.name.clone())
}

/// Like [`to_newick`] but with node labels supplied by `label`.
pub fn to_newick_with<F>(tree: &Tree, with_features: bool, label: F) -> String
where
    F: Fn(NodeId, &Node) -> String,
{
    let mut out = String::new();
    write_tree(tree, with_features, &label, &mut out);
    out.push(';');
    out
}

enum Step {
    Open(NodeId),
    Close(NodeId),
    Separator,
}

fn write_tree<F>(tree: &Tree, with_features: bool, label: &F, out: &mut String)
where
    F: Fn(NodeId, &Node) -> String,
{
    let mut stack = vec![Step::Open(tree.root())];
    while let Some(step) = stack.pop() {
        match step {
            Step::Open(id) => {
                let children = tree.children(id);
                if children.is_empty() {
                    write_label(tree, id, with_features, label, out);
                    continue;
                }
                out.push('(');
                stack.push(Step::Close(id));
                for (i, &child) in children.iter().enumerate().rev() {
                    stack.push(Step::Open(child));
                    if i > 0 {
                        stack.push(Step::Separator);
                    }
                }
            }
            Step::Close(id) => {
                out.push(')');
                write_label(tree, id, with_features, label, out);
            }
            Step::Separator => out.push(','),
        }
    }
}

fn write_label<F>(tree: &Tree, id: NodeId, with_features: bool, label: &F, out: &mut String)
where
    F: Fn(NodeId, &Node) -> String,
{
    let node = tree.node(id);
    out.push_str(&quote_name(&label(id, node)));
    if let Some(length) = node.length {
        let _ = write!(out, ":{length}");
    }
    if with_features && !node.features.is_empty() {
        out.push_str("[&&NHX");
        for (key, value) in &node.features {
            let _ = write!(out, ":{key}={value}");
        }
        out.push(']');
    }
}

fn quote_name(name: &str) -> Cow<'_, str> {
    if name.bytes().any(|c| is_delimiter(c) || c == b'\'') {
        Cow::Owned(format!("'{}'", name.replace('\'', "''")))
    } else {
        Cow::Borrowed(name)
    }
}
