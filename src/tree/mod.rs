//! Rooted trees stored in an arena, plus the algorithms that walk them.
//!
//! ```text
//!  .nhx / .rootree text
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  newick   │  parse / write, NHX features
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────┐      ┌──────────┐
//!   │ Tree  │ ───▶ │ extract   │  per-branch annotation values
//!   └──────┘      └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  clade    │  pure / mixed tag per node
//!   └──────────┘
//! ```

use std::collections::{BTreeMap, BTreeSet};

pub mod clade;
pub mod extract;
pub mod newick;

// ---------------------------------------------------------------------------
// Node / Tree
// ---------------------------------------------------------------------------

/// Index of a node in its [`Tree`]. Only meaningful for the tree that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub name: String,
    /// Branch length to the parent.
    pub length: Option<f64>,
    /// Annotations such as `Omega`, kept as raw text.
    pub features: BTreeMap<String, String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn named(name: impl Into<String>) -> Self {
        Node {
            name: name.into(),
            ..Node::default()
        }
    }

    pub fn with_length(mut self, length: f64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_feature(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.features.insert(key.into(), value.into());
        self
    }
}

/// A rooted tree. Every node is owned by the arena; links are [`NodeId`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    pub fn new(root: Node) -> Self {
        Tree {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                ..root
            }],
            root: NodeId(0),
        }
    }

    /// Attach `node` as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            ..node
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: a tree has at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes[id.0].children.is_empty()
    }

    /// Parents before children, children left to right.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        order
    }

    /// Children before parents; the root comes last.
    pub fn postorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().copied());
        }
        order.reverse();
        order
    }

    /// Leaves, left to right.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.preorder()
            .into_iter()
            .filter(|&id| self.is_leaf(id))
            .collect()
    }

    pub fn leaf_names(&self) -> Vec<&str> {
        self.leaves()
            .into_iter()
            .map(|id| self.nodes[id.0].name.as_str())
            .collect()
    }

    /// Copy of the tree restricted to the leaves named in `keep`.
    ///
    /// Internal nodes left without leaves are dropped and internal nodes left
    /// with a single child are collapsed into it, adding their branch length
    /// to the child's. Returns `None` if no leaf survives.
    pub fn prune(&self, keep: &BTreeSet<String>) -> Option<Tree> {
        let mut nodes: Vec<Node> = Vec::new();
        // copy of each original node, filled children first
        let mut copied: Vec<Option<NodeId>> = vec![None; self.nodes.len()];

        for id in self.postorder() {
            let node = &self.nodes[id.0];
            if node.children.is_empty() {
                if keep.contains(&node.name) {
                    nodes.push(Node {
                        parent: None,
                        children: Vec::new(),
                        ..node.clone()
                    });
                    copied[id.0] = Some(NodeId(nodes.len() - 1));
                }
                continue;
            }

            let kept: Vec<NodeId> = node
                .children
                .iter()
                .filter_map(|child| copied[child.0])
                .collect();
            copied[id.0] = match kept.len() {
                0 => None,
                1 => {
                    let only = kept[0];
                    let child = &mut nodes[only.0];
                    child.length = match (node.length, child.length) {
                        (None, None) => None,
                        (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
                    };
                    Some(only)
                }
                _ => {
                    let new_id = NodeId(nodes.len());
                    for child in &kept {
                        nodes[child.0].parent = Some(new_id);
                    }
                    nodes.push(Node {
                        name: node.name.clone(),
                        length: node.length,
                        features: node.features.clone(),
                        parent: None,
                        children: kept,
                    });
                    Some(new_id)
                }
            };
        }

        let root = copied[self.root.0]?;
        nodes[root.0].parent = None;
        Some(Tree { nodes, root })
    }
}
