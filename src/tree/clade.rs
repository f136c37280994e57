use super::newick::to_newick_with;
use super::{NodeId, Tree};

/// Whether every leaf below a node satisfies the trait predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CladeTag {
    Pure,
    Mixed,
}

impl CladeTag {
    /// Label suffix used in prepared trees: `{T}` for pure, `{R}` for mixed.
    pub fn suffix(self) -> &'static str {
        match self {
            CladeTag::Pure => "{T}",
            CladeTag::Mixed => "{R}",
        }
    }

    pub fn is_pure(self) -> bool {
        self == CladeTag::Pure
    }
}

/// One tag per node of the tree it was computed from, indexed by [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CladeTags {
    tags: Vec<CladeTag>,
}

impl CladeTags {
    pub fn get(&self, id: NodeId) -> CladeTag {
        self.tags[id.index()]
    }

    pub fn count(&self, tag: CladeTag) -> usize {
        self.tags.iter().filter(|&&t| t == tag).count()
    }
}

/// Tag every node in one postorder pass.
///
/// A leaf is pure iff `predicate(leaf name)`; an internal node is pure iff all
/// of its children are.
pub fn classify<P>(tree: &Tree, predicate: P) -> CladeTags
where
    P: Fn(&str) -> bool,
{
    let mut tags = vec![CladeTag::Mixed; tree.len()];
    for id in tree.postorder() {
        let pure = if tree.is_leaf(id) {
            predicate(&tree.node(id).name)
        } else {
            tree.children(id)
                .iter()
                .all(|&child| tags[child.index()].is_pure())
        };
        tags[id.index()] = if pure { CladeTag::Pure } else { CladeTag::Mixed };
    }
    CladeTags { tags }
}

/// Newick text where every node name carries its tag suffix.
pub fn tagged_newick(tree: &Tree, tags: &CladeTags) -> String {
    to_newick_with(tree, false, |id, node| {
        format!("{}{}", node.name, tags.get(id).suffix())
    })
}
