use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{RecordError, RecordResult};

use super::newick::read_tree;
use super::Tree;

/// Default name of the per-branch rate annotation.
pub const DEFAULT_RATE_FEATURE: &str = "Omega";

/// Per-branch values of one annotation, read from a tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchValues {
    /// Leaf name → value, for leaves carrying the annotation.
    pub by_leaf: BTreeMap<String, f64>,
    /// Every annotated node, internal or leaf, in preorder.
    pub values: Vec<f64>,
}

impl BranchValues {
    pub fn count(&self) -> usize {
        self.values.len()
    }

    /// `None` when no node carries the annotation.
    pub fn mean(&self) -> Option<f64> {
        (!self.values.is_empty()).then(|| self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    pub fn count_at_least(&self, threshold: f64) -> usize {
        self.values.iter().filter(|&&v| v >= threshold).count()
    }
}

/// Collect the numeric `feature` of every node of `tree`.
///
/// `path` is only used in error messages. A non-numeric value or a leaf name
/// seen twice is a format error.
pub fn extract_values(tree: &Tree, feature: &str, path: &Path) -> RecordResult<BranchValues> {
    let mut out = BranchValues::default();
    for id in tree.preorder() {
        let node = tree.node(id);
        let Some(raw) = node.features.get(feature) else {
            continue;
        };
        let value: f64 = raw.trim().parse().map_err(|_| {
            RecordError::format(
                path,
                format!("node '{}': {feature}='{raw}' is not a number", node.name),
            )
        })?;
        out.values.push(value);
        if tree.is_leaf(id) && out.by_leaf.insert(node.name.clone(), value).is_some() {
            return Err(RecordError::format(
                path,
                format!("leaf '{}' appears more than once", node.name),
            ));
        }
    }
    log::debug!(
        "{}: {} annotated nodes, {} annotated leaves",
        path.display(),
        out.values.len(),
        out.by_leaf.len()
    );
    Ok(out)
}

/// Load the annotated tree at `path` and extract `feature` from it.
pub fn read_branch_values(path: &Path, feature: &str) -> RecordResult<BranchValues> {
    let tree = read_tree(path)?;
    extract_values(&tree, feature, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::newick::parse_newick;

    fn extract(text: &str) -> RecordResult<BranchValues> {
        let tree = parse_newick(text).unwrap();
        extract_values(&tree, DEFAULT_RATE_FEATURE, Path::new("t.nhx"))
    }

    #[test]
    fn collects_leaf_and_internal_values() {
        let v = extract(
            "((a:1[&&NHX:Omega=0.5],b:1[&&NHX:Omega=1.5])ab:1[&&NHX:Omega=1.0],c:1[&&NHX:Omega=0.2]);",
        )
        .unwrap();
        assert_eq!(v.count(), 4);
        assert_eq!(v.count_at_least(1.0), 2);
        assert!((v.mean().unwrap() - 0.8).abs() < 1e-12);
        assert_eq!(v.by_leaf.len(), 3);
        assert_eq!(v.by_leaf["b"], 1.5);
        assert!(!v.by_leaf.contains_key("ab"));
    }

    #[test]
    fn unannotated_nodes_are_ignored() {
        let v = extract("(a[&&NHX:Omega=2],b);").unwrap();
        assert_eq!(v.values, vec![2.0]);
        assert!(!v.by_leaf.contains_key("b"));
        assert_eq!(extract("(a,b);").unwrap().mean(), None);
    }

    #[test]
    fn non_numeric_annotation_is_a_format_error() {
        let err = extract("(a[&&NHX:Omega=high],b);").unwrap_err();
        assert_eq!(err.kind(), "format");
        assert!(err.to_string().contains("Omega='high'"));
    }

    #[test]
    fn duplicate_leaf_is_a_format_error() {
        let err = extract("(a[&&NHX:Omega=1],a[&&NHX:Omega=2]);").unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn missing_tree_is_not_found() {
        let err = read_branch_values(Path::new("/no/such/tree.nhx"), "Omega").unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
