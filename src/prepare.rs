//! Preparation of per-gene inputs for the inference tools.
//!
//! Both workflows restrict a species tree, an alignment and a trait table to
//! the species they share. The selection workflow additionally tags every
//! node of the pruned tree as pure (`{T}`) or mixed (`{R}`) with respect to a
//! trait filter.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::data::filter::{matching_taxa, TraitFilter};
use crate::data::loader::{load_trait_table, read_fasta, write_fasta, FastaRecord};
use crate::tree::clade::{classify, tagged_newick, CladeTag};
use crate::tree::newick::{read_tree, to_newick};

/// Input files shared by both workflows.
#[derive(Debug, Clone)]
pub struct PrepareInputs {
    pub tree: PathBuf,
    pub fasta: PathBuf,
    pub traits: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSummary {
    pub species: usize,
    pub pure_leaves: usize,
    pub pure_nodes: usize,
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)
            .with_context(|| format!("creating {}", dir.display())),
        _ => Ok(()),
    }
}

fn warn_difference(what: &str, a: &BTreeSet<String>, b: &BTreeSet<String>) {
    let diff: Vec<&String> = a.symmetric_difference(b).collect();
    if !diff.is_empty() {
        log::warn!("{} species differ between {what}: {diff:?}", diff.len());
    }
}

/// Prune the tree to the shared species, tag every node against `filter` and
/// write the tagged tree and the matching sequences.
///
/// Fails when no species is shared by all three inputs or when every leaf
/// is pure, since the test then has no reference branches.
pub fn prepare_selection(
    inputs: &PrepareInputs,
    filter: &TraitFilter,
    output_tree: &Path,
    output_fasta: &Path,
) -> Result<SelectionSummary> {
    let tree = read_tree(&inputs.tree)?;
    let tree_species: BTreeSet<String> = tree.leaf_names().into_iter().map(String::from).collect();
    log::info!("found {} species in {}", tree_species.len(), inputs.tree.display());

    let sequences = read_fasta(&inputs.fasta)?;
    let fasta_species: BTreeSet<String> = sequences.iter().map(|r| r.id.clone()).collect();
    log::info!("found {} sequences in {}", fasta_species.len(), inputs.fasta.display());
    warn_difference("the fasta and the tree", &fasta_species, &tree_species);

    let traits = load_trait_table(&inputs.traits)?;
    let trait_species = traits.taxa();
    log::info!("found {} species in {}", traits.len(), inputs.traits.display());
    warn_difference("the fasta and the traits", &fasta_species, &trait_species);

    let keep: BTreeSet<String> = tree_species
        .intersection(&trait_species)
        .filter(|s| fasta_species.contains(*s))
        .cloned()
        .collect();
    log::info!("{} species shared by the tree, fasta and traits", keep.len());
    let Some(pruned) = tree.prune(&keep) else {
        bail!("no species shared by the tree, fasta and traits files");
    };

    let selected = matching_taxa(&traits, filter);
    let tags = classify(&pruned, |name| selected.contains(name));
    let leaves = pruned.leaves();
    let pure_leaves = leaves.iter().filter(|&&id| tags.get(id).is_pure()).count();
    let pure_nodes = tags.count(CladeTag::Pure);
    log::info!("{pure_leaves} selected leaves, {pure_nodes} pure nodes");
    if pure_leaves == leaves.len() {
        bail!("every leaf matches the selection; no reference branches left");
    }

    ensure_parent(output_tree)?;
    std::fs::write(output_tree, tagged_newick(&pruned, &tags))
        .with_context(|| format!("writing {}", output_tree.display()))?;
    ensure_parent(output_fasta)?;
    write_fasta(output_fasta, sequences.iter().filter(|r| keep.contains(&r.id)))
        .with_context(|| format!("writing {}", output_fasta.display()))?;

    Ok(SelectionSummary {
        species: keep.len(),
        pure_leaves,
        pure_nodes,
    })
}

/// Output files of [`prepare_alignment`].
#[derive(Debug, Clone)]
pub struct AlignmentOutputs {
    pub tree: PathBuf,
    pub alignment: PathBuf,
    pub traits: PathBuf,
}

/// Prune the tree to the species of the alignment and write the tree, a
/// `"<n> <len>"`-headed alignment and a copy of the trait table.
///
/// The tree, FASTA and trait table must name exactly the same species. An
/// empty FASTA writes nothing and returns `Ok(0)`.
pub fn prepare_alignment(inputs: &PrepareInputs, outputs: &AlignmentOutputs) -> Result<usize> {
    let tree = read_tree(&inputs.tree)?;
    let sequences = read_fasta(&inputs.fasta)?;
    log::info!("found {} sequences in {}", sequences.len(), inputs.fasta.display());
    if sequences.is_empty() {
        log::warn!("{} is empty, nothing to prepare", inputs.fasta.display());
        return Ok(0);
    }

    let fasta_species: BTreeSet<String> = sequences.iter().map(|r| r.id.clone()).collect();
    let tree_species: BTreeSet<String> = tree.leaf_names().into_iter().map(String::from).collect();
    if fasta_species != tree_species {
        bail!(
            "species differ between {} and {}",
            inputs.fasta.display(),
            inputs.tree.display()
        );
    }
    let traits = load_trait_table(&inputs.traits)?;
    if traits.taxa() != fasta_species {
        bail!(
            "species differ between {} and {}",
            inputs.fasta.display(),
            inputs.traits.display()
        );
    }

    let pruned = tree
        .prune(&fasta_species)
        .context("pruned tree has no leaves")?;
    ensure_parent(&outputs.tree)?;
    std::fs::write(&outputs.tree, to_newick(&pruned, false))
        .with_context(|| format!("writing {}", outputs.tree.display()))?;

    ensure_parent(&outputs.alignment)?;
    std::fs::write(&outputs.alignment, alignment_text(&sequences))
        .with_context(|| format!("writing {}", outputs.alignment.display()))?;

    ensure_parent(&outputs.traits)?;
    std::fs::copy(&inputs.traits, &outputs.traits)
        .with_context(|| format!("writing {}", outputs.traits.display()))?;

    Ok(sequences.len())
}

/// `"<n> <len>"` header then one `id sequence` line per record; `!` and `?`
/// become gaps.
fn alignment_text(sequences: &[FastaRecord]) -> String {
    let width = sequences.first().map_or(0, |r| r.seq.len());
    let mut lines = vec![format!("{} {width}", sequences.len())];
    lines.extend(
        sequences
            .iter()
            .map(|r| format!("{} {}", r.id, r.seq.replace(['!', '?'], "-"))),
    );
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::parse_selection;

    fn inputs(dir: &Path, tree: &str, fasta: &str, traits: &str) -> PrepareInputs {
        let paths = PrepareInputs {
            tree: dir.join("in.tree"),
            fasta: dir.join("in.fasta"),
            traits: dir.join("in.tsv"),
        };
        std::fs::write(&paths.tree, tree).unwrap();
        std::fs::write(&paths.fasta, fasta).unwrap();
        std::fs::write(&paths.traits, traits).unwrap();
        paths
    }

    const TRAITS: &str = "TaxonName\tAquatic_adaptation\n\
                          Orcinus_orca\t4\n\
                          Phoca_vitulina\t4\n\
                          Homo_sapiens\t0\n\
                          Mus_musculus\t0\n";

    #[test]
    fn selection_tags_and_prunes() {
        let dir = tempfile::tempdir().unwrap();
        let inp = inputs(
            dir.path(),
            "(((Orcinus_orca:1,Phoca_vitulina:1)Aquatic:1,Homo_sapiens:2)Boreo:1,(Mus_musculus:1,Rattus:1)Rod:1);",
            ">Orcinus_orca\nACGT\n>Phoca_vitulina\nACGA\n>Homo_sapiens\nACGG\n>Mus_musculus\nAC!T\n",
            TRAITS,
        );
        let out_tree = dir.path().join("out/sel.tree");
        let out_fasta = dir.path().join("out/sel.fasta");
        let filter = parse_selection("Aquatic_adaptation=4").unwrap();

        let summary = prepare_selection(&inp, &filter, &out_tree, &out_fasta).unwrap();
        assert_eq!(summary.species, 4);
        assert_eq!(summary.pure_leaves, 2);
        assert_eq!(summary.pure_nodes, 3);

        let tree = std::fs::read_to_string(&out_tree).unwrap();
        assert_eq!(
            tree,
            "(((Orcinus_orca{T}:1,Phoca_vitulina{T}:1)Aquatic{T}:1,Homo_sapiens{R}:2)Boreo{R}:1,Mus_musculus{R}:2){R};"
        );
        let fasta = read_fasta(&out_fasta).unwrap();
        assert_eq!(fasta.len(), 4);
    }

    #[test]
    fn selection_without_shared_species_fails() {
        let dir = tempfile::tempdir().unwrap();
        let inp = inputs(dir.path(), "(a,b);", ">c\nAC\n", TRAITS);
        let filter = parse_selection("Aquatic_adaptation=4").unwrap();
        let err = prepare_selection(&inp, &filter, &dir.path().join("t"), &dir.path().join("f"))
            .unwrap_err();
        assert!(err.to_string().contains("no species shared"));
    }

    #[test]
    fn selection_needs_reference_leaves() {
        let dir = tempfile::tempdir().unwrap();
        let inp = inputs(
            dir.path(),
            "(Orcinus_orca,Phoca_vitulina);",
            ">Orcinus_orca\nA\n>Phoca_vitulina\nA\n",
            TRAITS,
        );
        let filter = parse_selection("Aquatic_adaptation=4").unwrap();
        assert!(prepare_selection(&inp, &filter, &dir.path().join("t"), &dir.path().join("f")).is_err());
    }

    #[test]
    fn alignment_workflow_writes_phylip_like_file() {
        let dir = tempfile::tempdir().unwrap();
        let inp = inputs(
            dir.path(),
            "((Orcinus_orca:1,Phoca_vitulina:1):1,(Homo_sapiens:1,Mus_musculus:1):1);",
            ">Orcinus_orca\nAC?T\n>Phoca_vitulina\nACGA\n>Homo_sapiens\nACGG\n>Mus_musculus\nAC!T\n",
            TRAITS,
        );
        let outputs = AlignmentOutputs {
            tree: dir.path().join("bc/placnr.rootree"),
            alignment: dir.path().join("bc/placnr.ali"),
            traits: dir.path().join("bc/placnr.traits"),
        };
        assert_eq!(prepare_alignment(&inp, &outputs).unwrap(), 4);

        let ali = std::fs::read_to_string(&outputs.alignment).unwrap();
        let lines: Vec<&str> = ali.lines().collect();
        assert_eq!(lines[0], "4 4");
        assert_eq!(lines[1], "Orcinus_orca AC-T");
        assert_eq!(lines[4], "Mus_musculus AC-T");
        assert_eq!(std::fs::read_to_string(&outputs.traits).unwrap(), TRAITS);
        assert!(std::fs::read_to_string(&outputs.tree)
            .unwrap()
            .starts_with("((Orcinus_orca:1"));
    }

    #[test]
    fn alignment_workflow_rejects_mismatched_species() {
        let dir = tempfile::tempdir().unwrap();
        let inp = inputs(dir.path(), "(Orcinus_orca,Homo_sapiens);", ">Orcinus_orca\nA\n", TRAITS);
        let outputs = AlignmentOutputs {
            tree: dir.path().join("t"),
            alignment: dir.path().join("a"),
            traits: dir.path().join("r"),
        };
        assert!(prepare_alignment(&inp, &outputs).is_err());
    }

    #[test]
    fn empty_fasta_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let inp = inputs(dir.path(), "(a,b);", "", TRAITS);
        let outputs = AlignmentOutputs {
            tree: dir.path().join("t"),
            alignment: dir.path().join("a"),
            traits: dir.path().join("r"),
        };
        assert_eq!(prepare_alignment(&inp, &outputs).unwrap(), 0);
        assert!(!outputs.alignment.exists());
    }
}
