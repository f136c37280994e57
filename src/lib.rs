//! Aggregation of per-gene phylogenetic comparative-method output.
//!
//! * [`data`] – matrix files, trait tables, alignments and the wide output table
//! * [`tree`] – Newick/NHX trees, branch-rate extraction and clade tagging
//! * [`aggregate`] – per-gene records merged into cross-gene tables
//! * [`prepare`] – pruning and tagging of inputs before inference
//! * [`output`] – TSV / Parquet writers

pub mod aggregate;
pub mod data;
pub mod error;
pub mod output;
pub mod prepare;
pub mod tree;
