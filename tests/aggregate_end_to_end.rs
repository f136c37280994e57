use std::path::Path;

use phylo_merge::aggregate::{aggregate, discover_genes, AggregateConfig, SUMMARY_COLUMNS};
use phylo_merge::data::model::MetadataValue;
use phylo_merge::output::write_table;

const COV_AB: &str = "\
2
A
B

covariances

1.0 0.5
0.5 1.0

correlation coefficients

1.0 0.9
0.9 1.0

posterior probabilities of a positive coefficient

- 0.97
0.97 -

precisions

2.5 -0.3
-0.3 4

partial correlation coefficients

1 0.12
0.12 1

posterior probabilities of a positive partial coefficient

- 0.8
0.8 -
";

fn write_gene(root: &Path, id: &str, tree: &str, cov: Option<&str>, traits: &str) {
    let dir = root.join(id);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("nodeomega_1.Omega.nhx"), tree).unwrap();
    std::fs::write(dir.join("placnr.ali"), "3 900\nsp1 ACG\n").unwrap();
    std::fs::write(dir.join("placnr.traits"), traits).unwrap();
    if let Some(cov) = cov {
        std::fs::write(dir.join("nodeomega_1.cov"), cov).unwrap();
    }
}

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let traits = "TaxonName\thistorical_Ne\nsp1\t100\nsp2\tNA\nsp3\t300\n";
    write_gene(
        dir.path(),
        "gene_b",
        "((sp1:1[&&NHX:Omega=0.5],sp2:1[&&NHX:Omega=1.5]):1[&&NHX:Omega=1.0],sp3:1[&&NHX:Omega=0.2]);",
        Some(COV_AB),
        traits,
    );
    write_gene(
        dir.path(),
        "gene_a",
        "((sp1:1[&&NHX:Omega=0.1],sp4:1[&&NHX:Omega=0.3]):1,sp3:1[&&NHX:Omega=0.2]);",
        Some(COV_AB),
        traits,
    );
    write_gene(
        dir.path(),
        "gene_c",
        "(sp1:1[&&NHX:Omega=0.1],sp2:1[&&NHX:Omega=0.3]);",
        None,
        traits,
    );
    dir
}

#[test]
fn summary_has_pair_columns_without_diagonal() {
    let dir = fixture();
    let genes = discover_genes(dir.path()).unwrap();
    let result = aggregate(dir.path(), &genes, &AggregateConfig::default()).unwrap();
    let summary = &result.summary;

    assert_eq!(summary.get(0, "A_B_cov"), Some(&MetadataValue::Float(0.5)));
    assert_eq!(summary.get(0, "A_B_cor"), Some(&MetadataValue::Float(0.9)));
    assert_eq!(summary.get(0, "A_B_ppos_pcor"), Some(&MetadataValue::Float(0.8)));
    assert!(summary.column("A_A_cov").is_none());
    assert!(summary.column("B_A_cov").is_none());
    assert_eq!(&summary.columns()[..SUMMARY_COLUMNS.len()], SUMMARY_COLUMNS);
}

#[test]
fn gene_without_matrix_is_left_out_of_both_tables() {
    let dir = fixture();
    let genes = discover_genes(dir.path()).unwrap();
    assert_eq!(genes.len(), 3);
    let result = aggregate(dir.path(), &genes, &AggregateConfig::default()).unwrap();

    assert_eq!(result.summary.n_rows(), 2);
    assert_eq!(result.species.n_rows(), 2);
    assert_eq!(result.report.processed, vec!["gene_a", "gene_b"]);
    assert_eq!(result.report.skipped.len(), 1);
    assert_eq!(result.report.skipped[0].id, "gene_c");
    assert_eq!(result.report.skipped[0].kind, "not_found");

    let ids: Vec<String> = result
        .summary
        .column("id")
        .unwrap()
        .iter()
        .map(|v| v.to_string())
        .collect();
    assert_eq!(ids, vec!["gene_a", "gene_b"]);
}

#[test]
fn rate_summary_and_traits() {
    let dir = fixture();
    let genes = discover_genes(dir.path()).unwrap();
    let result = aggregate(dir.path(), &genes, &AggregateConfig::default()).unwrap();
    let summary = &result.summary;

    // gene_b: 0.5, 1.5, 1.0, 0.2
    assert_eq!(summary.get(1, "nb_branches"), Some(&MetadataValue::Integer(4)));
    assert_eq!(summary.get(1, "nb_omega_geq1"), Some(&MetadataValue::Integer(2)));
    assert_eq!(summary.get(1, "mean_omega"), Some(&MetadataValue::Float(0.8)));
    assert_eq!(summary.get(1, "nb_species"), Some(&MetadataValue::Integer(3)));
    assert_eq!(summary.get(1, "nb_sites"), Some(&MetadataValue::Integer(900)));
    assert_eq!(summary.get(1, "historical_Ne"), Some(&MetadataValue::Float(200.0)));
    assert_eq!(summary.get(1, "nb_ne"), Some(&MetadataValue::Integer(2)));
}

#[test]
fn species_table_is_the_union_with_missing_cells() {
    let dir = fixture();
    let genes = discover_genes(dir.path()).unwrap();
    let result = aggregate(dir.path(), &genes, &AggregateConfig::default()).unwrap();
    let species = &result.species;

    assert_eq!(species.columns(), ["id", "sp1", "sp2", "sp3", "sp4"]);
    // gene_a has no sp2, gene_b has no sp4
    assert_eq!(species.get(0, "sp2"), Some(&MetadataValue::Null));
    assert_eq!(species.get(0, "sp4"), Some(&MetadataValue::Float(0.3)));
    assert_eq!(species.get(1, "sp4"), Some(&MetadataValue::Null));
    assert_eq!(species.get(1, "sp2"), Some(&MetadataValue::Float(1.5)));

    let out = dir.path().join("omega.tsv");
    write_table(species, &out).unwrap();
    let text = std::fs::read_to_string(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[1], "gene_a\t0.1\tNA\t0.2\t0.3");
}

#[test]
fn traits_can_be_disabled() {
    let dir = fixture();
    let genes = discover_genes(dir.path()).unwrap();
    let config = AggregateConfig {
        trait_column: None,
        ..AggregateConfig::default()
    };
    let result = aggregate(dir.path(), &genes, &config).unwrap();
    assert!(result.summary.column("historical_Ne").is_none());
    assert!(result.summary.column("nb_ne").is_none());
}

#[test]
fn malformed_matrix_skips_the_gene() {
    let dir = fixture();
    let broken = COV_AB.replace("0.5 1.0", "0.5");
    std::fs::write(dir.path().join("gene_b/nodeomega_1.cov"), broken).unwrap();

    let genes = discover_genes(dir.path()).unwrap();
    let result = aggregate(dir.path(), &genes, &AggregateConfig::default()).unwrap();
    assert_eq!(result.report.processed, vec!["gene_a"]);
    let kinds: Vec<&str> = result.report.skipped.iter().map(|s| s.kind).collect();
    assert_eq!(kinds, vec!["format", "not_found"]);
    assert_eq!(result.species.n_rows(), 1);
}

#[test]
fn missing_rate_tree_skips_the_gene() {
    let dir = fixture();
    std::fs::remove_file(dir.path().join("gene_b/nodeomega_1.Omega.nhx")).unwrap();

    let genes = discover_genes(dir.path()).unwrap();
    let result = aggregate(dir.path(), &genes, &AggregateConfig::default()).unwrap();
    assert_eq!(result.report.processed, vec!["gene_a"]);
    assert_eq!(result.report.skipped[0].id, "gene_b");
    assert_eq!(result.report.skipped[0].kind, "not_found");
    assert_eq!(result.summary.n_rows(), 1);
    assert_eq!(result.species.columns(), ["id", "sp1", "sp3", "sp4"]);
}

#[test]
fn malformed_rate_tree_skips_the_gene() {
    let dir = fixture();
    std::fs::write(dir.path().join("gene_b/nodeomega_1.Omega.nhx"), "((sp1,sp2);").unwrap();

    let genes = discover_genes(dir.path()).unwrap();
    let result = aggregate(dir.path(), &genes, &AggregateConfig::default()).unwrap();
    assert_eq!(result.report.processed, vec!["gene_a"]);
    assert_eq!(result.report.skipped[0].kind, "format");
    assert_eq!(result.species.n_rows(), 1);
}

#[test]
fn leaf_named_like_the_id_column_skips_the_gene() {
    let dir = fixture();
    std::fs::write(
        dir.path().join("gene_b/nodeomega_1.Omega.nhx"),
        "(id:1[&&NHX:Omega=0.5],sp2:1[&&NHX:Omega=1.5]);",
    )
    .unwrap();

    let genes = discover_genes(dir.path()).unwrap();
    let result = aggregate(dir.path(), &genes, &AggregateConfig::default()).unwrap();
    assert_eq!(result.report.processed, vec!["gene_a"]);
    assert_eq!(result.report.skipped[0].id, "gene_b");
    assert_eq!(result.report.skipped[0].kind, "format");
    let ids: Vec<String> = result.species.column("id").unwrap().iter().map(|v| v.to_string()).collect();
    assert_eq!(ids, vec!["gene_a"]);
}

#[test]
fn deeply_nested_tree_does_not_abort_the_run() {
    let dir = fixture();
    let depth = 200_000;
    let tree = format!("{}a{};", "(".repeat(depth), ",b)".repeat(depth));
    std::fs::write(dir.path().join("gene_b/nodeomega_1.Omega.nhx"), tree).unwrap();

    let genes = discover_genes(dir.path()).unwrap();
    let result = aggregate(dir.path(), &genes, &AggregateConfig::default()).unwrap();
    assert_eq!(result.report.processed, vec!["gene_a", "gene_b"]);
    assert_eq!(result.summary.get(1, "nb_branches"), Some(&MetadataValue::Integer(0)));
    assert_eq!(result.summary.get(1, "mean_omega"), Some(&MetadataValue::Null));
}
