use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use phylo_merge::aggregate::GeneLayout;
use phylo_merge::data::matrix::write_covar;
use phylo_merge::data::model::{GeneCovarRecord, LabelSet, NamedMatrix, StatKind};
use phylo_merge::tree::newick::to_newick;
use phylo_merge::tree::{Node, NodeId, Tree};

const SPECIES: [&str; 10] = [
    "Homo_sapiens",
    "Pan_troglodytes",
    "Mus_musculus",
    "Rattus_norvegicus",
    "Bos_taurus",
    "Orcinus_orca",
    "Phoca_vitulina",
    "Canis_lupus",
    "Felis_catus",
    "Loxodonta_africana",
];

const LABELS: [&str; 3] = ["dNdS", "historical_Ne", "generation_time"];

/// Write a directory of synthetic gene folders.
#[derive(Parser, Debug)]
struct Cli {
    /// Destination directory, created if missing
    #[arg(long, default_value = "sample_data")]
    output_dir: PathBuf,
    #[arg(long, default_value_t = 20)]
    genes: usize,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Every n-th gene gets no matrix file, as if its run never finished
    #[arg(long, default_value_t = 5)]
    unfinished_every: usize,
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }

    /// Log-normal draw, used for rates and trait values.
    fn lognormal(&mut self, mu: f64, sigma: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        (mu + sigma * z).exp()
    }
}

fn round(v: f64) -> f64 {
    (v * 1e4).round() / 1e4
}

fn annotated(name: &str, rng: &mut SimpleRng) -> Node {
    Node::named(name)
        .with_length(round(rng.next_f64() * 0.2 + 0.01))
        .with_feature("Omega", round(rng.lognormal(-1.5, 0.8)).to_string())
}

/// Split `species` at random points until every clade is a single leaf.
fn grow(tree: &mut Tree, parent: NodeId, species: &[&str], rng: &mut SimpleRng) {
    if let [only] = species {
        tree.add_child(parent, annotated(only, rng));
        return;
    }
    let cut = 1 + rng.below(species.len() - 1);
    for half in [&species[..cut], &species[cut..]] {
        if half.len() == 1 {
            grow(tree, parent, half, rng);
        } else {
            let child = tree.add_child(parent, annotated("", rng));
            grow(tree, child, half, rng);
        }
    }
}

fn random_tree(species: &[&str], rng: &mut SimpleRng) -> Tree {
    let mut tree = Tree::new(Node::named(""));
    let root = tree.root();
    grow(&mut tree, root, species, rng);
    tree
}

fn random_covar(rng: &mut SimpleRng) -> Result<GeneCovarRecord> {
    let n = LABELS.len();
    let labels = LabelSet::new(LABELS.iter().map(|s| s.to_string()).collect())
        .map_err(anyhow::Error::msg)?;
    let matrices = StatKind::ALL
        .iter()
        .map(|&kind| {
            let mut cells = vec![None; n * n];
            for i in 0..n {
                for j in i..n {
                    let v = match kind {
                        StatKind::Covariance if i == j => rng.next_f64() * 2.0,
                        StatKind::Covariance => rng.next_f64() - 0.5,
                        StatKind::Correlation | StatKind::PartialCorrelation if i == j => 1.0,
                        StatKind::Correlation | StatKind::PartialCorrelation => {
                            rng.next_f64() * 2.0 - 1.0
                        }
                        _ => rng.next_f64(),
                    };
                    cells[i * n + j] = Some(round(v));
                    cells[j * n + i] = Some(round(v));
                }
            }
            NamedMatrix::new(kind, n, cells)
        })
        .collect();
    GeneCovarRecord::new(labels, matrices).map_err(anyhow::Error::msg)
}

fn traits_text(species: &[&str], rng: &mut SimpleRng) -> String {
    let mut out = String::from("TaxonName\thistorical_Ne\tgeneration_time\n");
    for name in species {
        let ne = if rng.below(6) == 0 {
            "NA".to_string()
        } else {
            format!("{:.0}", rng.lognormal(11.0, 1.0))
        };
        out.push_str(&format!("{name}\t{ne}\t{:.2}\n", rng.lognormal(1.0, 0.5)));
    }
    out
}

fn write(dir: &Path, name: &str, text: &str) -> Result<()> {
    let path = dir.join(name);
    std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let mut rng = SimpleRng::new(cli.seed);
    let layout = GeneLayout::default();

    for g in 0..cli.genes {
        let id = format!("ENSG{:08}", g + 1);
        let dir = cli.output_dir.join(&id);
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

        let species: Vec<&str> = SPECIES
            .iter()
            .copied()
            .filter(|_| rng.next_f64() < 0.8)
            .collect();
        let species = if species.len() < 3 { SPECIES[..4].to_vec() } else { species };

        let tree = random_tree(&species, &mut rng);
        write(&dir, &layout.input_tree, &to_newick(&tree, false))?;
        write(&dir, &layout.rate_tree, &to_newick(&tree, true))?;
        let sites = 3 * (100 + rng.below(900));
        write(&dir, &layout.alignment, &format!("{} {sites}\n", species.len()))?;
        write(&dir, &layout.traits, &traits_text(&species, &mut rng))?;

        let unfinished = cli.unfinished_every > 0 && g % cli.unfinished_every == cli.unfinished_every - 1;
        if unfinished {
            log::info!("{id}: leaving out {}", layout.covar);
        } else {
            write(&dir, &layout.covar, &write_covar(&random_covar(&mut rng)?))?;
        }
    }

    println!(
        "Wrote {} genes to {}",
        cli.genes,
        cli.output_dir.display()
    );
    Ok(())
}
