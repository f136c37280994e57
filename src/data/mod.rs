/// Data layer: per-gene record types, file readers and trait filtering.
///
/// Architecture:
/// ```text
///  nodeomega_1.cov   placnr.ali / .traits / .fasta / RELAX.json
///        │                    │
///        ▼                    ▼
///   ┌──────────┐        ┌──────────┐
///   │  matrix   │        │  loader   │  parse companion files
///   └──────────┘        └──────────┘
///        │                    │
///        ▼                    ▼
///   ┌────────────────┐  ┌────────────┐
///   │ GeneCovarRecord │  │ TraitTable  │
///   └────────────────┘  └────────────┘
///                             │
///                             ▼
///                       ┌──────────┐
///                       │  filter   │  trait predicate → selected taxa
///                       └──────────┘
///
///  per-gene records ──▶ table::AggregateTable (wide, NA-filled)
/// ```

pub mod filter;
pub mod loader;
pub mod matrix;
pub mod model;
pub mod table;
