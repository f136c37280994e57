use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

// ---------------------------------------------------------------------------
// MetadataValue – a single cell in a trait table or merged output table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value.
/// Used in `BTreeMap` / `BTreeSet` downstream, so `MetadataValue` must be `Ord`.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// Not available. Written as `NA`.
    Null,
}

// -- Manual Eq/Ord so we can put MetadataValue in BTreeSet --

impl Eq for MetadataValue {}

impl PartialOrd for MetadataValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MetadataValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use MetadataValue::*;
        fn discriminant(v: &MetadataValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Null => f.write_str(NA),
        }
    }
}

/// Text written for missing values.
pub const NA: &str = "NA";

impl From<Option<f64>> for MetadataValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(MetadataValue::Null, MetadataValue::Float)
    }
}

impl MetadataValue {
    /// Try to interpret the value as an `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Float(v) => Some(*v),
            MetadataValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetadataValue::Null)
    }

    /// Equality that treats `Integer(4)` and `Float(4.0)` as the same value.
    pub fn matches(&self, other: &MetadataValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }
}

// ---------------------------------------------------------------------------
// LabelSet – ordered feature labels shared by every matrix of a gene
// ---------------------------------------------------------------------------

/// Ordered, duplicate-free list of labels with O(1) position lookup.
///
/// The position of a label is the row and column index of that label in every
/// [`NamedMatrix`] of the same record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelSet {
    /// Build a label set. Fails with the offending label on a duplicate.
    pub fn new(labels: Vec<String>) -> Result<Self, String> {
        let mut index = HashMap::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            if index.insert(label.clone(), i).is_some() {
                return Err(label.clone());
            }
        }
        Ok(LabelSet { labels, index })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&str> {
        self.labels.get(i).map(String::as_str)
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    /// Every unordered index pair `(i, j)` with `i < j`, row-major.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> {
        let n = self.labels.len();
        (0..n).flat_map(move |i| (i + 1..n).map(move |j| (i, j)))
    }
}

// ---------------------------------------------------------------------------
// StatKind – the six pairwise statistics reported per gene
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatKind {
    Covariance,
    Correlation,
    PosteriorPositive,
    Precision,
    PartialCorrelation,
    PosteriorPositivePartial,
}

impl StatKind {
    /// All kinds, in the order their sections appear in a matrix file.
    pub const ALL: [StatKind; 6] = [
        StatKind::Covariance,
        StatKind::Correlation,
        StatKind::PosteriorPositive,
        StatKind::Precision,
        StatKind::PartialCorrelation,
        StatKind::PosteriorPositivePartial,
    ];

    /// Section header line in the matrix file.
    pub fn section_name(self) -> &'static str {
        match self {
            StatKind::Covariance => "covariances",
            StatKind::Correlation => "correlation coefficients",
            StatKind::PosteriorPositive => "posterior probabilities of a positive coefficient",
            StatKind::Precision => "precisions",
            StatKind::PartialCorrelation => "partial correlation coefficients",
            StatKind::PosteriorPositivePartial => {
                "posterior probabilities of a positive partial coefficient"
            }
        }
    }

    /// Suffix of the output column names.
    pub fn suffix(self) -> &'static str {
        match self {
            StatKind::Covariance => "cov",
            StatKind::Correlation => "cor",
            StatKind::PosteriorPositive => "ppos",
            StatKind::Precision => "prec",
            StatKind::PartialCorrelation => "pcor",
            StatKind::PosteriorPositivePartial => "ppos_pcor",
        }
    }
}

// ---------------------------------------------------------------------------
// NamedMatrix – one square statistic matrix
// ---------------------------------------------------------------------------

/// Square matrix of optional values, row-major. `None` marks an undefined cell.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedMatrix {
    kind: StatKind,
    size: usize,
    cells: Vec<Option<f64>>,
}

impl NamedMatrix {
    /// Panics if `cells.len() != size * size`.
    pub fn new(kind: StatKind, size: usize, cells: Vec<Option<f64>>) -> Self {
        assert_eq!(cells.len(), size * size, "matrix cell count mismatch");
        NamedMatrix { kind, size, cells }
    }

    pub fn kind(&self) -> StatKind {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        if i >= self.size || j >= self.size {
            return None;
        }
        self.cells[i * self.size + j]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Option<f64>]> {
        self.cells.chunks(self.size.max(1))
    }
}

// ---------------------------------------------------------------------------
// GeneCovarRecord – all matrices of one gene
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GeneCovarRecord {
    pub labels: LabelSet,
    matrices: BTreeMap<StatKind, NamedMatrix>,
}

impl GeneCovarRecord {
    /// Fails if a matrix does not match the label count.
    pub fn new(labels: LabelSet, matrices: Vec<NamedMatrix>) -> Result<Self, String> {
        let mut map = BTreeMap::new();
        for m in matrices {
            if m.size() != labels.len() {
                return Err(format!(
                    "'{}' matrix is {}x{} but there are {} labels",
                    m.kind().section_name(),
                    m.size(),
                    m.size(),
                    labels.len()
                ));
            }
            map.insert(m.kind(), m);
        }
        Ok(GeneCovarRecord {
            labels,
            matrices: map,
        })
    }

    pub fn matrix(&self, kind: StatKind) -> Option<&NamedMatrix> {
        self.matrices.get(&kind)
    }

    pub fn matrices(&self) -> impl Iterator<Item = &NamedMatrix> {
        self.matrices.values()
    }

    /// Flatten into `({label_i}_{label_j}_{suffix}, value)` cells.
    ///
    /// One cell per unordered pair `i < j` and per kind, pairs in row-major
    /// order and kinds in file order. The diagonal is never emitted.
    pub fn pair_columns(&self) -> Vec<(String, Option<f64>)> {
        let mut out = Vec::with_capacity(self.labels.len().pow(2) / 2 * self.matrices.len());
        for (i, j) in self.labels.pairs() {
            let (a, b) = (&self.labels.labels[i], &self.labels.labels[j]);
            for m in self.matrices.values() {
                out.push((format!("{a}_{b}_{}", m.kind().suffix()), m.get(i, j)));
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// TraitTable – per-species trait values
// ---------------------------------------------------------------------------

/// One row of a trait table.
#[derive(Debug, Clone)]
pub struct TraitRecord {
    pub taxon: String,
    /// Trait columns: column_name → value.
    pub values: BTreeMap<String, MetadataValue>,
}

/// A parsed trait table with pre-computed column indices.
#[derive(Debug, Clone)]
pub struct TraitTable {
    pub records: Vec<TraitRecord>,
    /// Ordered list of trait column names (excludes the taxon column).
    pub column_names: Vec<String>,
    /// For each trait column the sorted set of unique values.
    pub unique_values: BTreeMap<String, BTreeSet<MetadataValue>>,
}

impl TraitTable {
    /// Build column indices from the loaded records.
    pub fn from_records(records: Vec<TraitRecord>, column_names: Vec<String>) -> Self {
        let mut unique_values: BTreeMap<String, BTreeSet<MetadataValue>> = BTreeMap::new();
        for rec in &records {
            for (col, val) in &rec.values {
                unique_values
                    .entry(col.clone())
                    .or_default()
                    .insert(val.clone());
            }
        }
        TraitTable {
            records,
            column_names,
            unique_values,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }

    pub fn taxa(&self) -> BTreeSet<String> {
        self.records.iter().map(|r| r.taxon.clone()).collect()
    }

    /// Mean of the finite values of `column` and how many there are.
    ///
    /// `None` if the column does not exist; the mean is `None` when no finite
    /// value is available.
    pub fn column_mean(&self, column: &str) -> Option<(Option<f64>, usize)> {
        if !self.has_column(column) {
            return None;
        }
        let finite: Vec<f64> = self
            .records
            .iter()
            .filter_map(|r| r.values.get(column).and_then(MetadataValue::as_f64))
            .filter(|v| v.is_finite())
            .collect();
        let mean = (!finite.is_empty()).then(|| finite.iter().sum::<f64>() / finite.len() as f64);
        Some((mean, finite.len()))
    }
}
