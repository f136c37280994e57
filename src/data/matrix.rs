//! Reader and writer for per-gene matrix files.
//!
//! Layout of a matrix file:
//!
//! ```text
//! 2                      <- ignored title / count line
//! Phenotype_mean         <- labels, one per line
//! Genotype_mean
//!                        <- blank line ends the labels
//! covariances            <- one section per StatKind, in StatKind::ALL order
//!
//! 62.266  61.58
//! 61.58 61.114
//!
//! correlation coefficients
//!
//! 1  0.998
//! 0.998      1
//! ...
//! ```
//!
//! A `-` token is an undefined cell. Sections carry no length prefix, so they
//! are consumed strictly in sequence.

use std::fmt::Write as _;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{open_file, RecordError, RecordResult};

use super::model::{GeneCovarRecord, LabelSet, NamedMatrix, StatKind};

/// Token marking an undefined cell.
pub const MISSING_TOKEN: &str = "-";

// ---------------------------------------------------------------------------
// BlockReader – line cursor over a matrix file
// ---------------------------------------------------------------------------

/// Line-oriented cursor that remembers where it is for error messages.
pub struct BlockReader<R> {
    inner: R,
    path: PathBuf,
    line_no: usize,
}

impl<R: BufRead> BlockReader<R> {
    pub fn new(inner: R, path: impl Into<PathBuf>) -> Self {
        BlockReader {
            inner,
            path: path.into(),
            line_no: 0,
        }
    }

    /// Next line without its terminator, or `None` at end of input.
    fn next_line(&mut self) -> RecordResult<Option<String>> {
        let mut buf = String::new();
        let n = self
            .inner
            .read_line(&mut buf)
            .map_err(|e| RecordError::io(&self.path, e))?;
        if n == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        let trimmed = buf.trim_end_matches(['\n', '\r']).len();
        buf.truncate(trimmed);
        Ok(Some(buf))
    }

    fn error(&self, message: impl std::fmt::Display) -> RecordError {
        RecordError::format(&self.path, format!("line {}: {message}", self.line_no))
    }

    /// Skip the title line, then read labels until the first blank line.
    pub fn read_labels(&mut self) -> RecordResult<LabelSet> {
        if self.next_line()?.is_none() {
            return Err(self.error("empty matrix file"));
        }
        let mut labels = Vec::new();
        while let Some(line) = self.next_line()? {
            let label = line.trim();
            if label.is_empty() {
                break;
            }
            labels.push(label.to_string());
        }
        if labels.is_empty() {
            return Err(self.error("no labels before the first matrix section"));
        }
        LabelSet::new(labels).map_err(|dup| self.error(format!("duplicate label '{dup}'")))
    }

    /// Consume one section: header, blank line, `n` rows of `n` tokens and the
    /// terminating blank line (or end of input).
    ///
    /// On success the cursor sits right after the terminator, ready for the
    /// next section.
    pub fn read_block(&mut self, kind: StatKind, labels: &LabelSet) -> RecordResult<NamedMatrix> {
        let name = kind.section_name();
        match self.next_line()? {
            Some(header) if header.trim() == name => {}
            Some(header) => {
                return Err(self.error(format!(
                    "expected section '{name}', found '{}'",
                    header.trim()
                )))
            }
            None => return Err(self.error(format!("missing section '{name}'"))),
        }
        match self.next_line()? {
            Some(blank) if blank.trim().is_empty() => {}
            _ => return Err(self.error(format!("expected a blank line after '{name}'"))),
        }

        let n = labels.len();
        let mut cells = Vec::with_capacity(n * n);
        let mut rows = 0;
        while let Some(line) = self.next_line()? {
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            if rows == n {
                return Err(self.error(format!("'{name}' has more than {n} rows")));
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != n {
                return Err(self.error(format!(
                    "'{name}' row has {} values, expected {n}",
                    tokens.len()
                )));
            }
            for tok in tokens {
                cells.push(parse_cell(tok).map_err(|msg| self.error(msg))?);
            }
            rows += 1;
        }
        if rows < n {
            return Err(self.error(format!("'{name}' has {rows} rows, expected {n}")));
        }
        Ok(NamedMatrix::new(kind, n, cells))
    }
}

fn parse_cell(tok: &str) -> Result<Option<f64>, String> {
    if tok == MISSING_TOKEN {
        return Ok(None);
    }
    tok.parse::<f64>()
        .map(Some)
        .map_err(|_| format!("'{tok}' is not a number"))
}

// ---------------------------------------------------------------------------
// Whole-file reading
// ---------------------------------------------------------------------------

/// Parse a complete matrix file from any buffered reader.
/// `path` is only used in error messages.
pub fn parse_covar<R: BufRead>(reader: R, path: &Path) -> RecordResult<GeneCovarRecord> {
    let mut blocks = BlockReader::new(reader, path);
    let labels = blocks.read_labels()?;
    let matrices = StatKind::ALL
        .iter()
        .map(|&kind| blocks.read_block(kind, &labels))
        .collect::<RecordResult<Vec<_>>>()?;
    GeneCovarRecord::new(labels, matrices).map_err(|msg| RecordError::format(path, msg))
}

/// Read the matrix file at `path`. A missing file is [`RecordError::NotFound`].
pub fn read_covar_file(path: &Path) -> RecordResult<GeneCovarRecord> {
    let file = open_file(path)?;
    parse_covar(BufReader::new(file), path)
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Render one section the way [`BlockReader::read_block`] expects it.
pub fn write_block(out: &mut String, matrix: &NamedMatrix) {
    let _ = writeln!(out, "{}\n", matrix.kind().section_name());
    for row in matrix.rows() {
        let line: Vec<String> = row
            .iter()
            .map(|c| c.map_or_else(|| MISSING_TOKEN.to_string(), |v| v.to_string()))
            .collect();
        let _ = writeln!(out, "{}", line.join("\t"));
    }
    out.push('\n');
}

/// Render a complete matrix file.
pub fn write_covar(record: &GeneCovarRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", record.labels.len());
    for label in record.labels.iter() {
        let _ = writeln!(out, "{label}");
    }
    out.push('\n');
    for m in record.matrices() {
        write_block(&mut out, m);
    }
    out
}
