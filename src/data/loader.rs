use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{open_file, read_text, RecordError, RecordResult};

use super::model::{MetadataValue, TraitRecord, TraitTable};

/// Column holding the species name in trait tables.
pub const TAXON_COLUMN: &str = "TaxonName";

// ---------------------------------------------------------------------------
// Trait table
// ---------------------------------------------------------------------------

/// Load a trait table. Dispatch by extension.
///
/// * `.csv` – comma separated
/// * anything else (`.tsv`, `.traits`, ...) – tab separated
///
/// The table must have a `TaxonName` column; every other column is a trait.
pub fn load_trait_table(path: &Path) -> RecordResult<TraitTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let delimiter = if ext == "csv" { b',' } else { b'\t' };

    let file = open_file(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(false)
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| RecordError::format(path, format!("reading header: {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let taxon_idx = headers
        .iter()
        .position(|h| h == TAXON_COLUMN)
        .ok_or_else(|| RecordError::format(path, format!("missing '{TAXON_COLUMN}' column")))?;

    let mut records = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record =
            result.map_err(|e| RecordError::format(path, format!("row {row_no}: {e}")))?;
        let taxon = record.get(taxon_idx).unwrap_or("").trim().to_string();
        if taxon.is_empty() {
            return Err(RecordError::format(
                path,
                format!("row {row_no}: empty {TAXON_COLUMN}"),
            ));
        }

        let mut values = BTreeMap::new();
        for (col_idx, value) in record.iter().enumerate() {
            if col_idx == taxon_idx {
                continue;
            }
            values.insert(headers[col_idx].clone(), guess_metadata_type(value.trim()));
        }
        records.push(TraitRecord { taxon, values });
    }

    let column_names = headers
        .into_iter()
        .enumerate()
        .filter(|(i, _)| *i != taxon_idx)
        .map(|(_, h)| h)
        .collect();
    Ok(TraitTable::from_records(records, column_names))
}

/// Best-effort typing of a text cell. Empty, `NA` and `nan` are null.
pub fn guess_metadata_type(s: &str) -> MetadataValue {
    if s.is_empty() || s == "NA" || s.eq_ignore_ascii_case("nan") {
        return MetadataValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return MetadataValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return MetadataValue::Float(f);
    }
    if s == "true" || s == "false" {
        return MetadataValue::Bool(s == "true");
    }
    MetadataValue::String(s.to_string())
}

// ---------------------------------------------------------------------------
// Alignment header
// ---------------------------------------------------------------------------

/// Dimensions declared on the first line of an alignment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentSize {
    pub species: u64,
    pub sites: u64,
}

/// Read `"<species> <sites>"` from the first line of an alignment file.
/// The rest of the file is not read.
pub fn read_alignment_size(path: &Path) -> RecordResult<AlignmentSize> {
    let mut first = String::new();
    BufReader::new(open_file(path)?)
        .read_line(&mut first)
        .map_err(|e| RecordError::io(path, e))?;

    let fields: Vec<&str> = first.split_whitespace().collect();
    let [species, sites] = fields.as_slice() else {
        return Err(RecordError::format(
            path,
            format!("expected '<species> <sites>' header, found '{}'", first.trim()),
        ));
    };
    let parse = |tok: &str| {
        tok.parse::<u64>()
            .map_err(|_| RecordError::format(path, format!("'{tok}' is not a count")))
    };
    Ok(AlignmentSize {
        species: parse(*species)?,
        sites: parse(*sites)?,
    })
}

// ---------------------------------------------------------------------------
// FASTA
// ---------------------------------------------------------------------------

/// One FASTA entry. The id is the header text up to the first whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    pub id: String,
    pub seq: String,
}

/// Read all sequences of a FASTA file, in file order.
pub fn read_fasta(path: &Path) -> RecordResult<Vec<FastaRecord>> {
    let text = read_text(path)?;
    let mut records: Vec<FastaRecord> = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('>') {
            let id = header.split_whitespace().next().unwrap_or("").to_string();
            records.push(FastaRecord {
                id,
                seq: String::new(),
            });
        } else {
            match records.last_mut() {
                Some(rec) => rec.seq.push_str(line),
                None => {
                    return Err(RecordError::format(
                        path,
                        format!("line {}: sequence data before the first header", line_no + 1),
                    ))
                }
            }
        }
    }
    Ok(records)
}

/// Write `records` as FASTA, one line per sequence.
pub fn write_fasta<'a>(
    path: &Path,
    records: impl IntoIterator<Item = &'a FastaRecord>,
) -> std::io::Result<()> {
    let body: Vec<String> = records
        .into_iter()
        .map(|r| format!(">{}\n{}", r.id, r.seq))
        .collect();
    std::fs::write(path, body.join("\n"))
}

// ---------------------------------------------------------------------------
// RELAX result JSON
// ---------------------------------------------------------------------------

/// The `"test results"` object of a HyPhy RELAX JSON file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelaxTest {
    #[serde(rename = "LRT")]
    pub lrt: f64,
    #[serde(rename = "p-value")]
    pub p_value: f64,
    /// Relaxation (k < 1) or intensification (k > 1) parameter.
    #[serde(rename = "relaxation or intensification parameter")]
    pub k: f64,
}

#[derive(Deserialize)]
struct RelaxFile {
    #[serde(rename = "test results")]
    test_results: RelaxTest,
}

pub fn load_relax_result(path: &Path) -> RecordResult<RelaxTest> {
    let text = read_text(path)?;
    let parsed: RelaxFile = serde_json::from_str(&text)
        .map_err(|e| RecordError::format(path, format!("parsing RELAX JSON: {e}")))?;
    Ok(parsed.test_results)
}
