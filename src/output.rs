use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use parquet::arrow::ArrowWriter;

use crate::data::model::MetadataValue;
use crate::data::table::AggregateTable;

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Write a table to a file.  Dispatch by extension.
///
/// * `.parquet` / `.pq` – Parquet, one typed nullable column per table column
/// * anything else      – tab-separated text with `NA` for missing cells
pub fn write_table(table: &AggregateTable, path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let written = match ext.as_str() {
        "parquet" | "pq" => write_parquet(table, path),
        _ => write_tsv(table, path),
    };
    written.with_context(|| format!("writing {}", path.display()))?;

    log::info!(
        "wrote {} rows x {} columns to {}",
        table.n_rows(),
        table.columns().len(),
        path.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// TSV
// ---------------------------------------------------------------------------

fn write_tsv(table: &AggregateTable, path: &Path) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .context("creating TSV file")?;
    writer.write_record(table.columns())?;
    for row in 0..table.n_rows() {
        writer.write_record(table.row(row).map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Arrow / Parquet
// ---------------------------------------------------------------------------

/// Convert a table into one Arrow record batch.
///
/// Column types are inferred from the non-null cells: all integers → Int64,
/// integers and floats → Float64, all booleans → Boolean, anything else → Utf8.
pub fn to_record_batch(table: &AggregateTable) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(table.columns().len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.columns().len());

    for name in table.columns() {
        let cells = table.column(name).unwrap_or_default();
        let (data_type, array) = column_array(cells);
        fields.push(Field::new(name, data_type, true));
        arrays.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    RecordBatch::try_new(schema, arrays).context("building record batch")
}

fn column_array(cells: &[MetadataValue]) -> (DataType, ArrayRef) {
    let present = || cells.iter().filter(|v| !v.is_null());

    if present().all(|v| matches!(v, MetadataValue::Integer(_))) {
        let values: Vec<Option<i64>> = cells
            .iter()
            .map(|v| match v {
                MetadataValue::Integer(i) => Some(*i),
                _ => None,
            })
            .collect();
        return (DataType::Int64, Arc::new(Int64Array::from(values)));
    }
    if present().all(|v| v.as_f64().is_some()) {
        let values: Vec<Option<f64>> = cells.iter().map(MetadataValue::as_f64).collect();
        return (DataType::Float64, Arc::new(Float64Array::from(values)));
    }
    if present().all(|v| matches!(v, MetadataValue::Bool(_))) {
        let values: Vec<Option<bool>> = cells
            .iter()
            .map(|v| match v {
                MetadataValue::Bool(b) => Some(*b),
                _ => None,
            })
            .collect();
        return (DataType::Boolean, Arc::new(BooleanArray::from(values)));
    }
    let values: Vec<Option<String>> = cells
        .iter()
        .map(|v| (!v.is_null()).then(|| v.to_string()))
        .collect();
    (DataType::Utf8, Arc::new(StringArray::from(values)))
}

fn write_parquet(table: &AggregateTable, path: &Path) -> Result<()> {
    let batch = to_record_batch(table)?;
    let file = std::fs::File::create(path).context("creating parquet file")?;
    let mut writer =
        ArrowWriter::try_new(file, batch.schema(), None).context("creating parquet writer")?;
    writer.write(&batch).context("writing record batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

/// Render the first `rows` rows as a text table.
pub fn preview(table: &AggregateTable, rows: usize) -> Result<String> {
    let batch = to_record_batch(table)?;
    let head = batch.slice(0, rows.min(batch.num_rows()));
    Ok(pretty_format_batches(&[head])?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn sample() -> AggregateTable {
        let mut t = AggregateTable::with_columns(["id", "nb_sites", "mean_omega"]);
        t.push_row([
            ("id".to_string(), MetadataValue::String("g1".into())),
            ("nb_sites".to_string(), MetadataValue::Integer(300)),
            ("mean_omega".to_string(), MetadataValue::Float(0.25)),
            ("A_B_cov".to_string(), MetadataValue::Float(0.5)),
        ]);
        t.push_row([
            ("id".to_string(), MetadataValue::String("g2".into())),
            ("nb_sites".to_string(), MetadataValue::Integer(120)),
            ("mean_omega".to_string(), MetadataValue::Integer(1)),
        ]);
        t
    }

    #[test]
    fn tsv_uses_na_for_missing_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tsv");
        write_table(&sample(), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id\tnb_sites\tmean_omega\tA_B_cov");
        assert_eq!(lines[1], "g1\t300\t0.25\t0.5");
        assert_eq!(lines[2], "g2\t120\t1\tNA");
    }

    #[test]
    fn parquet_reads_back_with_inferred_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        write_table(&sample(), &path).unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 2);

        let schema = batch.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(1).data_type(), &DataType::Int64);
        assert_eq!(schema.field(2).data_type(), &DataType::Float64);

        let cov = batch
            .column(3)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(cov.value(0), 0.5);
        assert!(cov.is_null(1));
    }

    #[test]
    fn preview_is_limited() {
        let text = preview(&sample(), 1).unwrap();
        assert!(text.contains("g1"));
        assert!(!text.contains("g2"));
    }
}
