use std::collections::{BTreeMap, BTreeSet};

use super::loader::guess_metadata_type;
use super::model::{MetadataValue, TraitTable};

// ---------------------------------------------------------------------------
// Trait filter: which values are accepted per trait column
// ---------------------------------------------------------------------------

/// Per-column selection: maps column_name → set of accepted values.
pub type TraitFilter = BTreeMap<String, BTreeSet<MetadataValue>>;

/// Parse `column=value[,value...]` into a single-column filter.
///
/// Values are typed the same way trait table cells are, so `4` selects both
/// `4` and `4.0`.
pub fn parse_selection(spec: &str) -> Result<TraitFilter, String> {
    let (column, values) = spec
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=VALUE, got '{spec}'"))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(format!("empty column name in '{spec}'"));
    }
    let selected: BTreeSet<MetadataValue> = values
        .split(',')
        .map(|v| guess_metadata_type(v.trim()))
        .collect();
    Ok(TraitFilter::from([(column.to_string(), selected)]))
}

/// Parse several `column=value[,value...]` selections into one filter.
///
/// Selections on the same column add to its accepted values.
pub fn parse_selections<'a, I>(specs: I) -> Result<TraitFilter, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut filter = TraitFilter::new();
    for spec in specs {
        for (column, values) in parse_selection(spec)? {
            filter.entry(column).or_default().extend(values);
        }
    }
    Ok(filter)
}

/// Return the taxa that pass all filters.
///
/// A taxon passes a column filter when:
/// * The filter set for that column is empty → nothing selected → fails
/// * The taxon's value for that column matches a selected value → passes
/// * The taxon has no value for that column → passes only if Null is selected
pub fn matching_taxa(table: &TraitTable, filters: &TraitFilter) -> BTreeSet<String> {
    table
        .records
        .iter()
        .filter(|rec| {
            filters.iter().all(|(col, selected)| {
                let value = rec.values.get(col).unwrap_or(&MetadataValue::Null);
                selected.iter().any(|s| s.matches(value))
            })
        })
        .map(|rec| rec.taxon.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::TraitRecord;

    fn table() -> TraitTable {
        let rows = [
            ("Orcinus_orca", MetadataValue::Float(4.0)),
            ("Homo_sapiens", MetadataValue::Integer(0)),
            ("Phoca_vitulina", MetadataValue::Integer(4)),
            ("Mus_musculus", MetadataValue::Null),
        ];
        let records = rows
            .into_iter()
            .map(|(taxon, v)| TraitRecord {
                taxon: taxon.to_string(),
                values: BTreeMap::from([("Aquatic_adaptation".to_string(), v)]),
            })
            .collect();
        TraitTable::from_records(records, vec!["Aquatic_adaptation".into()])
    }

    #[test]
    fn numeric_selection_matches_int_and_float() {
        let filter = parse_selection("Aquatic_adaptation=4").unwrap();
        let taxa = matching_taxa(&table(), &filter);
        assert_eq!(
            taxa.into_iter().collect::<Vec<_>>(),
            vec!["Orcinus_orca", "Phoca_vitulina"]
        );
    }

    #[test]
    fn missing_value_only_matches_na() {
        let filter = parse_selection("Aquatic_adaptation=NA,0").unwrap();
        let taxa = matching_taxa(&table(), &filter);
        assert_eq!(
            taxa.into_iter().collect::<Vec<_>>(),
            vec!["Homo_sapiens", "Mus_musculus"]
        );
    }

    #[test]
    fn unknown_column_selects_nothing() {
        let filter = parse_selection("mass=1").unwrap();
        assert!(matching_taxa(&table(), &filter).is_empty());
    }

    #[test]
    fn malformed_selection_is_rejected() {
        assert!(parse_selection("Aquatic_adaptation").is_err());
        assert!(parse_selection("=4").is_err());
    }

    #[test]
    fn repeated_column_selections_are_merged() {
        let filter = parse_selections(["Aquatic_adaptation=4", "Aquatic_adaptation=0"]).unwrap();
        assert_eq!(filter.len(), 1);
        assert_eq!(filter["Aquatic_adaptation"].len(), 2);
        let taxa = matching_taxa(&table(), &filter);
        assert_eq!(
            taxa.into_iter().collect::<Vec<_>>(),
            vec!["Homo_sapiens", "Orcinus_orca", "Phoca_vitulina"]
        );
    }
}
