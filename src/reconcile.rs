//! Schema reconciliation: map an export's arbitrary header row onto the
//! canonical column list.
//!
//! Exports differ in column naming, order, and completeness, and some carry a
//! leading row-number column. Reconciliation never fails on shape: missing
//! columns become null columns and unknown columns are discarded.

use anyhow::{Context, Result, ensure};
use encoding_rs::Encoding;
use itertools::Itertools;
use log::debug;

use crate::{
    fields::{CanonicalSchema, Field},
    io_utils,
    profile::IngestProfile,
};

/// Parsed CSV input before any interpretation. Empty cells are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { headers, rows }
    }

    /// Builds a table from text cells, treating empty strings as null.
    pub fn from_text_rows<H, R, C>(headers: H, rows: R) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let headers = headers.into_iter().map(Into::into).collect();
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(Into::into)
                    .map(|cell: String| (!cell.is_empty()).then_some(cell))
                    .collect()
            })
            .collect();
        Self { headers, rows }
    }

    pub fn from_csv_bytes(
        bytes: &[u8],
        delimiter: u8,
        encoding: &'static Encoding,
    ) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        let mut reader = io_utils::open_csv_reader(bytes, delimiter, true);
        let headers = io_utils::reader_headers(&mut reader, encoding)?;
        let mut rows = Vec::new();
        for (row_idx, record) in reader.byte_records().enumerate() {
            let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
            ensure!(
                record.len() <= headers.len(),
                "Row {} has {} fields but the header names only {}",
                row_idx + 2,
                record.len(),
                headers.len()
            );
            let decoded = io_utils::decode_record(&record, encoding)
                .with_context(|| format!("Decoding row {}", row_idx + 2))?;
            rows.push(
                decoded
                    .into_iter()
                    .map(|cell| (!cell.is_empty()).then_some(cell))
                    .collect(),
            );
        }
        Ok(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What reconciliation did to the header row, for logging and previews.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub dropped_index_column: Option<String>,
    pub renamed: Vec<(String, String)>,
    pub synthesized: Vec<Field>,
    pub discarded: Vec<String>,
}

/// Rows aligned to a [`CanonicalSchema`]: cell `i` of every row belongs to
/// `schema.fields()[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledFrame {
    schema: CanonicalSchema,
    rows: Vec<Vec<Option<String>>>,
    report: ReconcileReport,
}

impl ReconciledFrame {
    pub fn schema(&self) -> &CanonicalSchema {
        &self.schema
    }

    pub fn columns(&self) -> Vec<&'static str> {
        self.schema.fields().iter().map(|f| f.name()).collect()
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn report(&self) -> &ReconcileReport {
        &self.report
    }

    pub fn cell(&self, row: usize, field: Field) -> Option<&str> {
        let idx = self.schema.position(field)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn reconcile(
    raw: &RawTable,
    schema: &CanonicalSchema,
    profile: &IngestProfile,
) -> ReconciledFrame {
    let mut report = ReconcileReport::default();

    let skip = match raw.headers.first() {
        Some(first) if !profile.is_date_alias(first) => {
            debug!("Dropping leading index column '{first}'");
            report.dropped_index_column = Some(first.clone());
            1
        }
        _ => 0,
    };

    // (source position, name after renaming)
    let candidates = raw
        .headers
        .iter()
        .enumerate()
        .skip(skip)
        .map(|(idx, header)| {
            let canonical = profile.canonical_name(header);
            if canonical != header {
                report
                    .renamed
                    .push((header.clone(), canonical.to_string()));
            }
            (idx, canonical)
        })
        .collect::<Vec<_>>();

    let mut used = vec![false; candidates.len()];
    let sources = schema
        .fields()
        .iter()
        .map(|field| {
            let found = candidates
                .iter()
                .enumerate()
                .find(|(slot, (_, name))| !used[*slot] && *name == field.name());
            match found {
                Some((slot, (source, _))) => {
                    used[slot] = true;
                    Some(*source)
                }
                None => {
                    report.synthesized.push(*field);
                    None
                }
            }
        })
        .collect::<Vec<_>>();

    report.discarded = candidates
        .iter()
        .zip(&used)
        .filter(|(_, used)| !**used)
        .map(|((idx, _), _)| raw.headers[*idx].clone())
        .collect();

    if !report.synthesized.is_empty() {
        debug!(
            "Synthesizing null column(s): {}",
            report.synthesized.iter().map(|f| f.name()).join(", ")
        );
    }
    if !report.discarded.is_empty() {
        debug!("Discarding column(s): {}", report.discarded.join(", "));
    }

    let rows = raw
        .rows
        .iter()
        .map(|row| {
            sources
                .iter()
                .map(|source| source.and_then(|idx| row.get(idx).cloned().flatten()))
                .collect()
        })
        .collect();

    ReconciledFrame {
        schema: schema.clone(),
        rows,
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> IngestProfile {
        IngestProfile::default()
    }

    #[test]
    fn leading_index_column_is_dropped() {
        let raw = RawTable::from_text_rows(
            ["Row", "UserServiceId", "Creator"],
            [["1", "105", "ali"]],
        );
        let frame = reconcile(&raw, &CanonicalSchema::standard(), &profile());
        assert_eq!(frame.report().dropped_index_column.as_deref(), Some("Row"));
        assert_eq!(frame.cell(0, Field::UserServiceId), Some("105"));
        assert_eq!(frame.cell(0, Field::Creator), Some("ali"));
    }

    #[test]
    fn first_column_is_dropped_even_when_canonical() {
        let raw = RawTable::from_text_rows(["UserServiceId", "Creator"], [["105", "ali"]]);
        let frame = reconcile(&raw, &CanonicalSchema::standard(), &profile());
        assert_eq!(frame.cell(0, Field::UserServiceId), None);
        assert!(frame.report().synthesized.contains(&Field::UserServiceId));
    }

    #[test]
    fn aliases_rename_and_unknown_columns_are_discarded() {
        let raw = RawTable::from_text_rows(
            ["CDT", "UserServiceId", "PayPlan", "SavingOffUsed"],
            [["1402/01/15 10:00", "105", "monthly", "50"]],
        );
        let frame = reconcile(&raw, &CanonicalSchema::standard(), &profile());
        assert_eq!(frame.report().dropped_index_column, None);
        assert_eq!(frame.cell(0, Field::CreatDate), Some("1402/01/15 10:00"));
        assert_eq!(frame.cell(0, Field::Package), Some("50"));
        assert_eq!(frame.report().discarded, vec!["PayPlan".to_string()]);
        assert_eq!(
            frame.report().renamed,
            vec![
                ("CDT".to_string(), "CreatDate".to_string()),
                ("SavingOffUsed".to_string(), "Package".to_string()),
            ]
        );
    }

    #[test]
    fn output_columns_equal_schema_even_for_empty_input() {
        let raw = RawTable::from_text_rows(["CDT"], Vec::<Vec<String>>::new());
        let frame = reconcile(&raw, &CanonicalSchema::standard(), &profile());
        assert!(frame.is_empty());
        assert_eq!(frame.columns(), CanonicalSchema::standard().column_names());
        assert_eq!(frame.report().synthesized.len(), 9);
    }

    #[test]
    fn duplicate_source_columns_resolve_to_first_occurrence() {
        let raw = RawTable::from_text_rows(
            ["CDT", "Creator", "Creator"],
            [["1402/01/15", "first", "second"]],
        );
        let frame = reconcile(&raw, &CanonicalSchema::standard(), &profile());
        assert_eq!(frame.cell(0, Field::Creator), Some("first"));
        assert_eq!(frame.report().discarded, vec!["Creator".to_string()]);
    }

    #[test]
    fn short_rows_fill_with_nulls() {
        let raw = RawTable::new(
            vec!["CDT".into(), "UserServiceId".into(), "Creator".into()],
            vec![vec![Some("1402/01/15".into())]],
        );
        let frame = reconcile(&raw, &CanonicalSchema::standard(), &profile());
        assert_eq!(frame.cell(0, Field::CreatDate), Some("1402/01/15"));
        assert_eq!(frame.cell(0, Field::UserServiceId), None);
    }

    #[test]
    fn csv_bytes_accept_rows_missing_trailing_cells() {
        let data = b"CDT,UserServiceId,Creator,ServiceName\n1402/01/15,105,ali\n1402/01/16,106\n";
        let raw = RawTable::from_csv_bytes(data, b',', encoding_rs::UTF_8).expect("parse");
        assert_eq!(raw.len(), 2);

        let frame = reconcile(&raw, &CanonicalSchema::standard(), &profile());
        assert_eq!(frame.cell(0, Field::Creator), Some("ali"));
        assert_eq!(frame.cell(0, Field::ServiceName), None);
        assert_eq!(frame.cell(1, Field::UserServiceId), Some("106"));
        assert_eq!(frame.cell(1, Field::Creator), None);
    }

    #[test]
    fn csv_bytes_reject_rows_longer_than_header() {
        let data = b"CDT,UserServiceId\n1402/01/15,105,extra\n";
        let err = RawTable::from_csv_bytes(data, b',', encoding_rs::UTF_8).unwrap_err();
        assert!(err.to_string().contains("Row 2 has 3 fields"));
    }

    #[test]
    fn csv_bytes_parse_empty_cells_as_null() {
        let data = b"CDT,UserServiceId,Creator\n1402/01/15,105,\n";
        let raw = RawTable::from_csv_bytes(data, b',', encoding_rs::UTF_8).expect("parse");
        assert_eq!(raw.len(), 1);
        assert_eq!(raw.rows[0][2], None);
        assert!(RawTable::from_csv_bytes(b"", b',', encoding_rs::UTF_8)
            .unwrap()
            .is_empty());
    }
}
