//! Normalization and watermark filtering of a reconciled frame.
//!
//! Each row is reduced to a [`ServiceRecord`] ready for append, or rejected.
//! A row survives only when its `UserServiceId` parses as an integer, is
//! strictly above the table's watermark, and has not already appeared earlier
//! in the same batch. Survivors get their `CreatDate` converted to a Gregorian
//! date (or null), every other column coerced to its declared type, and
//! `ServicePrice` and `Package` nulled along with any column the profile
//! adds to its erase list.

use std::collections::HashSet;

use log::debug;
use serde::Serialize;

use crate::{
    calendar::{Calendar, DateOutcome, normalize_creat_date},
    data::{Coerced, coerce_float, coerce_integer, coerce_string},
    fields::Field,
    profile::IngestProfile,
    reconcile::ReconciledFrame,
    record::ServiceRecord,
};

/// Why rows were left out of the batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RejectionTally {
    /// `UserServiceId` was null or not an integer.
    pub invalid_id: usize,
    /// `UserServiceId` was at or below the watermark.
    pub stale: usize,
    /// `UserServiceId` repeated an earlier row of the same batch.
    pub duplicate: usize,
}

impl RejectionTally {
    pub fn total(&self) -> usize {
        self.invalid_id + self.stale + self.duplicate
    }
}

/// How `CreatDate` values of the surviving rows were resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateTally {
    pub jalali: usize,
    pub gregorian: usize,
    pub nulled: usize,
}

impl DateTally {
    fn record(&mut self, outcome: &DateOutcome) {
        match outcome {
            DateOutcome::Converted {
                source: Calendar::Jalali,
                ..
            } => self.jalali += 1,
            DateOutcome::Converted {
                source: Calendar::Gregorian,
                ..
            } => self.gregorian += 1,
            DateOutcome::Unrecognized(_) | DateOutcome::Invalid(_) => self.nulled += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    pub ready: Vec<ServiceRecord>,
    pub rejected: RejectionTally,
    pub dates: DateTally,
}

impl FilterOutcome {
    pub fn rejected_count(&self) -> usize {
        self.rejected.total()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    /// Highest identifier in the batch, or `None` when nothing survived.
    pub fn max_id(&self) -> Option<i64> {
        self.ready.iter().map(|r| r.user_service_id).max()
    }
}

/// Verdict on one row's identifier against the watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdVerdict {
    Accept(i64),
    Invalid(Option<String>),
    Stale(i64),
}

pub fn classify_id(raw: Option<&str>, watermark: i64) -> IdVerdict {
    match coerce_integer(raw) {
        Coerced::Parsed(id) if id > watermark => IdVerdict::Accept(id),
        Coerced::Parsed(id) => IdVerdict::Stale(id),
        Coerced::Missing => IdVerdict::Invalid(None),
        Coerced::Unparseable(text) => IdVerdict::Invalid(Some(text)),
    }
}

pub fn normalize_and_filter(
    frame: &ReconciledFrame,
    watermark: i64,
    profile: &IngestProfile,
) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();
    let mut seen = HashSet::new();

    for row in 0..frame.len() {
        let id = match classify_id(frame.cell(row, Field::UserServiceId), watermark) {
            IdVerdict::Accept(id) => id,
            IdVerdict::Stale(_) => {
                outcome.rejected.stale += 1;
                continue;
            }
            IdVerdict::Invalid(text) => {
                debug!("Row {}: unusable UserServiceId {:?}", row + 1, text);
                outcome.rejected.invalid_id += 1;
                continue;
            }
        };
        if !seen.insert(id) {
            debug!("Row {}: UserServiceId {id} repeats within the batch", row + 1);
            outcome.rejected.duplicate += 1;
            continue;
        }

        let date = frame
            .cell(row, Field::CreatDate)
            .map(normalize_creat_date)
            .unwrap_or_else(|| DateOutcome::Unrecognized(String::new()));
        if let DateOutcome::Invalid(raw) | DateOutcome::Unrecognized(raw) = &date
            && !raw.is_empty()
        {
            debug!("Row {}: CreatDate '{raw}' nulled", row + 1);
        }
        outcome.dates.record(&date);

        let mut record = build_record(frame, row, id, date.date());
        for field in profile.erased_fields() {
            record.clear(field);
        }
        outcome.ready.push(record);
    }

    debug!(
        "Watermark {watermark}: {} ready, {} invalid id, {} stale, {} duplicate",
        outcome.ready.len(),
        outcome.rejected.invalid_id,
        outcome.rejected.stale,
        outcome.rejected.duplicate
    );
    outcome
}

fn build_record(
    frame: &ReconciledFrame,
    row: usize,
    id: i64,
    creat_date: Option<chrono::NaiveDate>,
) -> ServiceRecord {
    let text = |field| coerce_string(frame.cell(row, field));
    let amount = |field| coerce_float(frame.cell(row, field)).value();
    ServiceRecord {
        creat_date,
        user_service_id: id,
        creator: text(Field::Creator),
        service_name: text(Field::ServiceName),
        username: text(Field::Username),
        service_status: text(Field::ServiceStatus),
        service_price: amount(Field::ServicePrice),
        package: amount(Field::Package),
        start_date: text(Field::StartDate),
        end_date: text(Field::EndDate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fields::CanonicalSchema,
        reconcile::{RawTable, reconcile},
    };
    use chrono::NaiveDate;

    fn frame(headers: &[&str], rows: &[&[&str]]) -> ReconciledFrame {
        let raw = RawTable::from_text_rows(
            headers.iter().copied(),
            rows.iter().map(|row| row.iter().copied()),
        );
        reconcile(
            &raw,
            &CanonicalSchema::standard(),
            &IngestProfile::default(),
        )
    }

    #[test]
    fn watermark_boundary_keeps_only_strictly_newer_ids() {
        let frame = frame(
            &["CDT", "UserServiceId"],
            &[
                &["2023-01-01", "99"],
                &["2023-01-01", "100"],
                &["2023-01-01", "101"],
                &["2023-01-01", "abc"],
                &["2023-01-01", ""],
            ],
        );
        let outcome = normalize_and_filter(&frame, 100, &IngestProfile::default());
        let ids = outcome
            .ready
            .iter()
            .map(|r| r.user_service_id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![101]);
        assert_eq!(outcome.rejected.stale, 2);
        assert_eq!(outcome.rejected.invalid_id, 2);
        assert_eq!(outcome.rejected_count(), 4);
    }

    #[test]
    fn repeated_ids_within_batch_keep_first_row() {
        let frame = frame(
            &["CDT", "UserServiceId", "Creator"],
            &[&["", "5", "first"], &["", "5", "second"], &["", "6", "third"]],
        );
        let outcome = normalize_and_filter(&frame, 0, &IngestProfile::default());
        assert_eq!(outcome.ready.len(), 2);
        assert_eq!(outcome.ready[0].creator.as_deref(), Some("first"));
        assert_eq!(outcome.rejected.duplicate, 1);
    }

    #[test]
    fn unsorted_input_is_filtered_per_row() {
        let frame = frame(
            &["CDT", "UserServiceId"],
            &[&["", "120"], &["", "90"], &["", "110"]],
        );
        let outcome = normalize_and_filter(&frame, 100, &IngestProfile::default());
        assert_eq!(outcome.max_id(), Some(120));
        assert_eq!(outcome.ready.len(), 2);
    }

    #[test]
    fn prices_are_erased_regardless_of_source() {
        let frame = frame(
            &["CDT", "UserServiceId", "ServicePrice", "SavingOffUsed"],
            &[&["1402/01/15", "1", "120000", "50"]],
        );
        let outcome = normalize_and_filter(&frame, 0, &IngestProfile::default());
        assert_eq!(outcome.ready[0].service_price, None);
        assert_eq!(outcome.ready[0].package, None);
    }

    #[test]
    fn amounts_are_erased_even_when_profile_lists_nothing() {
        let profile = IngestProfile {
            erase: Vec::new(),
            ..IngestProfile::default()
        };
        let raw = RawTable::from_text_rows(
            ["CDT", "UserServiceId", "ServicePrice", "SavingOffUsed"],
            [["1402/01/15", "1", "120000", "50"]],
        );
        let frame = reconcile(&raw, &CanonicalSchema::standard(), &profile);
        let outcome = normalize_and_filter(&frame, 0, &profile);
        assert_eq!(outcome.ready[0].service_price, None);
        assert_eq!(outcome.ready[0].package, None);
    }

    #[test]
    fn dates_are_converted_or_nulled_and_tallied() {
        let frame = frame(
            &["CDT", "UserServiceId", "StartDate"],
            &[
                &["1402/01/15 10:00", "1", "1402/01/15"],
                &["2023/4/5", "2", ""],
                &["15/01/2023", "3", ""],
                &["", "4", ""],
            ],
        );
        let outcome = normalize_and_filter(&frame, 0, &IngestProfile::default());
        assert_eq!(
            outcome.ready[0].creat_date,
            NaiveDate::from_ymd_opt(2023, 4, 4)
        );
        assert_eq!(outcome.ready[0].start_date.as_deref(), Some("1402/01/15"));
        assert_eq!(
            outcome.ready[1].creat_date,
            NaiveDate::from_ymd_opt(2023, 4, 5)
        );
        assert_eq!(outcome.ready[2].creat_date, None);
        assert_eq!(outcome.ready[3].creat_date, None);
        assert_eq!(
            outcome.dates,
            DateTally {
                jalali: 1,
                gregorian: 1,
                nulled: 2
            }
        );
    }

    #[test]
    fn string_artifacts_become_null() {
        let frame = frame(
            &["CDT", "UserServiceId", "Creator", "Username", "ServiceStatus"],
            &[&["", "1", "None", "nan", "active"]],
        );
        let outcome = normalize_and_filter(&frame, 0, &IngestProfile::default());
        let record = &outcome.ready[0];
        assert_eq!(record.creator, None);
        assert_eq!(record.username, None);
        assert_eq!(record.service_status.as_deref(), Some("active"));
    }

    #[test]
    fn classify_id_reports_each_path() {
        assert_eq!(classify_id(Some("101"), 100), IdVerdict::Accept(101));
        assert_eq!(classify_id(Some("100"), 100), IdVerdict::Stale(100));
        assert_eq!(classify_id(None, 100), IdVerdict::Invalid(None));
        assert_eq!(
            classify_id(Some("x1"), 100),
            IdVerdict::Invalid(Some("x1".to_string()))
        );
    }
}
