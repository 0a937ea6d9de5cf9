//! Ad-hoc reporting over rows already stored in the warehouse.
//!
//! A [`ReportQuery`] combines creator, identifier, and creation-date filters
//! with AND. When several tables are given, each requested creator is looked
//! up in table order and the first table holding matching rows wins.
//! [`summarize`] adds a running `Package` balance and a grand-total row.

use std::{
    collections::{BTreeSet, HashSet},
    str::FromStr,
};

use anyhow::{Context, Result, anyhow, bail, ensure};
use chrono::NaiveDate;
use log::{info, warn};
use rust_decimal::{Decimal, prelude::FromPrimitive};
use serde::Serialize;

use crate::{
    data::{Value, parse_iso_date},
    fields::{CanonicalSchema, Field},
    record::ServiceRecord,
    warehouse::Warehouse,
};

pub const GRAND_TOTAL_LABEL: &str = "Grand Total";

/// Condition on `UserServiceId`, written as `=N`, `>=N`, `<=N`, `>N`, `<N`,
/// a bare `N`, or an inclusive range `N..M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdCondition {
    Eq(i64),
    Ge(i64),
    Le(i64),
    Gt(i64),
    Lt(i64),
    Between(i64, i64),
}

impl IdCondition {
    pub fn matches(&self, id: i64) -> bool {
        match *self {
            IdCondition::Eq(n) => id == n,
            IdCondition::Ge(n) => id >= n,
            IdCondition::Le(n) => id <= n,
            IdCondition::Gt(n) => id > n,
            IdCondition::Lt(n) => id < n,
            IdCondition::Between(low, high) => (low..=high).contains(&id),
        }
    }
}

fn parse_id(value: &str, expr: &str) -> Result<i64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid UserServiceId '{value}' in condition '{expr}'"))
}

impl FromStr for IdCondition {
    type Err = anyhow::Error;

    fn from_str(expr: &str) -> Result<Self> {
        let trimmed = expr.trim();
        ensure!(!trimmed.is_empty(), "Empty UserServiceId condition");
        if let Some((low, high)) = trimmed.split_once("..") {
            let (low, high) = (parse_id(low, trimmed)?, parse_id(high, trimmed)?);
            ensure!(
                low <= high,
                "Range '{trimmed}' is empty; the lower bound must come first"
            );
            return Ok(IdCondition::Between(low, high));
        }
        for (prefix, build) in [
            (">=", IdCondition::Ge as fn(i64) -> IdCondition),
            ("<=", IdCondition::Le),
            (">", IdCondition::Gt),
            ("<", IdCondition::Lt),
            ("=", IdCondition::Eq),
        ] {
            if let Some(rest) = trimmed.strip_prefix(prefix) {
                return Ok(build(parse_id(rest, trimmed)?));
            }
        }
        Ok(IdCondition::Eq(parse_id(trimmed, trimmed)?))
    }
}

/// Condition on `CreatDate`. Rows with a null date never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateCondition {
    On(NaiveDate),
    Between(NaiveDate, NaiveDate),
}

impl DateCondition {
    pub fn on(value: &str) -> Result<Self> {
        Ok(DateCondition::On(parse_iso_date(value)?))
    }

    /// Parses `YYYY-MM-DD,YYYY-MM-DD` as an inclusive range.
    pub fn between(value: &str) -> Result<Self> {
        let Some((start, end)) = value.split_once(',') else {
            bail!("Date range '{value}' must be written as START,END");
        };
        let (start, end) = (parse_iso_date(start)?, parse_iso_date(end)?);
        ensure!(start <= end, "Date range '{value}' ends before it starts");
        Ok(DateCondition::Between(start, end))
    }

    pub fn matches(&self, date: Option<NaiveDate>) -> bool {
        match (self, date) {
            (_, None) => false,
            (DateCondition::On(day), Some(date)) => date == *day,
            (DateCondition::Between(start, end), Some(date)) => (*start..=*end).contains(&date),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportQuery {
    pub creators: Vec<String>,
    pub id: Option<IdCondition>,
    pub date: Option<DateCondition>,
}

impl ReportQuery {
    pub fn matches(&self, record: &ServiceRecord) -> bool {
        let creator_ok = self.creators.is_empty()
            || record
                .creator
                .as_deref()
                .is_some_and(|creator| self.creators.iter().any(|c| c == creator));
        creator_ok
            && self.id.is_none_or(|cond| cond.matches(record.user_service_id))
            && self.date.is_none_or(|cond| cond.matches(record.creat_date))
    }

    fn for_creator(&self, creator: &str) -> ReportQuery {
        ReportQuery {
            creators: vec![creator.to_string()],
            ..self.clone()
        }
    }
}

/// Which table served a requested creator, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatorSource {
    pub creator: String,
    pub table: Option<String>,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportResult {
    pub rows: Vec<ServiceRecord>,
    pub sources: Vec<CreatorSource>,
}

pub fn run_query<W>(warehouse: &W, tables: &[String], query: &ReportQuery) -> Result<ReportResult>
where
    W: Warehouse + ?Sized,
{
    let Some(first) = tables.first() else {
        bail!("At least one table is required");
    };

    if query.creators.is_empty() {
        let rows = warehouse
            .scan(first)
            .with_context(|| format!("Reading table '{first}'"))?
            .into_iter()
            .filter(|record| query.matches(record))
            .collect();
        return Ok(ReportResult {
            rows,
            sources: Vec::new(),
        });
    }

    let scans = tables
        .iter()
        .map(|table| match warehouse.scan(table) {
            Ok(rows) => Some(rows),
            Err(err) => {
                warn!("Skipping table '{table}': {err}");
                None
            }
        })
        .collect::<Vec<_>>();
    if scans.iter().all(Option::is_none) {
        return Err(anyhow!(
            "None of the tables [{}] could be read",
            tables.join(", ")
        ));
    }

    let mut result = ReportResult::default();
    for creator in query.creators.iter().filter(|c| !c.trim().is_empty()) {
        if result.sources.iter().any(|source| &source.creator == creator) {
            continue;
        }
        let narrowed = query.for_creator(creator);
        let found = tables.iter().zip(&scans).find_map(|(table, rows)| {
            let matched = rows
                .as_ref()?
                .iter()
                .filter(|record| narrowed.matches(record))
                .cloned()
                .collect::<Vec<_>>();
            (!matched.is_empty()).then(|| (table.clone(), matched))
        });
        match found {
            Some((table, rows)) => {
                info!("Creator '{creator}': {} row(s) from '{table}'", rows.len());
                result.sources.push(CreatorSource {
                    creator: creator.clone(),
                    table: Some(table),
                    rows: rows.len(),
                });
                result.rows.extend(rows);
            }
            None => {
                info!("Creator '{creator}' not found in any table");
                result.sources.push(CreatorSource {
                    creator: creator.clone(),
                    table: None,
                    rows: 0,
                });
            }
        }
    }
    Ok(result)
}

/// Distinct non-empty `Creator` values, sorted.
pub fn distinct_creators<W>(warehouse: &W, table: &str) -> Result<Vec<String>>
where
    W: Warehouse + ?Sized,
{
    let creators = warehouse
        .scan(table)
        .with_context(|| format!("Reading table '{table}'"))?
        .into_iter()
        .filter_map(|record| record.creator)
        .filter(|creator| !creator.trim().is_empty())
        .collect::<BTreeSet<_>>();
    Ok(creators.into_iter().collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub record: ServiceRecord,
    pub running_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub rows: Vec<SummaryRow>,
    pub total_package: Decimal,
    pub distinct_users: usize,
}

fn package_amount(record: &ServiceRecord) -> Decimal {
    record
        .package
        .and_then(Decimal::from_f64)
        .unwrap_or_default()
}

/// Orders rows by `CreatDate` (nulls first, then id) and accumulates
/// `Package`. Null amounts count as zero.
pub fn summarize(mut records: Vec<ServiceRecord>) -> ReportSummary {
    records.sort_by_key(|record| (record.creat_date, record.user_service_id));
    let mut balance = Decimal::ZERO;
    let rows = records
        .into_iter()
        .map(|record| {
            balance += package_amount(&record);
            SummaryRow {
                record,
                running_balance: balance,
            }
        })
        .collect::<Vec<_>>();
    let distinct_users = rows
        .iter()
        .filter_map(|row| row.record.username.as_deref())
        .collect::<HashSet<_>>()
        .len();
    ReportSummary {
        rows,
        total_package: balance,
        distinct_users,
    }
}

impl ReportSummary {
    pub fn headers() -> Vec<String> {
        [
            "Username",
            "UserServiceId",
            "Creator",
            "CreatDate",
            "Package",
            "RunningBalance",
            "UsersCount",
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    }

    /// Detail rows followed by the grand-total row.
    pub fn to_rows(&self) -> Vec<Vec<String>> {
        let cell = |record: &ServiceRecord, field| {
            record
                .value(field)
                .map(|value: Value| value.as_display())
                .unwrap_or_default()
        };
        let mut rows = self
            .rows
            .iter()
            .map(|row| {
                vec![
                    cell(&row.record, Field::Username),
                    cell(&row.record, Field::UserServiceId),
                    cell(&row.record, Field::Creator),
                    cell(&row.record, Field::CreatDate),
                    cell(&row.record, Field::Package),
                    row.running_balance.normalize().to_string(),
                    String::new(),
                ]
            })
            .collect::<Vec<_>>();
        rows.push(vec![
            GRAND_TOTAL_LABEL.to_string(),
            String::new(),
            String::new(),
            String::new(),
            self.total_package.normalize().to_string(),
            String::new(),
            self.distinct_users.to_string(),
        ]);
        rows
    }
}

/// Headers and cells for a plain (non-summary) report.
pub fn detail_rows(records: &[ServiceRecord]) -> (Vec<String>, Vec<Vec<String>>) {
    let layout = CanonicalSchema::standard();
    let rows = records.iter().map(|record| record.to_row(&layout)).collect();
    (layout.column_names(), rows)
}
