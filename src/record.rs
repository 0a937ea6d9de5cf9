//! The typed row of the service report table.

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    data::{Value, parse_typed_value},
    fields::{CanonicalSchema, Field},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    #[serde(rename = "CreatDate")]
    pub creat_date: Option<NaiveDate>,
    #[serde(rename = "UserServiceId")]
    pub user_service_id: i64,
    #[serde(rename = "Creator")]
    pub creator: Option<String>,
    #[serde(rename = "ServiceName")]
    pub service_name: Option<String>,
    #[serde(rename = "Username")]
    pub username: Option<String>,
    #[serde(rename = "ServiceStatus")]
    pub service_status: Option<String>,
    #[serde(rename = "ServicePrice")]
    pub service_price: Option<f64>,
    #[serde(rename = "Package")]
    pub package: Option<f64>,
    #[serde(rename = "StartDate")]
    pub start_date: Option<String>,
    #[serde(rename = "EndDate")]
    pub end_date: Option<String>,
}

impl ServiceRecord {
    /// A record carrying only its identifier; every other column is null.
    pub fn new(user_service_id: i64) -> Self {
        Self {
            creat_date: None,
            user_service_id,
            creator: None,
            service_name: None,
            username: None,
            service_status: None,
            service_price: None,
            package: None,
            start_date: None,
            end_date: None,
        }
    }

    pub fn value(&self, field: Field) -> Option<Value> {
        match field {
            Field::CreatDate => self.creat_date.map(Value::Date),
            Field::UserServiceId => Some(Value::Integer(self.user_service_id)),
            Field::Creator => self.creator.clone().map(Value::String),
            Field::ServiceName => self.service_name.clone().map(Value::String),
            Field::Username => self.username.clone().map(Value::String),
            Field::ServiceStatus => self.service_status.clone().map(Value::String),
            Field::ServicePrice => self.service_price.map(Value::Float),
            Field::Package => self.package.map(Value::Float),
            Field::StartDate => self.start_date.clone().map(Value::String),
            Field::EndDate => self.end_date.clone().map(Value::String),
        }
    }

    /// Nulls one column. The identifier cannot be cleared.
    pub fn clear(&mut self, field: Field) {
        match field {
            Field::CreatDate => self.creat_date = None,
            Field::UserServiceId => {}
            Field::Creator => self.creator = None,
            Field::ServiceName => self.service_name = None,
            Field::Username => self.username = None,
            Field::ServiceStatus => self.service_status = None,
            Field::ServicePrice => self.service_price = None,
            Field::Package => self.package = None,
            Field::StartDate => self.start_date = None,
            Field::EndDate => self.end_date = None,
        }
    }

    /// Renders the record in schema order; nulls become empty cells.
    pub fn to_row(&self, schema: &CanonicalSchema) -> Vec<String> {
        schema
            .fields()
            .iter()
            .map(|field| {
                self.value(*field)
                    .map(|value| value.as_display())
                    .unwrap_or_default()
            })
            .collect()
    }

    pub fn from_row(schema: &CanonicalSchema, row: &[String]) -> Result<Self> {
        let mut record = ServiceRecord::new(0);
        let mut saw_id = false;
        for (idx, field) in schema.fields().iter().enumerate() {
            let raw = row.get(idx).map(|s| s.as_str()).unwrap_or("");
            let value = parse_typed_value(raw, field.column_type())
                .with_context(|| format!("Column '{field}'"))?;
            match (field, value) {
                (_, None) => {}
                (Field::CreatDate, Some(Value::Date(date))) => record.creat_date = Some(date),
                (Field::UserServiceId, Some(Value::Integer(id))) => {
                    record.user_service_id = id;
                    saw_id = true;
                }
                (Field::ServicePrice, Some(Value::Float(v))) => record.service_price = Some(v),
                (Field::Package, Some(Value::Float(v))) => record.package = Some(v),
                (Field::Creator, Some(Value::String(s))) => record.creator = Some(s),
                (Field::ServiceName, Some(Value::String(s))) => record.service_name = Some(s),
                (Field::Username, Some(Value::String(s))) => record.username = Some(s),
                (Field::ServiceStatus, Some(Value::String(s))) => record.service_status = Some(s),
                (Field::StartDate, Some(Value::String(s))) => record.start_date = Some(s),
                (Field::EndDate, Some(Value::String(s))) => record.end_date = Some(s),
                (field, Some(other)) => {
                    return Err(anyhow!("Column '{field}' cannot hold value {other:?}"));
                }
            }
        }
        if !saw_id {
            return Err(anyhow!("Row is missing its UserServiceId"));
        }
        Ok(record)
    }
}
