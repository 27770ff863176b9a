//! Generic data access to one registered model's table.

use crate::db::query::{self, QueryBuf};
use crate::db::Database;
use crate::error::AppError;
use crate::model::RegisteredModel;
use crate::schema::{Schema, ValidationErrors};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row};
use std::sync::Arc;

pub const DEFAULT_LIMIT: i64 = 100;

/// Listing parameters, usable directly as a query-string schema.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListParams {
    pub limit: i64,
    pub offset: i64,
    /// `"-price,name"`
    pub sort: String,
    /// `"name__icontains=foo,price__gte=10"`
    pub query: String,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
            sort: String::new(),
            query: String::new(),
        }
    }
}

impl Schema for ListParams {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors
            .field("limit")
            .check(self.limit >= 0, "Must be greater than or equal to 0.");
        errors
            .field("offset")
            .check(self.offset >= 0, "Must be greater than or equal to 0.");
        errors.into_result()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CountBody {
    pub count: u64,
}

impl Schema for CountBody {}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct DeletedBody {
    pub deleted: u64,
}

impl Schema for DeletedBody {}

#[derive(Clone, Debug)]
pub struct Records {
    db: Database,
    model: Arc<RegisteredModel>,
}

impl Records {
    pub fn new(db: Database, model: Arc<RegisteredModel>) -> Self {
        Self { db, model }
    }

    pub fn model(&self) -> &RegisteredModel {
        &self.model
    }

    pub async fn get_many(&self, params: &ListParams) -> Result<Vec<Value>, AppError> {
        let filters = query::parse_query(&self.model, &params.query)?;
        let sorts = query::parse_sort(&self.model, &params.sort)?;
        let q = query::select_list(&self.model, &filters, &sorts, params.limit, params.offset)?;
        let rows = bind(&q).fetch_all(self.db.pool()).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    /// The row with key `key`; 404 when absent.
    pub async fn get_one(&self, key: impl Into<Value>) -> Result<Value, AppError> {
        let q = query::select_one(&self.model, &key.into())?;
        self.fetch_one(&q).await
    }

    pub async fn count(&self, query_str: &str) -> Result<u64, AppError> {
        let filters = query::parse_query(&self.model, query_str)?;
        let q = query::count(&self.model, &filters)?;
        let row = bind(&q).fetch_one(self.db.pool()).await?;
        let count: i64 = row.try_get(0)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    pub async fn create(&self, body: Map<String, Value>) -> Result<Value, AppError> {
        let q = query::insert(&self.model, &body)?;
        self.fetch_one(&q).await
    }

    /// Update the row with key `key`; 404 when absent.
    pub async fn update(&self, key: impl Into<Value>, body: Map<String, Value>) -> Result<Value, AppError> {
        let q = query::update(&self.model, &key.into(), &body)?;
        self.fetch_one(&q).await
    }

    /// Delete the row with key `key`; 404 when absent.
    pub async fn delete(&self, key: impl Into<Value>) -> Result<u64, AppError> {
        let q = query::delete(&self.model, &key.into())?;
        let done = bind(&q).execute(self.db.pool()).await?;
        match done.rows_affected() {
            0 => Err(self.not_found()),
            n => Ok(n),
        }
    }

    async fn fetch_one(&self, q: &QueryBuf) -> Result<Value, AppError> {
        bind(q)
            .fetch_optional(self.db.pool())
            .await?
            .map(|row| row_to_json(&row))
            .ok_or_else(|| self.not_found())
    }

    fn not_found(&self) -> AppError {
        AppError::not_found(format!("No matching record in {}", self.model.def.table))
    }
}

fn bind(q: &QueryBuf) -> Query<'_, Postgres, PgArguments> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    q.text_params()
        .into_iter()
        .fold(sqlx::query(&q.sql), |query, param| query.bind(param))
}

fn row_to_json(row: &PgRow) -> Value {
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        return Value::from(f64::from(n));
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
