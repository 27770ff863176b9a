//! Parameterized SQL for model tables. Every parameter is bound as text and cast to the column
//! type in the statement.

use crate::error::AppError;
use crate::model::ddl::quote;
use crate::model::{ColumnDef, RegisteredModel};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Upper bound applied to every list query.
pub const MAX_LIMIT: i64 = 1000;

/// Separator of the values of an `in` filter (`status__in=new|open`).
pub const IN_SEPARATOR: char = '|';

#[derive(Debug, Default, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn push_param(&mut self, value: Value) -> usize {
        self.params.push(value);
        self.params.len()
    }

    fn placeholder(&mut self, column: &ColumnDef, value: Value) -> String {
        let n = self.push_param(value);
        format!("${}::{}", n, column.cast_type())
    }

    /// Parameter values as bound: text, or NULL.
    pub fn text_params(&self) -> Vec<Option<String>> {
        self.params.iter().map(bind_text).collect()
    }
}

fn bind_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Exact,
    Iexact,
    Contains,
    Icontains,
    In,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    pub const ALL: [Operator; 9] = [
        Operator::Exact,
        Operator::Iexact,
        Operator::Contains,
        Operator::Icontains,
        Operator::In,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Exact => "EXACT",
            Operator::Iexact => "IEXACT",
            Operator::Contains => "CONTAINS",
            Operator::Icontains => "ICONTAINS",
            Operator::In => "IN",
            Operator::Gt => "GT",
            Operator::Gte => "GTE",
            Operator::Lt => "LT",
            Operator::Lte => "LTE",
        }
    }

    fn comparison(&self) -> Option<&'static str> {
        match self {
            Operator::Exact => Some("="),
            Operator::Gt => Some(">"),
            Operator::Gte => Some(">="),
            Operator::Lt => Some("<"),
            Operator::Lte => Some("<="),
            _ => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_uppercase();
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str() == upper)
            .ok_or_else(|| {
                let available: Vec<&str> = Operator::ALL.iter().map(Operator::as_str).collect();
                AppError::bad_request(format!("Invalid operator: {}, available: {:?}", upper, available))
            })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: Operator,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sort {
    pub field: String,
    pub descending: bool,
}

fn known_field<'m>(model: &'m RegisteredModel, field: &str) -> Result<&'m ColumnDef, AppError> {
    model
        .column(field)
        .ok_or_else(|| AppError::bad_request(format!("Unknown field {}", field)))
}

/// Parse `"name__icontains=foo,price__gte=10"`. A bare field means `exact`.
pub fn parse_query(model: &RegisteredModel, query: &str) -> Result<Vec<Filter>, AppError> {
    let mut filters = Vec::new();
    for clause in query.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        let (key, value) = clause
            .split_once('=')
            .ok_or_else(|| AppError::bad_request(format!("Malformed query clause: {}", clause)))?;
        let parts: Vec<&str> = key.split("__").collect();
        let (field, op) = match parts.as_slice() {
            [field] => (*field, Operator::Exact),
            [field, op] => (*field, op.parse()?),
            _ => return Err(AppError::bad_request("Unsupported query depth")),
        };
        known_field(model, field)?;
        filters.push(Filter {
            field: field.to_string(),
            op,
            value: value.to_string(),
        });
    }
    Ok(filters)
}

/// Parse `"-price,name"`; a leading `-` sorts descending.
pub fn parse_sort(model: &RegisteredModel, sort: &str) -> Result<Vec<Sort>, AppError> {
    sort.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let (field, descending) = match s.strip_prefix('-') {
                Some(field) => (field, true),
                None => (s, false),
            };
            known_field(model, field)?;
            Ok(Sort {
                field: field.to_string(),
                descending,
            })
        })
        .collect()
}

fn like_pattern(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{}%", escaped)
}

fn select_columns(model: &RegisteredModel) -> String {
    model
        .columns
        .iter()
        .map(|c| {
            let q = quote(&c.name);
            if c.select_as_text() {
                format!("{}::text AS {}", q, q)
            } else {
                q
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn key_column(model: &RegisteredModel) -> Result<&ColumnDef, AppError> {
    model
        .column(model.key())
        .ok_or_else(|| AppError::Internal(format!("table {} has no column {}", model.table, model.key())))
}

fn where_clause(model: &RegisteredModel, q: &mut QueryBuf, filters: &[Filter]) -> Result<String, AppError> {
    let mut parts = Vec::with_capacity(filters.len());
    for filter in filters {
        let column = known_field(model, &filter.field)?;
        let col = quote(&column.name);
        let part = match filter.op {
            Operator::Iexact => {
                let n = q.push_param(Value::String(filter.value.clone()));
                format!("LOWER({}::text) = LOWER(${})", col, n)
            }
            Operator::Contains | Operator::Icontains => {
                let n = q.push_param(Value::String(like_pattern(&filter.value)));
                let like = if filter.op == Operator::Contains { "LIKE" } else { "ILIKE" };
                format!("{}::text {} ${}", col, like, n)
            }
            Operator::In => {
                let placeholders: Vec<String> = filter
                    .value
                    .split(IN_SEPARATOR)
                    .map(|v| q.placeholder(column, Value::String(v.to_string())))
                    .collect();
                format!("{} IN ({})", col, placeholders.join(", "))
            }
            op => {
                let cmp = op.comparison().unwrap_or("=");
                let ph = q.placeholder(column, Value::String(filter.value.clone()));
                format!("{} {} {}", col, cmp, ph)
            }
        };
        parts.push(part);
    }
    Ok(if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    })
}

pub fn select_list(
    model: &RegisteredModel,
    filters: &[Filter],
    sorts: &[Sort],
    limit: i64,
    offset: i64,
) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::default();
    let where_sql = where_clause(model, &mut q, filters)?;
    let order: Vec<String> = if sorts.is_empty() {
        vec![quote(model.key())]
    } else {
        sorts
            .iter()
            .map(|s| format!("{}{}", quote(&s.field), if s.descending { " DESC" } else { "" }))
            .collect()
    };
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT {} OFFSET {}",
        select_columns(model),
        quote(&model.table),
        where_sql,
        order.join(", "),
        limit.clamp(0, MAX_LIMIT),
        offset.max(0)
    );
    Ok(q)
}

pub fn select_one(model: &RegisteredModel, key: &Value) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::default();
    let column = key_column(model)?;
    let ph = q.placeholder(column, key.clone());
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        select_columns(model),
        quote(&model.table),
        quote(&column.name),
        ph
    );
    Ok(q)
}

pub fn count(model: &RegisteredModel, filters: &[Filter]) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::default();
    let where_sql = where_clause(model, &mut q, filters)?;
    q.sql = format!("SELECT COUNT(*) FROM {}{}", quote(&model.table), where_sql);
    Ok(q)
}

fn check_fields(model: &RegisteredModel, body: &Map<String, Value>) -> Result<(), AppError> {
    body.keys().try_for_each(|k| known_field(model, k).map(|_| ()))
}

/// Columns missing from `body` are left to their database default.
pub fn insert(model: &RegisteredModel, body: &Map<String, Value>) -> Result<QueryBuf, AppError> {
    check_fields(model, body)?;
    let mut q = QueryBuf::default();
    let mut cols = Vec::new();
    let mut values = Vec::new();
    for column in &model.columns {
        let Some(value) = body.get(&column.name) else {
            continue;
        };
        values.push(q.placeholder(column, value.clone()));
        cols.push(quote(&column.name));
    }
    let table = quote(&model.table);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, select_columns(model))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            values.join(", "),
            select_columns(model)
        )
    };
    Ok(q)
}

/// Sets the columns present in `body`; the key column is never updated.
pub fn update(model: &RegisteredModel, key: &Value, body: &Map<String, Value>) -> Result<QueryBuf, AppError> {
    check_fields(model, body)?;
    let key_col = key_column(model)?;
    let mut q = QueryBuf::default();
    let mut sets = Vec::new();
    for column in &model.columns {
        if column.name == key_col.name {
            continue;
        }
        if let Some(value) = body.get(&column.name) {
            let ph = q.placeholder(column, value.clone());
            sets.push(format!("{} = {}", quote(&column.name), ph));
        }
    }
    if model.def.timestamps && !body.contains_key("updated_at") {
        sets.push(format!("{} = NOW()", quote("updated_at")));
    }
    if sets.is_empty() {
        return select_one(model, key);
    }
    let ph = q.placeholder(key_col, key.clone());
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        quote(&model.table),
        sets.join(", "),
        quote(&key_col.name),
        ph,
        select_columns(model)
    );
    Ok(q)
}

pub fn delete(model: &RegisteredModel, key: &Value) -> Result<QueryBuf, AppError> {
    let column = key_column(model)?;
    let mut q = QueryBuf::default();
    let ph = q.placeholder(column, key.clone());
    q.sql = format!("DELETE FROM {} WHERE {} = {}", quote(&model.table), quote(&column.name), ph);
    Ok(q)
}
