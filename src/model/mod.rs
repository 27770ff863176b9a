//! Persisted models: table definitions declared in code and registered per package.

pub mod catalog;
pub mod ddl;

pub use catalog::{ModelCatalog, RegisteredModel};

use serde::Serialize;

/// A persisted entity. The table name of the definition is namespaced by the owning package
/// when registered.
pub trait Model: Send + Sync + 'static {
    fn definition() -> ModelDef;
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum ColumnDefault {
    /// Quoted as a string literal.
    Literal(String),
    /// Emitted verbatim, e.g. `now()` or `gen_random_uuid()`.
    Expression(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    pub default: Option<ColumnDefault>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_literal(mut self, value: impl Into<String>) -> Self {
        self.default = Some(ColumnDefault::Literal(value.into()));
        self
    }

    pub fn default_expr(mut self, expression: impl Into<String>) -> Self {
        self.default = Some(ColumnDefault::Expression(expression.into()));
        self
    }

    /// Whether the database fills the column when an insert omits it.
    pub fn has_default(&self) -> bool {
        self.default.is_some() || self.is_serial()
    }

    fn is_serial(&self) -> bool {
        matches!(
            self.sql_type.to_lowercase().as_str(),
            "serial" | "bigserial" | "smallserial" | "serial4" | "serial8" | "serial2"
        )
    }

    /// Type to cast bound text parameters to.
    pub fn cast_type(&self) -> String {
        match self.sql_type.to_lowercase().as_str() {
            "serial" | "serial4" => "integer".to_string(),
            "bigserial" | "serial8" => "bigint".to_string(),
            "smallserial" | "serial2" => "smallint".to_string(),
            _ => self.sql_type.clone(),
        }
    }

    /// Values of these types are selected as text so they decode without loss.
    pub(crate) fn select_as_text(&self) -> bool {
        let lower = self.sql_type.to_lowercase();
        lower.starts_with("numeric") || lower.starts_with("decimal") || self.sql_type.contains('.')
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelDef {
    pub table: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub unique: Vec<Vec<String>>,
    /// (constraint name, expression)
    pub checks: Vec<(String, String)>,
    /// Adds `created_at` and `updated_at` unless declared explicitly.
    pub timestamps: bool,
}

impl ModelDef {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            primary_key: vec!["id".to_string()],
            unique: Vec::new(),
            checks: Vec::new(),
            timestamps: true,
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn unique<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique.push(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn check(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.checks.push((name.into(), expression.into()));
        self
    }

    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    /// Declared columns followed by the implicit timestamp columns.
    pub fn all_columns(&self) -> Vec<ColumnDef> {
        let mut columns = self.columns.clone();
        if self.timestamps {
            for name in ["created_at", "updated_at"] {
                if !columns.iter().any(|c| c.name == name) {
                    columns.push(ColumnDef::new(name, "timestamptz").not_null().default_expr("NOW()"));
                }
            }
        }
        columns
    }
}
