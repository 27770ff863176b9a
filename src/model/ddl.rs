//! CREATE TABLE statements for registered models.

use crate::model::{ColumnDefault, RegisteredModel};

pub(crate) fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Idempotent: tables that already exist are left as they are.
pub fn create_table(model: &RegisteredModel) -> String {
    let mut defs: Vec<String> = model
        .columns
        .iter()
        .map(|c| {
            let mut def = format!("{} {}", quote(&c.name), c.sql_type);
            if !c.nullable {
                def.push_str(" NOT NULL");
            }
            match &c.default {
                Some(ColumnDefault::Literal(value)) => {
                    def.push_str(" DEFAULT ");
                    def.push_str(&literal(value));
                }
                Some(ColumnDefault::Expression(expression)) => {
                    def.push_str(" DEFAULT ");
                    def.push_str(expression);
                }
                None => {}
            }
            def
        })
        .collect();

    if !model.def.primary_key.is_empty() {
        let pk: Vec<String> = model.def.primary_key.iter().map(|c| quote(c)).collect();
        defs.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }
    for unique in &model.def.unique {
        let cols: Vec<String> = unique.iter().map(|c| quote(c)).collect();
        defs.push(format!("UNIQUE ({})", cols.join(", ")));
    }
    for (name, expression) in &model.def.checks {
        defs.push(format!("CONSTRAINT {} CHECK ({})", quote(name), expression));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quote(&model.table),
        defs.join(",\n  ")
    )
}
