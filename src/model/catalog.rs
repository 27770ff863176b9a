//! Shared table catalog. Every model belongs to exactly one package.

use crate::db::Database;
use crate::error::DeclarationError;
use crate::model::{ddl, ColumnDef, Model, ModelDef};
use std::any::{type_name, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Separator between the owning package and the declared table name.
pub const NAMESPACE_SEPARATOR: &str = "__";

pub fn namespaced_table(package: &str, table: &str) -> String {
    format!("{}{}{}", package, NAMESPACE_SEPARATOR, table)
}

#[derive(Debug)]
pub struct RegisteredModel {
    pub package: String,
    /// `<package>__<table>`
    pub table: String,
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub def: ModelDef,
    /// Declared plus implicit columns.
    pub columns: Vec<ColumnDef>,
}

impl RegisteredModel {
    pub fn new(package: &str, type_id: TypeId, type_name: &'static str, def: ModelDef) -> Self {
        Self {
            package: package.to_string(),
            table: namespaced_table(package, &def.table),
            type_id,
            type_name,
            columns: def.all_columns(),
            def,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// First primary key column. Single-row operations address rows by it.
    pub fn key(&self) -> &str {
        self.def.primary_key.first().map(String::as_str).unwrap_or("id")
    }
}

#[derive(Default)]
struct Tables {
    by_name: BTreeMap<String, Arc<RegisteredModel>>,
    by_type: HashMap<TypeId, String>,
}

#[derive(Default)]
pub struct ModelCatalog {
    tables: RwLock<Tables>,
    materialized: AtomicBool,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `def` for `package`. Registering the same type again for the same package is a
    /// no-op; for another package it is an ownership error.
    pub fn register(
        &self,
        package: &str,
        type_id: TypeId,
        type_name: &'static str,
        def: ModelDef,
    ) -> Result<Arc<RegisteredModel>, DeclarationError> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = tables.by_type.get(&type_id) {
            let model = Arc::clone(&tables.by_name[existing]);
            if model.package == package {
                return Ok(model);
            }
            return Err(DeclarationError::ModelOwnership {
                model: type_name.to_string(),
                owner: model.package.clone(),
                requested: package.to_string(),
            });
        }

        let model = Arc::new(RegisteredModel::new(package, type_id, type_name, def));
        if tables.by_name.contains_key(&model.table) {
            return Err(DeclarationError::DuplicateTable(model.table.clone()));
        }
        tables.by_type.insert(type_id, model.table.clone());
        tables.by_name.insert(model.table.clone(), Arc::clone(&model));
        Ok(model)
    }

    pub fn register_model<M: Model>(&self, package: &str) -> Result<Arc<RegisteredModel>, DeclarationError> {
        self.register(package, TypeId::of::<M>(), type_name::<M>(), M::definition())
    }

    pub fn lookup<M: Model>(&self) -> Option<Arc<RegisteredModel>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let name = tables.by_type.get(&TypeId::of::<M>())?;
        tables.by_name.get(name).cloned()
    }

    pub fn table(&self, name: &str) -> Option<Arc<RegisteredModel>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.by_name.get(name).cloned()
    }

    pub fn tables(&self) -> Vec<String> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.by_name.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tables.read().unwrap_or_else(PoisonError::into_inner).by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// DDL for every registered table, in name order.
    pub fn ddl(&self) -> Vec<String> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.by_name.values().map(|m| ddl::create_table(m)).collect()
    }

    pub fn is_materialized(&self) -> bool {
        self.materialized.load(Ordering::SeqCst)
    }

    /// Create the registered tables. Runs once; later calls return `false` without touching the
    /// database.
    pub async fn materialize(&self, db: &Database) -> Result<bool, sqlx::Error> {
        if self.is_materialized() {
            return Ok(false);
        }
        for statement in self.ddl() {
            tracing::debug!(sql = %statement, "materialize");
            sqlx::query(&statement).execute(db.pool()).await?;
        }
        self.materialized.store(true, Ordering::SeqCst);
        tracing::info!(tables = self.len(), "model tables materialized");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnDef;

    struct Item;

    impl Model for Item {
        fn definition() -> ModelDef {
            ModelDef::new("items")
                .column(ColumnDef::new("id", "serial"))
                .column(ColumnDef::new("name", "text").not_null())
        }
    }

    struct OtherItem;

    impl Model for OtherItem {
        fn definition() -> ModelDef {
            ModelDef::new("items").column(ColumnDef::new("id", "serial"))
        }
    }

    #[test]
    fn tables_are_namespaced_by_package() {
        let catalog = ModelCatalog::new();
        let model = catalog.register_model::<Item>("catalog").unwrap();
        assert_eq!(model.table, "catalog__items");
        assert_eq!(catalog.lookup::<Item>().unwrap().table, "catalog__items");
        assert_eq!(model.column("updated_at").map(|c| c.sql_type.as_str()), Some("timestamptz"));
        assert_eq!(model.key(), "id");
    }

    #[test]
    fn same_table_name_in_two_packages_does_not_collide() {
        let catalog = ModelCatalog::new();
        catalog.register_model::<Item>("catalog").unwrap();
        catalog.register_model::<OtherItem>("billing").unwrap();
        assert_eq!(catalog.tables(), vec!["billing__items", "catalog__items"]);
    }

    #[test]
    fn a_model_has_one_owning_package() {
        let catalog = ModelCatalog::new();
        catalog.register_model::<Item>("catalog").unwrap();
        catalog.register_model::<Item>("catalog").unwrap();
        let err = catalog.register_model::<Item>("billing").unwrap_err();
        assert!(matches!(err, DeclarationError::ModelOwnership { ref owner, .. } if owner == "catalog"));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn two_models_cannot_share_a_table() {
        let catalog = ModelCatalog::new();
        catalog.register_model::<Item>("catalog").unwrap();
        let err = catalog.register_model::<OtherItem>("catalog").unwrap_err();
        assert!(matches!(err, DeclarationError::DuplicateTable(ref t) if t == "catalog__items"));
    }
}
