//! Catalog package: products stored in `catalog__product`.

use async_trait::async_trait;
use axum::http::StatusCode;
use mosaic_sdk::{
    AppError, BoxError, ColumnDef, Component, ComponentContext, Controller, CountBody, DeclarationError,
    DeletedBody, HandlerRegistry, Input, ListParams, Model, ModelDef, Package, PackageConfig, Page, Records,
    Returns, Schema, Service, Takes, ValidationErrors,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub path: Option<String>,
    pub currency: String,
    pub max_price_cents: i64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: None,
            currency: "EUR".to_string(),
            max_price_cents: 1_000_000,
        }
    }
}

impl PackageConfig for CatalogConfig {
    fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.field("currency").pattern(&self.currency, "^[A-Z]{3}$");
        errors.into_result()
    }
}

pub struct Product;

impl Model for Product {
    fn definition() -> ModelDef {
        ModelDef::new("product")
            .column(ColumnDef::new("id", "bigserial"))
            .column(ColumnDef::new("name", "text").not_null())
            .column(ColumnDef::new("price_cents", "bigint").not_null().default_literal("0"))
            .column(ColumnDef::new("active", "boolean").not_null().default_expr("TRUE"))
            .unique(["name"])
            .check("price_not_negative", "price_cents >= 0")
    }
}

/// Counts created products; logs the tally on shutdown.
#[derive(Default)]
pub struct Audit {
    created: AtomicU64,
}

#[async_trait]
impl Component for Audit {
    async fn on_shutdown(&self) -> Result<(), BoxError> {
        tracing::info!(created = self.created.load(Ordering::Relaxed), "catalog audit");
        Ok(())
    }
}

impl Service for Audit {
    fn create(ctx: &ComponentContext) -> Result<Self, BoxError> {
        ctx.log().info("audit enabled");
        Ok(Audit::default())
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductPath {
    pub id: i64,
}

impl Schema for ProductPath {}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NewProduct {
    pub name: String,
    pub price_cents: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl Schema for NewProduct {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.field("name").min_length(&self.name, 1).max_length(&self.name, 120);
        errors
            .field("price_cents")
            .check(self.price_cents >= 0, "Must be greater than or equal to 0.");
        errors.into_result()
    }
}

pub struct Products {
    records: Records,
    audit: Arc<Audit>,
    currency: String,
    max_price_cents: i64,
}

impl Component for Products {}

impl Controller for Products {
    fn create(ctx: &ComponentContext) -> Result<Self, BoxError> {
        let config = ctx
            .config::<CatalogConfig>()
            .ok_or("catalog config missing")?;
        Ok(Products {
            records: ctx.records::<Product>()?,
            audit: ctx.service::<Audit>()?,
            currency: config.currency.clone(),
            max_price_cents: config.max_price_cents,
        })
    }

    fn declare(routes: &HandlerRegistry) -> Result<(), DeclarationError> {
        routes
            .declare::<Self>(mosaic_sdk::handler_id!(list_products))
            .route("GET", "/products")?
            .describe("Products, filtered with `query` and ordered with `sort`")
            .takes(Takes::new().query::<ListParams>())
            .handle(Self::list_products)?;
        routes
            .declare::<Self>(mosaic_sdk::handler_id!(count_products))
            .route("GET", "/products/count")?
            .takes(Takes::new().query::<ListParams>())
            .returns(Returns::schema::<CountBody>())
            .handle(Self::count_products)?;
        routes
            .declare::<Self>(mosaic_sdk::handler_id!(get_product))
            .route("GET", "/products/{id}")?
            .takes(Takes::new().path::<ProductPath>())
            .handle(Self::get_product)?;
        routes
            .declare::<Self>(mosaic_sdk::handler_id!(create_product))
            .route("POST", "/products")?
            .takes(Takes::new().body::<NewProduct>())
            .returns(Returns::new().status(StatusCode::CREATED))
            .handle(Self::create_product)?;
        routes
            .declare::<Self>(mosaic_sdk::handler_id!(delete_product))
            .route("DELETE", "/products/{id}")?
            .takes(Takes::new().path::<ProductPath>())
            .returns(Returns::schema::<DeletedBody>())
            .handle(Self::delete_product)
    }
}

impl Products {
    async fn list_products(self: Arc<Self>, input: Input<(), (), (), ListParams>) -> Result<Page<Value>, AppError> {
        let params = input.query;
        let rows = self.records.get_many(&params).await?;
        let count = self.records.count(&params.query).await?;
        Ok(Page::new(
            rows,
            count,
            u32::try_from(params.limit).unwrap_or(u32::MAX),
            u32::try_from(params.offset).unwrap_or(u32::MAX),
        ))
    }

    async fn count_products(self: Arc<Self>, input: Input<(), (), (), ListParams>) -> Result<CountBody, AppError> {
        let count = self.records.count(&input.query.query).await?;
        Ok(CountBody { count })
    }

    async fn get_product(self: Arc<Self>, input: Input<(), ProductPath>) -> Result<Value, AppError> {
        let mut product = self.records.get_one(input.path.id).await?;
        if let Some(fields) = product.as_object_mut() {
            fields.insert("currency".to_string(), Value::String(self.currency.clone()));
        }
        Ok(product)
    }

    async fn create_product(self: Arc<Self>, input: Input<(), (), NewProduct>) -> Result<Value, AppError> {
        if input.body.price_cents > self.max_price_cents {
            return Err(AppError::bad_request(format!(
                "Price above the catalog limit of {} {}",
                self.max_price_cents, self.currency
            )));
        }
        let body = match serde_json::to_value(&input.body) {
            Ok(Value::Object(fields)) => fields,
            _ => return Err(AppError::Internal("product did not encode as an object".to_string())),
        };
        let created = self.records.create(body).await?;
        self.audit.created.fetch_add(1, Ordering::Relaxed);
        Ok(created)
    }

    async fn delete_product(self: Arc<Self>, input: Input<(), ProductPath>) -> Result<DeletedBody, AppError> {
        let deleted = self.records.delete(input.path.id).await?;
        Ok(DeletedBody { deleted })
    }
}

pub fn package() -> Result<Package, DeclarationError> {
    Package::builder("catalog")
        .version("0.2.0")
        .description("Product catalog")
        .config::<CatalogConfig>()
        .model::<Product>()
        .service::<Audit>()
        .controller::<Products>()
        .build()
}
