//! Built-in routes served next to the package routes.

pub mod common;

pub use common::system_routes;
