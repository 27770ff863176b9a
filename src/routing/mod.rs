//! Methods, path composition and the route table.

pub mod method;
pub mod openapi;
pub mod path;
pub mod table;

pub use method::{Method, UnknownMethod};
pub use path::format_path;
pub use table::{RouteEntry, RouteTable};
