pub mod client;

pub use client::{ClientAddr, FORWARDED_FOR_HEADER};
