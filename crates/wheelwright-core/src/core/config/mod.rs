pub mod catalog;
pub mod context;
mod settings;

pub use catalog::{Catalog, VariantSpec, DEFAULT_CATALOG};
pub use settings::*;
