//! Shop domain: product catalog and the shopping cart

pub mod cart;
pub mod catalog;

pub use cart::Cart;
pub use catalog::{Catalog, CatalogEntry, Product, ProductCode, StockStatus};
