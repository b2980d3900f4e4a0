//! Product catalog

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid product code: {0}")]
    InvalidProductCode(String),
    #[error("Malformed catalog: {0}")]
    MalformedCatalog(#[from] toml::de::Error),
    #[error("Product code {0} used more than once")]
    DuplicatedCode(ProductCode),
}

/// Newtype for the product reference code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductCode(u32);

impl ProductCode {
    pub const fn new(code: u32) -> Self {
        Self(code)
    }
}

impl fmt::Display for ProductCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProductCode {
    type Err = Error;

    /// Accepts both `1001` and the `#1001` form shown on product cards
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        let code = code.strip_prefix('#').unwrap_or(code);
        code.parse()
            .map(Self)
            .map_err(|_| Error::InvalidProductCode(s.to_owned()))
    }
}

/// What ends up in the cart when a product is bought
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub code: ProductCode,
    pub name: String,
    /// Price in whole currency units
    pub price: u64,
}

impl CatalogEntry {
    pub fn new(code: u32, name: impl Into<String>, price: u64) -> Self {
        Self {
            code: ProductCode(code),
            name: name.into(),
            price,
        }
    }
}

/// Stock level as presented to the buyer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockStatus {
    SoldOut,
    Low(u32),
    Available(u32),
}

impl StockStatus {
    /// Stock strictly below this amount is reported as low
    pub const LOW_STOCK_THRESHOLD: u32 = 3;

    pub fn from_stock(stock: u32) -> Self {
        match stock {
            0 => Self::SoldOut,
            n if n < Self::LOW_STOCK_THRESHOLD => Self::Low(n),
            n => Self::Available(n),
        }
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SoldOut => write!(f, "sold out"),
            Self::Low(n) => write!(f, "low stock ({n})"),
            Self::Available(n) => write!(f, "available: {n}"),
        }
    }
}

/// Catalog product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u32,
    pub code: ProductCode,
    pub name: String,
    /// Units in stock
    #[serde(default)]
    pub stock: u32,
    pub price: u64,
    #[serde(default)]
    pub image: Option<String>,
}

impl Product {
    pub fn stock_status(&self) -> StockStatus {
        StockStatus::from_stock(self.stock)
    }

    /// Cart entry for this product
    pub fn entry(&self) -> CatalogEntry {
        CatalogEntry {
            code: self.code,
            name: self.name.clone(),
            price: self.price,
        }
    }
}

/// Products on offer, in display order
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: Vec<Product>,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    products: Vec<Product>,
}

impl Catalog {
    /// Builds the catalog, rejecting products sharing the same code
    pub fn new(products: Vec<Product>) -> Result<Self, Error> {
        let mut codes = HashSet::new();
        if let Some(product) = products.iter().find(|p| !codes.insert(p.code)) {
            return Err(Error::DuplicatedCode(product.code));
        }

        Ok(Self { products })
    }

    /// Parses a catalog from the `[[products]]` TOML format
    pub fn from_toml(catalog: &str) -> Result<Self, Error> {
        let CatalogFile { products } = toml::from_str(catalog)?;
        Self::new(products)
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn get(&self, code: ProductCode) -> Option<&Product> {
        self.products.iter().find(|p| p.code == code)
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
