//! Shopping cart

use derivative::Derivative;

use crate::catalog::CatalogEntry;

/// Ordered, append-only list of selected catalog entries
///
/// There is no identity merging: adding the same entry twice yields two independent line items.
#[derive(Debug, Clone, PartialEq, Derivative)]
#[derivative(Default(new = "true"))]
pub struct Cart {
    entries: Vec<CatalogEntry>,
}

impl Cart {
    /// Appends an entry at the end of the cart
    pub fn add(&mut self, entry: CatalogEntry) {
        self.entries.push(entry);
    }

    /// Sum of all entries prices
    ///
    /// Saturates at `u64::MAX` instead of overflowing.
    pub fn total(&self) -> u64 {
        self.entries
            .iter()
            .fold(0, |total: u64, entry| total.saturating_add(entry.price))
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
