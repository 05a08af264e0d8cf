//! Stock levels for the products a single transaction touches.
//!
//! A store loads (and locks) the rows it needs into a [`StockBook`], the
//! domain mutates the book, and the store writes back only the levels that
//! changed.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use uuid::Uuid;

/// One product/quantity pair to reserve or restore.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StockLine { pub product_id: Uuid, pub quantity: i32 }

#[derive(Clone, Debug, Default)]
pub struct StockBook {
    levels: BTreeMap<Uuid, i32>,
    dirty: BTreeSet<Uuid>,
}

impl StockBook {
    pub fn new() -> Self { Self::default() }

    pub fn load(&mut self, product_id: Uuid, level: i32) { self.levels.insert(product_id, level); }

    pub fn level(&self, product_id: &Uuid) -> Option<i32> { self.levels.get(product_id).copied() }

    /// Reserves every line or none of them.
    pub fn reserve(&mut self, lines: &[StockLine]) -> Result<(), StockError> {
        let mut needed: BTreeMap<Uuid, i32> = BTreeMap::new();
        for line in lines {
            *needed.entry(line.product_id).or_default() += line.quantity;
        }
        for (product_id, requested) in &needed {
            let available = self.levels.get(product_id).copied().ok_or(StockError::Untracked(*product_id))?;
            if available < *requested {
                return Err(StockError::Insufficient { product_id: *product_id, requested: *requested, available });
            }
        }
        for (product_id, requested) in needed {
            if let Some(level) = self.levels.get_mut(&product_id) {
                *level -= requested;
                self.dirty.insert(product_id);
            }
        }
        Ok(())
    }

    /// Puts quantities back. Products missing from the book are skipped: a
    /// product deleted since the order was placed has nowhere to return to.
    pub fn restore(&mut self, lines: &[StockLine]) {
        for line in lines {
            if let Some(level) = self.levels.get_mut(&line.product_id) {
                *level += line.quantity;
                self.dirty.insert(line.product_id);
            }
        }
    }

    /// Changed levels, in ascending product id order.
    pub fn changes(&self) -> Vec<(Uuid, i32)> {
        self.dirty.iter().filter_map(|id| self.levels.get(id).map(|level| (*id, *level))).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    Insufficient { product_id: Uuid, requested: i32, available: i32 },
    #[error("product {0} is not tracked in this transaction")]
    Untracked(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_is_all_or_nothing() {
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let mut book = StockBook::new();
        book.load(a, 5);
        book.load(b, 1);
        let err = book.reserve(&[StockLine { product_id: a, quantity: 2 }, StockLine { product_id: b, quantity: 2 }]).unwrap_err();
        assert_eq!(err, StockError::Insufficient { product_id: b, requested: 2, available: 1 });
        assert_eq!(book.level(&a), Some(5));
        assert!(book.changes().is_empty());
    }

    #[test]
    fn test_duplicate_lines_are_summed() {
        let a = Uuid::now_v7();
        let mut book = StockBook::new();
        book.load(a, 3);
        assert!(book.reserve(&[StockLine { product_id: a, quantity: 2 }, StockLine { product_id: a, quantity: 2 }]).is_err());
        book.reserve(&[StockLine { product_id: a, quantity: 1 }, StockLine { product_id: a, quantity: 2 }]).unwrap();
        assert_eq!(book.changes(), vec![(a, 0)]);
    }

    #[test]
    fn test_restore_skips_missing_products() {
        let a = Uuid::now_v7();
        let mut book = StockBook::new();
        book.load(a, 0);
        book.restore(&[StockLine { product_id: a, quantity: 4 }, StockLine { product_id: Uuid::now_v7(), quantity: 1 }]);
        assert_eq!(book.changes(), vec![(a, 4)]);
    }
}
