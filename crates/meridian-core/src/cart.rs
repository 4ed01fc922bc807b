//! # Cart Normalization
//!
//! Turns raw requested line items into the canonical form the checkout
//! transaction operates on:
//!
//! 1. Drop lines with non-positive quantity or an invalid variant id
//! 2. Merge duplicate variants by summing their quantities
//! 3. Sort ascending by variant id
//!
//! The sort is not cosmetic: every stock transaction acquires variant rows in
//! ascending-id order, so two transactions touching overlapping variant sets
//! can never deadlock on each other.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A requested (variant, quantity) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub variant_id: i64,
    pub quantity: i64,
}

/// Normalizes requested lines into canonical checkout input.
///
/// Returns an empty vec when nothing valid remains; the caller rejects that
/// before opening a transaction.
pub fn normalize_lines(lines: &[OrderLine]) -> Vec<OrderLine> {
    let mut merged: BTreeMap<i64, i64> = BTreeMap::new();

    for line in lines {
        if line.variant_id <= 0 || line.quantity <= 0 {
            continue;
        }
        *merged.entry(line.variant_id).or_insert(0) += line.quantity;
    }

    // BTreeMap iteration is already ascending by variant id.
    merged
        .into_iter()
        .map(|(variant_id, quantity)| OrderLine {
            variant_id,
            quantity,
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(variant_id: i64, quantity: i64) -> OrderLine {
        OrderLine {
            variant_id,
            quantity,
        }
    }

    #[test]
    fn test_drops_non_positive_quantities() {
        let lines = vec![line(1, 0), line(2, -3), line(3, 2)];
        assert_eq!(normalize_lines(&lines), vec![line(3, 2)]);
    }

    #[test]
    fn test_drops_invalid_variant_ids() {
        let lines = vec![line(0, 5), line(-1, 5)];
        assert!(normalize_lines(&lines).is_empty());
    }

    #[test]
    fn test_merges_duplicate_variants() {
        let lines = vec![line(7, 1), line(7, 2), line(7, 3)];
        assert_eq!(normalize_lines(&lines), vec![line(7, 6)]);
    }

    #[test]
    fn test_sorts_ascending_by_variant_id() {
        let lines = vec![line(9, 1), line(3, 1), line(5, 1)];
        let normalized = normalize_lines(&lines);
        let ids: Vec<i64> = normalized.iter().map(|l| l.variant_id).collect();
        assert_eq!(ids, vec![3, 5, 9]);
    }

    #[test]
    fn test_empty_input() {
        assert!(normalize_lines(&[]).is_empty());
    }
}
