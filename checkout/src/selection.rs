//! The set of seats a user has picked.

use cinepay_api::{Seat, SeatLayout};
use std::collections::BTreeSet;

/// Selected seats, keyed by [`Seat::key`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    keys: BTreeSet<String>,
}

impl SelectionSet {
    /// Empty selection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle `seat` in or out; returns whether the selection changed
    ///
    /// Seats that are neither available nor held are never added. Removing
    /// is always allowed.
    pub fn toggle(&mut self, seat: &Seat) -> bool {
        let key = seat.key();
        if self.keys.remove(&key) {
            return true;
        }
        if !seat.status.is_selectable() {
            return false;
        }
        self.keys.insert(key)
    }

    /// Whether the seat with `key` is selected
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Number of selected seats
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether nothing is selected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Drop every seat
    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// Selected seats of `layout`, by row then column
    #[must_use]
    pub fn seats<'l>(&self, layout: &'l SeatLayout) -> Vec<&'l Seat> {
        layout
            .sorted_seats()
            .into_iter()
            .filter(|seat| self.keys.contains(&seat.key()))
            .collect()
    }

    /// Sum of seat prices, each falling back to `base_price`; saturates at `u64::MAX`
    #[must_use]
    pub fn subtotal(&self, layout: &SeatLayout, base_price: Option<u64>) -> u64 {
        self.seats(layout)
            .iter()
            .map(|seat| seat.price_or(base_price))
            .fold(0, u64::saturating_add)
    }

    /// Sorted labels, for the summary line
    #[must_use]
    pub fn labels(&self, layout: &SeatLayout) -> Vec<String> {
        let mut labels: Vec<String> = self.seats(layout).iter().map(|s| s.label.clone()).collect();
        labels.sort();
        labels
    }
}
