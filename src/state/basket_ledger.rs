//! Runtime usage tracking for baskets: an append-only log of every draw
//! and accumulation, from which cumulative used/accumulated totals are
//! derived (spec.md §8 testable property 1: "for every basket, used =
//! Σ(usage ledger entries) and accumulated = Σ(accumulation entries)").

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerEntryKind {
    Usage,
    Accumulation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketLedgerEntry {
    pub timestamp: NaiveDate,
    pub basket: String,
    pub amount: Decimal,
    pub description: Option<String>,
    pub kind: LedgerEntryKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasketLedger {
    entries: Vec<BasketLedgerEntry>,
}

impl BasketLedger {
    pub fn new() -> Self {
        BasketLedger::default()
    }

    /// entries in insertion order, which is also timestamp-monotonic
    /// (spec.md §5: "basket and cure ledger entries are totally ordered
    /// by insertion")
    pub fn entries(&self) -> &[BasketLedgerEntry] {
        &self.entries
    }

    pub fn entries_since(&self, since: NaiveDate) -> Vec<&BasketLedgerEntry> {
        self.entries.iter().filter(|e| e.timestamp >= since).collect()
    }

    pub fn drawn(&self, name: &str) -> Decimal {
        self.entries
            .iter()
            .filter(|e| e.basket == name && e.kind == LedgerEntryKind::Usage)
            .map(|e| e.amount)
            .sum()
    }

    pub fn accumulated(&self, name: &str) -> Decimal {
        self.entries
            .iter()
            .filter(|e| e.basket == name && e.kind == LedgerEntryKind::Accumulation)
            .map(|e| e.amount)
            .sum()
    }

    /// records a draw against a basket's capacity; does not itself check
    /// availability — the interpreter's basket module checks capacity
    /// before calling this
    pub fn draw(&mut self, name: &str, amount: Decimal, timestamp: NaiveDate, description: Option<String>) {
        self.entries.push(BasketLedgerEntry {
            timestamp,
            basket: name.to_string(),
            amount,
            description,
            kind: LedgerEntryKind::Usage,
        });
    }

    /// records a negative usage entry, clamped so the basket's cumulative
    /// drawn amount never goes below zero
    pub fn replenish(&mut self, name: &str, amount: Decimal, timestamp: NaiveDate, description: Option<String>) {
        let credit = amount.min(self.drawn(name));
        self.entries.push(BasketLedgerEntry {
            timestamp,
            basket: name.to_string(),
            amount: -credit,
            description,
            kind: LedgerEntryKind::Usage,
        });
    }

    /// adds to a builder basket's retained-earnings accumulation
    pub fn accumulate(&mut self, name: &str, amount: Decimal, timestamp: NaiveDate, description: Option<String>) {
        self.entries.push(BasketLedgerEntry {
            timestamp,
            basket: name.to_string(),
            amount,
            description,
            kind: LedgerEntryKind::Accumulation,
        });
    }

    pub fn available(&self, name: &str, capacity: Decimal) -> Decimal {
        (capacity - self.drawn(name)).max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn draw_and_replenish_track_availability() {
        let mut ledger = BasketLedger::new();
        ledger.draw("RPBasket", dec!(1_000_000), d(2026, 1, 15), None);
        assert_eq!(ledger.available("RPBasket", dec!(5_000_000)), dec!(4_000_000));
        ledger.replenish("RPBasket", dec!(400_000), d(2026, 2, 1), None);
        assert_eq!(ledger.available("RPBasket", dec!(5_000_000)), dec!(4_400_000));
    }

    #[test]
    fn builder_basket_accumulates_independently_of_draws() {
        let mut ledger = BasketLedger::new();
        ledger.accumulate("GrowthBasket", dec!(500_000), d(2026, 1, 31), Some("Q1 retained earnings".to_string()));
        ledger.accumulate("GrowthBasket", dec!(250_000), d(2026, 4, 30), None);
        assert_eq!(ledger.accumulated("GrowthBasket"), dec!(750_000));
    }

    #[test]
    fn used_and_accumulated_are_sums_over_entries() {
        let mut ledger = BasketLedger::new();
        ledger.draw("RPBasket", dec!(100), d(2026, 1, 1), None);
        ledger.draw("RPBasket", dec!(50), d(2026, 2, 1), None);
        ledger.accumulate("RPBasket", dec!(10), d(2026, 3, 1), None);
        assert_eq!(ledger.drawn("RPBasket"), dec!(150));
        assert_eq!(ledger.accumulated("RPBasket"), dec!(10));
        assert_eq!(ledger.entries().len(), 3);
    }

    #[test]
    fn entries_since_filters_by_timestamp() {
        let mut ledger = BasketLedger::new();
        ledger.draw("RPBasket", dec!(100), d(2026, 1, 1), None);
        ledger.draw("RPBasket", dec!(50), d(2026, 3, 1), None);
        assert_eq!(ledger.entries_since(d(2026, 2, 1)).len(), 1);
    }
}
