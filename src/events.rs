//! The interpreter's append-only audit trail. Every state-changing
//! operation emits one of these before returning, so a caller can replay
//! exactly what happened during a period without re-deriving it from the
//! before/after state snapshots.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    CovenantChecked {
        name: String,
        metric_value: Decimal,
        threshold: Decimal,
        passed: bool,
    },
    CovenantBreached {
        name: String,
        metric_value: Decimal,
        threshold: Decimal,
    },
    CureApplied {
        covenant: String,
        mechanism: String,
        amount: Decimal,
    },
    CureUnavailable {
        covenant: String,
        reason: String,
    },
    BasketDrawn {
        name: String,
        amount: Decimal,
        remaining: Decimal,
    },
    BasketCapacityRecalculated {
        name: String,
        capacity: Decimal,
    },
    PhaseEntered {
        name: String,
    },
    PhaseExited {
        name: String,
    },
    TransitionFired {
        name: String,
        from: String,
        to: String,
    },
    MilestoneAchieved {
        name: String,
        date: NaiveDate,
    },
    MilestoneMissed {
        name: String,
        longstop: NaiveDate,
    },
    TechnicalMilestoneProgress {
        name: String,
        current_value: Decimal,
        target_value: Decimal,
    },
    AmendmentApplied {
        number: i64,
    },
    AmendmentDirectiveFailed {
        number: i64,
        directive_index: usize,
        reason: String,
    },
    WaterfallExecuted {
        name: String,
        total_available: Decimal,
        shortfall: Decimal,
    },
    ReserveFunded {
        name: String,
        amount: Decimal,
        balance: Decimal,
    },
    ReserveDrawn {
        name: String,
        amount: Decimal,
        shortfall: Decimal,
    },
    ConditionPrecedentSatisfied {
        checklist: String,
        item: String,
    },
    ConditionPrecedentWaived {
        checklist: String,
        item: String,
    },
    ExternalEventTriggered {
        name: String,
    },
}

/// An append-only log of [`Event`]s emitted during interpretation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        EventStore::default()
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn emits_and_drains_events() {
        let mut store = EventStore::new();
        store.emit(Event::CovenantChecked {
            name: "MaxLeverage".to_string(),
            metric_value: dec!(3.5),
            threshold: dec!(4.0),
            passed: true,
        });
        assert_eq!(store.events().len(), 1);
        let drained = store.take_events();
        assert_eq!(drained.len(), 1);
        assert!(store.events().is_empty());
    }
}
