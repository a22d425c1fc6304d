//! Banknote decomposition for withdrawals.
//!
//! The solver is a pure function over an amount and a [`DenominationSet`];
//! nothing survives across calls.

use std::collections::BTreeMap;

use thiserror::Error;

use caixa_core::models::Banknotes;
use caixa_core::LedgerError;

#[derive(Debug, Error)]
#[error("invalid denomination set: {0}")]
pub struct InvalidDenominationSet(String);

/// The note face values one installation dispenses, largest first.
#[derive(Debug, Clone)]
pub struct DenominationSet {
    notes: Vec<i64>,
    lowest: i64,
}

impl DenominationSet {
    pub fn new(mut notes: Vec<i64>) -> Result<Self, InvalidDenominationSet> {
        if notes.is_empty() {
            return Err(InvalidDenominationSet(
                "at least one denomination is required".into(),
            ));
        }
        if notes.iter().any(|&note| note <= 0) {
            return Err(InvalidDenominationSet(
                "denominations must be positive".into(),
            ));
        }
        notes.sort_unstable_by(|a, b| b.cmp(a));
        if notes.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(InvalidDenominationSet("duplicate denomination".into()));
        }
        let lowest = notes[notes.len() - 1];
        Ok(Self { notes, lowest })
    }

    pub fn lowest(&self) -> i64 {
        self.lowest
    }

    pub fn contains(&self, value: i64) -> bool {
        self.notes.contains(&value)
    }

    pub fn descending(&self) -> impl Iterator<Item = i64> + '_ {
        self.notes.iter().copied()
    }

    /// The face values as shown in error messages: `100, 50, 20`.
    pub fn describe(&self) -> String {
        self.notes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Break `amount` into available notes, greedily from the largest
/// denomination down, with a lookahead guard before every subtraction.
///
/// The guard keeps the greedy pass from painting itself into a corner on
/// sets where plain greedy fails (taking a large note that strands an
/// unreachable remainder). It is a heuristic: success is the contract, not
/// a minimal note count.
pub fn decompose(amount: i64, notes: &DenominationSet) -> Result<Banknotes, LedgerError> {
    if amount < notes.lowest() {
        return Err(LedgerError::WithdrawalBelowMinimum {
            minimum: notes.lowest(),
        });
    }

    let mut remaining = amount;
    let mut counts: BTreeMap<i64, u32> = BTreeMap::new();

    for note in notes.descending() {
        while remaining > 0 && is_subtractable(remaining, note, notes) {
            remaining -= note;
            *counts.entry(note).or_insert(0) += 1;
        }
    }

    if remaining > 0 {
        return Err(LedgerError::NotRepresentable {
            available: notes.describe(),
        });
    }

    Ok(Banknotes(counts))
}

/// Taking `note` must not leave a remainder that no smaller note can reach:
/// the remainder has to be zero, exceed `note`, or be divisible by some
/// still-available note (itself a face value, or a multiple of the lowest).
fn is_subtractable(remaining: i64, note: i64, notes: &DenominationSet) -> bool {
    let rest = remaining - note;

    if rest < 0 {
        return false;
    }
    if rest > 0 && rest < notes.lowest() {
        return false;
    }
    if rest > note {
        return true;
    }

    for smaller in notes.descending().filter(|&n| n <= note) {
        let remainder = rest % smaller;
        if remainder == 0 || notes.contains(remainder) || remainder % notes.lowest() == 0 {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn set(notes: &[i64]) -> DenominationSet {
        DenominationSet::new(notes.to_vec()).unwrap()
    }

    #[test]
    fn breakdown_sums_to_the_requested_amount() {
        let notes = set(&[20, 50, 100]);
        let breakdown = decompose(410, &notes).unwrap();
        assert_eq!(breakdown.total(), 410);
        assert!(breakdown.0.values().all(|&count| count > 0));
    }

    #[test]
    fn exact_single_note_amounts() {
        let notes = set(&[20, 50, 100]);
        for amount in [20, 50, 100] {
            let breakdown = decompose(amount, &notes).unwrap();
            assert_eq!(breakdown.0, BTreeMap::from([(amount, 1)]));
        }
    }

    #[test]
    fn eighty_avoids_the_greedy_trap() {
        // Plain greedy would take 50 and strand 30; the lookahead refuses
        // the 50 and yields 4x20.
        let notes = set(&[20, 50, 100]);
        let breakdown = decompose(80, &notes).unwrap();
        assert_eq!(breakdown.total(), 80);
    }

    #[test]
    fn below_the_lowest_note_is_rejected() {
        let notes = set(&[20, 50, 100]);
        for amount in [10, 0, -5] {
            assert!(matches!(
                decompose(amount, &notes),
                Err(LedgerError::WithdrawalBelowMinimum { minimum: 20 })
            ));
        }
    }

    #[test]
    fn unreachable_amounts_are_not_representable() {
        let notes = set(&[20, 50, 100]);
        let err = decompose(30, &notes).unwrap_err();
        assert!(matches!(err, LedgerError::NotRepresentable { .. }));
        assert_eq!(
            err.to_string(),
            "Cédulas indisponíveis para esse valor. Cédulas disponíveis: 100, 50, 20."
        );

        assert!(matches!(
            decompose(40, &set(&[30, 50, 100])),
            Err(LedgerError::NotRepresentable { .. })
        ));
    }

    #[test]
    fn works_with_alternate_sets() {
        let notes = set(&[2, 5]);
        let breakdown = decompose(11, &notes).unwrap();
        assert_eq!(breakdown.total(), 11);

        let notes = set(&[10]);
        assert_eq!(decompose(70, &notes).unwrap().0, BTreeMap::from([(10, 7)]));
        assert!(decompose(75, &notes).is_err());
    }

    #[test]
    fn rejects_malformed_sets() {
        assert!(DenominationSet::new(vec![]).is_err());
        assert!(DenominationSet::new(vec![20, 50, 20]).is_err());
        assert!(DenominationSet::new(vec![0, 50]).is_err());
        assert!(DenominationSet::new(vec![-20, 50]).is_err());
    }

    #[test]
    fn set_orders_largest_first() {
        let notes = set(&[50, 100, 20]);
        assert_eq!(notes.descending().collect::<Vec<_>>(), vec![100, 50, 20]);
        assert_eq!(notes.lowest(), 20);
        assert_eq!(notes.describe(), "100, 50, 20");
    }

    proptest! {
        /// Whatever the outcome, a success always sums exactly and never
        /// carries zero counts.
        #[test]
        fn successful_breakdowns_sum_exactly(amount in 1i64..5_000) {
            let notes = set(&[20, 50, 100]);
            if let Ok(breakdown) = decompose(amount, &notes) {
                prop_assert_eq!(breakdown.total(), amount);
                prop_assert!(breakdown.0.values().all(|&count| count > 0));
            }
        }

        /// When the lowest note divides every other note, every multiple of
        /// it is representable and the heuristic must find a solution.
        #[test]
        fn heuristic_is_complete_when_lowest_divides_all(multiplier in 1i64..400) {
            let notes = set(&[10, 50, 100]);
            let amount = multiplier * 10;
            let breakdown = decompose(amount, &notes).unwrap();
            prop_assert_eq!(breakdown.total(), amount);
        }

        #[test]
        fn failures_are_stable_across_repeat_calls(amount in 1i64..1_000) {
            let notes = set(&[30, 50, 100]);
            let first = decompose(amount, &notes).is_ok();
            let second = decompose(amount, &notes).is_ok();
            prop_assert_eq!(first, second);
        }
    }
}
