//! Greedy settlement netting.
//!
//! Turns a balance map into an ordered list of proposed transfers that zero
//! every balance up to a fixed dust threshold. The matcher pairs the largest
//! debtor with the largest creditor and walks both lists with two pointers.
//! This is a greedy approximation: it does not guarantee the graph-theoretic
//! minimum number of transfers, and deliberately so.
//!
//! The plan is transient. It is recomputed on demand and never persisted;
//! only confirmed [`Settlement`](crate::Settlement) records are stored.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::balance::BalanceMap;

/// Transfers at or below this value are rounding dust and are dropped
/// without signaling.
pub const MIN_TRANSFER: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// One proposed peer-to-peer payment: `from` pays `to`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
}

/// Derives the transfer list that nets `balances` to (approximately) zero.
///
/// Debtors and creditors are each sorted by magnitude descending with the
/// user id as secondary key, so identical input always yields the identical
/// plan. Emitted amounts are rounded to 2 digits; any residual imbalance at
/// or below [`MIN_TRANSFER`] on either side is dropped silently.
#[must_use]
pub fn compute_settlement_plan(balances: &BalanceMap) -> Vec<Transfer> {
    let mut debtors: Vec<(&str, Decimal)> = balances
        .iter()
        .filter(|(_, balance)| **balance < Decimal::ZERO)
        .map(|(user, balance)| (user.as_str(), -*balance))
        .collect();
    let mut creditors: Vec<(&str, Decimal)> = balances
        .iter()
        .filter(|(_, balance)| **balance > Decimal::ZERO)
        .map(|(user, balance)| (user.as_str(), *balance))
        .collect();

    debtors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    creditors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut transfers = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < debtors.len() && j < creditors.len() {
        let (debtor, debt) = debtors[i];
        let (creditor, credit) = creditors[j];

        let amount = debt.min(credit);
        if amount > MIN_TRANSFER {
            transfers.push(Transfer {
                from: debtor.to_string(),
                to: creditor.to_string(),
                amount: amount.round_dp(2),
            });
        }

        debtors[i].1 = debt - amount;
        creditors[j].1 = credit - amount;

        // Both pointers may advance in the same step when the sides matched
        // exactly; whatever stays behind is dust.
        if debtors[i].1 <= MIN_TRANSFER {
            i += 1;
        }
        if creditors[j].1 <= MIN_TRANSFER {
            j += 1;
        }
    }

    transfers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balances(entries: &[(&str, i64)]) -> BalanceMap {
        entries
            .iter()
            .map(|(user, cents)| ((*user).to_string(), Decimal::new(*cents, 2)))
            .collect()
    }

    fn transfer(from: &str, to: &str, cents: i64) -> Transfer {
        Transfer {
            from: from.to_string(),
            to: to.to_string(),
            amount: Decimal::new(cents, 2),
        }
    }

    #[test]
    fn empty_balances_yield_empty_plan() {
        assert!(compute_settlement_plan(&BalanceMap::new()).is_empty());
    }

    #[test]
    fn single_pair_single_transfer() {
        let plan = compute_settlement_plan(&balances(&[("alice", 25_00), ("bob", -25_00)]));
        assert_eq!(plan, vec![transfer("bob", "alice", 25_00)]);
    }

    #[test]
    fn largest_debtor_pays_largest_creditor_first() {
        let plan = compute_settlement_plan(&balances(&[
            ("alice", 10_00),
            ("bob", 40_00),
            ("carol", -30_00),
            ("dave", -20_00),
        ]));
        assert_eq!(
            plan,
            vec![
                transfer("carol", "bob", 30_00),
                transfer("dave", "bob", 10_00),
                transfer("dave", "alice", 10_00),
            ]
        );
    }

    #[test]
    fn equal_magnitudes_break_ties_on_user_id() {
        let plan = compute_settlement_plan(&balances(&[
            ("zoe", 10_00),
            ("amy", 10_00),
            ("bob", -20_00),
        ]));
        assert_eq!(
            plan,
            vec![transfer("bob", "amy", 10_00), transfer("bob", "zoe", 10_00)]
        );
    }

    #[test]
    fn plan_is_deterministic() {
        let map = balances(&[
            ("alice", 12_34),
            ("bob", -7_00),
            ("carol", -5_34),
            ("dave", 0),
        ]);
        assert_eq!(compute_settlement_plan(&map), compute_settlement_plan(&map));
    }

    #[test]
    fn dust_balances_are_dropped_silently() {
        let plan = compute_settlement_plan(&balances(&[("alice", 1), ("bob", -1)]));
        assert!(plan.is_empty());
    }

    #[test]
    fn transfers_zero_out_balances_within_threshold() {
        let mut map = balances(&[
            ("alice", 3_37),
            ("bob", 148_32),
            ("carol", -151_68),
            ("dave", -1),
        ]);
        for t in compute_settlement_plan(&map) {
            *map.get_mut(&t.from).unwrap() += t.amount;
            *map.get_mut(&t.to).unwrap() -= t.amount;
        }
        assert!(map.values().all(|balance| balance.abs() <= MIN_TRANSFER));
    }
}
