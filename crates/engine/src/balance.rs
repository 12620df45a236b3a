//! Per-bill balance calculation.
//!
//! Pure functions over a bill's expense set; no I/O, no side effects, safe to
//! recompute at will. Callers must read the expense set from a consistent
//! snapshot (the same transaction as any concurrent writer).

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::Expense;

/// Net position per user: positive = the group owes them, negative = they owe
/// the group.
pub type BalanceMap = HashMap<String, Decimal>;

/// Computes `balance(u) = payments(u) - owed(u)` for every user appearing as
/// a payer or as a shared-by member across `expenses`.
///
/// Shares are divided at full decimal precision; nothing is rounded here.
/// Rounding happens once, at the presentation edge ([`round_balances`]) and
/// on emitted transfer amounts, so per-expense rounding error cannot compound
/// across a large bill.
///
/// An expense with an empty shared-by set contributes to the payer's payments
/// and to nobody's owed total. That is accepted input, not an error.
#[must_use]
pub fn compute_balances(expenses: &[Expense]) -> BalanceMap {
    let mut payments: HashMap<&str, Decimal> = HashMap::new();
    let mut owed: HashMap<&str, Decimal> = HashMap::new();

    for expense in expenses {
        let amount = expense.amount.to_decimal();
        *payments.entry(expense.paid_by.as_str()).or_default() += amount;

        if expense.shared_by.is_empty() {
            continue;
        }
        let share = amount / Decimal::from(expense.shared_by.len());
        for person in &expense.shared_by {
            *owed.entry(person.as_str()).or_default() += share;
        }
    }

    let mut balances = BalanceMap::new();
    for user in payments.keys().chain(owed.keys()) {
        let paid = payments.get(user).copied().unwrap_or_default();
        let owes = owed.get(user).copied().unwrap_or_default();
        balances.insert((*user).to_string(), paid - owes);
    }
    balances
}

/// 2-digit presentation rounding (banker's), applied to a full-precision
/// balance map for display.
#[must_use]
pub fn round_balances(balances: &BalanceMap) -> BalanceMap {
    balances
        .iter()
        .map(|(user, balance)| (user.clone(), balance.round_dp(2)))
        .collect()
}
