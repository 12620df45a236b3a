use rust_decimal::Decimal;
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};

use crate::{
    Amount, ResultEngine,
    balance::{compute_balances, round_balances},
};

use super::{Engine, with_tx};

/// One bill's contribution to a user's overall position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BillBalance {
    pub bill_id: String,
    pub event_id: String,
    pub title: String,
    pub total_amount: Amount,
    pub balance: Decimal,
    pub is_settled: bool,
}

/// Cross-bill financial summary for one user.
///
/// Settled bills stay in the breakdown for display but are excluded from the
/// owed/owes running totals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub total_bills: usize,
    pub settled_bills: usize,
    pub unsettled_bills: usize,
    pub total_owed_to_user: Decimal,
    pub total_user_owes: Decimal,
    pub breakdown: Vec<BillBalance>,
}

impl Engine {
    /// Aggregates the user's position across every bill they are associated
    /// with. Read-only fan-out over the balance calculator; holds no state.
    pub async fn user_summary(&self, user_id: &str) -> ResultEngine<UserSummary> {
        with_tx!(self, |db_tx| {
            let bills = self.bills_for_user(&db_tx, user_id).await?;

            let mut summary = UserSummary {
                total_bills: bills.len(),
                settled_bills: 0,
                unsettled_bills: 0,
                total_owed_to_user: Decimal::ZERO,
                total_user_owes: Decimal::ZERO,
                breakdown: Vec::with_capacity(bills.len()),
            };

            for bill in bills {
                let expenses = self.load_expenses(&db_tx, &bill.id).await?;
                let balances = round_balances(&compute_balances(&expenses));
                let balance = balances.get(user_id).copied().unwrap_or_default();

                if bill.is_settled {
                    summary.settled_bills += 1;
                } else {
                    summary.unsettled_bills += 1;
                    if balance > Decimal::ZERO {
                        summary.total_owed_to_user += balance;
                    } else if balance < Decimal::ZERO {
                        summary.total_user_owes += balance.abs();
                    }
                }

                summary.breakdown.push(BillBalance {
                    bill_id: bill.id,
                    event_id: bill.event_id,
                    title: bill.title,
                    total_amount: Amount::new(bill.total_amount_minor),
                    balance,
                    is_settled: bill.is_settled,
                });
            }

            Ok(summary)
        })
    }
}
