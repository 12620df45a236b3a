use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveValue, Condition, DatabaseTransaction, QueryFilter, QueryOrder, Statement,
    TransactionTrait, prelude::*,
};
use serde::{Deserialize, Serialize};

use crate::{
    Amount, Bill, EngineError, Expense, ResultEngine, Settlement, Transfer,
    balance::{BalanceMap, compute_balances, round_balances},
    bill_participants, bills, compute_settlement_plan, event_participants, events,
};

use super::{Engine, normalize_optional_text, normalize_required_text, with_tx};

/// Computed split for one bill: rounded per-user balances and the transient
/// netting plan, side by side with the cached total.
///
/// Recorded settlements are *not* folded in here; they are a separate read
/// model (`BillDetail::settlements`) so callers can show "computed balance"
/// and "claimed payments" independently.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub balances: BalanceMap,
    pub transfers: Vec<Transfer>,
    pub total_amount: Amount,
}

/// Everything a bill view needs: the bill, its expenses with hydrated share
/// sets, the computed split, and the recorded settlements (newest first).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BillDetail {
    pub bill: Bill,
    pub expenses: Vec<Expense>,
    pub split: SplitSummary,
    pub settlements: Vec<Settlement>,
}

/// One row of a bill listing: the bill plus the calling user's view of it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BillOverview {
    pub bill: Bill,
    pub expense_count: usize,
    pub user_balance: Decimal,
}

/// Optional narrowing for [`Engine::list_bills`].
#[derive(Clone, Debug, Default)]
pub struct BillListFilter {
    pub event_id: Option<String>,
    pub settled: Option<bool>,
}

fn build_split_summary(expenses: &[Expense], total_amount: Amount) -> SplitSummary {
    let balances = compute_balances(expenses);
    let transfers = compute_settlement_plan(&balances);
    SplitSummary {
        balances: round_balances(&balances),
        transfers,
        total_amount,
    }
}

impl Engine {
    /// Create a bill under a finalized event the user belongs to.
    ///
    /// The creator is enrolled as the first bill participant.
    pub async fn create_bill(
        &self,
        event_id: &str,
        title: &str,
        description: Option<&str>,
        user_id: &str,
    ) -> ResultEngine<String> {
        let title = normalize_required_text(title, "bill title")?;
        let description = normalize_optional_text(description);

        with_tx!(self, |db_tx| {
            self.require_user_exists(&db_tx, user_id).await?;
            let event = self.require_event_member(&db_tx, event_id, user_id).await?;
            if !event.is_finalized {
                return Err(EngineError::InvalidState(
                    "event date is not finalized".to_string(),
                ));
            }

            let bill = Bill::new(event.id, title, description, user_id.to_string());
            let bill_id = bill.id.clone();
            bills::ActiveModel::from(&bill).insert(&db_tx).await?;
            self.ensure_bill_participant(&db_tx, &bill_id, user_id)
                .await?;

            tracing::debug!("created bill {bill_id} for event {event_id}");
            Ok(bill_id)
        })
    }

    /// Full bill view: expenses, computed split, and recorded settlements.
    ///
    /// First qualifying access enrolls the user as a bill participant, so the
    /// bill shows up in their listings from then on.
    pub async fn bill_detail(&self, bill_id: &str, user_id: &str) -> ResultEngine<BillDetail> {
        with_tx!(self, |db_tx| {
            let bill_model = self.require_bill_read(&db_tx, bill_id, user_id).await?;
            self.ensure_bill_participant(&db_tx, bill_id, user_id)
                .await?;

            let expenses = self.load_expenses(&db_tx, bill_id).await?;
            let settlements = self.load_settlements(&db_tx, bill_id).await?;
            let bill = Bill::try_from(bill_model)?;
            let split = build_split_summary(&expenses, bill.total_amount);

            Ok(BillDetail {
                bill,
                expenses,
                split,
                settlements,
            })
        })
    }

    /// All bills the user is associated with: bills they created, bills of
    /// events they created or participate in, and bills they were enrolled in
    /// as a participant.
    pub(super) async fn bills_for_user(
        &self,
        db: &DatabaseTransaction,
        user_id: &str,
    ) -> ResultEngine<Vec<bills::Model>> {
        let mut event_ids: Vec<String> = events::Entity::find()
            .filter(events::Column::CreatedBy.eq(user_id))
            .all(db)
            .await?
            .into_iter()
            .map(|event| event.id)
            .collect();
        event_ids.extend(
            event_participants::Entity::find()
                .filter(event_participants::Column::UserId.eq(user_id))
                .all(db)
                .await?
                .into_iter()
                .map(|row| row.event_id),
        );
        let participant_bill_ids: Vec<String> = bill_participants::Entity::find()
            .filter(bill_participants::Column::UserId.eq(user_id))
            .all(db)
            .await?
            .into_iter()
            .map(|row| row.bill_id)
            .collect();

        bills::Entity::find()
            .filter(
                Condition::any()
                    .add(bills::Column::CreatedBy.eq(user_id))
                    .add(bills::Column::EventId.is_in(event_ids))
                    .add(bills::Column::Id.is_in(participant_bill_ids)),
            )
            .order_by_desc(bills::Column::CreatedAt)
            .all(db)
            .await
            .map_err(Into::into)
    }

    /// Lists the user's bills, newest first, with per-bill expense count and
    /// the user's own rounded balance.
    pub async fn list_bills(
        &self,
        user_id: &str,
        filter: &BillListFilter,
    ) -> ResultEngine<Vec<BillOverview>> {
        with_tx!(self, |db_tx| {
            let mut models = self.bills_for_user(&db_tx, user_id).await?;
            if let Some(event_id) = &filter.event_id {
                models.retain(|bill| &bill.event_id == event_id);
            }
            if let Some(settled) = filter.settled {
                models.retain(|bill| bill.is_settled == settled);
            }

            let mut out = Vec::with_capacity(models.len());
            for model in models {
                let expenses = self.load_expenses(&db_tx, &model.id).await?;
                let balances = round_balances(&compute_balances(&expenses));
                let user_balance = balances.get(user_id).copied().unwrap_or_default();
                out.push(BillOverview {
                    expense_count: expenses.len(),
                    user_balance,
                    bill: Bill::try_from(model)?,
                });
            }
            Ok(out)
        })
    }

    /// Flip the manual settled flag (creator-only) and return the new state.
    ///
    /// The flag is independent of the computed balances: a bill may be marked
    /// settled with debts outstanding, and vice versa.
    pub async fn toggle_bill_settled(&self, bill_id: &str, user_id: &str) -> ResultEngine<bool> {
        with_tx!(self, |db_tx| {
            let bill = self.require_bill_creator(&db_tx, bill_id, user_id).await?;
            let now_settled = !bill.is_settled;
            bills::ActiveModel {
                id: ActiveValue::Set(bill.id),
                is_settled: ActiveValue::Set(now_settled),
                updated_at: ActiveValue::Set(Utc::now()),
                ..Default::default()
            }
            .update(&db_tx)
            .await?;
            tracing::debug!("bill {bill_id} marked settled={now_settled}");
            Ok(now_settled)
        })
    }

    /// Delete a bill and everything it owns (creator-only).
    pub async fn delete_bill(&self, bill_id: &str, user_id: &str) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let bill = self.require_bill_creator(&db_tx, bill_id, user_id).await?;
            let bill_db_id = bill.id;

            // Explicit cascade within one DB transaction; not every FK
            // declares ON DELETE CASCADE on sqlite.
            let backend = self.database.get_database_backend();

            db_tx
                .execute(Statement::from_sql_and_values(
                    backend,
                    "DELETE FROM expense_shares WHERE expense_id IN \
                     (SELECT id FROM expenses WHERE bill_id = ?);",
                    vec![bill_db_id.clone().into()],
                ))
                .await?;
            db_tx
                .execute(Statement::from_sql_and_values(
                    backend,
                    "DELETE FROM expenses WHERE bill_id = ?;",
                    vec![bill_db_id.clone().into()],
                ))
                .await?;
            db_tx
                .execute(Statement::from_sql_and_values(
                    backend,
                    "DELETE FROM settlements WHERE bill_id = ?;",
                    vec![bill_db_id.clone().into()],
                ))
                .await?;
            db_tx
                .execute(Statement::from_sql_and_values(
                    backend,
                    "DELETE FROM bill_participants WHERE bill_id = ?;",
                    vec![bill_db_id.clone().into()],
                ))
                .await?;
            db_tx
                .execute(Statement::from_sql_and_values(
                    backend,
                    "DELETE FROM bills WHERE id = ?;",
                    vec![bill_db_id.into()],
                ))
                .await?;

            Ok(())
        })
    }
}
