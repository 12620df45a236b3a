use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, Statement, TransactionTrait,
    prelude::*,
};
use uuid::Uuid;

use crate::{
    Amount, EngineError, Expense, ResultEngine, bills, expense_shares, expenses,
};

use super::{Engine, normalize_optional_text, normalize_required_text, with_tx};

/// Caller-supplied fields for creating or updating an expense.
#[derive(Clone, Debug)]
pub struct ExpenseDraft {
    pub description: String,
    pub amount: Amount,
    pub paid_by: String,
    pub shared_by: Vec<String>,
    pub receipt_ref: Option<String>,
}

impl Engine {
    /// Add an expense to a bill and refresh the bill's cached total.
    ///
    /// The mutation and the total recomputation share one transaction, so a
    /// concurrent reader never observes a half-applied edit.
    pub async fn add_expense(
        &self,
        bill_id: &str,
        draft: ExpenseDraft,
        user_id: &str,
    ) -> ResultEngine<Uuid> {
        with_tx!(self, |db_tx| {
            let bill = self.require_bill_read(&db_tx, bill_id, user_id).await?;
            let draft = self.validate_expense_draft(&db_tx, &bill, draft).await?;

            let expense = Expense::new(
                bill.id,
                draft.description,
                draft.amount,
                draft.paid_by,
                draft.shared_by,
                draft.receipt_ref,
            )?;
            expenses::ActiveModel::from(&expense).insert(&db_tx).await?;
            self.insert_shares(&db_tx, &expense.id.to_string(), &expense.shared_by)
                .await?;

            self.recompute_bill_total(&db_tx, bill_id).await?;
            Ok(expense.id)
        })
    }

    /// Update an expense in place, replacing its share set, and refresh the
    /// bill's cached total.
    pub async fn update_expense(
        &self,
        expense_id: Uuid,
        draft: ExpenseDraft,
        user_id: &str,
    ) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let expense_model = expenses::Entity::find_by_id(expense_id.to_string())
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::NotFound("expense".to_string()))?;
            let bill = bills::Entity::find_by_id(expense_model.bill_id.clone())
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::NotFound("bill".to_string()))?;
            self.require_expense_edit(&db_tx, &expense_model, &bill, user_id)
                .await?;
            let draft = self.validate_expense_draft(&db_tx, &bill, draft).await?;

            expenses::ActiveModel {
                id: ActiveValue::Set(expense_model.id.clone()),
                description: ActiveValue::Set(draft.description),
                amount_minor: ActiveValue::Set(draft.amount.minor()),
                paid_by: ActiveValue::Set(draft.paid_by),
                receipt_ref: ActiveValue::Set(draft.receipt_ref),
                updated_at: ActiveValue::Set(Utc::now()),
                ..Default::default()
            }
            .update(&db_tx)
            .await?;

            expense_shares::Entity::delete_many()
                .filter(expense_shares::Column::ExpenseId.eq(expense_model.id.clone()))
                .exec(&db_tx)
                .await?;
            self.insert_shares(&db_tx, &expense_model.id, &draft.shared_by)
                .await?;

            self.recompute_bill_total(&db_tx, &expense_model.bill_id)
                .await?;
            Ok(())
        })
    }

    /// Remove an expense and refresh the bill's cached total.
    pub async fn delete_expense(&self, expense_id: Uuid, user_id: &str) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let expense_model = expenses::Entity::find_by_id(expense_id.to_string())
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::NotFound("expense".to_string()))?;
            let bill = bills::Entity::find_by_id(expense_model.bill_id.clone())
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::NotFound("bill".to_string()))?;
            self.require_expense_edit(&db_tx, &expense_model, &bill, user_id)
                .await?;

            expense_shares::Entity::delete_many()
                .filter(expense_shares::Column::ExpenseId.eq(expense_model.id.clone()))
                .exec(&db_tx)
                .await?;
            expenses::Entity::delete_by_id(expense_model.id)
                .exec(&db_tx)
                .await?;

            self.recompute_bill_total(&db_tx, &expense_model.bill_id)
                .await?;
            Ok(())
        })
    }

    /// Normalizes a draft and checks that the payer and every sharer belong
    /// to the bill's event. The shared-by set is de-duplicated and sorted so
    /// hydration order is stable. An empty shared-by set is accepted.
    async fn validate_expense_draft(
        &self,
        db: &DatabaseTransaction,
        bill: &bills::Model,
        draft: ExpenseDraft,
    ) -> ResultEngine<ExpenseDraft> {
        let description = normalize_required_text(&draft.description, "expense description")?;
        if draft.amount.is_negative() {
            return Err(EngineError::Validation(
                "expense amount must be >= 0".to_string(),
            ));
        }

        let event = self.require_event_member(db, &bill.event_id, &draft.paid_by)
            .await
            .map_err(|err| match err {
                EngineError::PermissionDenied(_) => EngineError::Validation(format!(
                    "payer \"{}\" is not a member of the event",
                    draft.paid_by
                )),
                other => other,
            })?;

        let mut shared_by: Vec<String> = draft.shared_by;
        shared_by.sort();
        shared_by.dedup();
        for person in &shared_by {
            if !self.is_event_member(db, &event, person).await? {
                return Err(EngineError::Validation(format!(
                    "shared-by user \"{person}\" is not a member of the event"
                )));
            }
        }

        Ok(ExpenseDraft {
            description,
            amount: draft.amount,
            paid_by: draft.paid_by,
            shared_by,
            receipt_ref: normalize_optional_text(draft.receipt_ref.as_deref()),
        })
    }

    async fn insert_shares(
        &self,
        db: &DatabaseTransaction,
        expense_id: &str,
        shared_by: &[String],
    ) -> ResultEngine<()> {
        for person in shared_by {
            expense_shares::ActiveModel {
                expense_id: ActiveValue::Set(expense_id.to_string()),
                user_id: ActiveValue::Set(person.clone()),
            }
            .insert(db)
            .await?;
        }
        Ok(())
    }

    /// Loads a bill's expenses (newest first) with hydrated share sets.
    pub(super) async fn load_expenses(
        &self,
        db: &DatabaseTransaction,
        bill_id: &str,
    ) -> ResultEngine<Vec<Expense>> {
        let models = expenses::Entity::find()
            .filter(expenses::Column::BillId.eq(bill_id.to_string()))
            .order_by_desc(expenses::Column::CreatedAt)
            .all(db)
            .await?;

        let expense_ids: Vec<String> = models.iter().map(|m| m.id.clone()).collect();
        let mut shares_by_expense: HashMap<String, Vec<String>> = HashMap::new();
        let share_rows = expense_shares::Entity::find()
            .filter(expense_shares::Column::ExpenseId.is_in(expense_ids))
            .order_by_asc(expense_shares::Column::UserId)
            .all(db)
            .await?;
        for row in share_rows {
            shares_by_expense
                .entry(row.expense_id)
                .or_default()
                .push(row.user_id);
        }

        let mut out = Vec::with_capacity(models.len());
        for model in models {
            let shared_by = shares_by_expense.remove(&model.id).unwrap_or_default();
            out.push(Expense::try_from((model, shared_by))?);
        }
        Ok(out)
    }

    /// Recomputes the bill's derived total from its expense rows and stamps
    /// `updated_at`. Runs inside the caller's transaction; the cached value
    /// equals the live sum on every commit.
    pub(super) async fn recompute_bill_total(
        &self,
        db: &DatabaseTransaction,
        bill_id: &str,
    ) -> ResultEngine<i64> {
        let backend = self.database.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            "SELECT COALESCE(SUM(amount_minor), 0) AS sum \
             FROM expenses \
             WHERE bill_id = ?",
            vec![bill_id.into()],
        );
        let row = db.query_one(stmt).await?;
        let total: i64 = row.and_then(|r| r.try_get("", "sum").ok()).unwrap_or(0);

        bills::ActiveModel {
            id: ActiveValue::Set(bill_id.to_string()),
            total_amount_minor: ActiveValue::Set(total),
            updated_at: ActiveValue::Set(Utc::now()),
            ..Default::default()
        }
        .update(db)
        .await?;

        tracing::debug!("recomputed total for bill {bill_id}: {}", Amount::new(total));
        Ok(total)
    }
}
