use chrono::Utc;
use sea_orm::{ActiveValue, DatabaseTransaction, prelude::*};

use crate::{
    EngineError, ResultEngine, bill_participants, bills, event_participants, events, expenses,
    users,
};

use super::Engine;

impl Engine {
    pub(super) async fn require_user_exists(
        &self,
        db: &DatabaseTransaction,
        username: &str,
    ) -> ResultEngine<()> {
        let exists = users::Entity::find_by_id(username.to_string())
            .one(db)
            .await?
            .is_some();
        if !exists {
            return Err(EngineError::NotFound("user".to_string()));
        }
        Ok(())
    }

    async fn find_event_by_id(
        &self,
        db: &DatabaseTransaction,
        event_id: &str,
    ) -> ResultEngine<Option<events::Model>> {
        events::Entity::find_by_id(event_id.to_string())
            .one(db)
            .await
            .map_err(Into::into)
    }

    /// Event membership: the creator, or anyone with a participant row.
    pub(super) async fn is_event_member(
        &self,
        db: &DatabaseTransaction,
        event: &events::Model,
        user_id: &str,
    ) -> ResultEngine<bool> {
        if event.created_by == user_id {
            return Ok(true);
        }
        let row =
            event_participants::Entity::find_by_id((event.id.clone(), user_id.to_string()))
                .one(db)
                .await?;
        Ok(row.is_some())
    }

    pub(super) async fn require_event_member(
        &self,
        db: &DatabaseTransaction,
        event_id: &str,
        user_id: &str,
    ) -> ResultEngine<events::Model> {
        let event = self
            .find_event_by_id(db, event_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("event".to_string()))?;
        if !self.is_event_member(db, &event, user_id).await? {
            return Err(EngineError::PermissionDenied(
                "not a member of this event".to_string(),
            ));
        }
        Ok(event)
    }

    /// Bill visibility: the bill creator, the event creator, or any event
    /// participant.
    pub(super) async fn has_bill_access(
        &self,
        db: &DatabaseTransaction,
        bill: &bills::Model,
        user_id: &str,
    ) -> ResultEngine<bool> {
        if bill.created_by == user_id {
            return Ok(true);
        }
        let Some(event) = self.find_event_by_id(db, &bill.event_id).await? else {
            return Ok(false);
        };
        self.is_event_member(db, &event, user_id).await
    }

    pub(super) async fn require_bill_read(
        &self,
        db: &DatabaseTransaction,
        bill_id: &str,
        user_id: &str,
    ) -> ResultEngine<bills::Model> {
        let bill = bills::Entity::find_by_id(bill_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound("bill".to_string()))?;
        if !self.has_bill_access(db, &bill, user_id).await? {
            return Err(EngineError::PermissionDenied(
                "no access to this bill".to_string(),
            ));
        }
        Ok(bill)
    }

    pub(super) async fn require_bill_creator(
        &self,
        db: &DatabaseTransaction,
        bill_id: &str,
        user_id: &str,
    ) -> ResultEngine<bills::Model> {
        let bill = bills::Entity::find_by_id(bill_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound("bill".to_string()))?;
        if bill.created_by != user_id {
            return Err(EngineError::PermissionDenied(
                "only the bill creator may do this".to_string(),
            ));
        }
        Ok(bill)
    }

    /// Expense edits are open to the payer, the bill creator, and the event
    /// creator.
    pub(super) async fn require_expense_edit(
        &self,
        db: &DatabaseTransaction,
        expense: &expenses::Model,
        bill: &bills::Model,
        user_id: &str,
    ) -> ResultEngine<()> {
        if expense.paid_by == user_id || bill.created_by == user_id {
            return Ok(());
        }
        if let Some(event) = self.find_event_by_id(db, &bill.event_id).await?
            && event.created_by == user_id
        {
            return Ok(());
        }
        Err(EngineError::PermissionDenied(
            "no permission to edit this expense".to_string(),
        ))
    }

    /// Lazily enrolls a user as a bill participant on first qualifying
    /// access. Idempotent per (bill, user).
    pub(super) async fn ensure_bill_participant(
        &self,
        db: &DatabaseTransaction,
        bill_id: &str,
        user_id: &str,
    ) -> ResultEngine<()> {
        let existing =
            bill_participants::Entity::find_by_id((bill_id.to_string(), user_id.to_string()))
                .one(db)
                .await?;
        if existing.is_none() {
            bill_participants::ActiveModel {
                bill_id: ActiveValue::Set(bill_id.to_string()),
                user_id: ActiveValue::Set(user_id.to_string()),
                joined_at: ActiveValue::Set(Utc::now()),
            }
            .insert(db)
            .await?;
        }
        Ok(())
    }
}
