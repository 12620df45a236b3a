use chrono::Utc;
use sea_orm::{
    DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Amount, EngineError, ResultEngine, Settlement, settlements};

use super::{Engine, normalize_optional_text, with_tx};

/// Outcome of a confirm call. Re-confirming an already-confirmed settlement
/// is a soft no-op, reported as a warning condition rather than an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementConfirmation {
    Confirmed,
    AlreadyConfirmed,
}

impl Engine {
    /// Record a claimed payment from `from_user` to `to_user` on a bill.
    ///
    /// Only the asserted payer may create the record, and the recipient must
    /// be able to see the bill. The amount is deliberately *not* checked
    /// against the computed balances: settlements are optimistic, manual
    /// tracking, confirmed by the recipient, and never feed back into the
    /// netting.
    pub async fn propose_settlement(
        &self,
        bill_id: &str,
        from_user: &str,
        to_user: &str,
        amount: Amount,
        notes: Option<&str>,
    ) -> ResultEngine<Uuid> {
        let notes = normalize_optional_text(notes);
        with_tx!(self, |db_tx| {
            let bill = self.require_bill_read(&db_tx, bill_id, from_user).await?;
            self.require_user_exists(&db_tx, to_user).await?;
            if !self.has_bill_access(&db_tx, &bill, to_user).await? {
                return Err(EngineError::Validation(format!(
                    "recipient \"{to_user}\" is not a participant of this bill"
                )));
            }

            let settlement = Settlement::new(
                bill.id,
                from_user.to_string(),
                to_user.to_string(),
                amount,
                notes,
            )?;
            settlements::ActiveModel::from(&settlement)
                .insert(&db_tx)
                .await?;

            tracing::debug!(
                "settlement {} recorded: {from_user} -> {to_user}, awaiting confirmation",
                settlement.id
            );
            Ok(settlement.id)
        })
    }

    /// Confirm a received settlement (recipient-only). Irreversible.
    ///
    /// The flag flip is a single conditional update filtered on
    /// `is_confirmed = false`, so two racing confirms cannot both win: the
    /// loser observes zero affected rows and takes the soft path.
    pub async fn confirm_settlement(
        &self,
        settlement_id: Uuid,
        acting_user: &str,
    ) -> ResultEngine<SettlementConfirmation> {
        with_tx!(self, |db_tx| {
            let model = settlements::Entity::find_by_id(settlement_id.to_string())
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::NotFound("settlement".to_string()))?;
            if model.to_user != acting_user {
                return Err(EngineError::PermissionDenied(
                    "only the recipient may confirm a settlement".to_string(),
                ));
            }
            if model.is_confirmed {
                tracing::warn!("settlement {settlement_id} was already confirmed");
                return Ok(SettlementConfirmation::AlreadyConfirmed);
            }

            let result = settlements::Entity::update_many()
                .col_expr(settlements::Column::IsConfirmed, Expr::value(true))
                .col_expr(settlements::Column::ConfirmedAt, Expr::value(Utc::now()))
                .filter(settlements::Column::Id.eq(settlement_id.to_string()))
                .filter(settlements::Column::IsConfirmed.eq(false))
                .exec(&db_tx)
                .await?;
            if result.rows_affected == 0 {
                tracing::warn!("settlement {settlement_id} was already confirmed");
                return Ok(SettlementConfirmation::AlreadyConfirmed);
            }

            tracing::debug!("settlement {settlement_id} confirmed by {acting_user}");
            Ok(SettlementConfirmation::Confirmed)
        })
    }

    /// Reject a received settlement (recipient-only, unconfirmed-only).
    ///
    /// Rejection deletes the record; a confirmed settlement can never be
    /// rejected.
    pub async fn reject_settlement(
        &self,
        settlement_id: Uuid,
        acting_user: &str,
    ) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let model = settlements::Entity::find_by_id(settlement_id.to_string())
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::NotFound("settlement".to_string()))?;
            if model.to_user != acting_user {
                return Err(EngineError::PermissionDenied(
                    "only the recipient may reject a settlement".to_string(),
                ));
            }
            if model.is_confirmed {
                return Err(EngineError::InvalidState(
                    "cannot reject a confirmed settlement".to_string(),
                ));
            }

            let result = settlements::Entity::delete_many()
                .filter(settlements::Column::Id.eq(settlement_id.to_string()))
                .filter(settlements::Column::IsConfirmed.eq(false))
                .exec(&db_tx)
                .await?;
            if result.rows_affected == 0 {
                // Confirmed by a racing writer between the read and the
                // delete.
                return Err(EngineError::InvalidState(
                    "cannot reject a confirmed settlement".to_string(),
                ));
            }

            tracing::debug!("settlement {settlement_id} rejected by {acting_user}");
            Ok(())
        })
    }

    /// Loads a bill's settlements, newest first.
    pub(super) async fn load_settlements(
        &self,
        db: &DatabaseTransaction,
        bill_id: &str,
    ) -> ResultEngine<Vec<Settlement>> {
        let models = settlements::Entity::find()
            .filter(settlements::Column::BillId.eq(bill_id.to_string()))
            .order_by_desc(settlements::Column::CreatedAt)
            .all(db)
            .await?;
        models.into_iter().map(Settlement::try_from).collect()
    }
}
