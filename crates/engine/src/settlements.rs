//! Settlement primitives.
//!
//! A `Settlement` is a user-asserted payment record, distinct from the
//! transient transfers the netting plan proposes. It is created by the payer,
//! waits for the recipient's confirmation, and becomes immutable once
//! confirmed. Settlements are informational: they never feed back into the
//! computed balances.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Amount, EngineError, ResultEngine};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: Uuid,
    pub bill_id: String,
    pub from_user: String,
    pub to_user: String,
    pub amount: Amount,
    pub notes: Option<String>,
    pub is_confirmed: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Settlement {
    pub fn new(
        bill_id: String,
        from_user: String,
        to_user: String,
        amount: Amount,
        notes: Option<String>,
    ) -> ResultEngine<Self> {
        if !amount.is_positive() {
            return Err(EngineError::Validation(
                "settlement amount must be > 0".to_string(),
            ));
        }
        if from_user == to_user {
            return Err(EngineError::Validation(
                "from_user and to_user must differ".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            bill_id,
            from_user,
            to_user,
            amount,
            notes,
            is_confirmed: false,
            confirmed_at: None,
            created_at: Utc::now(),
        })
    }

    /// Whether the settlement still awaits the recipient's confirmation.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.is_confirmed
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "settlements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub bill_id: String,
    pub from_user: String,
    pub to_user: String,
    pub amount_minor: i64,
    pub notes: Option<String>,
    pub is_confirmed: bool,
    pub confirmed_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bills::Entity",
        from = "Column::BillId",
        to = "super::bills::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Bills,
}

impl Related<super::bills::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bills.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Settlement> for ActiveModel {
    fn from(settlement: &Settlement) -> Self {
        Self {
            id: ActiveValue::Set(settlement.id.to_string()),
            bill_id: ActiveValue::Set(settlement.bill_id.clone()),
            from_user: ActiveValue::Set(settlement.from_user.clone()),
            to_user: ActiveValue::Set(settlement.to_user.clone()),
            amount_minor: ActiveValue::Set(settlement.amount.minor()),
            notes: ActiveValue::Set(settlement.notes.clone()),
            is_confirmed: ActiveValue::Set(settlement.is_confirmed),
            confirmed_at: ActiveValue::Set(settlement.confirmed_at),
            created_at: ActiveValue::Set(settlement.created_at),
        }
    }
}

impl TryFrom<Model> for Settlement {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::NotFound("settlement".to_string()))?,
            bill_id: model.bill_id,
            from_user: model.from_user,
            to_user: model.to_user,
            amount: Amount::new(model.amount_minor),
            notes: model.notes,
            is_confirmed: model.is_confirmed,
            confirmed_at: model.confirmed_at,
            created_at: model.created_at,
        })
    }
}
