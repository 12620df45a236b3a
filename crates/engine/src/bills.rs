//! Bill primitives.
//!
//! A `Bill` groups the expenses of one event. Its `total_amount` is a derived
//! cache, recomputed from the expense rows inside the same transaction as any
//! expense mutation; it is never a source of truth.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Amount, EngineError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    pub id: String,
    pub event_id: String,
    pub title: String,
    pub description: Option<String>,
    pub total_amount: Amount,
    pub is_settled: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bill {
    pub fn new(
        event_id: String,
        title: String,
        description: Option<String>,
        created_by: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            event_id,
            title,
            description,
            total_amount: Amount::ZERO,
            is_settled: false,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "bills")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub event_id: String,
    pub title: String,
    pub description: Option<String>,
    pub total_amount_minor: i64,
    pub is_settled: bool,
    pub created_by: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::events::Entity",
        from = "Column::EventId",
        to = "super::events::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Events,
    #[sea_orm(has_many = "super::expenses::Entity")]
    Expenses,
    #[sea_orm(has_many = "super::settlements::Entity")]
    Settlements,
    #[sea_orm(has_many = "super::bill_participants::Entity")]
    Participants,
}

impl Related<super::events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Events.def()
    }
}

impl Related<super::expenses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expenses.def()
    }
}

impl Related<super::settlements::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Settlements.def()
    }
}

impl Related<super::bill_participants::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participants.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Bill> for ActiveModel {
    fn from(bill: &Bill) -> Self {
        Self {
            id: ActiveValue::Set(bill.id.clone()),
            event_id: ActiveValue::Set(bill.event_id.clone()),
            title: ActiveValue::Set(bill.title.clone()),
            description: ActiveValue::Set(bill.description.clone()),
            total_amount_minor: ActiveValue::Set(bill.total_amount.minor()),
            is_settled: ActiveValue::Set(bill.is_settled),
            created_by: ActiveValue::Set(bill.created_by.clone()),
            created_at: ActiveValue::Set(bill.created_at),
            updated_at: ActiveValue::Set(bill.updated_at),
        }
    }
}

impl TryFrom<Model> for Bill {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        if Uuid::parse_str(&model.id).is_err() {
            return Err(EngineError::NotFound("bill".to_string()));
        }
        Ok(Self {
            id: model.id,
            event_id: model.event_id,
            title: model.title,
            description: model.description,
            total_amount: Amount::new(model.total_amount_minor),
            is_settled: model.is_settled,
            created_by: model.created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
