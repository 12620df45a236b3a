//! Expense primitives.
//!
//! An `Expense` is one expenditure within a bill: a single payer and a
//! shared-by set persisted as `expense_shares` rows. The domain struct
//! carries the hydrated share set; the model row does not.
//!
//! An empty shared-by set is accepted input: such an expense counts toward
//! the payer's payments but toward nobody's owed total, so it inflates the
//! payer's positive balance.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Amount, EngineError, ResultEngine};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub bill_id: String,
    pub description: String,
    pub amount: Amount,
    pub paid_by: String,
    pub shared_by: Vec<String>,
    pub receipt_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    pub fn new(
        bill_id: String,
        description: String,
        amount: Amount,
        paid_by: String,
        shared_by: Vec<String>,
        receipt_ref: Option<String>,
    ) -> ResultEngine<Self> {
        if amount.is_negative() {
            return Err(EngineError::Validation(
                "expense amount must be >= 0".to_string(),
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            bill_id,
            description,
            amount,
            paid_by,
            shared_by,
            receipt_ref,
            created_at: now,
            updated_at: now,
        })
    }

    /// Per-person share of this expense, at full decimal precision.
    ///
    /// Returns zero when nobody shares the expense.
    #[must_use]
    pub fn share_per_person(&self) -> rust_decimal::Decimal {
        if self.shared_by.is_empty() {
            return rust_decimal::Decimal::ZERO;
        }
        self.amount.to_decimal() / rust_decimal::Decimal::from(self.shared_by.len())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub bill_id: String,
    pub description: String,
    pub amount_minor: i64,
    pub paid_by: String,
    pub receipt_ref: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
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
    #[sea_orm(has_many = "super::expense_shares::Entity")]
    Shares,
}

impl Related<super::bills::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bills.def()
    }
}

impl Related<super::expense_shares::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shares.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Expense> for ActiveModel {
    fn from(expense: &Expense) -> Self {
        Self {
            id: ActiveValue::Set(expense.id.to_string()),
            bill_id: ActiveValue::Set(expense.bill_id.clone()),
            description: ActiveValue::Set(expense.description.clone()),
            amount_minor: ActiveValue::Set(expense.amount.minor()),
            paid_by: ActiveValue::Set(expense.paid_by.clone()),
            receipt_ref: ActiveValue::Set(expense.receipt_ref.clone()),
            created_at: ActiveValue::Set(expense.created_at),
            updated_at: ActiveValue::Set(expense.updated_at),
        }
    }
}

impl TryFrom<(Model, Vec<String>)> for Expense {
    type Error = EngineError;

    fn try_from((model, shared_by): (Model, Vec<String>)) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::NotFound("expense".to_string()))?,
            bill_id: model.bill_id,
            description: model.description,
            amount: Amount::new(model.amount_minor),
            paid_by: model.paid_by,
            shared_by,
            receipt_ref: model.receipt_ref,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
