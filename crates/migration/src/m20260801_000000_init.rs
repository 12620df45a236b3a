//! Initial schema migration - creates all tables from scratch.
//!
//! Complete schema for the group-expense ledger:
//!
//! - `users`: foreign-key anchors for the external identity provider
//! - `events`: bill grouping scope, with the finalized flag gating creation
//! - `event_participants`: event membership driving bill access
//! - `bills`: named expense groupings with a cached total
//! - `expenses`: single-payer expenditures within a bill
//! - `expense_shares`: the shared-by set, one row per sharer
//! - `settlements`: claimed payments awaiting recipient confirmation
//! - `bill_participants`: lazy per-bill membership for listing and access

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Users {
    Table,
    Username,
}

#[derive(Iden)]
enum Events {
    Table,
    Id,
    Title,
    CreatedBy,
    IsFinalized,
}

#[derive(Iden)]
enum EventParticipants {
    Table,
    EventId,
    UserId,
}

#[derive(Iden)]
enum Bills {
    Table,
    Id,
    EventId,
    Title,
    Description,
    TotalAmountMinor,
    IsSettled,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Expenses {
    Table,
    Id,
    BillId,
    Description,
    AmountMinor,
    PaidBy,
    ReceiptRef,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum ExpenseShares {
    Table,
    ExpenseId,
    UserId,
}

#[derive(Iden)]
enum Settlements {
    Table,
    Id,
    BillId,
    FromUser,
    ToUser,
    AmountMinor,
    Notes,
    IsConfirmed,
    ConfirmedAt,
    CreatedAt,
}

#[derive(Iden)]
enum BillParticipants {
    Table,
    BillId,
    UserId,
    JoinedAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Users
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Username)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Events
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Events::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Events::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Events::Title).string().not_null())
                    .col(ColumnDef::new(Events::CreatedBy).string().not_null())
                    .col(
                        ColumnDef::new(Events::IsFinalized)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-events-created_by")
                            .from(Events::Table, Events::CreatedBy)
                            .to(Users::Table, Users::Username),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Event Participants
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(EventParticipants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EventParticipants::EventId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EventParticipants::UserId).string().not_null())
                    .primary_key(
                        Index::create()
                            .col(EventParticipants::EventId)
                            .col(EventParticipants::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-event_participants-event_id")
                            .from(EventParticipants::Table, EventParticipants::EventId)
                            .to(Events::Table, Events::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-event_participants-user_id")
                            .from(EventParticipants::Table, EventParticipants::UserId)
                            .to(Users::Table, Users::Username)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-event_participants-user_id")
                    .table(EventParticipants::Table)
                    .col(EventParticipants::UserId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Bills
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Bills::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Bills::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Bills::EventId).string().not_null())
                    .col(ColumnDef::new(Bills::Title).string().not_null())
                    .col(ColumnDef::new(Bills::Description).string())
                    .col(
                        ColumnDef::new(Bills::TotalAmountMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Bills::IsSettled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Bills::CreatedBy).string().not_null())
                    .col(ColumnDef::new(Bills::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Bills::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-bills-event_id")
                            .from(Bills::Table, Bills::EventId)
                            .to(Events::Table, Events::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-bills-created_by")
                            .from(Bills::Table, Bills::CreatedBy)
                            .to(Users::Table, Users::Username),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-bills-event_id")
                    .table(Bills::Table)
                    .col(Bills::EventId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Expenses
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Expenses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Expenses::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Expenses::BillId).string().not_null())
                    .col(ColumnDef::new(Expenses::Description).string().not_null())
                    .col(ColumnDef::new(Expenses::AmountMinor).big_integer().not_null())
                    .col(ColumnDef::new(Expenses::PaidBy).string().not_null())
                    .col(ColumnDef::new(Expenses::ReceiptRef).string())
                    .col(ColumnDef::new(Expenses::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Expenses::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-expenses-bill_id")
                            .from(Expenses::Table, Expenses::BillId)
                            .to(Bills::Table, Bills::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-expenses-paid_by")
                            .from(Expenses::Table, Expenses::PaidBy)
                            .to(Users::Table, Users::Username),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-expenses-bill_id")
                    .table(Expenses::Table)
                    .col(Expenses::BillId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 6. Expense Shares
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(ExpenseShares::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ExpenseShares::ExpenseId).string().not_null())
                    .col(ColumnDef::new(ExpenseShares::UserId).string().not_null())
                    .primary_key(
                        Index::create()
                            .col(ExpenseShares::ExpenseId)
                            .col(ExpenseShares::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-expense_shares-expense_id")
                            .from(ExpenseShares::Table, ExpenseShares::ExpenseId)
                            .to(Expenses::Table, Expenses::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-expense_shares-user_id")
                            .from(ExpenseShares::Table, ExpenseShares::UserId)
                            .to(Users::Table, Users::Username)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 7. Settlements
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Settlements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Settlements::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Settlements::BillId).string().not_null())
                    .col(ColumnDef::new(Settlements::FromUser).string().not_null())
                    .col(ColumnDef::new(Settlements::ToUser).string().not_null())
                    .col(
                        ColumnDef::new(Settlements::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Settlements::Notes).string())
                    .col(
                        ColumnDef::new(Settlements::IsConfirmed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Settlements::ConfirmedAt).timestamp())
                    .col(ColumnDef::new(Settlements::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-settlements-bill_id")
                            .from(Settlements::Table, Settlements::BillId)
                            .to(Bills::Table, Bills::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-settlements-from_user")
                            .from(Settlements::Table, Settlements::FromUser)
                            .to(Users::Table, Users::Username),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-settlements-to_user")
                            .from(Settlements::Table, Settlements::ToUser)
                            .to(Users::Table, Users::Username),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-settlements-bill_id")
                    .table(Settlements::Table)
                    .col(Settlements::BillId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 8. Bill Participants
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(BillParticipants::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(BillParticipants::BillId).string().not_null())
                    .col(ColumnDef::new(BillParticipants::UserId).string().not_null())
                    .col(
                        ColumnDef::new(BillParticipants::JoinedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(BillParticipants::BillId)
                            .col(BillParticipants::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-bill_participants-bill_id")
                            .from(BillParticipants::Table, BillParticipants::BillId)
                            .to(Bills::Table, Bills::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-bill_participants-user_id")
                            .from(BillParticipants::Table, BillParticipants::UserId)
                            .to(Users::Table, Users::Username)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-bill_participants-user_id")
                    .table(BillParticipants::Table)
                    .col(BillParticipants::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop in reverse order of creation (respecting FK dependencies)
        manager
            .drop_table(Table::drop().table(BillParticipants::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Settlements::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ExpenseShares::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Expenses::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Bills::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EventParticipants::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Events::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}
