pub use balance::{BalanceMap, compute_balances, round_balances};
pub use bills::Bill;
pub use error::EngineError;
pub use expenses::Expense;
pub use money::Amount;
pub use netting::{MIN_TRANSFER, Transfer, compute_settlement_plan};
pub use ops::{
    BillBalance, BillDetail, BillListFilter, BillOverview, Engine, EngineBuilder, ExpenseDraft,
    SettlementConfirmation, SplitSummary, UserSummary,
};
pub use settlements::Settlement;

mod balance;
mod bill_participants;
mod bills;
mod error;
mod event_participants;
mod events;
mod expense_shares;
mod expenses;
mod money;
mod netting;
mod ops;
mod settlements;
mod users;

pub type ResultEngine<T> = Result<T, EngineError>;
