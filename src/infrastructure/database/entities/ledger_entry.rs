//! Ledger entry entity (append-only)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ledger_entries")]
pub struct Model {
    /// Insertion order
    #[sea_orm(primary_key)]
    pub seq: i32,

    #[sea_orm(unique)]
    pub entry_id: String,

    pub user_id: String,

    /// Signed; negative is a debit
    pub amount: i64,
    pub description: String,

    #[sea_orm(nullable)]
    pub facility_id: Option<String>,
    #[sea_orm(nullable)]
    pub slot_id: Option<String>,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user_account::Entity",
        from = "Column::UserId",
        to = "super::user_account::Column::Id"
    )]
    UserAccount,
}

impl Related<super::user_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserAccount.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
