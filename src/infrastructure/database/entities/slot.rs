//! Slot entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "slots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub facility_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Provisioning order, used for stable listing
    pub position: i32,
    pub number: String,
    pub rate: i64,

    pub is_booked: bool,
    #[sea_orm(nullable)]
    pub booked_by: Option<String>,
    #[sea_orm(nullable)]
    pub booked_at: Option<DateTimeUtc>,

    #[sea_orm(nullable)]
    pub sensor_key: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::facility::Entity",
        from = "Column::FacilityId",
        to = "super::facility::Column::Id"
    )]
    Facility,
}

impl Related<super::facility::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Facility.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
