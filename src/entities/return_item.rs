use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One returned line; quantity never exceeds what the matching allocation
/// still has outstanding for that (package, batch) pair.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "return_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub return_id: Uuid,
    pub product_id: Uuid,
    pub batch_id: Uuid,
    pub quantity: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::return_entity::Entity",
        from = "Column::ReturnId",
        to = "super::return_entity::Column::Id"
    )]
    Return,
    #[sea_orm(
        belongs_to = "super::inventory_batch::Entity",
        from = "Column::BatchId",
        to = "super::inventory_batch::Column::Id"
    )]
    InventoryBatch,
}

impl Related<super::return_entity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Return.def()
    }
}

impl Related<super::inventory_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryBatch.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
