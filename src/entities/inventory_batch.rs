use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A dated lot of a product with its own quantity and expiry.
///
/// Quantity bookkeeping invariant, observable at any point in time:
/// `current_quantity + damaged_quantity + sum(allocated - returned)
///  == original_quantity`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "inventory_batches")]
#[schema(as = InventoryBatch)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    #[sea_orm(unique)]
    pub batch_number: String,
    pub original_quantity: i32,
    pub current_quantity: i32,
    pub damaged_quantity: i32,
    pub manufacture_date: Option<NaiveDate>,
    pub expiration_date: NaiveDate,
    pub supplier_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(has_many = "super::batch_allocation::Entity")]
    BatchAllocations,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::batch_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BatchAllocations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
