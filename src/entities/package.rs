use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Package status enumeration.
///
/// `pending` and `ready_for_dispatch` are owned by the packing workflow;
/// `dispatched` is set when a transport is assigned; `in_transit`,
/// `delivered` and `returned` are projections of the transport and return
/// lifecycles and are never writable directly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "ready_for_dispatch")]
    ReadyForDispatch,
    #[sea_orm(string_value = "dispatched")]
    Dispatched,
    #[sea_orm(string_value = "in_transit")]
    InTransit,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "returned")]
    Returned,
}

impl PackageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageStatus::Pending => "pending",
            PackageStatus::ReadyForDispatch => "ready_for_dispatch",
            PackageStatus::Dispatched => "dispatched",
            PackageStatus::InTransit => "in_transit",
            PackageStatus::Delivered => "delivered",
            PackageStatus::Returned => "returned",
        }
    }

    /// Legal forward edges of the package state machine.
    pub fn can_transition_to(&self, next: PackageStatus) -> bool {
        use PackageStatus::*;
        matches!(
            (self, next),
            (Pending, ReadyForDispatch)
                | (ReadyForDispatch, Dispatched)
                | (Dispatched, InTransit)
                | (InTransit, Delivered)
                | (Delivered, Returned)
        )
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(PackageStatus::Pending),
            "ready_for_dispatch" => Ok(PackageStatus::ReadyForDispatch),
            "dispatched" => Ok(PackageStatus::Dispatched),
            "in_transit" => Ok(PackageStatus::InTransit),
            "delivered" => Ok(PackageStatus::Delivered),
            "returned" => Ok(PackageStatus::Returned),
            other => Err(format!("unknown package status: {other}")),
        }
    }
}

/// The physical unit assembled from allocated batches for one order.
/// Retained forever for audit; one primary package per order.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "packages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub package_code: String,
    #[sea_orm(unique)]
    pub order_id: Uuid,
    pub status: PackageStatus,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 3)))", nullable)]
    pub weight_kg: Option<Decimal>,
    pub dimensions_cm: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
    #[sea_orm(has_many = "super::package_item::Entity")]
    PackageItems,
    #[sea_orm(has_many = "super::batch_allocation::Entity")]
    BatchAllocations,
    #[sea_orm(has_many = "super::transport::Entity")]
    Transports,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::package_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PackageItems.def()
    }
}

impl Related<super::batch_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BatchAllocations.def()
    }
}

impl Related<super::transport::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transports.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_transitions_follow_the_chain() {
        use PackageStatus::*;
        assert!(Pending.can_transition_to(ReadyForDispatch));
        assert!(ReadyForDispatch.can_transition_to(Dispatched));
        assert!(Dispatched.can_transition_to(InTransit));
        assert!(InTransit.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(Returned));

        assert!(!Pending.can_transition_to(Dispatched));
        assert!(!ReadyForDispatch.can_transition_to(InTransit));
        assert!(!Dispatched.can_transition_to(Delivered));
        assert!(!Delivered.can_transition_to(Pending));
        assert!(!Returned.can_transition_to(Delivered));
    }
}
