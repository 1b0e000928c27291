use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Return status enumeration: `initiated → pickup_scheduled → picked_up →
/// received → processed`, strictly monotonic. Only `processed` mutates
/// inventory; a return that is merely `received` holds no stock effect.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    #[sea_orm(string_value = "initiated")]
    Initiated,
    #[sea_orm(string_value = "pickup_scheduled")]
    PickupScheduled,
    #[sea_orm(string_value = "picked_up")]
    PickedUp,
    #[sea_orm(string_value = "received")]
    Received,
    #[sea_orm(string_value = "processed")]
    Processed,
}

impl ReturnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnStatus::Initiated => "initiated",
            ReturnStatus::PickupScheduled => "pickup_scheduled",
            ReturnStatus::PickedUp => "picked_up",
            ReturnStatus::Received => "received",
            ReturnStatus::Processed => "processed",
        }
    }

    /// Legal forward edges; no skipping.
    pub fn can_transition_to(&self, next: ReturnStatus) -> bool {
        use ReturnStatus::*;
        matches!(
            (self, next),
            (Initiated, PickupScheduled)
                | (PickupScheduled, PickedUp)
                | (PickedUp, Received)
                | (Received, Processed)
        )
    }

    /// A return counts as open until it reaches `processed`; at most one
    /// open return may exist per package.
    pub fn is_open(&self) -> bool {
        !matches!(self, ReturnStatus::Processed)
    }
}

impl fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReturnStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "initiated" => Ok(ReturnStatus::Initiated),
            "pickup_scheduled" => Ok(ReturnStatus::PickupScheduled),
            "picked_up" => Ok(ReturnStatus::PickedUp),
            "received" => Ok(ReturnStatus::Received),
            "processed" => Ok(ReturnStatus::Processed),
            other => Err(format!("unknown return status: {other}")),
        }
    }
}

/// Goods moving back from a delivered package into the warehouse.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "returns")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub package_id: Uuid,
    pub reason: String,
    pub status: ReturnStatus,
    /// Transporter booked at pickup scheduling; the reverse-leg transport is
    /// created from it when the goods are actually picked up.
    pub transporter_id: Option<Uuid>,
    /// Reverse-leg transport, attached at pickup.
    pub transport_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub processed_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::package::Entity",
        from = "Column::PackageId",
        to = "super::package::Column::Id"
    )]
    Package,
    #[sea_orm(has_many = "super::return_item::Entity")]
    ReturnItems,
}

impl Related<super::package::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Package.def()
    }
}

impl Related<super::return_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReturnItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_transitions_cannot_skip() {
        use ReturnStatus::*;
        assert!(Initiated.can_transition_to(PickupScheduled));
        assert!(PickupScheduled.can_transition_to(PickedUp));
        assert!(PickedUp.can_transition_to(Received));
        assert!(Received.can_transition_to(Processed));

        assert!(!Initiated.can_transition_to(PickedUp));
        assert!(!Initiated.can_transition_to(Processed));
        assert!(!Received.can_transition_to(PickedUp));
        assert!(!Processed.can_transition_to(Received));
    }

    #[test]
    fn only_processed_returns_are_closed() {
        assert!(ReturnStatus::Initiated.is_open());
        assert!(ReturnStatus::PickupScheduled.is_open());
        assert!(ReturnStatus::PickedUp.is_open());
        assert!(ReturnStatus::Received.is_open());
        assert!(!ReturnStatus::Processed.is_open());
    }
}
