use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Transport status enumeration: `dispatched → in_transit → delivered`,
/// strictly monotonic, no skipping.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum TransportStatus {
    #[sea_orm(string_value = "dispatched")]
    Dispatched,
    #[sea_orm(string_value = "in_transit")]
    InTransit,
    #[sea_orm(string_value = "delivered")]
    Delivered,
}

impl TransportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportStatus::Dispatched => "dispatched",
            TransportStatus::InTransit => "in_transit",
            TransportStatus::Delivered => "delivered",
        }
    }

    /// The legal transition table: `dispatched→in_transit`,
    /// `in_transit→delivered`. Everything else is rejected.
    pub fn can_transition_to(&self, next: TransportStatus) -> bool {
        use TransportStatus::*;
        matches!(
            (self, next),
            (Dispatched, InTransit) | (InTransit, Delivered)
        )
    }
}

impl fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dispatched" | "assigned" => Ok(TransportStatus::Dispatched),
            "in_transit" => Ok(TransportStatus::InTransit),
            "delivered" => Ok(TransportStatus::Delivered),
            other => Err(format!("unknown transport status: {other}")),
        }
    }
}

/// The physical movement of a package from warehouse to destination.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transports")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub package_id: Uuid,
    pub transporter_id: Uuid,
    pub status: TransportStatus,
    /// Set when this transport is the reverse leg of a return.
    pub is_return_leg: bool,
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
    #[sea_orm(has_many = "super::transport_event::Entity")]
    TransportEvents,
}

impl Related<super::package::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Package.def()
    }
}

impl Related<super::transport_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransportEvents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_cannot_skip_or_reverse() {
        use TransportStatus::*;
        assert!(Dispatched.can_transition_to(InTransit));
        assert!(InTransit.can_transition_to(Delivered));

        assert!(!Dispatched.can_transition_to(Delivered));
        assert!(!InTransit.can_transition_to(Dispatched));
        assert!(!Delivered.can_transition_to(InTransit));
        assert!(!Delivered.can_transition_to(Delivered));
    }
}
