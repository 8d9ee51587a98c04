//! Device entity: a wakeable machine and its network endpoints

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::mac::MacAddress;
use crate::magic_packet::{TargetKind, WakeTarget, DEFAULT_WOL_PORT, GLOBAL_BROADCAST};
use crate::WolError;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "devices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Char(Some(36))")]
    pub id: String,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    /// 12 upper-case hex digits, no delimiters
    #[sea_orm(column_type = "Char(Some(12))")]
    pub mac: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub internal_host: Option<String>,

    pub internal_port: i32,

    #[sea_orm(column_type = "Text", nullable)]
    pub external_host: Option<String>,

    pub external_port: i32,

    #[sea_orm(nullable)]
    pub status_probe_port: Option<i32>,

    /// Set only after a successful wake dispatch
    pub last_seen_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::schedules::Entity")]
    Schedules,
}

impl Related<super::schedules::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Schedules.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

fn port_or_default(port: i32) -> u16 {
    u16::try_from(port)
        .ok()
        .filter(|p| *p != 0)
        .unwrap_or(DEFAULT_WOL_PORT)
}

fn non_blank(host: &Option<String>) -> Option<&str> {
    host.as_deref().map(str::trim).filter(|h| !h.is_empty())
}

impl Model {
    pub fn mac_address(&self) -> Result<MacAddress, WolError> {
        self.mac.parse()
    }

    /// Wake targets in dispatch order: internal, global broadcast at the internal port, external.
    pub fn wake_targets(&self) -> Vec<WakeTarget> {
        let internal_port = port_or_default(self.internal_port);
        let mut targets = Vec::with_capacity(3);
        if let Some(host) = non_blank(&self.internal_host) {
            targets.push(WakeTarget::new(TargetKind::Internal, host, internal_port));
        }
        targets.push(WakeTarget::new(
            TargetKind::Broadcast,
            GLOBAL_BROADCAST,
            internal_port,
        ));
        if let Some(host) = non_blank(&self.external_host) {
            targets.push(WakeTarget::new(
                TargetKind::External,
                host,
                port_or_default(self.external_port),
            ));
        }
        targets
    }
}
