//! `zone` command family: `status`, `stop`, `reload`, `bump`, `list-zones`
//! (spec §4.3, §6).

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "action")]
pub enum ZoneRequest {
    Status { zone: String },
    Stop { zone: String },
    Reload { zone: String },
    Bump { zone: String },
    ListZones,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ZoneStatus {
    pub name: String,
    pub kind: String,
    pub serial: Option<u32>,
    pub dirty: bool,
    pub frozen: bool,
    pub error: Option<String>,
    /// Seconds remaining until the Refresh Engine's next tick causes a
    /// refresh (SPEC_FULL §C: exposes `RefreshCounter.cur_refresh`).
    pub refresh_countdown_secs: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ZoneSummary {
    pub name: String,
    pub kind: String,
}
