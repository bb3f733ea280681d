//! `delegation` command family: `status`, `sync` (spec §4.6, §6).

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "action")]
pub enum DelegationRequest {
    Status { zone: String },
    Sync { zone: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DelegationStatus {
    pub zone: String,
    pub in_sync: bool,
    pub ns_adds: Vec<String>,
    pub ns_removes: Vec<String>,
    pub a_adds: Vec<String>,
    pub a_removes: Vec<String>,
    pub aaaa_adds: Vec<String>,
    pub aaaa_removes: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DelegationSyncResult {
    pub zone: String,
    pub performed: bool,
    pub scheme: Option<String>,
    pub rcode: Option<String>,
}
