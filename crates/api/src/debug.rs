//! `debug` command family: `rrset`, `lookup-and-validate` (spec §6).

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "action")]
pub enum DebugRequest {
    Rrset { zone: String, owner: String, rtype: String },
    LookupAndValidate { zone: String, owner: String, rtype: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RrsetDump {
    pub owner: String,
    pub rtype: String,
    pub ttl: u32,
    pub records: Vec<String>,
    pub rrsigs: Vec<String>,
}
