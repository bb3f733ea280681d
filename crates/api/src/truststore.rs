//! `truststore` command family: `list-dnskey`, `child-sig0-mgmt` (spec §4.1, §6).

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrustAnchorInfo {
    pub zone: String,
    pub keyid: u16,
    pub key_rr_text: String,
    pub validated: bool,
    pub trusted: bool,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "action")]
pub enum ChildSig0MgmtRequest {
    List { zone: String },
    Trust { zone: String, keyid: u16 },
    Untrust { zone: String, keyid: u16 },
    ImportAnchors { path: String },
}
