//! `keystore` command family: `sig0-mgmt`, `dnssec-mgmt` (spec §4.1, §6).

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    Created,
    Published,
    Active,
    Retired,
    Removed,
    Revoked,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Sig0KeyInfo {
    pub zone: String,
    pub keyid: u16,
    pub algorithm: String,
    pub state: KeyState,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DnssecKeyInfo {
    pub zone: String,
    pub keyid: u16,
    pub algorithm: String,
    pub flags: u16,
    pub state: KeyState,
    pub dnskey_text: String,
}

/// `sig0-mgmt` requests.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "action")]
pub enum Sig0MgmtRequest {
    List { zone: String },
    Add { zone: String, algorithm: String, comment: Option<String> },
    Import { zone: String, private_key_pem: String, comment: Option<String> },
    SetState { zone: String, keyid: u16, state: KeyState },
    Delete { zone: String, keyid: u16 },
}

/// `dnssec-mgmt` requests.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "action")]
pub enum DnssecMgmtRequest {
    List { zone: String },
    Generate { zone: String, algorithm: String, ksk: bool },
    Promote { zone: String, keyid: u16 },
    SetState { zone: String, keyid: u16, state: KeyState },
    Delete { zone: String, keyid: u16 },
}
