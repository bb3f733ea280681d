//! `nsec` command family: `sign-zone`, `generate-nsec`, `show-nsec-chain`,
//! `freeze`, `thaw` (spec §4.4, §6).

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "action")]
pub enum NsecRequest {
    SignZone { zone: String },
    GenerateNsec { zone: String },
    ShowNsecChain { zone: String },
    Freeze { zone: String },
    Thaw { zone: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NsecChainEntry {
    pub owner: String,
    pub next_owner: String,
    pub types: Vec<String>,
}
