//! The zones configuration document: one entry per zone, optionally
//! built on a named template (spec §6).

use std::collections::HashMap;
use std::net::SocketAddr;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::{load_yaml, parse_rtype, ConfigError, Templates};

/// `type` field of a zone entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneTypeSpec {
    Primary,
    Secondary,
}

/// `store` field of a zone entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreSpec {
    Map,
    Slice,
    XfrOnly,
}

/// The per-zone update policy document (spec §4.5).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UpdatePolicySpec {
    #[serde(rename = "type")]
    pub kind: PolicyKindSpec,
    pub rrtypes: Vec<String>,
    #[serde(default)]
    pub keyupload: KeyUploadSpec,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKindSpec {
    #[serde(rename = "self")]
    SelfOnly,
    #[serde(rename = "selfsub")]
    SelfSub,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyUploadSpec {
    #[default]
    None,
    Unvalidated,
}

/// A named, partial zone configuration, merged underneath any zone
/// entry that references it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ZoneTemplate {
    #[serde(rename = "type")]
    pub kind: Option<ZoneTypeSpec>,
    pub store: Option<StoreSpec>,
    pub primary: Option<SocketAddr>,
    #[serde(default)]
    pub notify: Vec<SocketAddr>,
    pub dnssec_policy: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    pub updatepolicy: Option<UpdatePolicySpec>,
}

/// A single zone entry (spec §6: `{name, type, store, primary, notify,
/// zonefile, template, dnssec_policy, options, updatepolicy}`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ZoneConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<ZoneTypeSpec>,
    pub store: Option<StoreSpec>,
    pub primary: Option<SocketAddr>,
    #[serde(default)]
    pub notify: Vec<SocketAddr>,
    pub zonefile: Option<Utf8PathBuf>,
    pub template: Option<String>,
    pub dnssec_policy: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    pub updatepolicy: Option<UpdatePolicySpec>,
}

const RECOGNIZED_OPTIONS: &[&str] = &[
    "delegation-sync-parent",
    "delegation-sync-child",
    "online-signing",
    "allow-updates",
    "allow-child-updates",
    "fold-case",
    "sign-zone",
    "black-lies",
    "publish-key",
];

impl ZoneConfig {
    /// Merge this entry on top of its named template, if any, and
    /// validate the result. Returns the fully-resolved entry.
    ///
    /// Per spec §6/§3, unknown options or unknown policy types reject
    /// the zone at load time with a fatal error, rather than being
    /// silently dropped.
    pub fn resolve(mut self, templates: &Templates) -> Result<ResolvedZone, ConfigError> {
        if let Some(template_name) = &self.template {
            let template = templates.get(template_name).ok_or_else(|| ConfigError {
                message: format!(
                    "zone '{}' references unknown template '{template_name}'",
                    self.name
                ),
            })?;
            if self.kind.is_none() {
                self.kind = template.kind;
            }
            if self.store.is_none() {
                self.store = template.store;
            }
            if self.primary.is_none() {
                self.primary = template.primary;
            }
            if self.notify.is_empty() {
                self.notify = template.notify.clone();
            }
            if self.dnssec_policy.is_none() {
                self.dnssec_policy = template.dnssec_policy.clone();
            }
            if self.options.is_empty() {
                self.options = template.options.clone();
            }
            if self.updatepolicy.is_none() {
                self.updatepolicy = template.updatepolicy.clone();
            }
        }

        let kind = self.kind.ok_or_else(|| ConfigError {
            message: format!("zone '{}' has no type", self.name),
        })?;
        let store = self.store.unwrap_or(StoreSpec::Map);

        if kind == ZoneTypeSpec::Secondary && self.primary.is_none() {
            return Err(ConfigError {
                message: format!("secondary zone '{}' has no primary configured", self.name),
            });
        }
        if kind == ZoneTypeSpec::Primary && self.zonefile.is_none() {
            return Err(ConfigError {
                message: format!("primary zone '{}' has no zonefile configured", self.name),
            });
        }

        for option in &self.options {
            if !RECOGNIZED_OPTIONS.contains(&option.as_str()) {
                return Err(ConfigError {
                    message: format!("zone '{}' has unknown option '{option}'", self.name),
                });
            }
        }

        if let Some(policy) = &self.updatepolicy {
            for rtype in &policy.rrtypes {
                parse_rtype(rtype)?;
            }
        }

        Ok(ResolvedZone {
            name: self.name,
            kind,
            store,
            primary: self.primary,
            notify: self.notify,
            zonefile: self.zonefile,
            dnssec_policy: self.dnssec_policy,
            options: self.options,
            updatepolicy: self.updatepolicy,
        })
    }
}

/// A zone entry after template merging and validation.
#[derive(Clone, Debug)]
pub struct ResolvedZone {
    pub name: String,
    pub kind: ZoneTypeSpec,
    pub store: StoreSpec,
    pub primary: Option<SocketAddr>,
    pub notify: Vec<SocketAddr>,
    pub zonefile: Option<Utf8PathBuf>,
    pub dnssec_policy: Option<String>,
    pub options: Vec<String>,
    pub updatepolicy: Option<UpdatePolicySpec>,
}

/// The zones configuration document: templates plus zone entries.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ZonesConfig {
    #[serde(default)]
    pub templates: Templates,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
}

impl ZonesConfig {
    pub fn load(path: &Utf8PathBuf) -> Result<Self, ConfigError> {
        load_yaml(path)
    }

    /// Resolve every zone entry against the template table, failing
    /// fast (spec §6: "reject the zone at load time with a fatal log")
    /// on the first invalid entry.
    pub fn resolve_all(self) -> Result<Vec<ResolvedZone>, ConfigError> {
        let templates = self.templates;
        self.zones
            .into_iter()
            .map(|zone| zone.resolve(&templates))
            .collect()
    }
}

pub type TemplateTable = HashMap<String, ZoneTemplate>;
