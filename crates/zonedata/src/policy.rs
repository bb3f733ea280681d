//! Per-zone dynamic update policy (spec §4.5).

use domain::base::iana::Rtype;

/// How a DNS UPDATE's record owners are checked against the signer name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyKind {
    /// Every RR owner must equal the signer name exactly.
    SelfOnly,
    /// Every RR owner must be at or below the signer name.
    SelfSub,
}

/// Whether an update containing a previously-untrusted child KEY upload
/// is accepted without a pre-existing trust relation (spec §4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum KeyUploadPolicy {
    /// Only updates signed by an already-trusted key are accepted.
    #[default]
    None,
    /// A single unvalidated KEY-add naming an existing child delegation
    /// is accepted; the resulting key is stored untrusted/unvalidated.
    Unvalidated,
}

/// The update policy attached to a zone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdatePolicy {
    pub kind: PolicyKind,
    /// The rrtypes this policy permits an UPDATE to touch. An UPDATE
    /// naming any other rrtype is rejected in full.
    pub permitted_rrtypes: Vec<Rtype>,
    pub keyupload: KeyUploadPolicy,
}

impl UpdatePolicy {
    pub fn permits_rtype(&self, rtype: Rtype) -> bool {
        self.permitted_rrtypes.contains(&rtype)
    }
}
