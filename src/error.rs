//! The error taxonomy every engine worker translates its lower-level
//! errors into at its queue boundary (spec §7).

use std::fmt;

/// A typed daemon error. Each variant corresponds to one of the error
/// kinds enumerated in spec §7; callers outside a unit see only this
/// type, never the lower-level error it was built from.
#[derive(Debug)]
pub enum Error {
    /// Upstream AXFR failed, NOTIFY unacked, parent unreachable. Logged
    /// and retried with bounded backoff; does not affect query-serving
    /// for already-loaded data.
    Transient(String),
    /// FORMERR, malformed RR, signature did not validate. Reported in
    /// the DNS response RCODE; no state mutation.
    Protocol(String),
    /// Update rejected by per-zone policy, unknown rrtype, unknown
    /// option. Reported as REFUSED on the wire and/or explanatory text
    /// on the API; no state mutation.
    Policy(String),
    /// A DB transaction failed; rolled back, safe to retry.
    Storage(String),
    /// Invalid configuration at load. Fatal: the process refuses to
    /// start.
    Configuration(String),
    /// A programming invariant was violated (e.g. a zone present in the
    /// store but its apex owner absent). Logged; callers return
    /// SERVFAIL. Never panics the process.
    Invariant(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transient(msg) => write!(f, "transient error: {msg}"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::Policy(msg) => write!(f, "policy error: {msg}"),
            Error::Storage(msg) => write!(f, "storage error: {msg}"),
            Error::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Error::Invariant(msg) => write!(f, "invariant violation: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// The RCODE a DNS response should carry for this error, where one
    /// applies (spec §7's "reported in the DNS response RCODE").
    pub fn to_rcode(&self) -> domain::base::iana::Rcode {
        use domain::base::iana::Rcode;
        match self {
            Error::Transient(_) => Rcode::SERVFAIL,
            Error::Protocol(_) => Rcode::FORMERR,
            Error::Policy(_) => Rcode::REFUSED,
            Error::Storage(_) => Rcode::SERVFAIL,
            Error::Configuration(_) => Rcode::SERVFAIL,
            Error::Invariant(_) => Rcode::SERVFAIL,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<tdns_cfg::ConfigError> for Error {
    fn from(err: tdns_cfg::ConfigError) -> Self {
        Error::Configuration(err.to_string())
    }
}
