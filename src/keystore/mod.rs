//! Keystore / Truststore (spec §4.1): persistent SIG(0) and DNSSEC key
//! material, backed by a single SQLite database file (spec §6).
//!
//! All three stores share one connection guarded by a single
//! process-wide lock (spec §5: "The Keystore uses a process-wide lock
//! around each transactional operation"); each logical store is simply
//! a different set of tables reached through that same connection.

use std::sync::Mutex;

use camino::Utf8PathBuf;
use rusqlite::Connection;

use crate::error::Error;

pub mod dnssec;
pub mod sig0;
pub mod truststore;

pub use dnssec::DnssecKeyStore;
pub use sig0::Sig0KeyStore;
pub use truststore::Sig0TrustStore;

/// The key lifecycle state machine shared by every store (spec §3:
/// "State machine: `created → published → active → retired → removed`,
/// with optional `revoked`").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyState {
    Created,
    Published,
    Active,
    Retired,
    Removed,
    Revoked,
}

impl KeyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyState::Created => "created",
            KeyState::Published => "published",
            KeyState::Active => "active",
            KeyState::Retired => "retired",
            KeyState::Removed => "removed",
            KeyState::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "created" => KeyState::Created,
            "published" => KeyState::Published,
            "active" => KeyState::Active,
            "retired" => KeyState::Retired,
            "removed" => KeyState::Removed,
            "revoked" => KeyState::Revoked,
            _ => return None,
        })
    }
}

/// Opens (creating if needed) the shared database file and runs the
/// schema migrations for all three stores (spec §6: "Schemas are
/// created on first run if missing").
pub struct Db {
    pub conn: Mutex<Connection>,
}

impl Db {
    pub fn open(path: &Utf8PathBuf) -> Result<Self, Error> {
        let conn = Connection::open(path.as_std_path())
            .map_err(|err| Error::Storage(format!("cannot open database {path}: {err}")))?;
        conn.execute_batch(SCHEMA)
            .map_err(|err| Error::Storage(format!("cannot migrate database {path}: {err}")))?;
        Ok(Db {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Self {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        Db {
            conn: Mutex::new(conn),
        }
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sig0_keys (
    zone        TEXT NOT NULL,
    keyid       INTEGER NOT NULL,
    algorithm   TEXT NOT NULL,
    private_key BLOB NOT NULL,
    public_key  TEXT NOT NULL,
    state       TEXT NOT NULL,
    comment     TEXT,
    PRIMARY KEY (zone, keyid)
);

CREATE TABLE IF NOT EXISTS sig0_trust (
    zone       TEXT NOT NULL,
    keyid      INTEGER NOT NULL,
    key_rr     TEXT NOT NULL,
    validated  INTEGER NOT NULL,
    trusted    INTEGER NOT NULL,
    comment    TEXT,
    PRIMARY KEY (zone, keyid)
);

CREATE TABLE IF NOT EXISTS dnssec_keys (
    zone        TEXT NOT NULL,
    keyid       INTEGER NOT NULL,
    algorithm   TEXT NOT NULL,
    flags       INTEGER NOT NULL,
    private_key BLOB NOT NULL,
    dnskey_text TEXT NOT NULL,
    state       TEXT NOT NULL,
    PRIMARY KEY (zone, keyid)
);
";
