//! `Sig0TrustStore`: remote, public-only trust anchors used to validate
//! inbound SIG(0)-signed UPDATE messages (spec §4.1).

use std::fs;
use std::sync::Arc;

use camino::Utf8Path;
use rusqlite::params;

use crate::error::Error;
use crate::keystore::Db;

/// A trust anchor: a child zone's public KEY record we are willing to
/// accept signatures from.
#[derive(Clone, Debug)]
pub struct TrustAnchor {
    pub zone: String,
    pub keyid: u16,
    pub key_rr: String,
    /// The cryptographic provenance of this key was established.
    pub validated: bool,
    /// Local policy admits this key (both must be true to use it).
    pub trusted: bool,
    pub comment: Option<String>,
}

impl TrustAnchor {
    pub fn is_usable(&self) -> bool {
        self.validated && self.trusted
    }
}

pub struct Sig0TrustStore {
    db: Arc<Db>,
}

impl Sig0TrustStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    pub fn list(&self, zone: &str) -> Result<Vec<TrustAnchor>, Error> {
        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT zone, keyid, key_rr, validated, trusted, comment
             FROM sig0_trust WHERE zone = ?1",
        )?;
        let rows = stmt
            .query_map(params![zone], row_to_anchor)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get(&self, zone: &str, keyid: u16) -> Result<Option<TrustAnchor>, Error> {
        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT zone, keyid, key_rr, validated, trusted, comment
             FROM sig0_trust WHERE zone = ?1 AND keyid = ?2",
        )?;
        let mut rows = stmt.query_map(params![zone, keyid], row_to_anchor)?;
        rows.next().transpose().map_err(Error::from)
    }

    /// Insert or update an anchor (used by the unvalidated-key-upload
    /// exception in the Update Pipeline, spec §4.5: stored as
    /// `validated=false, trusted=false`).
    pub fn upsert(&self, anchor: &TrustAnchor) -> Result<(), Error> {
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sig0_trust (zone, keyid, key_rr, validated, trusted, comment)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(zone, keyid) DO UPDATE SET
                key_rr = excluded.key_rr,
                validated = excluded.validated,
                trusted = excluded.trusted,
                comment = excluded.comment",
            params![
                anchor.zone,
                anchor.keyid,
                anchor.key_rr,
                anchor.validated,
                anchor.trusted,
                anchor.comment,
            ],
        )?;
        Ok(())
    }

    /// Promote local policy trust for an anchor that is already
    /// validated (the out-of-band `trust` action named in spec §4.5).
    pub fn trust(&self, zone: &str, keyid: u16) -> Result<(), Error> {
        self.set_trusted(zone, keyid, true)
    }

    pub fn untrust(&self, zone: &str, keyid: u16) -> Result<(), Error> {
        self.set_trusted(zone, keyid, false)
    }

    fn set_trusted(&self, zone: &str, keyid: u16, trusted: bool) -> Result<(), Error> {
        let conn = self.db.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE sig0_trust SET trusted = ?1 WHERE zone = ?2 AND keyid = ?3",
            params![trusted, zone, keyid],
        )?;
        if changed == 0 {
            return Err(Error::Storage(format!(
                "no trust anchor {zone}/{keyid} found"
            )));
        }
        Ok(())
    }

    /// Bulk import a static trust-anchor file: one `zone keyid key_rr`
    /// triple per line. Entries imported this way are
    /// `validated=true, trusted=true` (spec §4.1).
    pub fn import_anchors_file(&self, path: &Utf8Path) -> Result<usize, Error> {
        let text = fs::read_to_string(path)
            .map_err(|err| Error::Configuration(format!("cannot read {path}: {err}")))?;
        let mut count = 0;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.splitn(3, char::is_whitespace);
            let zone = parts
                .next()
                .ok_or_else(|| Error::Configuration("malformed trust anchor line".into()))?;
            let keyid: u16 = parts
                .next()
                .ok_or_else(|| Error::Configuration("malformed trust anchor line".into()))?
                .parse()
                .map_err(|_| Error::Configuration("malformed keyid in trust anchor line".into()))?;
            let key_rr = parts
                .next()
                .ok_or_else(|| Error::Configuration("malformed trust anchor line".into()))?
                .to_string();
            self.upsert(&TrustAnchor {
                zone: zone.to_string(),
                keyid,
                key_rr,
                validated: true,
                trusted: true,
                comment: Some("imported trust anchor".into()),
            })?;
            count += 1;
        }
        Ok(count)
    }
}

fn row_to_anchor(row: &rusqlite::Row) -> rusqlite::Result<TrustAnchor> {
    Ok(TrustAnchor {
        zone: row.get(0)?,
        keyid: row.get(1)?,
        key_rr: row.get(2)?,
        validated: row.get(3)?,
        trusted: row.get(4)?,
        comment: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Sig0TrustStore {
        Sig0TrustStore::new(Arc::new(Db::open_in_memory()))
    }

    #[test]
    fn unvalidated_upload_is_not_usable_until_trusted_and_validated() {
        let store = store();
        store
            .upsert(&TrustAnchor {
                zone: "c.test.net.".into(),
                keyid: 12345,
                key_rr: "KEY ...".into(),
                validated: false,
                trusted: false,
                comment: None,
            })
            .unwrap();
        let anchor = store.get("c.test.net.", 12345).unwrap().unwrap();
        assert!(!anchor.is_usable());
    }
}
