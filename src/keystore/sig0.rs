//! `Sig0KeyStore`: local, private SIG(0) signing keys (spec §4.1).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::params;

use crate::error::Error;
use crate::keystore::{Db, KeyState};

/// A single local SIG(0) key row.
#[derive(Clone, Debug)]
pub struct Sig0Key {
    pub zone: String,
    pub keyid: u16,
    pub algorithm: String,
    pub private_key: Vec<u8>,
    pub public_key: String,
    pub state: KeyState,
    pub comment: Option<String>,
}

/// Local, private SIG(0) keys, keyed by (zone, keyid).
///
/// Used to sign outbound UPDATE messages to a parent and other
/// outbound authenticated messages (spec §3).
pub struct Sig0KeyStore {
    db: Arc<Db>,
    /// Active keys per zone, invalidated on any state change for that
    /// zone (spec §4.1: "the cache is invalidated on any state change").
    active_cache: Mutex<HashMap<String, Vec<Sig0Key>>>,
}

impl Sig0KeyStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self {
            db,
            active_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn list(&self, zone: &str) -> Result<Vec<Sig0Key>, Error> {
        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT zone, keyid, algorithm, private_key, public_key, state, comment
             FROM sig0_keys WHERE zone = ?1",
        )?;
        let rows = stmt
            .query_map(params![zone], row_to_key)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Insert a freshly generated key. This is the only path that
    /// produces private key material (spec §4.1): the caller is
    /// responsible for publishing the corresponding KEY/DNSKEY record.
    pub fn add(&self, key: Sig0Key) -> Result<(), Error> {
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sig0_keys (zone, keyid, algorithm, private_key, public_key, state, comment)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                key.zone,
                key.keyid,
                key.algorithm,
                key.private_key,
                key.public_key,
                key.state.as_str(),
                key.comment,
            ],
        )?;
        drop(conn);
        self.invalidate(&key.zone);
        Ok(())
    }

    pub fn set_state(&self, zone: &str, keyid: u16, state: KeyState) -> Result<(), Error> {
        let conn = self.db.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE sig0_keys SET state = ?1 WHERE zone = ?2 AND keyid = ?3",
            params![state.as_str(), zone, keyid],
        )?;
        if changed == 0 {
            return Err(Error::Storage(format!(
                "no sig0 key {zone}/{keyid} to transition"
            )));
        }
        drop(conn);
        self.invalidate(zone);
        Ok(())
    }

    /// Per spec §4.1: "A deletion is rejected if the target row does
    /// not exist."
    pub fn delete(&self, zone: &str, keyid: u16) -> Result<(), Error> {
        let conn = self.db.conn.lock().unwrap();
        let changed = conn.execute(
            "DELETE FROM sig0_keys WHERE zone = ?1 AND keyid = ?2",
            params![zone, keyid],
        )?;
        if changed == 0 {
            return Err(Error::Storage(format!(
                "no sig0 key {zone}/{keyid} to delete"
            )));
        }
        drop(conn);
        self.invalidate(zone);
        Ok(())
    }

    /// `GetSig0ActiveKeys(zone)`: the cached set of active private keys
    /// for signing outbound messages.
    pub fn active_keys(&self, zone: &str) -> Result<Vec<Sig0Key>, Error> {
        if let Some(keys) = self.active_cache.lock().unwrap().get(zone) {
            return Ok(keys.clone());
        }
        let all = self.list(zone)?;
        let active: Vec<_> = all
            .into_iter()
            .filter(|k| matches!(k.state, KeyState::Active))
            .collect();
        self.active_cache
            .lock()
            .unwrap()
            .insert(zone.to_string(), active.clone());
        Ok(active)
    }

    fn invalidate(&self, zone: &str) {
        self.active_cache.lock().unwrap().remove(zone);
    }
}

fn row_to_key(row: &rusqlite::Row) -> rusqlite::Result<Sig0Key> {
    let state_str: String = row.get(5)?;
    Ok(Sig0Key {
        zone: row.get(0)?,
        keyid: row.get(1)?,
        algorithm: row.get(2)?,
        private_key: row.get(3)?,
        public_key: row.get(4)?,
        state: KeyState::parse(&state_str).unwrap_or(KeyState::Retired),
        comment: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Sig0KeyStore {
        Sig0KeyStore::new(Arc::new(Db::open_in_memory()))
    }

    fn key(zone: &str, keyid: u16, state: KeyState) -> Sig0Key {
        Sig0Key {
            zone: zone.into(),
            keyid,
            algorithm: "ED25519".into(),
            private_key: vec![1, 2, 3],
            public_key: "key text".into(),
            state,
            comment: None,
        }
    }

    #[test]
    fn delete_missing_key_is_rejected() {
        let store = store();
        assert!(store.delete("c.test.net.", 1).is_err());
    }

    #[test]
    fn active_keys_reflects_state_changes() {
        let store = store();
        store.add(key("c.test.net.", 1, KeyState::Created)).unwrap();
        assert!(store.active_keys("c.test.net.").unwrap().is_empty());

        store
            .set_state("c.test.net.", 1, KeyState::Active)
            .unwrap();
        assert_eq!(store.active_keys("c.test.net.").unwrap().len(), 1);
    }
}
