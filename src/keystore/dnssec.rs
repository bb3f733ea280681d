//! `DnssecKeyStore`: zone-signing key material, partitioned by KSK/ZSK
//! role (spec §4.1, §3).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::params;

use crate::error::Error;
use crate::keystore::{Db, KeyState};

pub const FLAGS_ZSK: u16 = 256;
pub const FLAGS_KSK: u16 = 257;

#[derive(Clone, Debug)]
pub struct DnssecKey {
    pub zone: String,
    pub keyid: u16,
    pub algorithm: String,
    pub flags: u16,
    pub private_key: Vec<u8>,
    pub dnskey_text: String,
    pub state: KeyState,
}

impl DnssecKey {
    pub fn is_ksk(&self) -> bool {
        self.flags == FLAGS_KSK
    }
}

pub struct DnssecKeyStore {
    db: Arc<Db>,
    active_cache: Mutex<HashMap<String, Vec<DnssecKey>>>,
}

impl DnssecKeyStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self {
            db,
            active_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn list(&self, zone: &str) -> Result<Vec<DnssecKey>, Error> {
        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT zone, keyid, algorithm, flags, private_key, dnskey_text, state
             FROM dnssec_keys WHERE zone = ?1",
        )?;
        let rows = stmt
            .query_map(params![zone], row_to_key)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The on-demand key generation path named in spec §4.1: "the only
    /// producer of private key material. After generation, the caller
    /// is responsible for publishing the DNSKEY into the zone."
    pub fn generate(&self, key: DnssecKey) -> Result<(), Error> {
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO dnssec_keys (zone, keyid, algorithm, flags, private_key, dnskey_text, state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                key.zone,
                key.keyid,
                key.algorithm,
                key.flags,
                key.private_key,
                key.dnskey_text,
                key.state.as_str(),
            ],
        )?;
        drop(conn);
        self.invalidate(&key.zone);
        Ok(())
    }

    /// `published → active` promotion.
    pub fn promote(&self, zone: &str, keyid: u16) -> Result<(), Error> {
        self.set_state(zone, keyid, KeyState::Active)
    }

    pub fn set_state(&self, zone: &str, keyid: u16, state: KeyState) -> Result<(), Error> {
        let conn = self.db.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE dnssec_keys SET state = ?1 WHERE zone = ?2 AND keyid = ?3",
            params![state.as_str(), zone, keyid],
        )?;
        if changed == 0 {
            return Err(Error::Storage(format!(
                "no dnssec key {zone}/{keyid} to transition"
            )));
        }
        drop(conn);
        self.invalidate(zone);
        Ok(())
    }

    pub fn delete(&self, zone: &str, keyid: u16) -> Result<(), Error> {
        let conn = self.db.conn.lock().unwrap();
        let changed = conn.execute(
            "DELETE FROM dnssec_keys WHERE zone = ?1 AND keyid = ?2",
            params![zone, keyid],
        )?;
        if changed == 0 {
            return Err(Error::Storage(format!(
                "no dnssec key {zone}/{keyid} to delete"
            )));
        }
        drop(conn);
        self.invalidate(zone);
        Ok(())
    }

    pub fn active_keys(&self, zone: &str) -> Result<Vec<DnssecKey>, Error> {
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

    /// `ensureActiveDnssecKeys(z)`: generate a KSK and ZSK if the zone
    /// has none active yet; a no-op otherwise (spec §8 idempotence
    /// property).
    pub fn ensure_active_keys(
        &self,
        zone: &str,
        algorithm: &str,
        mut generate: impl FnMut(&str, u16) -> Result<DnssecKey, Error>,
    ) -> Result<(), Error> {
        let active = self.active_keys(zone)?;
        if !active.iter().any(|k| k.is_ksk()) {
            let key = generate(algorithm, FLAGS_KSK)?;
            self.generate(key)?;
        }
        if !active.iter().any(|k| !k.is_ksk()) {
            let key = generate(algorithm, FLAGS_ZSK)?;
            self.generate(key)?;
        }
        Ok(())
    }

    fn invalidate(&self, zone: &str) {
        self.active_cache.lock().unwrap().remove(zone);
    }
}

fn row_to_key(row: &rusqlite::Row) -> rusqlite::Result<DnssecKey> {
    let state_str: String = row.get(6)?;
    Ok(DnssecKey {
        zone: row.get(0)?,
        keyid: row.get(1)?,
        algorithm: row.get(2)?,
        flags: row.get(3)?,
        private_key: row.get(4)?,
        dnskey_text: row.get(5)?,
        state: KeyState::parse(&state_str).unwrap_or(KeyState::Retired),
    })
}
