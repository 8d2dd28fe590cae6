//! SQLite-backed flow and anomaly store. Numeric summaries stay queryable in plain
//! columns; the full vector (endpoint addresses included) and alert text are
//! AES-GCM encrypted under a key derived from a device secret.

use crate::error::{AegisError, Result};
use crate::features::FlowFeatureVector;
use crate::risk::RiskResult;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

fn derive_key(seed: &[u8]) -> [u8; KEY_LEN] {
    use ring::digest;
    let mut out = [0u8; KEY_LEN];
    let h = digest::digest(&digest::SHA256, seed);
    out[..h.as_ref().len().min(KEY_LEN)].copy_from_slice(h.as_ref());
    out
}

fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| AegisError::Crypto(e.to_string()))?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt((&nonce).into(), plaintext)
        .map_err(|e| AegisError::Crypto(e.to_string()))?;
    let mut out = nonce.to_vec();
    out.extend(ciphertext);
    Ok(BASE64.encode(&out))
}

fn decrypt(key: &[u8; KEY_LEN], encoded: &str) -> Result<Vec<u8>> {
    let raw = BASE64
        .decode(encoded)
        .map_err(|e| AegisError::Crypto(e.to_string()))?;
    if raw.len() < NONCE_LEN {
        return Err(AegisError::Crypto("payload too short".into()));
    }
    let (nonce, ct) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| AegisError::Crypto(e.to_string()))?;
    cipher
        .decrypt(nonce.into(), ct)
        .map_err(|e| AegisError::Crypto(e.to_string()))
}

/// Decrypted anomaly row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub id: String,
    pub flow_id: String,
    pub ts: f64,
    pub score: f32,
    pub threat_level: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_flows: u64,
    pub total_packets: u64,
    pub total_anomalies: u64,
}

pub struct FlowStore {
    conn: Mutex<Connection>,
    key: [u8; KEY_LEN],
}

impl FlowStore {
    /// Open or create DB at path. Key is derived from `secret`.
    pub fn open(path: &Path, secret: &[u8]) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS flows (
                id TEXT PRIMARY KEY,
                ts REAL NOT NULL,
                protocol TEXT NOT NULL,
                src_port INTEGER NOT NULL,
                dst_port INTEGER NOT NULL,
                total_packets INTEGER NOT NULL,
                flow_duration REAL NOT NULL,
                anomaly_score REAL,
                is_anomaly INTEGER NOT NULL DEFAULT 0,
                payload_enc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_flows_ts ON flows(ts);
            CREATE INDEX IF NOT EXISTS idx_flows_anomaly ON flows(is_anomaly, ts);
            CREATE TABLE IF NOT EXISTS anomalies (
                id TEXT PRIMARY KEY,
                flow_id TEXT NOT NULL REFERENCES flows(id),
                ts REAL NOT NULL,
                score REAL NOT NULL,
                threat_level TEXT NOT NULL,
                description_enc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_anomalies_ts ON anomalies(ts);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            key: derive_key(secret),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AegisError::Io(std::io::ErrorKind::Other.into()))
    }

    /// Insert or replace a finished flow with its verdict (payload stored encrypted).
    pub fn insert_flow(&self, flow: &FlowFeatureVector, risk: Option<&RiskResult>) -> Result<String> {
        let id = flow.flow_id();
        let payload = serde_json::to_vec(flow)?;
        let enc = encrypt(&self.key, &payload)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO flows \
             (id, ts, protocol, src_port, dst_port, total_packets, flow_duration, anomaly_score, is_anomaly, payload_enc) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                flow.timestamp,
                flow.protocol.as_str(),
                flow.key.src_port,
                flow.key.dst_port,
                flow.total_packets as i64,
                flow.flow_duration,
                risk.map(|r| f64::from(r.score)),
                risk.map(|r| r.is_anomaly).unwrap_or(false),
                enc,
            ],
        )?;
        Ok(id)
    }

    /// Read a flow back by id (decrypt payload)
    pub fn get_flow(&self, id: &str) -> Result<Option<FlowFeatureVector>> {
        let enc: Option<String> = self
            .conn()?
            .query_row(
                "SELECT payload_enc FROM flows WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match enc {
            Some(enc) => {
                let plain = decrypt(&self.key, &enc)?;
                Ok(Some(serde_json::from_slice(&plain)?))
            }
            None => Ok(None),
        }
    }

    /// Record an alert for an already-stored flow; returns the alert id.
    pub fn insert_anomaly(&self, risk: &RiskResult) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let enc = encrypt(&self.key, risk.description.as_bytes())?;
        self.conn()?.execute(
            "INSERT INTO anomalies (id, flow_id, ts, score, threat_level, description_enc) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, risk.flow_id, risk.ts, f64::from(risk.score), risk.level.as_str(), enc],
        )?;
        Ok(id)
    }

    /// Most recent alerts first.
    pub fn recent_anomalies(&self, limit: usize) -> Result<Vec<AnomalyRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, flow_id, ts, score, threat_level, description_enc \
             FROM anomalies ORDER BY ts DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, flow_id, ts, score, threat_level, enc) = row?;
            let plain = decrypt(&self.key, &enc)?;
            out.push(AnomalyRecord {
                id,
                flow_id,
                ts,
                score: score as f32,
                threat_level,
                description: String::from_utf8_lossy(&plain).into_owned(),
            });
        }
        Ok(out)
    }

    pub fn statistics(&self) -> Result<StoreStats> {
        let conn = self.conn()?;
        let (total_flows, total_packets): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(total_packets), 0) FROM flows",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let total_anomalies: i64 =
            conn.query_row("SELECT COUNT(*) FROM anomalies", [], |row| row.get(0))?;
        Ok(StoreStats {
            total_flows: total_flows as u64,
            total_packets: total_packets as u64,
            total_anomalies: total_anomalies as u64,
        })
    }

    /// Retention: delete flows (and their alerts) that started before `ts`
    pub fn prune_before(&self, ts: f64) -> Result<u64> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM anomalies WHERE ts < ?1", params![ts])?;
        let n = conn.execute("DELETE FROM flows WHERE ts < ?1", params![ts])?;
        Ok(n as u64)
    }
}
