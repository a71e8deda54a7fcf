//! Append-only audit trail
//!
//! One JSON object per line:
//!
//! ```text
//! {"data":{...},"hash":"<sha256 hex>","ts":"2024-01-01T00:00:00.000000Z","type":"plan"}
//! ```
//!
//! Each entry's hash covers the canonical (key-sorted) encoding of its own
//! `ts`, `type` and `data`. Hashes are not chained, so the trail detects
//! shrinkage but not reordering or same-length edits.
//!
//! The trail remembers the byte length it last saw. An append that finds the
//! file shorter than that, or that does not grow it, marks the trail broken for
//! good and returns [`AuditError::Integrity`].

use crate::error::AuditError;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Recognised entry types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Plan,
    Diff,
    ApplyResult,
    Tests,
    Revert,
    ApplyError,
    Violation,
    Rehydrate,
    RoomReady,
    Publish,
    CorrectionAdded,
}

/// One line of the trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub ts: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub data: Value,
    pub hash: String,
}

impl AuditEntry {
    /// Check the stored hash against the entry's content
    #[must_use]
    pub fn verify(&self) -> bool {
        entry_hash(&self.ts, self.kind, &self.data)
            .map(|h| h == self.hash)
            .unwrap_or(false)
    }

    /// Convenience accessor for a field of `data`
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

/// Result of a full-scan hash check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub entries_checked: usize,
    pub malformed_lines: usize,
    pub hash_mismatches: Vec<usize>,
}

impl IntegrityReport {
    #[must_use]
    pub fn valid(&self) -> bool {
        self.hash_mismatches.is_empty()
    }
}

#[derive(Debug)]
struct TrailState {
    known_len: u64,
    intact: bool,
}

#[derive(Debug)]
pub struct AuditTrail {
    path: PathBuf,
    state: Mutex<TrailState>,
}

impl AuditTrail {
    /// Open (creating if missing) the trail at `path`
    ///
    /// # Errors
    /// Returns error if the file cannot be created or inspected
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        OpenOptions::new().create(true).append(true).open(&path)?;
        let known_len = current_len(&path)?;
        Ok(Self {
            path,
            state: Mutex::new(TrailState {
                known_len,
                intact: true,
            }),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry and force it to disk
    ///
    /// # Errors
    /// [`AuditError::Integrity`] if the file shrank since the last observation
    /// or did not grow; this is sticky for the lifetime of the trail.
    pub fn append(&self, kind: EntryKind, data: Value) -> Result<AuditEntry, AuditError> {
        let mut state = self.state.lock();
        let before = current_len(&self.path)?;
        if !state.intact || before < state.known_len {
            state.intact = false;
            tracing::error!(
                path = %self.path.display(),
                expected_at_least = state.known_len,
                actual = before,
                "audit trail shrank out-of-band"
            );
            return Err(AuditError::Integrity {
                expected_at_least: state.known_len,
                actual: before,
            });
        }

        let ts = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string();
        let hash = entry_hash(&ts, kind, &data)?;
        let entry = AuditEntry {
            ts,
            kind,
            data,
            hash,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        file.sync_all()?;

        let after = file.metadata()?.len();
        if after <= before {
            state.intact = false;
            tracing::error!(before, after, "audit append did not grow the trail");
            return Err(AuditError::Integrity {
                expected_at_least: before + 1,
                actual: after,
            });
        }
        state.known_len = after;
        tracing::trace!(kind = ?entry.kind, len = after, "audit entry appended");
        Ok(entry)
    }

    /// The last `n` parseable entries, oldest first
    ///
    /// # Errors
    /// Returns error only if the file exists but cannot be read
    pub fn tail(&self, n: usize) -> Result<Vec<AuditEntry>, AuditError> {
        let mut entries = self.entries()?;
        let skip = entries.len().saturating_sub(n);
        Ok(entries.split_off(skip))
    }

    /// Every parseable entry, oldest first; malformed lines are skipped
    ///
    /// # Errors
    /// Returns error only if the file exists but cannot be read
    pub fn entries(&self) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(self.scan()?.0)
    }

    /// Re-hash every entry
    ///
    /// # Errors
    /// Returns error only if the file exists but cannot be read
    pub fn verify_hashes(&self) -> Result<IntegrityReport, AuditError> {
        let (entries, malformed_lines) = self.scan()?;
        let hash_mismatches = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.verify())
            .map(|(i, _)| i)
            .collect();
        Ok(IntegrityReport {
            entries_checked: entries.len(),
            malformed_lines,
            hash_mismatches,
        })
    }

    /// Compare the file against the last observed length
    ///
    /// Returns `false` once the trail has been seen to shrink.
    pub fn check_integrity(&self) -> bool {
        let mut state = self.state.lock();
        if state.intact {
            match current_len(&self.path) {
                Ok(len) if len >= state.known_len => {}
                _ => state.intact = false,
            }
        }
        state.intact
    }

    /// Byte length recorded after the last successful append
    #[must_use]
    pub fn known_len(&self) -> u64 {
        self.state.lock().known_len
    }

    fn scan(&self) -> Result<(Vec<AuditEntry>, usize), AuditError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e.into()),
        };
        let mut malformed = 0;
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .filter_map(|l| match serde_json::from_str::<AuditEntry>(l) {
                Ok(entry) => Some(entry),
                Err(_) => {
                    malformed += 1;
                    None
                }
            })
            .collect();
        Ok((entries, malformed))
    }
}

fn current_len(path: &Path) -> Result<u64, AuditError> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// SHA-256 over the key-sorted encoding of `{data, ts, type}`
fn entry_hash(ts: &str, kind: EntryKind, data: &Value) -> Result<String, serde_json::Error> {
    let mut body = Map::new();
    body.insert("data".to_string(), canonicalize(data));
    body.insert("ts".to_string(), Value::String(ts.to_string()));
    body.insert("type".to_string(), serde_json::to_value(kind)?);
    let bytes = serde_json::to_vec(&Value::Object(body))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Value::Object(
                keys.into_iter()
                    .map(|k| (k.clone(), canonicalize(&map[k])))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
