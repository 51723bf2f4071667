// Identifiers
//
// Queue ids are 20-character base32hex short ids with a leading timestamp so
// that lexicographic order approximates creation order. Message ids are
// ULIDs; the embedded creation time is recovered when computing the
// time-in-queue histogram.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use ulid::Ulid;

/// Length of a textual queue identifier.
pub const QUEUE_ID_LEN: usize = 20;

/// Length of a textual message identifier.
pub const MESSAGE_ID_LEN: usize = 26;

const ENCODING: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

static MACHINE_ID: Lazy<[u8; 3]> = Lazy::new(|| {
    let mut id = [0u8; 3];
    rand::thread_rng().fill(&mut id[..]);
    id
});

static COUNTER: Lazy<AtomicU32> =
    Lazy::new(|| AtomicU32::new(rand::thread_rng().gen::<u32>() & 0x00ff_ffff));

// Monotonic within the process: ids generated in the same millisecond still
// sort in generation order.
static ULID_GENERATOR: Lazy<std::sync::Mutex<ulid::Generator>> =
    Lazy::new(|| std::sync::Mutex::new(ulid::Generator::new()));

/// Sortable queue identifier.
///
/// Layout: 4 bytes of unix seconds, 3 bytes of per-process machine id,
/// 2 bytes of pid, 3 bytes of a rolling counter, base32hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueId(String);

impl QueueId {
    /// Generates a fresh identifier.
    pub fn generate() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        let pid = std::process::id() as u16;
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;

        let mut raw = [0u8; 12];
        raw[..4].copy_from_slice(&secs.to_be_bytes());
        raw[4..7].copy_from_slice(&*MACHINE_ID);
        raw[7..9].copy_from_slice(&pid.to_be_bytes());
        raw[9] = (count >> 16) as u8;
        raw[10] = (count >> 8) as u8;
        raw[11] = count as u8;

        QueueId(encode_base32hex(&raw))
    }

    /// Validates a caller-supplied identifier. Input is lowercased before
    /// the structural check.
    pub fn parse(s: &str) -> Result<Self> {
        let lowered = s.to_lowercase();
        if lowered.len() != QUEUE_ID_LEN || !lowered.bytes().all(|b| ENCODING.contains(&b)) {
            return Err(Error::InvalidId);
        }

        Ok(QueueId(lowered))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Time-ordered message identifier (ULID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generates a fresh identifier carrying the current millisecond.
    pub fn generate() -> Self {
        let mut generator = ULID_GENERATOR
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // The generator only fails when the random part overflows within a
        // single millisecond; fall back to an unordered id in that case.
        let ulid = generator.generate().unwrap_or_else(|_| Ulid::new());

        MessageId(ulid.to_string())
    }

    /// Validates a caller-supplied identifier.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != MESSAGE_ID_LEN {
            return Err(Error::InvalidId);
        }

        Ulid::from_string(s).map_err(|_| Error::InvalidId)?;

        Ok(MessageId(s.to_string()))
    }

    /// Creation time embedded in the identifier, unix milliseconds.
    pub fn created_at_millis(&self) -> Result<i64> {
        let ulid = Ulid::from_string(&self.0).map_err(|_| Error::InvalidId)?;
        Ok(ulid.timestamp_ms() as i64)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn encode_base32hex(raw: &[u8; 12]) -> String {
    let mut out = String::with_capacity(QUEUE_ID_LEN);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;

    for &byte in raw {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;

        while bits >= 5 {
            bits -= 5;
            out.push(ENCODING[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }

    if bits > 0 {
        out.push(ENCODING[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_id_shape() {
        let id = QueueId::generate();
        assert_eq!(id.as_str().len(), QUEUE_ID_LEN);
        assert!(id.as_str().bytes().all(|b| ENCODING.contains(&b)));
    }

    #[test]
    fn queue_ids_are_unique_and_sorted_within_process() {
        let ids: Vec<QueueId> = (0..64).map(|_| QueueId::generate()).collect();

        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();

        assert_eq!(sorted.len(), 64);
        assert_eq!(sorted, ids);
    }

    #[test]
    fn queue_id_parse_accepts_uppercase_input() {
        let id = QueueId::generate();
        let parsed = QueueId::parse(&id.as_str().to_uppercase()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn queue_id_parse_rejects_malformed_input() {
        assert_eq!(QueueId::parse(""), Err(Error::InvalidId));
        assert_eq!(QueueId::parse("short"), Err(Error::InvalidId));
        assert_eq!(QueueId::parse(&"x".repeat(21)), Err(Error::InvalidId));
        // 'z' is outside the base32hex alphabet.
        assert_eq!(QueueId::parse(&"z".repeat(20)), Err(Error::InvalidId));
    }

    #[test]
    fn message_id_roundtrip_and_creation_time() {
        let before = chrono::Utc::now().timestamp_millis();
        let id = MessageId::generate();
        let after = chrono::Utc::now().timestamp_millis();

        let parsed = MessageId::parse(id.as_str()).unwrap();
        let created = parsed.created_at_millis().unwrap();

        assert_eq!(parsed, id);
        assert!(created >= before && created <= after);
    }

    #[test]
    fn message_id_parse_rejects_malformed_input() {
        assert_eq!(MessageId::parse(""), Err(Error::InvalidId));
        assert_eq!(MessageId::parse("not-a-ulid"), Err(Error::InvalidId));
        // 'u' is excluded from Crockford base32.
        assert_eq!(MessageId::parse(&"u".repeat(26)), Err(Error::InvalidId));
    }

    #[test]
    fn message_ids_sort_in_generation_order() {
        let ids: Vec<MessageId> = (0..256).map(|_| MessageId::generate()).collect();

        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();

        assert_eq!(sorted.len(), 256);
        assert_eq!(sorted, ids);
    }
}
