//! Compact wire representation of a catalog.
//!
//! Framing (the wire contract, stable across versions):
//! - byte 0: delivery tag, `0x00` direct or `0x01` broadcast;
//! - bytes 1..: GZIP-compressed JSON payload. The direct payload is the slot
//!   array itself; the broadcast payload is a broadcast id whose published
//!   blob is bit-identical to a direct-framed catalog, so one decoder serves
//!   both forms.
//!
//! Callers encode while holding the owning catalog's lock, so the slot array
//! cannot mutate mid-encode.

use std::io::Read;
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use fsh_common::{FshError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::broadcast::{Broadcast, BroadcastManager};
use crate::status::MapStatus;

/// Framing tag for a reply carrying the catalog inline.
pub const DIRECT_TAG: u8 = 0;
/// Framing tag for a reply carrying only a broadcast id.
pub const BROADCAST_TAG: u8 = 1;

fn encode_framed<T: Serialize>(tag: u8, value: &T) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    serde_json::to_writer(&mut encoder, value)
        .map_err(|e| FshError::Protocol(format!("catalog encode failed: {e}")))?;
    let payload = encoder.finish()?;
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(tag);
    out.extend_from_slice(&payload);
    Ok(out)
}

fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    let mut decoder = GzDecoder::new(payload);
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    serde_json::from_slice(&buf)
        .map_err(|e| FshError::Protocol(format!("catalog decode failed: {e}")))
}

/// Encode a slot array for the wire, switching to broadcast delivery when
/// the direct form reaches `min_broadcast_size`.
///
/// Returns the reply bytes plus the broadcast handle to pin when the
/// oversized path was taken.
pub fn serialize_map_statuses(
    statuses: &[Option<MapStatus>],
    broadcasts: &Arc<dyn BroadcastManager>,
    is_local: bool,
    min_broadcast_size: usize,
) -> Result<(Vec<u8>, Option<Broadcast>)> {
    let direct = encode_framed(DIRECT_TAG, &statuses)?;
    if direct.len() < min_broadcast_size {
        return Ok((direct, None));
    }

    let direct_len = direct.len();
    let id = broadcasts.publish(direct, is_local)?;
    let outer = encode_framed(BROADCAST_TAG, &id)?;
    debug!(
        broadcast_id = id,
        direct_bytes = direct_len,
        reply_bytes = outer.len(),
        "catalog reply switched to broadcast delivery"
    );
    Ok((outer, Some(Broadcast::new(id, Arc::clone(broadcasts)))))
}

/// Decode a framed catalog reply, pulling the broadcast blob when needed.
pub fn deserialize_map_statuses(
    bytes: &[u8],
    broadcasts: &Arc<dyn BroadcastManager>,
) -> Result<Vec<Option<MapStatus>>> {
    match bytes.first() {
        Some(&DIRECT_TAG) => decode_payload(&bytes[1..]),
        Some(&BROADCAST_TAG) => {
            let id: u64 = decode_payload(&bytes[1..])?;
            let blob = broadcasts.fetch(id)?;
            match blob.first() {
                Some(&DIRECT_TAG) => decode_payload(&blob[1..]),
                other => Err(FshError::Protocol(format!(
                    "broadcast catalog blob has unexpected framing tag {other:?}"
                ))),
            }
        }
        other => Err(FshError::Protocol(format!(
            "unknown catalog framing tag {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::InMemoryBroadcastManager;
    use fsh_common::BlockManagerId;

    fn sample_statuses() -> Vec<Option<MapStatus>> {
        let a = BlockManagerId::new("exec-a", "host-a", 7337);
        let b = BlockManagerId::new("exec-b", "host-b", 7337);
        vec![
            Some(MapStatus::new(a, &[10, 20, 30])),
            None,
            Some(MapStatus::summarized(b, &[0, 5, 0])),
        ]
    }

    #[test]
    fn direct_form_round_trips() {
        let broadcasts: Arc<dyn BroadcastManager> = Arc::new(InMemoryBroadcastManager::new());
        let statuses = sample_statuses();
        let (bytes, handle) =
            serialize_map_statuses(&statuses, &broadcasts, true, usize::MAX).expect("serialize");
        assert_eq!(bytes[0], DIRECT_TAG);
        assert!(handle.is_none());

        let decoded = deserialize_map_statuses(&bytes, &broadcasts).expect("deserialize");
        assert_eq!(decoded, statuses);
    }

    #[test]
    fn broadcast_form_round_trips_and_pins_blob() {
        let broadcasts: Arc<dyn BroadcastManager> = Arc::new(InMemoryBroadcastManager::new());
        let statuses = sample_statuses();
        let (bytes, handle) =
            serialize_map_statuses(&statuses, &broadcasts, true, 1).expect("serialize");
        assert_eq!(bytes[0], BROADCAST_TAG);
        let handle = handle.expect("broadcast handle");

        let decoded = deserialize_map_statuses(&bytes, &broadcasts).expect("deserialize");
        assert_eq!(decoded, statuses);

        // The outer reply must stay small regardless of catalog size.
        assert!(bytes.len() < 64);

        handle.destroy(false).expect("destroy");
        assert!(deserialize_map_statuses(&bytes, &broadcasts).is_err());
    }

    #[test]
    fn variant_is_preserved_through_the_wire() {
        let broadcasts: Arc<dyn BroadcastManager> = Arc::new(InMemoryBroadcastManager::new());
        let statuses = sample_statuses();
        let (bytes, _) =
            serialize_map_statuses(&statuses, &broadcasts, true, usize::MAX).expect("serialize");
        let decoded = deserialize_map_statuses(&bytes, &broadcasts).expect("deserialize");
        assert!(matches!(decoded[0], Some(MapStatus::Dense { .. })));
        assert!(matches!(decoded[2], Some(MapStatus::Summarized { .. })));
    }

    #[test]
    fn unknown_tag_is_a_protocol_error() {
        let broadcasts: Arc<dyn BroadcastManager> = Arc::new(InMemoryBroadcastManager::new());
        let err = deserialize_map_statuses(&[0x7f, 0, 0], &broadcasts).expect_err("bad tag");
        assert!(matches!(err, FshError::Protocol(_)));
        let err = deserialize_map_statuses(&[], &broadcasts).expect_err("empty reply");
        assert!(matches!(err, FshError::Protocol(_)));
    }
}
