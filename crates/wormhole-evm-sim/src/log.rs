//! Decoding `LogMessagePublished` event logs into unsigned VAAs.
//!
//! The core contract emits
//! `LogMessagePublished(address indexed sender, uint64 sequence, uint32 nonce, bytes payload, uint8 consistencyLevel)`.
//! The sender is the only indexed field, so it lands in `topics[1]`; the
//! rest is ABI-encoded in the log data:
//!
//! | offset | content                                     |
//! |--------|---------------------------------------------|
//! | 0      | sequence (uint64, right-aligned)            |
//! | 32     | nonce (uint32, right-aligned)               |
//! | 64     | payload offset (ignored)                    |
//! | 96     | consistency level (uint8, right-aligned)    |
//! | 128    | payload length (uint256)                    |
//! | 160    | payload, zero-padded to a 32-byte multiple  |

use thiserror::Error;

use crate::{keccak256, Vaa};

/// Canonical signature of the message-published event.
pub const LOG_MESSAGE_PUBLISHED_SIGNATURE: &str =
    "LogMessagePublished(address,uint64,uint32,bytes,uint8)";

/// Width of one ABI word.
const WORD: usize = 32;

/// Errors produced while decoding a published-message log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("log topic 0 is not LogMessagePublished: 0x{}", hex::encode(.0))]
    UnexpectedTopic([u8; 32]),
    #[error("log has {0} topics, expected the event selector and the emitter")]
    MissingEmitter(usize),
    #[error("failed to parse wormhole message: decoder needs {expected} bytes, log data has {actual}")]
    DecodeMismatch { expected: usize, actual: usize },
}

/// A raw EVM event log as captured by the test harness.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawLog {
    /// The emitting contract.
    pub address: [u8; 20],
    /// Indexed topics; `topics[0]` is the event selector.
    pub topics: Vec<[u8; 32]>,
    /// ABI-encoded non-indexed fields.
    pub data: Vec<u8>,
}

impl RawLog {
    /// Whether this log is a `LogMessagePublished` event.
    pub fn is_message_published(&self) -> bool {
        self.topics.first() == Some(&log_message_published_topic())
    }
}

/// `topics[0]` of every `LogMessagePublished` event.
pub fn log_message_published_topic() -> [u8; 32] {
    keccak256(LOG_MESSAGE_PUBLISHED_SIGNATURE)
}

/// Build the log a conforming core contract emits for a published message.
///
/// Handy for tests that do not capture logs from a real chain.
pub fn encode_message_published_log(
    core_bridge: [u8; 20],
    emitter: [u8; 32],
    sequence: u64,
    nonce: u32,
    payload: &[u8],
    consistency_level: u8,
) -> RawLog {
    let padded_len = payload.len().div_ceil(WORD) * WORD;
    let mut data = Vec::with_capacity(5 * WORD + padded_len);

    data.extend_from_slice(&right_align(&sequence.to_be_bytes()));
    data.extend_from_slice(&right_align(&nonce.to_be_bytes()));
    data.extend_from_slice(&right_align(&((4 * WORD) as u64).to_be_bytes()));
    data.extend_from_slice(&right_align(&[consistency_level]));
    data.extend_from_slice(&right_align(&(payload.len() as u64).to_be_bytes()));
    data.extend_from_slice(payload);
    data.resize(5 * WORD + padded_len, 0);

    RawLog {
        address: core_bridge,
        topics: vec![log_message_published_topic(), emitter],
        data,
    }
}

fn right_align(bytes: &[u8]) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - bytes.len()..].copy_from_slice(bytes);
    word
}

/// Cursor over the log data. Every read checks the remaining length.
struct Cursor<'a> {
    data: &'a [u8],
    index: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, index: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], LogError> {
        let end = self
            .index
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(LogError::DecodeMismatch {
                expected: self.index.saturating_add(len),
                actual: self.data.len(),
            })?;
        let out = &self.data[self.index..end];
        self.index = end;
        Ok(out)
    }

    /// The trailing `N` bytes of the next word.
    fn word_tail<const N: usize>(&mut self) -> Result<[u8; N], LogError> {
        let word = self.take(WORD)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&word[WORD - N..]);
        Ok(out)
    }

    /// The next word as a length. Values that do not fit a `usize` cannot
    /// be satisfied by any in-memory log.
    fn length(&mut self) -> Result<usize, LogError> {
        let word = self.take(WORD)?;
        let (high, low) = word.split_at(WORD - 8);
        let mut low_bytes = [0u8; 8];
        low_bytes.copy_from_slice(low);
        let len = u64::from_be_bytes(low_bytes);
        match usize::try_from(len) {
            Ok(len) if high.iter().all(|b| *b == 0) => Ok(len),
            _ => Err(LogError::DecodeMismatch {
                expected: usize::MAX,
                actual: self.data.len(),
            }),
        }
    }
}

/// Decode a `LogMessagePublished` log into a partially-filled [`Vaa`].
///
/// Only the fields the log carries are set: emitter address, sequence,
/// nonce, consistency level, and payload. Version, timestamp, emitter chain,
/// guardian set index, and signatures are left at their defaults for the
/// caller to stamp before hashing.
pub fn decode_message_published(log: &RawLog) -> Result<Vaa, LogError> {
    let selector = log.topics.first().ok_or(LogError::MissingEmitter(0))?;
    if *selector != log_message_published_topic() {
        return Err(LogError::UnexpectedTopic(*selector));
    }
    let emitter_address = *log
        .topics
        .get(1)
        .ok_or(LogError::MissingEmitter(log.topics.len()))?;

    let mut cursor = Cursor::new(&log.data);

    let sequence = u64::from_be_bytes(cursor.word_tail::<8>()?);
    let nonce = u32::from_be_bytes(cursor.word_tail::<4>()?);
    cursor.take(WORD)?;
    let [consistency_level] = cursor.word_tail::<1>()?;
    let payload_len = cursor.length()?;
    // Anything after the payload is ABI padding.
    let payload = cursor.take(payload_len)?.to_vec();

    Ok(Vaa {
        emitter_address,
        sequence,
        nonce,
        consistency_level,
        payload,
        ..Vaa::default()
    })
}

/// Keep the `LogMessagePublished` logs, in order.
pub fn filter_message_published(logs: &[RawLog]) -> Vec<RawLog> {
    logs.iter()
        .filter(|log| log.is_message_published())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_log(payload: &[u8]) -> RawLog {
        encode_message_published_log([0x11; 20], [0xAB; 32], 7, 42, payload, 1)
    }

    #[test]
    fn test_event_selector() {
        assert_eq!(
            hex::encode(log_message_published_topic()),
            "6eb224fb001ed210e379b335e35efe88672a8ce935d981a6896b27ffdf52a3b2"
        );
    }

    #[test]
    fn test_decode_conforming_log() {
        let log = sample_log(&[0xDE, 0xAD]);
        assert_eq!(log.data.len(), 6 * 32);

        let vaa = decode_message_published(&log).unwrap();
        assert_eq!(vaa.emitter_address, [0xAB; 32]);
        assert_eq!(vaa.sequence, 7);
        assert_eq!(vaa.nonce, 42);
        assert_eq!(vaa.consistency_level, 1);
        assert_eq!(vaa.payload, vec![0xDE, 0xAD]);

        // Fields the log does not carry stay unset.
        assert_eq!(vaa.timestamp, 0);
        assert_eq!(vaa.emitter_chain, 0);
        assert!(vaa.signatures.is_empty());
    }

    #[test]
    fn test_decode_word_aligned_and_empty_payloads() {
        let aligned = decode_message_published(&sample_log(&[0x5A; 64])).unwrap();
        assert_eq!(aligned.payload, vec![0x5A; 64]);

        let empty = sample_log(&[]);
        assert_eq!(empty.data.len(), 5 * 32);
        assert!(decode_message_published(&empty).unwrap().payload.is_empty());
    }

    #[test]
    fn test_decode_truncated_payload_is_mismatch() {
        let mut log = sample_log(&[0x01; 40]);
        log.data.truncate(5 * 32 + 39);

        assert_eq!(
            decode_message_published(&log),
            Err(LogError::DecodeMismatch {
                expected: 5 * 32 + 40,
                actual: 5 * 32 + 39,
            })
        );
    }

    #[test]
    fn test_decode_truncated_header_is_mismatch() {
        let mut log = sample_log(&[]);
        log.data.truncate(100);
        assert!(matches!(
            decode_message_published(&log),
            Err(LogError::DecodeMismatch { actual: 100, .. })
        ));
    }

    #[test]
    fn test_decode_oversized_length_is_mismatch() {
        let mut log = sample_log(&[0x01]);
        log.data[4 * 32] = 0x01;
        assert!(matches!(
            decode_message_published(&log),
            Err(LogError::DecodeMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_foreign_topics() {
        let mut log = sample_log(&[1]);
        log.topics[0] = [0xFF; 32];
        assert_eq!(
            decode_message_published(&log),
            Err(LogError::UnexpectedTopic([0xFF; 32]))
        );

        let mut log = sample_log(&[1]);
        log.topics.truncate(1);
        assert_eq!(
            decode_message_published(&log),
            Err(LogError::MissingEmitter(1))
        );
    }

    #[test]
    fn test_filter_keeps_order() {
        let other = RawLog {
            address: [0x22; 20],
            topics: vec![keccak256("Transfer(address,address,uint256)")],
            data: vec![],
        };
        let first = sample_log(&[1]);
        let second = sample_log(&[2]);
        let logs = vec![other.clone(), first.clone(), other, second.clone()];

        assert_eq!(filter_message_published(&logs), vec![first, second]);
    }
}
