//! Core bridge governance payloads.

use thiserror::Error;

use crate::storage::u128_to_word;

/// Module identifier of the core bridge: "Core", left-padded to 32 bytes.
pub const CORE_MODULE: [u8; 32] = {
    let mut module = [0u8; 32];
    module[28] = b'C';
    module[29] = b'o';
    module[30] = b'r';
    module[31] = b'e';
    module
};

/// Governance action id of `SetMessageFee`.
pub const ACTION_SET_MESSAGE_FEE: u8 = 3;

/// Consistency level used on governance VAAs.
pub const GOVERNANCE_CONSISTENCY_LEVEL: u8 = 200;

/// Encoded length of a `SetMessageFee` payload.
pub const SET_MESSAGE_FEE_LEN: usize = 32 + 1 + 2 + 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GovernanceError {
    #[error("governance payload must be 67 bytes, got {0}")]
    InvalidLength(usize),
    #[error("governance module is not Core: 0x{}", hex::encode(.0))]
    InvalidModule([u8; 32]),
    #[error("unexpected governance action: {0}")]
    InvalidAction(u8),
}

/// `SetMessageFee` governance action.
///
/// Format: module (32) | action (1) | target chain (2) | fee (32, big-endian)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetMessageFee {
    /// Chain the action applies to.
    pub target_chain: u16,
    /// New fee as a 256-bit big-endian word.
    pub fee: [u8; 32],
}

impl SetMessageFee {
    pub fn new(target_chain: u16, fee: [u8; 32]) -> Self {
        Self { target_chain, fee }
    }

    /// A fee that fits in 128 bits, widened to the 32-byte word.
    pub fn from_u128(target_chain: u16, fee: u128) -> Self {
        Self::new(target_chain, u128_to_word(fee))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(SET_MESSAGE_FEE_LEN);
        payload.extend_from_slice(&CORE_MODULE);
        payload.push(ACTION_SET_MESSAGE_FEE);
        payload.extend_from_slice(&self.target_chain.to_be_bytes());
        payload.extend_from_slice(&self.fee);
        payload
    }

    pub fn decode(payload: &[u8]) -> Result<Self, GovernanceError> {
        if payload.len() != SET_MESSAGE_FEE_LEN {
            return Err(GovernanceError::InvalidLength(payload.len()));
        }
        let mut module = [0u8; 32];
        module.copy_from_slice(&payload[..32]);
        if module != CORE_MODULE {
            return Err(GovernanceError::InvalidModule(module));
        }
        if payload[32] != ACTION_SET_MESSAGE_FEE {
            return Err(GovernanceError::InvalidAction(payload[32]));
        }
        let target_chain = u16::from_be_bytes([payload[33], payload[34]]);
        let mut fee = [0u8; 32];
        fee.copy_from_slice(&payload[35..]);

        Ok(Self { target_chain, fee })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_module_padding() {
        assert_eq!(
            hex::encode(CORE_MODULE),
            "00000000000000000000000000000000000000000000000000000000436f7265"
        );
    }

    #[test]
    fn test_set_message_fee_layout() {
        let payload = SetMessageFee::from_u128(2, 100).encode();

        assert_eq!(payload.len(), SET_MESSAGE_FEE_LEN);
        assert_eq!(&payload[..32], &CORE_MODULE);
        assert_eq!(payload[32], 3);
        assert_eq!(&payload[33..35], &[0, 2]);
        assert_eq!(payload[66], 100);
        assert!(payload[35..66].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_decode_rejects_other_actions() {
        let mut payload = SetMessageFee::from_u128(2, 1).encode();
        payload[32] = 2;
        assert_eq!(
            SetMessageFee::decode(&payload),
            Err(GovernanceError::InvalidAction(2))
        );

        let mut payload = SetMessageFee::from_u128(2, 1).encode();
        payload[0] = 1;
        assert!(matches!(
            SetMessageFee::decode(&payload),
            Err(GovernanceError::InvalidModule(_))
        ));

        assert_eq!(
            SetMessageFee::decode(&[0u8; 10]),
            Err(GovernanceError::InvalidLength(10))
        );
    }

    #[test]
    fn test_decode_roundtrip() {
        let action = SetMessageFee::from_u128(4, 123_456);
        assert_eq!(SetMessageFee::decode(&action.encode()), Ok(action));
    }

    #[test]
    fn test_fee_uses_full_word() {
        let mut fee = [0u8; 32];
        fee[0] = 0x01;
        let payload = SetMessageFee::new(2, fee).encode();

        assert_eq!(&payload[35..], &fee);
        assert_eq!(SetMessageFee::decode(&payload).unwrap().fee, fee);
    }
}
