//! An in-memory Wormhole core bridge for tests that run without an EVM.
//!
//! State lives in a flat `(account, slot) -> word` map using the core
//! contract's real storage layout, so the guardian set override exercises
//! the same slot arithmetic it would against a deployed contract.

use std::collections::HashMap;
use std::convert::Infallible;

use thiserror::Error;
use wormhole_raw_vaas::Vaa as RawVaa;

use crate::storage::{
    address_to_word, guardian_key_slot, guardian_set_slot, mapping_slot, slot, slot_add,
    u128_to_word, u64_to_word, word_to_address, word_to_u64, Address, Word,
    CONSUMED_GOVERNANCE_ACTIONS_SLOT, GOVERNANCE_CONTRACT_SLOT, GUARDIAN_SET_INDEX_SLOT,
    MESSAGE_FEE_SLOT, PROVIDER_SLOT, SEQUENCES_SLOT,
};
use crate::{
    double_keccak256, encode_message_published_log, recover_signer, CoreBridge, GovernanceError,
    GuardianSet, GuardianSignature, RawLog, SetMessageFee, StateEditor, TestGuardianSet,
    VAA_VERSION,
};

/// Mainnet Ethereum core bridge address, used as the default devnet address.
pub const DEFAULT_CORE_BRIDGE_ADDRESS: Address = [
    0x98, 0xf3, 0xc9, 0xe6, 0xe3, 0xfa, 0xce, 0x36, 0xba, 0xad, 0x05, 0xfe, 0x09, 0xd3, 0x75, 0xef,
    0x14, 0x64, 0x28, 0x8b,
];

/// Governance emitter address on the governance chain.
pub const DEFAULT_GOVERNANCE_CONTRACT: [u8; 32] = {
    let mut contract = [0u8; 32];
    contract[31] = 4;
    contract
};

/// Rejections raised by [`DevnetCoreBridge::submit_set_message_fee`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("invalid VAA: {0}")]
    InvalidVaa(String),
    #[error("unsupported VAA version: {0}")]
    UnsupportedVersion(u8),
    #[error("not signed by current guardian set: VAA uses {actual}, current is {expected}")]
    GuardianSetMismatch { expected: u32, actual: u32 },
    #[error("guardian set {0} is empty or corrupt")]
    InvalidGuardianSet(u32),
    #[error("no quorum: {signatures} signatures, {quorum} required")]
    NoQuorum { signatures: usize, quorum: usize },
    #[error("signature {0} is invalid")]
    InvalidSignature(usize),
    #[error("wrong governance chain: {0}")]
    InvalidGovernanceChain(u16),
    #[error("wrong governance contract: 0x{}", hex::encode(.0))]
    InvalidGovernanceContract([u8; 32]),
    #[error("invalid governance payload: {0}")]
    Governance(#[from] GovernanceError),
    #[error("governance action targets chain {0}")]
    InvalidTargetChain(u16),
    #[error("governance action already consumed")]
    GovernanceActionConsumed,
}

/// Initial state of a [`DevnetCoreBridge`].
#[derive(Clone, Debug)]
pub struct DevnetConfig {
    /// Address of the core bridge account.
    pub address: Address,
    /// Chain id of the chain the bridge runs on.
    pub chain_id: u16,
    pub governance_chain_id: u16,
    pub governance_contract: [u8; 32],
    /// Index of the active guardian set.
    pub guardian_set_index: u32,
    /// Keys of the active guardian set.
    pub guardians: Vec<Address>,
    pub message_fee: u128,
}

impl Default for DevnetConfig {
    /// Ethereum mainnet shape: chain 2, governed from Solana, 19 guardians.
    fn default() -> Self {
        Self {
            address: DEFAULT_CORE_BRIDGE_ADDRESS,
            chain_id: 2,
            governance_chain_id: 1,
            governance_contract: DEFAULT_GOVERNANCE_CONTRACT,
            guardian_set_index: 4,
            guardians: TestGuardianSet::generate(19, 0).eth_addresses(),
            message_fee: 0,
        }
    }
}

/// A core bridge whose storage is a plain map.
#[derive(Clone, Debug, Default)]
pub struct DevnetCoreBridge {
    address: Address,
    storage: HashMap<(Address, Word), Word>,
}

impl DevnetCoreBridge {
    pub fn new(config: DevnetConfig) -> Self {
        let mut bridge = Self {
            address: config.address,
            storage: HashMap::new(),
        };

        let mut provider = [0u8; 32];
        provider[28..30].copy_from_slice(&config.governance_chain_id.to_be_bytes());
        provider[30..32].copy_from_slice(&config.chain_id.to_be_bytes());
        bridge.write(slot(PROVIDER_SLOT), provider);
        bridge.write(slot(GOVERNANCE_CONTRACT_SLOT), config.governance_contract);

        bridge.write_guardian_set(config.guardian_set_index, &config.guardians);
        bridge.write(
            slot(GUARDIAN_SET_INDEX_SLOT),
            u64_to_word(config.guardian_set_index as u64),
        );
        bridge.write(slot(MESSAGE_FEE_SLOT), u128_to_word(config.message_fee));

        bridge
    }

    fn read(&self, key: &Word) -> Word {
        self.read_account(&self.address, key)
    }

    fn read_account(&self, account: &Address, key: &Word) -> Word {
        self.storage
            .get(&(*account, *key))
            .copied()
            .unwrap_or_default()
    }

    fn write(&mut self, key: Word, value: Word) {
        self.storage.insert((self.address, key), value);
    }

    fn write_guardian_set(&mut self, index: u32, keys: &[Address]) {
        let set_slot = guardian_set_slot(index);
        self.write(set_slot, u64_to_word(keys.len() as u64));
        for (position, key) in keys.iter().enumerate() {
            self.write(
                guardian_key_slot(&set_slot, position as u64),
                address_to_word(key),
            );
        }
    }

    fn read_guardian_set(&self, index: u32) -> Result<GuardianSet, BridgeError> {
        let set_slot = guardian_set_slot(index);
        let len = word_to_u64(&self.read(&set_slot))
            .filter(|len| *len <= u8::MAX as u64)
            .ok_or(BridgeError::InvalidGuardianSet(index))?;

        let keys = (0..len)
            .map(|position| word_to_address(&self.read(&guardian_key_slot(&set_slot, position))))
            .collect();
        let expiration = self.read(&slot_add(&set_slot, 1));

        Ok(GuardianSet {
            keys,
            expiration_time: u32::from_be_bytes([
                expiration[28],
                expiration[29],
                expiration[30],
                expiration[31],
            ]),
        })
    }

    fn read_chain_id(&self) -> u16 {
        let provider = self.read(&slot(PROVIDER_SLOT));
        u16::from_be_bytes([provider[30], provider[31]])
    }

    fn read_governance_chain_id(&self) -> u16 {
        let provider = self.read(&slot(PROVIDER_SLOT));
        u16::from_be_bytes([provider[28], provider[29]])
    }

    fn read_guardian_set_index(&self) -> u32 {
        let word = self.read(&slot(GUARDIAN_SET_INDEX_SLOT));
        u32::from_be_bytes([word[28], word[29], word[30], word[31]])
    }

    /// The current message fee as a 256-bit big-endian word.
    pub fn message_fee(&self) -> Word {
        self.read(&slot(MESSAGE_FEE_SLOT))
    }

    /// Whether a governance VAA with this digest has been applied.
    pub fn is_governance_action_consumed(&self, digest: &[u8; 32]) -> bool {
        self.read(&mapping_slot(digest, CONSUMED_GOVERNANCE_ACTIONS_SLOT)) != [0u8; 32]
    }

    /// Next sequence number the bridge will assign to `sender`.
    pub fn next_sequence(&self, sender: &Address) -> u64 {
        let word = self.read(&mapping_slot(&address_to_word(sender), SEQUENCES_SLOT));
        word_to_u64(&word).unwrap_or_default()
    }

    /// Publish a message from `sender` and return the log the contract emits.
    pub fn publish_message(
        &mut self,
        sender: &Address,
        nonce: u32,
        payload: &[u8],
        consistency_level: u8,
    ) -> RawLog {
        let sequence = self.next_sequence(sender);
        self.write(
            mapping_slot(&address_to_word(sender), SEQUENCES_SLOT),
            u64_to_word(sequence + 1),
        );

        encode_message_published_log(
            self.address,
            address_to_word(sender),
            sequence,
            nonce,
            payload,
            consistency_level,
        )
    }

    /// Check every signature on a signed VAA against the guardian set it names.
    fn verify_signatures(&self, signed_vaa: &[u8], digest: &[u8; 32]) -> Result<(), BridgeError> {
        let guardian_set_index = u32::from_be_bytes([
            signed_vaa[1],
            signed_vaa[2],
            signed_vaa[3],
            signed_vaa[4],
        ]);
        let current = self.read_guardian_set_index();
        if guardian_set_index != current {
            return Err(BridgeError::GuardianSetMismatch {
                expected: current,
                actual: guardian_set_index,
            });
        }

        let guardian_set = self.read_guardian_set(guardian_set_index)?;
        if guardian_set.keys.is_empty() {
            return Err(BridgeError::InvalidGuardianSet(guardian_set_index));
        }

        let signature_count = signed_vaa[5] as usize;
        if signature_count < guardian_set.quorum() {
            return Err(BridgeError::NoQuorum {
                signatures: signature_count,
                quorum: guardian_set.quorum(),
            });
        }

        let mut last_index: Option<u8> = None;
        for i in 0..signature_count {
            let start = 6 + i * GuardianSignature::LEN;
            let bytes: &[u8; GuardianSignature::LEN] = signed_vaa
                .get(start..start + GuardianSignature::LEN)
                .and_then(|bytes| bytes.try_into().ok())
                .ok_or(BridgeError::InvalidSignature(i))?;
            let signature = GuardianSignature::from_bytes(bytes);

            // Guardian indices must be strictly ascending.
            if last_index.is_some_and(|last| signature.guardian_index <= last) {
                return Err(BridgeError::InvalidSignature(i));
            }
            last_index = Some(signature.guardian_index);

            let key = guardian_set
                .keys
                .get(signature.guardian_index as usize)
                .ok_or(BridgeError::InvalidSignature(i))?;
            let signer =
                recover_signer(digest, &signature).map_err(|_| BridgeError::InvalidSignature(i))?;
            if signer != *key {
                return Err(BridgeError::InvalidSignature(i));
            }
        }

        Ok(())
    }
}

impl StateEditor for DevnetCoreBridge {
    type Error = Infallible;

    fn load(&self, account: &Address, slot: &Word) -> Result<Word, Self::Error> {
        Ok(self.read_account(account, slot))
    }

    fn store(&mut self, account: &Address, slot: &Word, value: Word) -> Result<(), Self::Error> {
        self.storage.insert((*account, *slot), value);
        Ok(())
    }
}

impl CoreBridge for DevnetCoreBridge {
    type Error = BridgeError;

    fn address(&self) -> Address {
        self.address
    }

    fn chain_id(&self) -> Result<u16, Self::Error> {
        Ok(self.read_chain_id())
    }

    fn governance_chain_id(&self) -> Result<u16, Self::Error> {
        Ok(self.read_governance_chain_id())
    }

    fn governance_contract(&self) -> Result<[u8; 32], Self::Error> {
        Ok(self.read(&slot(GOVERNANCE_CONTRACT_SLOT)))
    }

    fn current_guardian_set_index(&self) -> Result<u32, Self::Error> {
        Ok(self.read_guardian_set_index())
    }

    fn guardian_set(&self, index: u32) -> Result<GuardianSet, Self::Error> {
        self.read_guardian_set(index)
    }

    fn submit_set_message_fee(&mut self, signed_vaa: &[u8]) -> Result<(), Self::Error> {
        let vaa = RawVaa::parse(signed_vaa).map_err(|e| BridgeError::InvalidVaa(e.to_string()))?;
        if vaa.version() != VAA_VERSION {
            return Err(BridgeError::UnsupportedVersion(vaa.version()));
        }

        let body = vaa.body();
        let digest = double_keccak256(body.as_ref());
        self.verify_signatures(signed_vaa, &digest)?;

        if body.emitter_chain() != self.read_governance_chain_id() {
            return Err(BridgeError::InvalidGovernanceChain(body.emitter_chain()));
        }
        let emitter_address: [u8; 32] = body.emitter_address();
        if emitter_address != self.read(&slot(GOVERNANCE_CONTRACT_SLOT)) {
            return Err(BridgeError::InvalidGovernanceContract(emitter_address));
        }

        let action = SetMessageFee::decode(body.payload().as_ref())?;
        if action.target_chain != self.read_chain_id() {
            return Err(BridgeError::InvalidTargetChain(action.target_chain));
        }

        if self.is_governance_action_consumed(&digest) {
            return Err(BridgeError::GovernanceActionConsumed);
        }
        self.write(
            mapping_slot(&digest, CONSUMED_GOVERNANCE_ACTIONS_SLOT),
            u64_to_word(1),
        );
        self.write(slot(MESSAGE_FEE_SLOT), action.fee);

        tracing::info!(fee = %hex::encode(action.fee), "message fee updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TestGuardian, Vaa, GOVERNANCE_CONSISTENCY_LEVEL};

    fn single_guardian_bridge() -> DevnetCoreBridge {
        DevnetCoreBridge::new(DevnetConfig {
            guardians: vec![TestGuardian::default().eth_address],
            ..DevnetConfig::default()
        })
    }

    fn fee_vaa(bridge: &DevnetCoreBridge, fee: u128) -> Vaa {
        let mut vaa = Vaa::new(
            1,
            DEFAULT_GOVERNANCE_CONTRACT,
            0,
            SetMessageFee::from_u128(bridge.read_chain_id(), fee).encode(),
        );
        vaa.consistency_level = GOVERNANCE_CONSISTENCY_LEVEL;
        vaa.guardian_set_index = bridge.read_guardian_set_index();
        vaa
    }

    #[test]
    fn test_default_state() {
        let bridge = DevnetCoreBridge::new(DevnetConfig::default());

        assert_eq!(bridge.chain_id().unwrap(), 2);
        assert_eq!(bridge.governance_chain_id().unwrap(), 1);
        assert_eq!(
            bridge.governance_contract().unwrap(),
            DEFAULT_GOVERNANCE_CONTRACT
        );
        assert_eq!(bridge.current_guardian_set_index().unwrap(), 4);

        let set = bridge.guardian_set(4).unwrap();
        assert_eq!(set.keys, TestGuardianSet::generate(19, 0).eth_addresses());
        assert_eq!(set.expiration_time, 0);
        assert_eq!(set.quorum(), 13);

        // Unknown sets read as empty.
        assert!(bridge.guardian_set(5).unwrap().keys.is_empty());
    }

    #[test]
    fn test_guardian_set_lives_at_mapping_slot() {
        let bridge = single_guardian_bridge();
        let set_slot = guardian_set_slot(4);
        let address = bridge.address();

        assert_eq!(bridge.load(&address, &set_slot).unwrap(), u64_to_word(1));
        assert_eq!(
            bridge
                .load(&address, &guardian_key_slot(&set_slot, 0))
                .unwrap(),
            address_to_word(&TestGuardian::default().eth_address)
        );
    }

    #[test]
    fn test_fee_and_sequences_use_core_state_slots() {
        let mut bridge = DevnetCoreBridge::new(DevnetConfig {
            message_fee: 9,
            ..DevnetConfig::default()
        });
        let address = bridge.address();
        let sender = [0x42; 20];
        bridge.publish_message(&sender, 0, b"", 1);

        assert_eq!(bridge.load(&address, &slot(7)).unwrap(), u64_to_word(9));
        assert_eq!(bridge.load(&address, &slot(6)).unwrap(), [0u8; 32]);
        assert_eq!(
            bridge
                .load(&address, &mapping_slot(&address_to_word(&sender), 4))
                .unwrap(),
            u64_to_word(1)
        );
    }

    #[test]
    fn test_publish_message_increments_sequence() {
        let mut bridge = single_guardian_bridge();
        let sender = [0x42; 20];

        let first = bridge.publish_message(&sender, 1, b"one", 1);
        let second = bridge.publish_message(&sender, 1, b"two", 1);

        assert_eq!(first.topics[1], address_to_word(&sender));
        assert_eq!(crate::decode_message_published(&first).unwrap().sequence, 0);
        assert_eq!(crate::decode_message_published(&second).unwrap().sequence, 1);
        assert_eq!(bridge.next_sequence(&sender), 2);
        assert_eq!(bridge.next_sequence(&[0x43; 20]), 0);
    }

    #[test]
    fn test_set_message_fee() {
        let mut bridge = single_guardian_bridge();
        let mut vaa = fee_vaa(&bridge, 100);
        let signed = vaa.sign(&TestGuardian::default());

        bridge.submit_set_message_fee(&signed).unwrap();
        assert_eq!(bridge.message_fee(), u128_to_word(100));
        assert!(bridge.is_governance_action_consumed(&vaa.hash));

        assert_eq!(
            bridge.submit_set_message_fee(&signed),
            Err(BridgeError::GovernanceActionConsumed)
        );
    }

    #[test]
    fn test_set_message_fee_rejects_unknown_signer() {
        let mut bridge = single_guardian_bridge();
        let signed = fee_vaa(&bridge, 100).sign(&TestGuardian::new([0x11; 32], 0));

        assert_eq!(
            bridge.submit_set_message_fee(&signed),
            Err(BridgeError::InvalidSignature(0))
        );
    }

    #[test]
    fn test_set_message_fee_requires_quorum() {
        let mut bridge = DevnetCoreBridge::new(DevnetConfig::default());
        let signed = fee_vaa(&bridge, 100).sign(&TestGuardian::default());

        assert_eq!(
            bridge.submit_set_message_fee(&signed),
            Err(BridgeError::NoQuorum {
                signatures: 1,
                quorum: 13
            })
        );
    }

    #[test]
    fn test_set_message_fee_checks_emitter_and_target() {
        let mut bridge = single_guardian_bridge();
        let guardian = TestGuardian::default();

        let mut wrong_chain = fee_vaa(&bridge, 1);
        wrong_chain.emitter_chain = 2;
        assert_eq!(
            bridge.submit_set_message_fee(&wrong_chain.sign(&guardian)),
            Err(BridgeError::InvalidGovernanceChain(2))
        );

        let mut wrong_target = fee_vaa(&bridge, 1);
        wrong_target.payload = SetMessageFee::from_u128(6, 1).encode();
        assert_eq!(
            bridge.submit_set_message_fee(&wrong_target.sign(&guardian)),
            Err(BridgeError::InvalidTargetChain(6))
        );

        let mut stale_set = fee_vaa(&bridge, 1);
        stale_set.guardian_set_index = 3;
        assert_eq!(
            bridge.submit_set_message_fee(&stale_set.sign(&guardian)),
            Err(BridgeError::GuardianSetMismatch {
                expected: 4,
                actual: 3
            })
        );
    }
}
