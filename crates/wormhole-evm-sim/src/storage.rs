//! Raw EVM storage access and the Wormhole core contract's storage layout.

use crate::keccak256;

/// A 32-byte storage word.
pub type Word = [u8; 32];

/// A 20-byte EVM account address.
pub type Address = [u8; 20];

/// Storage slot of the `Provider.chainId` / `Provider.governanceChainId` pair.
pub const PROVIDER_SLOT: u64 = 0;
/// Storage slot of `Provider.governanceContract`.
pub const GOVERNANCE_CONTRACT_SLOT: u64 = 1;
/// Base slot of the `mapping(uint32 => GuardianSet) guardianSets`.
pub const GUARDIAN_SETS_SLOT: u64 = 2;
/// Storage slot of the packed `guardianSetIndex` / `guardianSetExpiry` pair.
pub const GUARDIAN_SET_INDEX_SLOT: u64 = 3;
/// Base slot of the `mapping(address => uint64) sequences`.
pub const SEQUENCES_SLOT: u64 = 4;
/// Base slot of the `mapping(bytes32 => bool) consumedGovernanceActions`.
pub const CONSUMED_GOVERNANCE_ACTIONS_SLOT: u64 = 5;
/// Storage slot of `messageFee`, after the `initializedImplementations`
/// mapping at slot 6.
pub const MESSAGE_FEE_SLOT: u64 = 7;

/// Privileged read/write access to contract storage, addressed by account
/// and 32-byte slot key.
///
/// This is the one capability the simulator needs from a test harness
/// beyond ordinary contract calls. Implemented by [`crate::DevnetCoreBridge`]
/// for in-process tests; an EVM harness implements it with its own
/// storage cheatcodes.
pub trait StateEditor {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read a storage word. Unset slots read as zero.
    fn load(&self, account: &Address, slot: &Word) -> Result<Word, Self::Error>;

    /// Overwrite a storage word.
    fn store(&mut self, account: &Address, slot: &Word, value: Word) -> Result<(), Self::Error>;
}

/// A fixed slot number as a storage key.
pub fn slot(index: u64) -> Word {
    u64_to_word(index)
}

pub fn u64_to_word(value: u64) -> Word {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn u128_to_word(value: u128) -> Word {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Left-pad a 20-byte address into a storage word.
pub fn address_to_word(address: &Address) -> Word {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address);
    word
}

/// The low 20 bytes of a storage word.
pub fn word_to_address(word: &Word) -> Address {
    let mut address = [0u8; 20];
    address.copy_from_slice(&word[12..]);
    address
}

/// Interpret a storage word as a length, if it fits in a `u64`.
pub fn word_to_u64(word: &Word) -> Option<u64> {
    if word[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&word[24..]);
    Some(u64::from_be_bytes(low))
}

/// Big-endian 256-bit `base + offset`, wrapping on overflow as the EVM does.
pub fn slot_add(base: &Word, offset: u64) -> Word {
    let mut out = *base;
    let mut carry = offset as u128;
    for byte in out.iter_mut().rev() {
        if carry == 0 {
            break;
        }
        let sum = *byte as u128 + (carry & 0xff);
        *byte = sum as u8;
        carry = (carry >> 8) + (sum >> 8);
    }
    out
}

/// Storage key of `mapping[key]` for a mapping rooted at `base`:
/// `keccak256(key . base)` with both operands as 32-byte words.
pub fn mapping_slot(key: &Word, base: u64) -> Word {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(key);
    preimage[32..].copy_from_slice(&slot(base));
    keccak256(preimage)
}

/// Slot of `guardianSets[index]`. The struct's first member, the `keys`
/// array, stores its length here; `expirationTime` follows at `+ 1`.
pub fn guardian_set_slot(index: u32) -> Word {
    mapping_slot(&u64_to_word(index as u64), GUARDIAN_SETS_SLOT)
}

/// Slot of `guardianSets[index].keys[position]`.
pub fn guardian_key_slot(guardian_set_slot: &Word, position: u64) -> Word {
    slot_add(&keccak256(guardian_set_slot), position)
}
