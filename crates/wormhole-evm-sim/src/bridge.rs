//! The [`CoreBridge`] trait: the read accessors and governance entry point
//! the simulator uses on a deployed Wormhole core contract.

use crate::storage::Address;

/// A guardian set as returned by `getGuardianSet(index)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuardianSet {
    /// Guardian Ethereum addresses, in signing order.
    pub keys: Vec<Address>,
    /// Expiration time (0 = never expires).
    pub expiration_time: u32,
}

impl GuardianSet {
    /// Minimum number of signatures the core contract accepts for this set.
    pub fn quorum(&self) -> usize {
        self.keys.len() * 2 / 3 + 1
    }
}

/// Abstraction over a deployed core contract.
///
/// Implemented for [`crate::DevnetCoreBridge`] (in-process testing); an EVM
/// harness implements it over contract calls.
pub trait CoreBridge {
    type Error: std::error::Error + Send + Sync + 'static;

    /// The contract's account address.
    fn address(&self) -> Address;

    fn chain_id(&self) -> Result<u16, Self::Error>;

    fn governance_chain_id(&self) -> Result<u16, Self::Error>;

    fn governance_contract(&self) -> Result<[u8; 32], Self::Error>;

    fn current_guardian_set_index(&self) -> Result<u32, Self::Error>;

    /// Fetch the guardian set stored at `index`.
    fn guardian_set(&self, index: u32) -> Result<GuardianSet, Self::Error>;

    /// Submit a signed `SetMessageFee` governance VAA.
    fn submit_set_message_fee(&mut self, signed_vaa: &[u8]) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum() {
        let set = |n: usize| GuardianSet {
            keys: vec![[0u8; 20]; n],
            expiration_time: 0,
        };
        assert_eq!(set(1).quorum(), 1);
        assert_eq!(set(3).quorum(), 3);
        assert_eq!(set(19).quorum(), 13);
    }
}
