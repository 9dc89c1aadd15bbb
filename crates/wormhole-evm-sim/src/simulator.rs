//! [`WormholeSimulator`]: a single test guardian attesting messages for a
//! core bridge whose guardian set it has taken over.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::storage::{Address, Word};
use crate::{
    decode_message_published, filter_message_published, keccak256, override_guardian_set,
    BatchVaa, CoreBridge, LogError, RawLog, SetMessageFee, StateEditor, TestGuardian, Vaa,
    VaaError, GOVERNANCE_CONSISTENCY_LEVEL, VAA_VERSION,
};

/// Address of the default test contract in Foundry, used as the harness
/// account whose sentinel slot is checked.
pub const DEFAULT_HARNESS_ADDRESS: Address = [
    0x7f, 0xa9, 0x38, 0x5b, 0xe1, 0x02, 0xac, 0x3e, 0xac, 0x29, 0x74, 0x83, 0xdd, 0x62, 0x33, 0xd6,
    0x2b, 0x3e, 0x14, 0x96,
];

/// Preimage of the default sentinel slot key.
pub const SENTINEL_SLOT_PREIMAGE: &str = "wormhole.simulator.sentinel";

/// Why a guardian set override was refused or did not stick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OverrideViolation {
    #[error("sentinel slot of the harness account is not empty")]
    SentinelSlotNotEmpty,
    #[error("guardian set has {0} keys after override, expected 1")]
    UnexpectedLength(usize),
    #[error("guardian set key is 0x{}, expected 0x{}", hex::encode(.actual), hex::encode(.expected))]
    UnexpectedGuardian { expected: Address, actual: Address },
}

/// Errors that can occur while simulating guardian attestations.
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error(transparent)]
    Log(#[from] LogError),
    #[error(transparent)]
    Vaa(#[from] VaaError),
    #[error("guardian set override invariant violated: {0}")]
    GuardianOverrideInvariantViolation(#[from] OverrideViolation),
    #[error("submission rejected: {0}")]
    SubmissionRejected(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("expected {expected} published messages, found {found}")]
    MessageCountMismatch { expected: usize, found: usize },
    #[error("invalid guardian key: {0:?}")]
    InvalidGuardianKey(libsecp256k1::Error),
    #[error("state access failed: {0}")]
    StateAccess(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SimulatorError {
    pub(crate) fn state_access<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SimulatorError::StateAccess(Box::new(e))
    }
}

/// Configuration for a [`WormholeSimulator`].
#[derive(Clone, Debug)]
pub struct SimulatorConfig {
    /// Account whose sentinel slot must be empty before the override.
    pub harness_address: Address,
    /// The sentinel slot key.
    pub sentinel_slot: Word,
    /// Fixed observation timestamp, or `None` to use the wall clock.
    pub timestamp: Option<u32>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            harness_address: DEFAULT_HARNESS_ADDRESS,
            sentinel_slot: keccak256(SENTINEL_SLOT_PREIMAGE),
            timestamp: None,
        }
    }
}

/// Signs VAAs for messages published on a core bridge, as its only guardian.
///
/// # Example
///
/// ```rust
/// use wormhole_evm_sim::{
///     DevnetConfig, DevnetCoreBridge, SimulatorConfig, WormholeSimulator,
///     DEFAULT_GUARDIAN_SECRET_KEY,
/// };
///
/// let bridge = DevnetCoreBridge::new(DevnetConfig::default());
/// let mut simulator = WormholeSimulator::initialize(
///     bridge,
///     DEFAULT_GUARDIAN_SECRET_KEY,
///     SimulatorConfig::default(),
/// )
/// .unwrap();
///
/// let log = simulator.bridge_mut().publish_message(&[0xAB; 20], 42, b"hello", 1);
/// let signed_vaa = simulator.sign_single(&log, 2).unwrap();
/// assert_eq!(signed_vaa[0], 1);
/// ```
pub struct WormholeSimulator<B> {
    bridge: B,
    guardian: TestGuardian,
    config: SimulatorConfig,
}

impl<B> WormholeSimulator<B>
where
    B: CoreBridge + StateEditor,
{
    /// Take over `bridge`'s current guardian set with the key
    /// `guardian_private_key`.
    ///
    /// This is the only place storage is written; every signing method
    /// requires the returned simulator.
    pub fn initialize(
        mut bridge: B,
        guardian_private_key: [u8; 32],
        config: SimulatorConfig,
    ) -> Result<Self, SimulatorError> {
        let guardian = TestGuardian::try_new(guardian_private_key, 0)
            .map_err(SimulatorError::InvalidGuardianKey)?;

        override_guardian_set(
            &mut bridge,
            &guardian.eth_address,
            &config.harness_address,
            &config.sentinel_slot,
        )?;

        Ok(Self {
            bridge,
            guardian,
            config,
        })
    }

    /// The guardian that signs every VAA.
    pub fn guardian(&self) -> &TestGuardian {
        &self.guardian
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }

    pub fn into_bridge(self) -> B {
        self.bridge
    }

    /// Keep the `LogMessagePublished` logs, in order, and check that exactly
    /// `expected` were found.
    pub fn fetch_messages_from_logs(
        &self,
        logs: &[RawLog],
        expected: usize,
    ) -> Result<Vec<RawLog>, SimulatorError> {
        let published = filter_message_published(logs);
        if published.len() != expected {
            return Err(SimulatorError::MessageCountMismatch {
                expected,
                found: published.len(),
            });
        }
        Ok(published)
    }

    /// Decode a published-message log and sign it as a version-1 VAA.
    pub fn sign_single(&self, log: &RawLog, emitter_chain: u16) -> Result<Vec<u8>, SimulatorError> {
        let mut vaa = decode_message_published(log)?;
        vaa.version = VAA_VERSION;
        vaa.timestamp = self.timestamp();
        vaa.emitter_chain = emitter_chain;
        vaa.guardian_set_index = self.guardian_set_index()?;

        let signed = vaa.sign(&self.guardian);
        tracing::debug!(
            digest = %hex::encode(vaa.hash),
            sequence = vaa.sequence,
            guardian_set_index = vaa.guardian_set_index,
            "signed VAA"
        );
        Ok(signed)
    }

    /// Decode every log, keep the messages with `nonce` in log order, and
    /// sign them as one batch VAA under a single emitter.
    ///
    /// No matching message is not an error: the result is an empty batch.
    pub fn sign_batch(
        &self,
        logs: &[RawLog],
        nonce: u32,
        emitter_chain: u16,
        emitter_address: [u8; 32],
    ) -> Result<Vec<u8>, SimulatorError> {
        let timestamp = self.timestamp();

        let mut observations = Vec::new();
        for log in logs {
            let mut vaa = decode_message_published(log)?;
            vaa.timestamp = timestamp;
            vaa.emitter_chain = emitter_chain;
            vaa.emitter_address = emitter_address;
            if vaa.nonce == nonce {
                observations.push(vaa);
            }
        }

        let mut batch = BatchVaa::from_observations(self.guardian_set_index()?, &observations)?;
        let signed = batch.sign(&self.guardian);
        tracing::debug!(
            digest = %hex::encode(batch.digest()),
            observations = batch.observations.len(),
            guardian_set_index = batch.guardian_set_index,
            "signed batch VAA"
        );
        Ok(signed)
    }

    /// Sign a `SetMessageFee` governance VAA for the bridge's own chain and
    /// submit it. `new_fee` is the 256-bit big-endian fee word. Returns the
    /// submitted VAA.
    pub fn set_fee(&mut self, new_fee: [u8; 32]) -> Result<Vec<u8>, SimulatorError> {
        let chain_id = self
            .bridge
            .chain_id()
            .map_err(SimulatorError::state_access)?;
        let governance_chain = self
            .bridge
            .governance_chain_id()
            .map_err(SimulatorError::state_access)?;
        let governance_contract = self
            .bridge
            .governance_contract()
            .map_err(SimulatorError::state_access)?;

        let mut vaa = Vaa::new(
            governance_chain,
            governance_contract,
            0,
            SetMessageFee::new(chain_id, new_fee).encode(),
        );
        vaa.timestamp = self.timestamp();
        vaa.consistency_level = GOVERNANCE_CONSISTENCY_LEVEL;
        vaa.guardian_set_index = self.guardian_set_index()?;
        let signed = vaa.sign(&self.guardian);

        self.bridge
            .submit_set_message_fee(&signed)
            .map_err(|e| SimulatorError::SubmissionRejected(Box::new(e)))?;
        tracing::info!(fee = %hex::encode(new_fee), chain_id, "submitted SetMessageFee");

        Ok(signed)
    }

    fn guardian_set_index(&self) -> Result<u32, SimulatorError> {
        self.bridge
            .current_guardian_set_index()
            .map_err(SimulatorError::state_access)
    }

    fn timestamp(&self) -> u32 {
        self.config.timestamp.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs() as u32)
                .unwrap_or_default()
        })
    }
}
