//! Guardian attestation simulator for Wormhole EVM integration tests.
//!
//! Takes over a core bridge's active guardian set with a single test key,
//! then turns `LogMessagePublished` logs into signed VAAs that the bridge
//! itself accepts.
//!
//! # Flow
//!
//! 1. [`WormholeSimulator::initialize`] rewrites the guardian set in storage
//!    through a [`StateEditor`]
//! 2. [`WormholeSimulator::fetch_messages_from_logs`] picks the published
//!    messages out of a transaction's logs
//! 3. [`WormholeSimulator::sign_single`] or [`WormholeSimulator::sign_batch`]
//!    produces the VAA bytes
//!
//! [`DevnetCoreBridge`] is an in-memory core bridge with the real contract's
//! storage layout, for tests that don't run an EVM.

mod bridge;
mod devnet;
mod governance;
mod guardian;
mod guardian_set;
mod log;
mod simulator;
mod vaa;

pub mod storage;

pub use bridge::{CoreBridge, GuardianSet};
pub use devnet::{
    BridgeError, DevnetConfig, DevnetCoreBridge, DEFAULT_CORE_BRIDGE_ADDRESS,
    DEFAULT_GOVERNANCE_CONTRACT,
};
pub use governance::{
    GovernanceError, SetMessageFee, ACTION_SET_MESSAGE_FEE, CORE_MODULE,
    GOVERNANCE_CONSISTENCY_LEVEL, SET_MESSAGE_FEE_LEN,
};
pub use guardian::{
    double_keccak256, keccak256, recover_signer, GuardianSignature, TestGuardian,
    TestGuardianSet, DEFAULT_GUARDIAN_SECRET_KEY, ETH_RECOVERY_OFFSET,
};
pub use guardian_set::override_guardian_set;
pub use log::{
    decode_message_published, encode_message_published_log, filter_message_published,
    log_message_published_topic, LogError, RawLog, LOG_MESSAGE_PUBLISHED_SIGNATURE,
};
pub use simulator::{
    OverrideViolation, SimulatorConfig, SimulatorError, WormholeSimulator,
    DEFAULT_HARNESS_ADDRESS, SENTINEL_SLOT_PREIMAGE,
};
pub use storage::StateEditor;
pub use vaa::{
    emitter_address_from_20, BatchVaa, SignedVaa, Vaa, VaaError, BATCH_VAA_VERSION,
    BODY_HEADER_LEN, VAA_VERSION,
};
