//! Rewriting a deployed core bridge's active guardian set in place.

use crate::storage::{
    address_to_word, guardian_key_slot, guardian_set_slot, u64_to_word, word_to_u64, Address,
    Word,
};
use crate::{CoreBridge, OverrideViolation, SimulatorError, StateEditor};

/// Guardian indices are one byte, so no real set has more keys than this.
const MAX_GUARDIANS: u64 = 256;

/// Replace the bridge's current guardian set with the single key `guardian`.
///
/// `sentinel` is a slot of the `harness` account that must still be zero;
/// a non-zero value means something else already wrote there and the slot
/// layout assumptions no longer hold.
///
/// After the writes, the set is read back through
/// [`CoreBridge::guardian_set`] and must contain exactly `guardian`.
pub fn override_guardian_set<B>(
    bridge: &mut B,
    guardian: &Address,
    harness: &Address,
    sentinel: &Word,
) -> Result<u32, SimulatorError>
where
    B: CoreBridge + StateEditor,
{
    let sentinel_value = bridge
        .load(harness, sentinel)
        .map_err(SimulatorError::state_access)?;
    if sentinel_value != [0u8; 32] {
        return Err(OverrideViolation::SentinelSlotNotEmpty.into());
    }

    let contract = bridge.address();
    let index = bridge
        .current_guardian_set_index()
        .map_err(SimulatorError::state_access)?;
    let set_slot = guardian_set_slot(index);

    let current_len = bridge
        .load(&contract, &set_slot)
        .map(|word| word_to_u64(&word).unwrap_or_default().min(MAX_GUARDIANS))
        .map_err(SimulatorError::state_access)?;

    // Clear stale keys so nothing past the new length can be read back.
    for position in 1..current_len {
        bridge
            .store(&contract, &guardian_key_slot(&set_slot, position), [0u8; 32])
            .map_err(SimulatorError::state_access)?;
    }
    bridge
        .store(
            &contract,
            &guardian_key_slot(&set_slot, 0),
            address_to_word(guardian),
        )
        .map_err(SimulatorError::state_access)?;
    bridge
        .store(&contract, &set_slot, u64_to_word(1))
        .map_err(SimulatorError::state_access)?;

    let guardian_set = bridge
        .guardian_set(index)
        .map_err(SimulatorError::state_access)?;
    match guardian_set.keys.as_slice() {
        [key] if key == guardian => {}
        [key] => {
            return Err(OverrideViolation::UnexpectedGuardian {
                expected: *guardian,
                actual: *key,
            }
            .into())
        }
        keys => return Err(OverrideViolation::UnexpectedLength(keys.len()).into()),
    }

    tracing::info!(
        guardian_set_index = index,
        replaced = current_len,
        guardian = %hex::encode(guardian),
        "overrode guardian set"
    );

    Ok(index)
}
