//! Guardian key management and digest signing.

use libsecp256k1::{Message, PublicKey, RecoveryId, SecretKey, Signature};
use sha3::{Digest, Keccak256};

/// Well-known devnet guardian secret key (from Wormhole test fixtures).
pub const DEFAULT_GUARDIAN_SECRET_KEY: [u8; 32] = [
    0xcf, 0xb1, 0x23, 0x03, 0xa1, 0x9c, 0xde, 0x58, 0x0b, 0xb4, 0xdd, 0x77, 0x16, 0x39, 0xb0, 0xd2,
    0x6b, 0xc6, 0x83, 0x53, 0x64, 0x55, 0x71, 0xa8, 0xcf, 0xf5, 0x16, 0xab, 0x2e, 0xe1, 0x13, 0xa0,
];

/// Offset between the Ethereum `v` convention (27/28) and a raw recovery id.
pub const ETH_RECOVERY_OFFSET: u8 = 27;

/// keccak256 of `data`.
pub fn keccak256(data: impl AsRef<[u8]>) -> [u8; 32] {
    Keccak256::digest(data.as_ref()).into()
}

/// keccak256 applied twice. This is the digest guardians sign.
pub fn double_keccak256(data: impl AsRef<[u8]>) -> [u8; 32] {
    keccak256(keccak256(data))
}

/// A guardian signature as it appears on the wire.
///
/// Format: [guardian_index (1 byte), r (32 bytes), s (32 bytes), recovery_id (1 byte)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuardianSignature {
    /// Index of the signer within the guardian set.
    pub guardian_index: u8,
    /// ECDSA `r`, big-endian.
    pub r: [u8; 32],
    /// ECDSA `s`, big-endian.
    pub s: [u8; 32],
    /// Recovery id in the protocol's 0/1 convention.
    pub recovery_id: u8,
}

impl GuardianSignature {
    /// Encoded length in bytes.
    pub const LEN: usize = 66;

    /// Build from a 65-byte `[r, s, v]` signature where `v` is 27 or 28.
    pub fn from_rsv(guardian_index: u8, rsv: &[u8; 65]) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&rsv[..32]);
        s.copy_from_slice(&rsv[32..64]);
        Self {
            guardian_index,
            r,
            s,
            recovery_id: rsv[64].wrapping_sub(ETH_RECOVERY_OFFSET),
        }
    }

    /// Parse a 66-byte wire signature.
    pub fn from_bytes(bytes: &[u8; Self::LEN]) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[1..33]);
        s.copy_from_slice(&bytes[33..65]);
        Self {
            guardian_index: bytes[0],
            r,
            s,
            recovery_id: bytes[65],
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = self.guardian_index;
        out[1..33].copy_from_slice(&self.r);
        out[33..65].copy_from_slice(&self.s);
        out[65] = self.recovery_id;
        out
    }
}

/// Recover the Ethereum address that produced `signature` over `digest`.
pub fn recover_signer(
    digest: &[u8; 32],
    signature: &GuardianSignature,
) -> Result<[u8; 20], libsecp256k1::Error> {
    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(&signature.r);
    compact[32..].copy_from_slice(&signature.s);

    let parsed = Signature::parse_standard(&compact)?;
    let recovery_id = RecoveryId::parse(signature.recovery_id)?;
    let public_key = libsecp256k1::recover(&Message::parse(digest), &parsed, &recovery_id)?;

    Ok(eth_address(&public_key))
}

/// Last 20 bytes of keccak256(uncompressed pubkey without the 0x04 prefix).
fn eth_address(public_key: &PublicKey) -> [u8; 20] {
    let hash = keccak256(&public_key.serialize()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..32]);
    address
}

/// A test guardian with signing capabilities.
#[derive(Clone)]
pub struct TestGuardian {
    secret_key: SecretKey,
    /// The guardian's public key.
    pub public_key: PublicKey,
    /// The guardian's Ethereum address (last 20 bytes of keccak256(pubkey)).
    pub eth_address: [u8; 20],
    /// The guardian's index within the guardian set.
    pub index: u8,
}

impl std::fmt::Debug for TestGuardian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestGuardian")
            .field("eth_address", &hex::encode(self.eth_address))
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl TestGuardian {
    /// Create a new test guardian with the given secret key and index.
    ///
    /// Panics on an invalid secret key; use [`TestGuardian::try_new`] for
    /// keys that come from outside the test.
    pub fn new(secret_key: [u8; 32], index: u8) -> Self {
        Self::try_new(secret_key, index).expect("Invalid secret key")
    }

    /// Create a new test guardian, rejecting keys outside the curve order.
    pub fn try_new(secret_key: [u8; 32], index: u8) -> Result<Self, libsecp256k1::Error> {
        let secret_key = SecretKey::parse(&secret_key)?;
        let public_key = PublicKey::from_secret_key(&secret_key);
        let eth_address = eth_address(&public_key);

        Ok(Self {
            secret_key,
            public_key,
            eth_address,
            index,
        })
    }

    /// Sign a 32-byte digest and return the 65-byte signature [r, s, v]
    /// with `v` in the Ethereum 27/28 convention.
    pub fn sign(&self, digest: &[u8; 32]) -> [u8; 65] {
        let message = Message::parse(digest);
        let (signature, recovery_id) = libsecp256k1::sign(&message, &self.secret_key);

        let mut sig_bytes = [0u8; 65];
        sig_bytes[..64].copy_from_slice(&signature.serialize());
        sig_bytes[64] = recovery_id.serialize() + ETH_RECOVERY_OFFSET;
        sig_bytes
    }

    /// Sign a digest and encode it as this guardian's wire signature.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> GuardianSignature {
        GuardianSignature::from_rsv(self.index, &self.sign(digest))
    }
}

impl Default for TestGuardian {
    fn default() -> Self {
        Self::new(DEFAULT_GUARDIAN_SECRET_KEY, 0)
    }
}

/// A set of test guardians.
#[derive(Clone, Debug)]
pub struct TestGuardianSet {
    guardians: Vec<TestGuardian>,
}

impl TestGuardianSet {
    /// Generate N guardians deterministically from a seed.
    ///
    /// Uses keccak256(seed || index) as the secret key for each guardian.
    pub fn generate(count: usize, seed: u64) -> Self {
        let guardians = (0..count)
            .map(|i| {
                let mut input = [0u8; 40];
                input[..8].copy_from_slice(&seed.to_le_bytes());
                input[8..16].copy_from_slice(&(i as u64).to_le_bytes());
                TestGuardian::new(keccak256(input), i as u8)
            })
            .collect();
        Self { guardians }
    }

    /// Get the Ethereum addresses of all guardians.
    pub fn eth_addresses(&self) -> Vec<[u8; 20]> {
        self.guardians.iter().map(|g| g.eth_address).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_guardian_eth_address() {
        let guardian = TestGuardian::default();
        assert_eq!(
            hex::encode(guardian.eth_address),
            "befa429d57cd18b7f8a4d91a2da9ab4af05d0fbe"
        );
    }

    #[test]
    fn test_double_keccak_is_keccak_twice() {
        let data = b"observation bytes";
        let once = Keccak256::digest(data);
        let twice: [u8; 32] = Keccak256::digest(once).into();

        assert_eq!(double_keccak256(data), twice);
        assert_eq!(double_keccak256(data), double_keccak256(data));
        assert_ne!(double_keccak256(data), keccak256(data));
    }

    #[test]
    fn test_sign_uses_eth_v_convention() {
        let guardian = TestGuardian::default();
        let sig = guardian.sign(&[7u8; 32]);
        assert!(sig[64] == 27 || sig[64] == 28);

        let wire = guardian.sign_digest(&[7u8; 32]);
        assert!(wire.recovery_id <= 1);
        assert_eq!(wire.guardian_index, 0);
        assert_eq!(wire.recovery_id + 27, sig[64]);
    }

    #[test]
    fn test_recover_signer_matches_guardian() {
        let guardian = TestGuardian::default();
        let digest = double_keccak256(b"hello wormhole");
        let sig = guardian.sign_digest(&digest);

        assert_eq!(recover_signer(&digest, &sig).unwrap(), guardian.eth_address);

        // A different digest recovers someone else.
        let other = double_keccak256(b"goodbye wormhole");
        assert_ne!(recover_signer(&other, &sig).unwrap(), guardian.eth_address);
    }

    #[test]
    fn test_signature_wire_bytes() {
        let guardian = TestGuardian::default();
        let sig = guardian.sign_digest(&[1u8; 32]);
        let bytes = sig.to_bytes();

        assert_eq!(bytes[0], 0);
        assert_eq!(&bytes[1..33], &sig.r);
        assert_eq!(&bytes[33..65], &sig.s);
        assert_eq!(GuardianSignature::from_bytes(&bytes), sig);
    }

    #[test]
    fn test_try_new_rejects_zero_key() {
        assert!(TestGuardian::try_new([0u8; 32], 0).is_err());
    }

    #[test]
    fn test_guardian_set_generate() {
        let set = TestGuardianSet::generate(13, 12345);

        assert_eq!(set.guardians.len(), 13);
        assert_eq!(set.guardians[4].index, 4);

        let addrs = set.eth_addresses();
        for i in 0..addrs.len() {
            for j in (i + 1)..addrs.len() {
                assert_ne!(addrs[i], addrs[j]);
            }
        }
    }
}
