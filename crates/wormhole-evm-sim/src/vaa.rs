//! VAA construction, signing, and wire encoding.

use thiserror::Error;

use crate::{double_keccak256, keccak256, GuardianSignature, TestGuardian};

/// Version byte of a single-observation VAA.
pub const VAA_VERSION: u8 = 1;

/// Version byte of a batch VAA. Also the type tag mixed into the batch digest.
pub const BATCH_VAA_VERSION: u8 = 2;

/// Length of the observation body before the payload:
/// timestamp (4) + nonce (4) + chain (2) + emitter (32) + sequence (8) + consistency (1).
pub const BODY_HEADER_LEN: usize = 51;

/// Errors produced while parsing or assembling VAAs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaaError {
    #[error("unsupported VAA version: {0}")]
    UnsupportedVersion(u8),
    #[error("VAA truncated: needed {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },
    #[error("batch VAA has trailing bytes: consumed {consumed} of {actual}")]
    TrailingBytes { consumed: usize, actual: usize },
    #[error("batch VAA observation counts disagree: {hashes} hashes, {observations} observations")]
    ObservationCountMismatch { hashes: u8, observations: u8 },
    #[error("batch VAA supports at most 255 observations, got {0}")]
    TooManyObservations(usize),
}

/// A VAA: the observation body plus its signing envelope.
///
/// A VAA decoded from a log only carries the log's fields; the rest must be
/// stamped before [`Vaa::sign`] computes `hash`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Vaa {
    /// The VAA version (1 for a single observation).
    pub version: u8,
    /// The observation timestamp.
    pub timestamp: u32,
    /// The nonce.
    pub nonce: u32,
    /// The emitter chain ID.
    pub emitter_chain: u16,
    /// The emitter address (32 bytes).
    pub emitter_address: [u8; 32],
    /// The sequence number.
    pub sequence: u64,
    /// The consistency level.
    pub consistency_level: u8,
    /// The payload bytes.
    pub payload: Vec<u8>,
    /// The guardian set index that signs this VAA.
    pub guardian_set_index: u32,
    /// Guardian signatures; filled by [`Vaa::sign`].
    pub signatures: Vec<GuardianSignature>,
    /// Double keccak256 of [`Vaa::body`]; filled by [`Vaa::sign`].
    pub hash: [u8; 32],
}

impl Vaa {
    /// Create a new VAA with required fields and sensible defaults.
    pub fn new(
        emitter_chain: u16,
        emitter_address: [u8; 32],
        sequence: u64,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            version: VAA_VERSION,
            timestamp: 1234567890,
            emitter_chain,
            emitter_address,
            sequence,
            consistency_level: 1,
            payload,
            ..Self::default()
        }
    }

    /// Build the observation bytes (without version, guardian set index, or signatures).
    pub fn body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(BODY_HEADER_LEN + self.payload.len());

        // Timestamp (4 bytes, big-endian)
        body.extend_from_slice(&self.timestamp.to_be_bytes());

        // Nonce (4 bytes, big-endian)
        body.extend_from_slice(&self.nonce.to_be_bytes());

        // Emitter chain (2 bytes, big-endian)
        body.extend_from_slice(&self.emitter_chain.to_be_bytes());

        // Emitter address (32 bytes)
        body.extend_from_slice(&self.emitter_address);

        // Sequence (8 bytes, big-endian)
        body.extend_from_slice(&self.sequence.to_be_bytes());

        // Consistency level (1 byte)
        body.push(self.consistency_level);

        // Payload, unprefixed
        body.extend_from_slice(&self.payload);

        body
    }

    /// Compute the VAA digest (double keccak256 of body).
    pub fn digest(&self) -> [u8; 32] {
        double_keccak256(self.body())
    }

    /// Hash the finished body, sign it with `guardian`, and return the
    /// encoded VAA. Replaces any previous signatures.
    pub fn sign(&mut self, guardian: &TestGuardian) -> Vec<u8> {
        self.hash = self.digest();
        self.signatures = vec![guardian.sign_digest(&self.hash)];
        self.encode()
    }

    /// Encode the signed VAA.
    pub fn encode(&self) -> Vec<u8> {
        let body = self.body();
        let mut vaa =
            Vec::with_capacity(6 + self.signatures.len() * GuardianSignature::LEN + body.len());

        // Version (1 byte)
        vaa.push(self.version);

        // Guardian set index (4 bytes, big-endian)
        vaa.extend_from_slice(&self.guardian_set_index.to_be_bytes());

        // Number of signatures (1 byte)
        vaa.push(self.signatures.len() as u8);

        // Signatures (66 bytes each)
        for sig in &self.signatures {
            vaa.extend_from_slice(&sig.to_bytes());
        }

        // Body
        vaa.extend_from_slice(&body);

        vaa
    }

    /// Parse an observation body back into its fields.
    pub fn from_body(body: &[u8]) -> Result<Self, VaaError> {
        let mut reader = Reader::new(body);
        let timestamp = u32::from_be_bytes(reader.array()?);
        let nonce = u32::from_be_bytes(reader.array()?);
        let emitter_chain = u16::from_be_bytes(reader.array()?);
        let emitter_address = reader.array()?;
        let sequence = u64::from_be_bytes(reader.array()?);
        let [consistency_level] = reader.array::<1>()?;
        let payload = reader.rest().to_vec();

        Ok(Self {
            version: VAA_VERSION,
            timestamp,
            nonce,
            emitter_chain,
            emitter_address,
            sequence,
            consistency_level,
            payload,
            hash: double_keccak256(body),
            ..Self::default()
        })
    }
}

/// A parsed single-observation VAA.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedVaa {
    pub guardian_set_index: u32,
    pub signatures: Vec<GuardianSignature>,
    pub body: Vec<u8>,
}

impl SignedVaa {
    /// Parse a signed version-1 VAA into (guardian_set_index, signatures, body).
    pub fn parse(raw: &[u8]) -> Result<Self, VaaError> {
        let mut reader = Reader::new(raw);
        let [version] = reader.array::<1>()?;
        if version != VAA_VERSION {
            return Err(VaaError::UnsupportedVersion(version));
        }
        let guardian_set_index = u32::from_be_bytes(reader.array()?);
        let signatures = reader.signatures()?;
        let body = reader.rest().to_vec();

        Ok(Self {
            guardian_set_index,
            signatures,
            body,
        })
    }

    /// Decode the body into a [`Vaa`] carrying this header and signatures.
    pub fn to_vaa(&self) -> Result<Vaa, VaaError> {
        let mut vaa = Vaa::from_body(&self.body)?;
        vaa.guardian_set_index = self.guardian_set_index;
        vaa.signatures = self.signatures.clone();
        Ok(vaa)
    }
}

/// A batch VAA: several observations sharing one signature over the
/// hash of their digests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchVaa {
    /// The guardian set index that signs this batch.
    pub guardian_set_index: u32,
    /// Guardian signatures over [`BatchVaa::digest`].
    pub signatures: Vec<GuardianSignature>,
    /// Double keccak256 of each observation, in batch order.
    pub hashes: Vec<[u8; 32]>,
    /// Observation bytes, in batch order.
    pub observations: Vec<Vec<u8>>,
}

impl BatchVaa {
    /// Assemble an unsigned batch from observations in the given order.
    pub fn from_observations(
        guardian_set_index: u32,
        observations: &[Vaa],
    ) -> Result<Self, VaaError> {
        if observations.len() > u8::MAX as usize {
            return Err(VaaError::TooManyObservations(observations.len()));
        }
        let observations: Vec<Vec<u8>> = observations.iter().map(Vaa::body).collect();
        let hashes = observations.iter().map(|o| double_keccak256(o)).collect();

        Ok(Self {
            guardian_set_index,
            signatures: Vec::new(),
            hashes,
            observations,
        })
    }

    /// The digest guardians sign:
    /// `double_keccak256(version . keccak256(hash_0 . hash_1 . ...))`.
    pub fn digest(&self) -> [u8; 32] {
        let hash_of_hashes = keccak256(self.hashes.concat());
        let mut preimage = [0u8; 33];
        preimage[0] = BATCH_VAA_VERSION;
        preimage[1..].copy_from_slice(&hash_of_hashes);
        double_keccak256(preimage)
    }

    /// Sign the batch digest with `guardian` and return the encoded batch.
    pub fn sign(&mut self, guardian: &TestGuardian) -> Vec<u8> {
        self.signatures = vec![guardian.sign_digest(&self.digest())];
        self.encode()
    }

    /// Encode the signed batch.
    pub fn encode(&self) -> Vec<u8> {
        let count = self.hashes.len() as u8;
        let mut out = Vec::new();

        out.push(BATCH_VAA_VERSION);
        out.extend_from_slice(&self.guardian_set_index.to_be_bytes());
        out.push(self.signatures.len() as u8);
        for sig in &self.signatures {
            out.extend_from_slice(&sig.to_bytes());
        }

        out.push(count);
        for hash in &self.hashes {
            out.extend_from_slice(hash);
        }

        // The observation count is repeated ahead of the framed observations.
        out.push(count);
        for (index, observation) in self.observations.iter().enumerate() {
            out.push(index as u8);
            out.extend_from_slice(&(observation.len() as u32).to_be_bytes());
            out.extend_from_slice(observation);
        }

        out
    }

    /// Parse a signed version-2 VAA. All bytes must be consumed.
    pub fn parse(raw: &[u8]) -> Result<Self, VaaError> {
        let mut reader = Reader::new(raw);
        let [version] = reader.array::<1>()?;
        if version != BATCH_VAA_VERSION {
            return Err(VaaError::UnsupportedVersion(version));
        }
        let guardian_set_index = u32::from_be_bytes(reader.array()?);
        let signatures = reader.signatures()?;

        let [hash_count] = reader.array::<1>()?;
        let hashes = (0..hash_count)
            .map(|_| reader.array())
            .collect::<Result<Vec<[u8; 32]>, _>>()?;

        let [observation_count] = reader.array::<1>()?;
        if observation_count != hash_count {
            return Err(VaaError::ObservationCountMismatch {
                hashes: hash_count,
                observations: observation_count,
            });
        }
        let mut observations = Vec::with_capacity(observation_count as usize);
        for _ in 0..observation_count {
            let [_index] = reader.array::<1>()?;
            let len = u32::from_be_bytes(reader.array()?) as usize;
            observations.push(reader.take(len)?.to_vec());
        }

        if reader.index != raw.len() {
            return Err(VaaError::TrailingBytes {
                consumed: reader.index,
                actual: raw.len(),
            });
        }

        Ok(Self {
            guardian_set_index,
            signatures,
            hashes,
            observations,
        })
    }
}

/// Bounds-checked reader over encoded VAA bytes.
struct Reader<'a> {
    data: &'a [u8],
    index: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, index: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], VaaError> {
        let end = self
            .index
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(VaaError::Truncated {
                needed: self.index.saturating_add(len),
                actual: self.data.len(),
            })?;
        let out = &self.data[self.index..end];
        self.index = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], VaaError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn signatures(&mut self) -> Result<Vec<GuardianSignature>, VaaError> {
        let [count] = self.array::<1>()?;
        let mut signatures = Vec::with_capacity(count as usize);
        for _ in 0..count {
            signatures.push(GuardianSignature::from_bytes(&self.array()?));
        }
        Ok(signatures)
    }

    fn rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.index..];
        self.index = self.data.len();
        out
    }
}

/// Helper to create an emitter address from a 20-byte address (right-aligned).
///
/// Useful for EVM-style addresses that are 20 bytes.
pub fn emitter_address_from_20(addr: [u8; 20]) -> [u8; 32] {
    let mut result = [0u8; 32];
    result[12..32].copy_from_slice(&addr);
    result
}
