//! Cryptographic primitives: audit-event signing and envelope encryption.
//!
//! Two narrow, independent concerns live here. [`AuditSigner`] signs and
//! verifies audit events with Ed25519 so a tampered or forged event can be
//! detected without trusting the storage layer. [`Encryptor`] derives a
//! per-row AES-256-GCM key from a process-wide master secret via PBKDF2 and
//! encrypts memory content whose [`Sensitivity`](crate::domain_types::Sensitivity)
//! requires it, with a fresh nonce on every write.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

/// Number of PBKDF2 rounds applied when deriving a per-row encryption key.
/// OWASP's 2023 guidance floors PBKDF2-HMAC-SHA256 at 600,000 iterations for
/// password hashing; this is key derivation from an already-high-entropy
/// master secret rather than a human password, so we use a lower but still
/// conservative round count well above the 200,000 minimum.
pub const PBKDF2_ROUNDS: u32 = 210_000;

const AES_KEY_LEN: usize = 32;
const AES_NONCE_LEN: usize = 12;

/// Errors from signing, verification, or envelope encryption.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// A signature did not verify against the expected key.
    #[error("signature verification failed")]
    InvalidSignature,

    /// A signing key seed or verifying key was the wrong length or malformed.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// AES-GCM encryption or decryption failed (includes AEAD tag mismatch).
    #[error("encryption operation failed")]
    CryptoFailure,
}

/// Signs and verifies audit events with Ed25519.
///
/// The signing key is process-wide, loaded once at startup from
/// [`crate::config::RuntimeConfig`] and held for the process lifetime; it is
/// never persisted alongside the events it signs.
pub struct AuditSigner {
    signing_key: SigningKey,
}

impl AuditSigner {
    /// Builds a signer from a 32-byte seed, typically decoded from the
    /// configured `HYPHAE_AUDIT_SIGNING_KEY` secret.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::InvalidKey`] if `seed` is not exactly 32
    /// bytes.
    pub fn from_seed(seed: &[u8]) -> Result<Self, SecurityError> {
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| SecurityError::InvalidKey("signing seed must be 32 bytes".to_string()))?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Generates a fresh signing key. Used by tests and by `hyphae-cli` when
    /// bootstrapping a new deployment's secret.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// The verifying key counterpart, safe to distribute to auditors who need
    /// to check signatures without holding the signing key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// The raw 32-byte seed, for `hyphae-cli` to persist to the path
    /// `HYPHAE_AUDIT_SIGNING_KEY_PATH` will point at. Never logged.
    #[must_use]
    pub fn seed_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Signs an arbitrary byte string, typically a canonicalized encoding of
    /// an audit event's `(tenant_id, operation, payload, created_at)` tuple.
    #[must_use]
    pub fn sign(&self, bytes: &[u8]) -> Vec<u8> {
        self.signing_key.sign(bytes).to_bytes().to_vec()
    }

    /// Verifies a signature produced by [`Self::sign`] (or by another signer
    /// sharing the same key) against `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::InvalidKey`] if `signature` is not a
    /// well-formed 64-byte Ed25519 signature, or
    /// [`SecurityError::InvalidSignature`] if it does not verify.
    pub fn verify(&self, bytes: &[u8], signature: &[u8]) -> Result<(), SecurityError> {
        verify_with_key(&self.verifying_key(), bytes, signature)
    }
}

/// Verifies a signature against an explicit verifying key, for callers (e.g.
/// an external auditor) that hold only the public half.
///
/// # Errors
///
/// Returns [`SecurityError::InvalidKey`] if `signature` is malformed, or
/// [`SecurityError::InvalidSignature`] if it does not verify.
pub fn verify_with_key(
    verifying_key: &VerifyingKey,
    bytes: &[u8],
    signature: &[u8],
) -> Result<(), SecurityError> {
    let signature = Signature::from_slice(signature)
        .map_err(|e| SecurityError::InvalidKey(e.to_string()))?;
    verifying_key
        .verify(bytes, &signature)
        .map_err(|_| SecurityError::InvalidSignature)
}

/// Derives per-row AES-256-GCM keys from a master secret and encrypts or
/// decrypts content at rest.
///
/// Callers supply a per-row `salt` (in practice, the row's own id bytes, so
/// every row gets an independent derived key without a separate salt
/// column) and a fresh random nonce is drawn on every encryption.
pub struct Encryptor {
    master_secret: Vec<u8>,
}

impl Encryptor {
    /// Builds an encryptor over a master secret, typically decoded from the
    /// configured `HYPHAE_ENCRYPTION_MASTER_KEY` secret.
    #[must_use]
    pub fn new(master_secret: Vec<u8>) -> Self {
        Self { master_secret }
    }

    fn derive_key(&self, salt: &[u8]) -> Key<Aes256Gcm> {
        let mut key_bytes = [0u8; AES_KEY_LEN];
        pbkdf2_hmac::<Sha256>(&self.master_secret, salt, PBKDF2_ROUNDS, &mut key_bytes);
        *Key::<Aes256Gcm>::from_slice(&key_bytes)
    }

    /// Encrypts `plaintext`, authenticating `aad` alongside it, under a key
    /// derived from `salt`. Returns `(nonce, ciphertext)`; both must be
    /// stored to decrypt later.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::CryptoFailure`] if the underlying AEAD
    /// operation fails.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        salt: &[u8],
        aad: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), SecurityError> {
        let key = self.derive_key(salt);
        let cipher = Aes256Gcm::new(&key);

        let mut nonce_bytes = [0u8; AES_NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| SecurityError::CryptoFailure)?;

        Ok((nonce_bytes.to_vec(), ciphertext))
    }

    /// Decrypts `ciphertext` produced by [`Self::encrypt`] with the same
    /// `salt`, `nonce`, and `aad`.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::InvalidKey`] if `nonce` is not
    /// [`AES_NONCE_LEN`](crate::security) bytes, or
    /// [`SecurityError::CryptoFailure`] if the AEAD tag does not verify
    /// (wrong key, tampered ciphertext, or mismatched `aad`).
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
        salt: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, SecurityError> {
        if nonce.len() != AES_NONCE_LEN {
            return Err(SecurityError::InvalidKey(
                "nonce must be 12 bytes".to_string(),
            ));
        }
        let key = self.derive_key(salt);
        let cipher = Aes256Gcm::new(&key);
        let nonce = Nonce::from_slice(nonce);

        cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| SecurityError::CryptoFailure)
    }
}

impl From<SecurityError> for crate::error::CoreError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::InvalidSignature | SecurityError::InvalidKey(_) => {
                crate::error::CoreError::InvalidArgument(err.to_string())
            }
            SecurityError::CryptoFailure => crate::error::CoreError::Internal(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trips() {
        let signer = AuditSigner::generate();
        let message = b"tenant-a|memory.search|payload|1234";
        let signature = signer.sign(message);
        assert!(signer.verify(message, &signature).is_ok());
    }

    #[test]
    fn tampered_message_fails_verification() {
        let signer = AuditSigner::generate();
        let signature = signer.sign(b"original");
        assert!(signer.verify(b"tampered", &signature).is_err());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let signer_a = AuditSigner::generate();
        let signer_b = AuditSigner::generate();
        let signature = signer_a.sign(b"message");
        let verified = verify_with_key(&signer_b.verifying_key(), b"message", &signature);
        assert!(verified.is_err());
    }

    #[test]
    fn malformed_signature_is_rejected_not_panicking() {
        let signer = AuditSigner::generate();
        assert!(signer.verify(b"message", &[1, 2, 3]).is_err());
    }

    #[test]
    fn encryption_round_trips_with_matching_salt_and_aad() {
        let encryptor = Encryptor::new(b"a sufficiently long master secret".to_vec());
        let salt = b"memory-row-id-0001";
        let aad = b"tenant-a";
        let (nonce, ciphertext) = encryptor.encrypt(b"sensitive content", salt, aad).unwrap();
        let plaintext = encryptor.decrypt(&ciphertext, &nonce, salt, aad).unwrap();
        assert_eq!(plaintext, b"sensitive content");
    }

    #[test]
    fn decryption_fails_with_wrong_salt() {
        let encryptor = Encryptor::new(b"a sufficiently long master secret".to_vec());
        let aad = b"tenant-a";
        let (nonce, ciphertext) = encryptor
            .encrypt(b"sensitive content", b"row-1", aad)
            .unwrap();
        assert!(encryptor
            .decrypt(&ciphertext, &nonce, b"row-2", aad)
            .is_err());
    }

    #[test]
    fn decryption_fails_with_wrong_aad() {
        let encryptor = Encryptor::new(b"a sufficiently long master secret".to_vec());
        let salt = b"row-1";
        let (nonce, ciphertext) = encryptor
            .encrypt(b"sensitive content", salt, b"tenant-a")
            .unwrap();
        assert!(encryptor
            .decrypt(&ciphertext, &nonce, salt, b"tenant-b")
            .is_err());
    }

    #[test]
    fn each_encryption_uses_a_fresh_nonce() {
        let encryptor = Encryptor::new(b"a sufficiently long master secret".to_vec());
        let (nonce_a, _) = encryptor.encrypt(b"content", b"row-1", b"aad").unwrap();
        let (nonce_b, _) = encryptor.encrypt(b"content", b"row-1", b"aad").unwrap();
        assert_ne!(nonce_a, nonce_b);
    }
}
