//! Commitment chain, server side (§4.7).
//!
//! The client derives `nullifier = SHA-256(identity_secret)` and
//! `commitment = SHA-256(nullifier)` and sends only the commitment; the
//! server never sees `identity_secret` or `nullifier`. All this side does
//! is enforce that a commitment is used at most once.

use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::storage::Storage;

/// Admits `commitment` if it hasn't been seen before, atomically marking
/// it used. Returns `DuplicateCommitment` on replay (I2: membership is
/// append-only).
pub async fn admit(storage: &Storage, commitment: &str) -> Result<(), AppError> {
    if commitment.is_empty() {
        return Err(AppError::BadRequest("commitment must not be empty".into()));
    }
    let was_duplicate = storage
        .check_and_insert_commitment(commitment)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    if was_duplicate {
        return Err(AppError::DuplicateCommitment);
    }
    Ok(())
}

/// Computes the commitment the `/auth/identity` diagnostic returns, from a
/// freshly generated `identity_secret`. Exposed purely as a convenience for
/// callers that don't want to derive it client-side (spec §6).
///
/// `identity_secret_hex` is hex-decoded to its raw bytes before hashing —
/// the chain hashes the 32-byte secret itself, not the ASCII of its hex
/// encoding. Malformed hex decodes to an empty byte string rather than
/// panicking; callers only ever pass values produced by `hex::encode`.
pub fn derive(identity_secret_hex: &str) -> (String, String) {
    let secret_bytes = hex::decode(identity_secret_hex).unwrap_or_default();

    let mut nullifier_hasher = Sha256::new();
    nullifier_hasher.update(&secret_bytes);
    let nullifier = hex::encode(nullifier_hasher.finalize());

    let mut commitment_hasher = Sha256::new();
    commitment_hasher.update(nullifier.as_bytes());
    let commitment = hex::encode(commitment_hasher.finalize());

    (nullifier, commitment)
}
