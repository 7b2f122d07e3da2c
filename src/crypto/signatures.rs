//! RSA-PSS proof-of-existence signatures over SHA-256 digests (§4.6).
//!
//! Verification is deliberately tolerant: a malformed signature or
//! mismatched key is just `false`, never an error. An attacker probing
//! signature verification must not be able to distinguish "bad signature"
//! from "internal failure" through error variants or timing.

use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

/// Signs `digest` (the raw SHA-256 bytes of the document) with RSA-PSS,
/// MGF1-SHA-256, salt length equal to the digest length (32 bytes).
/// Returns the signature's raw bytes.
pub fn sign(private_key: &RsaPrivateKey, digest: &[u8]) -> Vec<u8> {
    let signing_key = BlindedSigningKey::<Sha256>::new(private_key.clone());
    let mut rng = rand::thread_rng();
    let signature = signing_key.sign_with_rng(&mut rng, digest);
    signature.to_vec()
}

/// Verifies an RSA-PSS signature over `digest`. Never panics or returns an
/// error — any malformed input simply fails verification.
pub fn verify(public_key: &RsaPublicKey, digest: &[u8], signature_bytes: &[u8]) -> bool {
    let verifying_key = VerifyingKey::<Sha256>::new(public_key.clone());
    let signature = match Signature::try_from(signature_bytes) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    verifying_key.verify(digest, &signature).is_ok()
}
