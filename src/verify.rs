//! Read-only verification endpoints (§4.11). Every call here recomputes
//! against the current proof records; none of them mutate state.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::{merkle, signatures};
use crate::error::AppError;
use crate::storage::Storage;
use crate::vault::Vault;

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub merkle_root: String,
    pub total_submissions: usize,
}

#[derive(Debug, Deserialize)]
pub struct HashCheckRequest {
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct HashCheckResponse {
    pub data_hash: String,
    pub found: bool,
    pub merkle_root: String,
}

#[derive(Debug, Serialize)]
pub struct InclusionProofResponse {
    pub leaf_hash: String,
    pub merkle_root: String,
    pub proof_path: Vec<merkle::ProofStep>,
}

#[derive(Debug, Deserialize)]
pub struct SignatureCheckRequest {
    pub msg_id: String,
}

#[derive(Debug, Serialize)]
pub struct SignatureCheckResponse {
    pub hash: String,
    pub valid: Option<bool>,
    pub note: Option<&'static str>,
}

async fn leaf_hashes(storage: &Storage) -> Vec<String> {
    storage
        .proofs_in_order()
        .await
        .into_iter()
        .map(|(_, record)| record.data_hash)
        .collect()
}

pub async fn root(storage: &Storage) -> RootResponse {
    let leaves = leaf_hashes(storage).await;
    RootResponse {
        merkle_root: merkle::root(&leaves),
        total_submissions: leaves.len(),
    }
}

pub async fn check_hash(storage: &Storage, req: HashCheckRequest) -> HashCheckResponse {
    let data_hash = hex::encode(Sha256::digest(req.data.as_bytes()));
    let leaves = leaf_hashes(storage).await;
    let found = leaves.iter().any(|h| h == &data_hash);
    HashCheckResponse {
        data_hash,
        found,
        merkle_root: merkle::root(&leaves),
    }
}

pub async fn inclusion_proof(storage: &Storage, id: &str) -> Result<InclusionProofResponse, AppError> {
    let ordered = storage.proofs_in_order().await;
    let leaf_index = ordered
        .iter()
        .position(|(key, _)| key == id)
        .ok_or_else(|| AppError::NotFound(format!("no proof record for id {id}")))?;

    let leaves: Vec<String> = ordered.into_iter().map(|(_, record)| record.data_hash).collect();
    let proof_path = merkle::prove(&leaves, leaf_index)
        .expect("leaf_index was just located in the same leaf list");

    Ok(InclusionProofResponse {
        leaf_hash: leaves[leaf_index].clone(),
        merkle_root: merkle::root(&leaves),
        proof_path,
    })
}

/// Signature verification recomputes SHA-256 over the chat record's
/// *current* `encrypted_message` rather than trusting the proof record's
/// `data_hash`, which is frozen at send time — once the scheduler clears
/// `encrypted_message` at expiry, verification must stop succeeding (I5).
/// Submissions carry no signature by design (§9) and so never reach the
/// recompute step.
pub async fn check_signature(
    storage: &Storage,
    vault: &Vault,
    req: SignatureCheckRequest,
) -> Result<SignatureCheckResponse, AppError> {
    let proof = storage
        .get_proof(&req.msg_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("no proof record for id {}", req.msg_id)))?;

    let Some(sig_hex) = proof.signature else {
        return Ok(SignatureCheckResponse {
            hash: proof.data_hash,
            valid: None,
            note: Some("no signature recorded for this submission"),
        });
    };

    let current_message = storage
        .get_chat(&req.msg_id)
        .await
        .and_then(|record| record.encrypted_message);

    let Some(message) = current_message else {
        return Ok(SignatureCheckResponse {
            hash: proof.data_hash,
            valid: None,
            note: Some("message has expired; signature can no longer be verified"),
        });
    };

    let hash_bytes = Sha256::digest(message.as_bytes());
    let sig_bytes = hex::decode(&sig_hex).map_err(|e| AppError::Internal(e.to_string()))?;
    let valid = signatures::verify(vault.signing_public_key(), &hash_bytes, &sig_bytes);

    Ok(SignatureCheckResponse {
        hash: hex::encode(hash_bytes),
        valid: Some(valid),
        note: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ChatRecord, ProofRecord};
    use chrono::Utc;
    use std::path::PathBuf;

    async fn harness() -> (Storage, Vault) {
        let mut path = std::env::temp_dir();
        path.push(format!("obelysk-core-verify-test-{}", uuid::Uuid::new_v4()));
        let dir: PathBuf = path;
        let data_dir = dir.join("data");
        let vault_dir = dir.join("vault");
        let storage = Storage::open(&data_dir, &vault_dir).await.unwrap();
        let vault = Vault::open(&vault_dir).await.unwrap();
        (storage, vault)
    }

    #[tokio::test]
    async fn empty_store_has_empty_root_and_zero_count() {
        let (storage, _vault) = harness().await;
        let resp = root(&storage).await;
        assert_eq!(resp.merkle_root, "");
        assert_eq!(resp.total_submissions, 0);
    }

    #[tokio::test]
    async fn hash_check_finds_a_known_leaf_and_misses_an_unknown_one() {
        let (storage, _vault) = harness().await;
        storage
            .append_proof(
                "1".into(),
                ProofRecord {
                    data_hash: hex::encode(Sha256::digest(b"hello")),
                    signature: None,
                    created_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let found = check_hash(
            &storage,
            HashCheckRequest { data: "hello".into() },
        )
        .await;
        assert!(found.found);

        let missing = check_hash(
            &storage,
            HashCheckRequest { data: "goodbye".into() },
        )
        .await;
        assert!(!missing.found);
    }

    #[tokio::test]
    async fn inclusion_proof_verifies_against_the_current_root() {
        let (storage, _vault) = harness().await;
        for i in 0..3 {
            storage
                .append_proof(
                    i.to_string(),
                    ProofRecord {
                        data_hash: hex::encode(Sha256::digest(format!("leaf-{i}").as_bytes())),
                        signature: None,
                        created_at: Utc::now(),
                    },
                )
                .await
                .unwrap();
        }
        let resp = inclusion_proof(&storage, "1").await.unwrap();
        let root_resp = root(&storage).await;
        assert!(merkle::verify(
            &resp.leaf_hash,
            &resp.proof_path,
            &root_resp.merkle_root
        ));
    }

    #[tokio::test]
    async fn signature_check_reports_no_signature_for_submissions() {
        let (storage, vault) = harness().await;
        storage
            .append_proof(
                "1".into(),
                ProofRecord {
                    data_hash: hex::encode(Sha256::digest(b"hello")),
                    signature: None,
                    created_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let resp = check_signature(
            &storage,
            &vault,
            SignatureCheckRequest { msg_id: "1".into() },
        )
        .await
        .unwrap();
        assert_eq!(resp.valid, None);
        assert!(resp.note.is_some());
    }

    #[tokio::test]
    async fn signature_check_recomputes_hash_from_the_current_chat_message() {
        let (storage, vault) = harness().await;
        let message = "QQ==";
        let hash_bytes = Sha256::digest(message.as_bytes());
        let signature = signatures::sign(vault.signing_key(), &hash_bytes);

        storage
            .append_proof(
                "msg-1".into(),
                ProofRecord {
                    data_hash: hex::encode(hash_bytes),
                    signature: Some(hex::encode(signature)),
                    created_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        storage
            .insert_chat(
                "msg-1".into(),
                ChatRecord {
                    encrypted_message: Some(message.into()),
                    encrypted_key: Some("key".into()),
                    receiver: "alice".into(),
                    created_at: Utc::now(),
                    expiry: Utc::now() + chrono::Duration::minutes(60),
                    expired: false,
                },
            )
            .await
            .unwrap();

        let resp = check_signature(
            &storage,
            &vault,
            SignatureCheckRequest { msg_id: "msg-1".into() },
        )
        .await
        .unwrap();
        assert_eq!(resp.valid, Some(true));
    }

    #[tokio::test]
    async fn signature_check_is_unverifiable_once_the_chat_message_has_expired() {
        let (storage, vault) = harness().await;
        let message = "QQ==";
        let hash_bytes = Sha256::digest(message.as_bytes());
        let signature = signatures::sign(vault.signing_key(), &hash_bytes);

        storage
            .append_proof(
                "msg-1".into(),
                ProofRecord {
                    data_hash: hex::encode(hash_bytes),
                    signature: Some(hex::encode(signature)),
                    created_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        // Simulates the scheduler's post-expiry state (storage.rs::sweep_expired_chat).
        storage
            .insert_chat(
                "msg-1".into(),
                ChatRecord {
                    encrypted_message: None,
                    encrypted_key: None,
                    receiver: "alice".into(),
                    created_at: Utc::now(),
                    expiry: Utc::now(),
                    expired: true,
                },
            )
            .await
            .unwrap();

        let resp = check_signature(
            &storage,
            &vault,
            SignatureCheckRequest { msg_id: "msg-1".into() },
        )
        .await
        .unwrap();
        assert_eq!(resp.valid, None);
        assert!(resp.note.unwrap().contains("expired"));
    }
}
