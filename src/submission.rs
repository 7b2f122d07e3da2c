//! Submission admission (§4.8) and read-back (§4.9).

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::commitment;
use crate::config::Config;
use crate::crypto::{aes, pow};
use crate::error::AppError;
use crate::storage::{ProofRecord, Storage, SubmissionRecord};
use crate::vault::Vault;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub data: String,
    pub commitment: String,
    pub nonce: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub status: &'static str,
    pub msg_id: u64,
    pub expiry: chrono::DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub msg_id: u64,
    pub data: String,
    pub expiry: chrono::DateTime<Utc>,
}

pub async fn submit(
    storage: &Storage,
    vault: &Vault,
    config: &Config,
    req: SubmitRequest,
) -> Result<SubmitResponse, AppError> {
    if req.data.is_empty() || req.commitment.is_empty() || req.nonce.is_empty() {
        return Err(AppError::BadRequest(
            "data, commitment, and nonce are all required".into(),
        ));
    }

    if !pow::check(&req.commitment, &req.nonce, config.pow_difficulty) {
        return Err(AppError::BadRequest("proof of work failed".into()));
    }

    commitment::admit(storage, &req.commitment).await?;

    let dek = aes::generate_dek();
    let envelope = aes::encrypt(&dek, req.data.as_bytes())
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let wrapped_dek = aes::wrap_dek(vault.kek(), &dek).map_err(|e| AppError::Internal(e.to_string()))?;

    let now = Utc::now();
    let expiry = now + Duration::minutes(config.key_expiry_minutes);
    let commitment_value = req.commitment.clone();

    let msg_id = storage
        .insert_submission(|_id| SubmissionRecord {
            ciphertext: envelope.ciphertext,
            nonce: envelope.nonce,
            tag: String::new(),
            wrapped_dek: Some(serde_json::to_string(&wrapped_dek).unwrap_or_default()),
            commitment: commitment_value,
            created_at: now,
            expiry,
        })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let data_hash = hex::encode(Sha256::digest(req.data.as_bytes()));
    storage
        .append_proof(
            msg_id.to_string(),
            ProofRecord {
                data_hash,
                signature: None,
                created_at: now,
            },
        )
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(SubmitResponse {
        status: "accepted",
        msg_id,
        expiry,
    })
}

pub async fn read(storage: &Storage, vault: &Vault, msg_id: u64) -> Result<ReadResponse, AppError> {
    let record = storage
        .get_submission(msg_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("no submission with msg_id {msg_id}")))?;

    let now = Utc::now();
    let wrapped_dek = match &record.wrapped_dek {
        Some(w) if now < record.expiry => w,
        _ => {
            return Err(AppError::Gone(format!(
                "submission {msg_id} expired at {}",
                record.expiry
            )))
        }
    };

    let envelope: aes::Envelope =
        serde_json::from_str(wrapped_dek).map_err(|e| AppError::Internal(e.to_string()))?;
    let dek = aes::unwrap_dek(vault.kek(), &envelope).map_err(|e| AppError::Internal(e.to_string()))?;

    let data_envelope = aes::Envelope {
        ciphertext: record.ciphertext,
        nonce: record.nonce,
    };
    let plaintext_bytes = aes::decrypt(&dek, &data_envelope).map_err(|e| AppError::Internal(e.to_string()))?;
    let data = String::from_utf8(plaintext_bytes).map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(ReadResponse {
        msg_id,
        data,
        expiry: record.expiry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    async fn harness() -> (Storage, Vault, Config) {
        let mut path = std::env::temp_dir();
        path.push(format!("obelysk-core-submission-test-{}", uuid::Uuid::new_v4()));
        let dir: PathBuf = path;
        let data_dir = dir.join("data");
        let vault_dir = dir.join("vault");
        let storage = Storage::open(&data_dir, &vault_dir).await.unwrap();
        let vault = Vault::open(&vault_dir).await.unwrap();
        let config = Config {
            host: "0.0.0.0".into(),
            port: 8080,
            admin_token: "token".into(),
            key_expiry_minutes: 60,
            pow_difficulty: 0,
            sweep_interval_secs: 60,
            vault_dir: vault_dir.to_string_lossy().into_owned(),
            data_dir: data_dir.to_string_lossy().into_owned(),
        };
        (storage, vault, config)
    }

    #[tokio::test]
    async fn happy_path_submission_is_readable_until_expiry() {
        let (storage, vault, config) = harness().await;
        let resp = submit(
            &storage,
            &vault,
            &config,
            SubmitRequest {
                data: "hello".into(),
                commitment: "c1".into(),
                nonce: "0".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(resp.msg_id, 1);

        let read_back = read(&storage, &vault, resp.msg_id).await.unwrap();
        assert_eq!(read_back.data, "hello");
    }

    #[tokio::test]
    async fn replaying_the_same_commitment_is_rejected() {
        let (storage, vault, config) = harness().await;
        submit(
            &storage,
            &vault,
            &config,
            SubmitRequest {
                data: "hello".into(),
                commitment: "c1".into(),
                nonce: "0".into(),
            },
        )
        .await
        .unwrap();

        let err = submit(
            &storage,
            &vault,
            &config,
            SubmitRequest {
                data: "again".into(),
                commitment: "c1".into(),
                nonce: "1".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::DuplicateCommitment));
    }

    #[tokio::test]
    async fn pow_failure_is_rejected_before_consuming_the_commitment() {
        let (storage, vault, mut config) = harness().await;
        config.pow_difficulty = 8;
        let err = submit(
            &storage,
            &vault,
            &config,
            SubmitRequest {
                data: "hello".into(),
                commitment: "c1".into(),
                nonce: "0".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(storage.commitment_count().await, 0);
    }

    #[tokio::test]
    async fn reading_an_unknown_msg_id_is_not_found() {
        let (storage, vault, _config) = harness().await;
        let err = read(&storage, &vault, 999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn reading_after_expiry_is_gone() {
        let (storage, vault, mut config) = harness().await;
        config.key_expiry_minutes = 0;
        let resp = submit(
            &storage,
            &vault,
            &config,
            SubmitRequest {
                data: "hello".into(),
                commitment: "c1".into(),
                nonce: "0".into(),
            },
        )
        .await
        .unwrap();

        let err = read(&storage, &vault, resp.msg_id).await.unwrap_err();
        assert!(matches!(err, AppError::Gone(_)));
    }
}
