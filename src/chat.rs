//! Chat send (§4.10) and inbox listing. Message bodies are opaque
//! client-encrypted blobs; the server never inspects their contents —
//! only hashes and signs them for proof-of-existence.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::Config;
use crate::crypto::signatures;
use crate::error::AppError;
use crate::storage::{ChatRecord, ProofRecord, Storage};
use crate::vault::Vault;

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub encrypted_message: String,
    pub encrypted_key: String,
    pub receiver: String,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub message_id: String,
    pub expiry: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct InboxEntry {
    pub message_id: String,
    pub encrypted_message: Option<String>,
    pub encrypted_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    pub expired: bool,
}

pub async fn send(
    storage: &Storage,
    vault: &Vault,
    config: &Config,
    req: SendRequest,
) -> Result<SendResponse, AppError> {
    if req.encrypted_message.is_empty()
        || req.encrypted_key.is_empty()
        || req.receiver.is_empty()
    {
        return Err(AppError::BadRequest(
            "encrypted_message, encrypted_key, and receiver are all required".into(),
        ));
    }
    if !storage.is_registered(&req.receiver).await {
        return Err(AppError::NotFound(format!(
            "receiver '{}' has no registered public key",
            req.receiver
        )));
    }

    let message_id = Uuid::new_v4().to_string();
    let data_hash_bytes = Sha256::digest(req.encrypted_message.as_bytes());
    let signature = signatures::sign(vault.signing_key(), &data_hash_bytes);

    let now = Utc::now();
    let expiry = now + Duration::minutes(config.key_expiry_minutes);

    storage
        .insert_chat(
            message_id.clone(),
            ChatRecord {
                encrypted_message: Some(req.encrypted_message),
                encrypted_key: Some(req.encrypted_key),
                receiver: req.receiver,
                created_at: now,
                expiry,
                expired: false,
            },
        )
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    storage
        .append_proof(
            message_id.clone(),
            ProofRecord {
                data_hash: hex::encode(data_hash_bytes),
                signature: Some(hex::encode(signature)),
                created_at: now,
            },
        )
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(SendResponse { message_id, expiry })
}

pub async fn inbox(storage: &Storage, user_id: &str) -> Vec<InboxEntry> {
    storage
        .chat_for_receiver(user_id)
        .await
        .into_iter()
        .map(|(message_id, record)| InboxEntry {
            message_id,
            encrypted_message: record.encrypted_message,
            encrypted_key: record.encrypted_key,
            created_at: record.created_at,
            expiry: record.expiry,
            expired: record.expired,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    async fn harness() -> (Storage, Vault, Config) {
        let mut path = std::env::temp_dir();
        path.push(format!("obelysk-core-chat-test-{}", uuid::Uuid::new_v4()));
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
    async fn send_to_unregistered_receiver_is_not_found() {
        let (storage, vault, config) = harness().await;
        let err = send(
            &storage,
            &vault,
            &config,
            SendRequest {
                encrypted_message: "QQ==".into(),
                encrypted_key: "Qg==".into(),
                receiver: "nobody".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn round_trip_send_then_appears_in_inbox_with_matching_signature() {
        let (storage, vault, config) = harness().await;
        storage
            .register_public_key("alice".into(), "pem".into())
            .await
            .unwrap();

        let resp = send(
            &storage,
            &vault,
            &config,
            SendRequest {
                encrypted_message: "QQ==".into(),
                encrypted_key: "Qg==".into(),
                receiver: "alice".into(),
            },
        )
        .await
        .unwrap();

        let entries = inbox(&storage, "alice").await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message_id, resp.message_id);
        assert!(!entries[0].expired);

        let proof = storage.get_proof(&resp.message_id).await.unwrap();
        let expected_hash = hex::encode(Sha256::digest(b"QQ=="));
        assert_eq!(proof.data_hash, expected_hash);
        let sig_bytes = hex::decode(proof.signature.unwrap()).unwrap();
        assert!(signatures::verify(
            vault.signing_public_key(),
            &Sha256::digest(b"QQ=="),
            &sig_bytes
        ));
    }
}
