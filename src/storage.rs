//! Document-scoped, lock-serialized JSON persistence.
//!
//! Each of the four persistent documents (submissions, chat messages,
//! commitments, proofs) is held fully in memory behind its own
//! [`tokio::sync::Mutex`] and mirrored to disk on every mutation. The lock
//! covers the whole read-modify-write cycle, and every write goes through
//! write-new-then-rename so a crash mid-write can never leave a torn file
//! on disk (§4.1).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A single JSON document, guarded by a lock that covers load + mutate + persist.
struct Document<T> {
    path: PathBuf,
    state: Mutex<T>,
}

impl<T> Document<T>
where
    T: Default + Serialize + DeserializeOwned,
{
    async fn open(path: PathBuf) -> Result<Self, StorageError> {
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Atomically persists `value` by writing to a sibling temp file and
    /// renaming it over the target path.
    async fn persist(&self, value: &T) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let tmp_path = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    async fn mutate<R>(
        &self,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, StorageError> {
        let mut guard = self.state.lock().await;
        let result = f(&mut guard);
        self.persist(&guard).await?;
        Ok(result)
    }

    async fn load(&self) -> T
    where
        T: Clone,
    {
        self.state.lock().await.clone()
    }
}

pub type Timestamp = DateTime<Utc>;

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct SubmissionRecord {
    pub ciphertext: String,
    pub nonce: String,
    /// Kept for schema fidelity with the AES-EAX three-field layout; unused
    /// under AES-GCM, which appends its authentication tag to the
    /// ciphertext it returns rather than exposing it separately.
    pub tag: String,
    pub wrapped_dek: Option<String>,
    pub commitment: String,
    pub created_at: Timestamp,
    pub expiry: Timestamp,
}

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct ChatRecord {
    pub encrypted_message: Option<String>,
    pub encrypted_key: Option<String>,
    pub receiver: String,
    pub created_at: Timestamp,
    pub expiry: Timestamp,
    pub expired: bool,
}

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct ProofRecord {
    pub data_hash: String,
    pub signature: Option<String>,
    pub created_at: Timestamp,
}

#[derive(Default, Serialize, serde::Deserialize, Clone)]
struct SubmissionsDoc(HashMap<u64, SubmissionRecord>);

#[derive(Default, Serialize, serde::Deserialize, Clone)]
struct ChatDoc(HashMap<String, ChatRecord>);

#[derive(Default, Serialize, serde::Deserialize, Clone)]
struct CommitmentsDoc(HashSet<String>);

/// Proof records must preserve insertion order: the Merkle tree's leaves
/// are exactly the `data_hash` values of these records, in insertion order
/// (I3). A `HashMap` cannot express that, so proofs are kept as an ordered
/// list of (key, record) pairs alongside an index for lookup by key.
#[derive(Default, Serialize, serde::Deserialize, Clone)]
struct ProofsDoc {
    order: Vec<String>,
    records: HashMap<String, ProofRecord>,
}

/// user_id → PEM-encoded RSA public key. Lives in the vault directory
/// (`public_keys.json`) alongside the KEK and signing key, but is a
/// regular lock-guarded document like the other three.
#[derive(Default, Serialize, serde::Deserialize, Clone)]
struct KeyRegistryDoc(HashMap<String, String>);

/// Handle to all persistent documents. Lock acquisition order across
/// documents is fixed (commitments → submissions → proofs) to avoid
/// deadlock, per §5; no single request path needs more than two locks at
/// once, but callers that must hold several must acquire in this order.
pub struct Storage {
    submissions: Document<SubmissionsDoc>,
    chat: Document<ChatDoc>,
    commitments: Document<CommitmentsDoc>,
    proofs: Document<ProofsDoc>,
    keys: Document<KeyRegistryDoc>,
}

impl Storage {
    pub async fn open(
        data_dir: impl AsRef<Path>,
        vault_dir: impl AsRef<Path>,
    ) -> Result<Self, StorageError> {
        let dir = data_dir.as_ref();
        let vault_dir = vault_dir.as_ref();
        Ok(Self {
            submissions: Document::open(dir.join("submissions.json")).await?,
            chat: Document::open(dir.join("chat_messages.json")).await?,
            commitments: Document::open(dir.join("commitments.json")).await?,
            proofs: Document::open(dir.join("proofs.json")).await?,
            keys: Document::open(vault_dir.join("public_keys.json")).await?,
        })
    }

    /// Upserts a user's public key PEM into the registry.
    pub async fn register_public_key(
        &self,
        user_id: String,
        public_key_pem: String,
    ) -> Result<(), StorageError> {
        self.keys
            .mutate(|doc| {
                doc.0.insert(user_id, public_key_pem);
            })
            .await
    }

    pub async fn get_public_key(&self, user_id: &str) -> Option<String> {
        self.keys.state.lock().await.0.get(user_id).cloned()
    }

    pub async fn is_registered(&self, user_id: &str) -> bool {
        self.keys.state.lock().await.0.contains_key(user_id)
    }

    /// Checks the commitment set for membership; on miss, inserts it.
    /// Returns `true` if the commitment was already present (caller should
    /// reject as a duplicate).
    pub async fn check_and_insert_commitment(
        &self,
        commitment: &str,
    ) -> Result<bool, StorageError> {
        self.commitments
            .mutate(|set| {
                if set.0.contains(commitment) {
                    true
                } else {
                    set.0.insert(commitment.to_string());
                    false
                }
            })
            .await
    }

    /// Allocates the next sequential `msg_id` and inserts the record, under
    /// a single lock acquisition so allocation is race-free (§5, §9).
    pub async fn insert_submission(
        &self,
        build: impl FnOnce(u64) -> SubmissionRecord,
    ) -> Result<u64, StorageError> {
        self.submissions
            .mutate(|doc| {
                let next_id = doc.0.keys().max().copied().unwrap_or(0) + 1;
                doc.0.insert(next_id, build(next_id));
                next_id
            })
            .await
    }

    pub async fn get_submission(&self, msg_id: u64) -> Option<SubmissionRecord> {
        self.submissions.state.lock().await.0.get(&msg_id).cloned()
    }

    /// Clears `wrapped_dek` for every submission whose `expiry` has passed.
    /// Returns the number of records changed. Idempotent: already-cleared
    /// records are left untouched.
    pub async fn sweep_expired_submissions(&self, now: Timestamp) -> Result<usize, StorageError> {
        self.submissions
            .mutate(|doc| {
                let mut cleared = 0;
                for record in doc.0.values_mut() {
                    if now >= record.expiry && record.wrapped_dek.is_some() {
                        record.wrapped_dek = None;
                        cleared += 1;
                    }
                }
                cleared
            })
            .await
    }

    pub async fn insert_chat(
        &self,
        message_id: String,
        record: ChatRecord,
    ) -> Result<(), StorageError> {
        self.chat
            .mutate(|doc| {
                doc.0.insert(message_id, record);
            })
            .await
    }

    pub async fn get_chat(&self, message_id: &str) -> Option<ChatRecord> {
        self.chat.state.lock().await.0.get(message_id).cloned()
    }

    pub async fn chat_for_receiver(&self, receiver: &str) -> Vec<(String, ChatRecord)> {
        self.chat
            .state
            .lock()
            .await
            .0
            .iter()
            .filter(|(_, rec)| rec.receiver == receiver)
            .map(|(id, rec)| (id.clone(), rec.clone()))
            .collect()
    }

    /// Clears the E2E blobs and marks `expired` for every chat record whose
    /// deadline has passed. Returns the number of records changed.
    pub async fn sweep_expired_chat(&self, now: Timestamp) -> Result<usize, StorageError> {
        self.chat
            .mutate(|doc| {
                let mut cleared = 0;
                for record in doc.0.values_mut() {
                    if now >= record.expiry && !record.expired {
                        record.encrypted_message = None;
                        record.encrypted_key = None;
                        record.expired = true;
                        cleared += 1;
                    }
                }
                cleared
            })
            .await
    }

    /// Appends a proof record keyed by `key` (a submission `msg_id` or chat
    /// `message_id`), preserving insertion order for Merkle leaf indexing.
    pub async fn append_proof(
        &self,
        key: String,
        record: ProofRecord,
    ) -> Result<(), StorageError> {
        self.proofs
            .mutate(|doc| {
                doc.order.push(key.clone());
                doc.records.insert(key, record);
            })
            .await
    }

    /// Returns all proof records in insertion order — these are exactly
    /// the Merkle tree's leaves (I3).
    pub async fn proofs_in_order(&self) -> Vec<(String, ProofRecord)> {
        let doc = self.proofs.state.lock().await;
        doc.order
            .iter()
            .filter_map(|key| doc.records.get(key).map(|r| (key.clone(), r.clone())))
            .collect()
    }

    pub async fn get_proof(&self, key: &str) -> Option<ProofRecord> {
        self.proofs.state.lock().await.records.get(key).cloned()
    }

    pub async fn submission_count(&self) -> usize {
        self.submissions.load().await.0.len()
    }

    pub async fn chat_count(&self) -> usize {
        self.chat.load().await.0.len()
    }

    pub async fn commitment_count(&self) -> usize {
        self.commitments.load().await.0.len()
    }
}

pub fn log_sweep_failure(context: &str, err: &StorageError) {
    warn!(error = %err, context, "expiry sweep tick failed, will retry next interval");
}
