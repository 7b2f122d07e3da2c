//! Background expiry sweeper (§4.12). A single long-running task wakes on
//! a fixed interval and clears wrapped DEKs / chat blobs past their
//! deadline; an admin trigger runs the same sweep synchronously for a
//! "force expire now" diagnostic.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use crate::storage::{self, Storage};

/// Runs one sweep pass over both documents, in the lock order the spec
/// fixes for the scheduler: submissions, then chat messages.
pub async fn sweep_once(storage: &Storage) -> (usize, usize) {
    let now = Utc::now();
    let submissions_cleared = match storage.sweep_expired_submissions(now).await {
        Ok(count) => count,
        Err(err) => {
            storage::log_sweep_failure("submissions", &err);
            0
        }
    };
    let chat_cleared = match storage.sweep_expired_chat(now).await {
        Ok(count) => count,
        Err(err) => {
            storage::log_sweep_failure("chat_messages", &err);
            0
        }
    };
    if submissions_cleared > 0 || chat_cleared > 0 {
        debug!(submissions_cleared, chat_cleared, "expiry sweep cleared records");
    }
    (submissions_cleared, chat_cleared)
}

/// Spawns the sweeper as a single background task. Must be called exactly
/// once at startup (§4.12, §9); survives I/O failures on individual ticks
/// by logging and continuing on the next interval.
pub fn spawn(storage: Arc<Storage>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        info!(interval_secs, "expiry sweeper started");
        loop {
            interval.tick().await;
            sweep_once(&storage).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ChatRecord, SubmissionRecord};
    use chrono::Duration as ChronoDuration;
    use std::path::PathBuf;

    async fn storage() -> Storage {
        let mut path = std::env::temp_dir();
        path.push(format!("obelysk-core-scheduler-test-{}", uuid::Uuid::new_v4()));
        let dir: PathBuf = path;
        Storage::open(&dir, &dir).await.unwrap()
    }

    #[tokio::test]
    async fn sweep_clears_expired_submissions_and_chat_and_is_idempotent() {
        let storage = storage().await;
        let now = Utc::now();

        storage
            .insert_submission(|_| SubmissionRecord {
                ciphertext: "ct".into(),
                nonce: "n".into(),
                tag: String::new(),
                wrapped_dek: Some("wrapped".into()),
                commitment: "c1".into(),
                created_at: now - ChronoDuration::minutes(120),
                expiry: now - ChronoDuration::minutes(60),
            })
            .await
            .unwrap();

        storage
            .insert_chat(
                "msg-1".into(),
                ChatRecord {
                    encrypted_message: Some("blob".into()),
                    encrypted_key: Some("key".into()),
                    receiver: "alice".into(),
                    created_at: now - ChronoDuration::minutes(120),
                    expiry: now - ChronoDuration::minutes(60),
                    expired: false,
                },
            )
            .await
            .unwrap();

        let (subs_cleared, chat_cleared) = sweep_once(&storage).await;
        assert_eq!(subs_cleared, 1);
        assert_eq!(chat_cleared, 1);

        assert!(storage.get_submission(1).await.unwrap().wrapped_dek.is_none());
        let chat_record = storage.get_chat("msg-1").await.unwrap();
        assert!(chat_record.expired);
        assert!(chat_record.encrypted_message.is_none());
        assert!(chat_record.encrypted_key.is_none());

        let (subs_again, chat_again) = sweep_once(&storage).await;
        assert_eq!(subs_again, 0);
        assert_eq!(chat_again, 0);
    }

    #[tokio::test]
    async fn unexpired_records_are_left_untouched() {
        let storage = storage().await;
        let now = Utc::now();
        storage
            .insert_submission(|_| SubmissionRecord {
                ciphertext: "ct".into(),
                nonce: "n".into(),
                tag: String::new(),
                wrapped_dek: Some("wrapped".into()),
                commitment: "c1".into(),
                created_at: now,
                expiry: now + ChronoDuration::minutes(60),
            })
            .await
            .unwrap();

        let (subs_cleared, _) = sweep_once(&storage).await;
        assert_eq!(subs_cleared, 0);
        assert!(storage.get_submission(1).await.unwrap().wrapped_dek.is_some());
    }
}
