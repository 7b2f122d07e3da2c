//! Key-material bootstrap: the KEK and the server's RSA-PSS signing
//! keypair are generated once, written to the vault directory with
//! restrictive permissions, and loaded back on every subsequent startup
//! (§4.2). Both are plain files rather than an HSM or KMS integration,
//! matching the spec's single-process trust model.

use std::path::{Path, PathBuf};

use rand::RngCore;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use thiserror::Error;
use tracing::info;

const KEK_FILENAME: &str = "kek.hex";
const SIGNING_KEY_FILENAME: &str = "signing_key.pem";
const SIGNING_PUBKEY_FILENAME: &str = "signing_key.pub.pem";
const RSA_KEY_BITS: usize = 2048;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("key-encoding error: {0}")]
    Encoding(String),
    #[error("stored key-encryption key is not valid hex: {0}")]
    InvalidKekHex(String),
    #[error("stored key-encryption key has the wrong length: expected 32 bytes, got {0}")]
    WrongKekLength(usize),
}

/// Holds the process's long-lived key material. Loaded once at startup
/// and shared behind an `Arc` for the lifetime of the server.
pub struct Vault {
    kek: [u8; 32],
    signing_key: RsaPrivateKey,
    signing_public_key: RsaPublicKey,
}

impl Vault {
    /// Loads the vault from `dir`, generating and persisting fresh key
    /// material for anything that doesn't already exist. Idempotent:
    /// running this against an already-initialized directory just loads
    /// what's there.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, VaultError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let kek = load_or_init_kek(&dir).await?;
        let (signing_key, signing_public_key) = load_or_init_signing_key(&dir).await?;

        info!(vault_dir = %dir.display(), "vault ready");
        Ok(Self {
            kek,
            signing_key,
            signing_public_key,
        })
    }

    pub fn kek(&self) -> &[u8; 32] {
        &self.kek
    }

    pub fn signing_key(&self) -> &RsaPrivateKey {
        &self.signing_key
    }

    pub fn signing_public_key(&self) -> &RsaPublicKey {
        &self.signing_public_key
    }

    /// PEM-encoded SubjectPublicKeyInfo, for the `/keys/server/pubkey` diagnostic.
    pub fn public_key_pem(&self) -> Result<String, VaultError> {
        self.signing_public_key
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| VaultError::Encoding(e.to_string()))
    }
}

async fn load_or_init_kek(dir: &Path) -> Result<[u8; 32], VaultError> {
    let path = kek_path(dir);
    match tokio::fs::read_to_string(&path).await {
        Ok(hex_str) => {
            let bytes = hex::decode(hex_str.trim())
                .map_err(|e| VaultError::InvalidKekHex(e.to_string()))?;
            let len = bytes.len();
            bytes
                .try_into()
                .map_err(|_| VaultError::WrongKekLength(len))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let mut kek = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut kek);
            write_restricted(&path, hex::encode(kek).as_bytes()).await?;
            info!("generated new key-encryption key");
            Ok(kek)
        }
        Err(e) => Err(e.into()),
    }
}

async fn load_or_init_signing_key(
    dir: &Path,
) -> Result<(RsaPrivateKey, RsaPublicKey), VaultError> {
    let key_path = dir.join(SIGNING_KEY_FILENAME);
    let pub_path = dir.join(SIGNING_PUBKEY_FILENAME);

    match tokio::fs::read_to_string(&key_path).await {
        Ok(pem) => {
            let private = RsaPrivateKey::from_pkcs8_pem(&pem)
                .map_err(|e| VaultError::Encoding(e.to_string()))?;
            let public = match tokio::fs::read_to_string(&pub_path).await {
                Ok(pub_pem) => RsaPublicKey::from_public_key_pem(&pub_pem)
                    .map_err(|e| VaultError::Encoding(e.to_string()))?,
                Err(_) => RsaPublicKey::from(&private),
            };
            Ok((private, public))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let mut rng = rand::thread_rng();
            let private = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
                .map_err(|e| VaultError::Encoding(e.to_string()))?;
            let public = RsaPublicKey::from(&private);

            let private_pem = private
                .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
                .map_err(|e| VaultError::Encoding(e.to_string()))?;
            let public_pem = public
                .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
                .map_err(|e| VaultError::Encoding(e.to_string()))?;

            write_restricted(&key_path, private_pem.as_bytes()).await?;
            write_new_then_rename(&pub_path, public_pem.as_bytes()).await?;
            info!(bits = RSA_KEY_BITS, "generated new RSA-PSS signing keypair");
            Ok((private, public))
        }
        Err(e) => Err(e.into()),
    }
}

fn kek_path(dir: &Path) -> PathBuf {
    dir.join(KEK_FILENAME)
}

/// Write-new-then-rename, with owner-only permissions on the final file
/// (the KEK and private signing key must never be group/world readable).
async fn write_restricted(path: &Path, contents: &[u8]) -> Result<(), VaultError> {
    write_new_then_rename(path, contents).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(path, perms).await?;
    }
    Ok(())
}

async fn write_new_then_rename(path: &Path, contents: &[u8]) -> Result<(), VaultError> {
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, contents).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}
