use crate::errors::{AppError, AppResult};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use std::path::{Path, PathBuf};

const KEYRING_SERVICE: &str = "chat-to-notion";
const KEYRING_ACCOUNT: &str = "credential-encryption-key";
const KEY_FILE_NAME: &str = "master.key";
const SEALED_PREFIX: &str = "v1:";
const NONCE_LEN: usize = 12;

pub const MASTER_KEY_ENV: &str = "CHAT_TO_NOTION_MASTER_KEY";

/// Encrypts Notion API keys before they are written to SQLite.
///
/// Sealed values are `v1:` followed by base64 of `nonce || ciphertext`.
#[derive(Clone)]
pub struct CredentialVault {
    key: [u8; 32],
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

impl CredentialVault {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Resolves the master key from the environment, the OS keyring, or a key
    /// file in `data_dir`, creating one when none exists yet.
    pub fn open(data_dir: &Path) -> AppResult<Self> {
        let key = MasterKeySource::new(data_dir).load_or_create()?;
        Ok(Self::new(key))
    }

    pub fn seal(&self, plaintext: &str) -> AppResult<String> {
        let cipher = self.cipher()?;
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let encrypted = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|error| AppError::Internal(format!("credential encryption failed: {}", error)))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + encrypted.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&encrypted);
        Ok(format!(
            "{}{}",
            SEALED_PREFIX,
            base64::engine::general_purpose::STANDARD.encode(payload)
        ))
    }

    pub fn unseal(&self, sealed: &str) -> AppResult<String> {
        let Some(encoded) = sealed.strip_prefix(SEALED_PREFIX) else {
            return Err(AppError::Internal("unrecognized sealed credential format".to_string()));
        };
        let payload = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|error| AppError::Internal(format!("sealed credential is not base64: {}", error)))?;
        if payload.len() <= NONCE_LEN {
            return Err(AppError::Internal("sealed credential is truncated".to_string()));
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let cipher = self.cipher()?;
        let decrypted = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| AppError::Internal("credential decryption failed".to_string()))?;
        String::from_utf8(decrypted).map_err(|error| AppError::Internal(error.to_string()))
    }

    fn cipher(&self) -> AppResult<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|error| AppError::Internal(error.to_string()))
    }
}

struct MasterKeySource {
    key_file: PathBuf,
}

impl MasterKeySource {
    fn new(data_dir: &Path) -> Self {
        Self {
            key_file: data_dir.join(KEY_FILE_NAME),
        }
    }

    fn load_or_create(&self) -> AppResult<[u8; 32]> {
        if let Ok(raw) = std::env::var(MASTER_KEY_ENV) {
            return decode_key(&raw);
        }
        if let Some(key) = self.read_keyring() {
            return Ok(key);
        }
        if let Some(key) = self.read_file()? {
            return Ok(key);
        }

        let key: [u8; 32] = rand::random();
        let encoded = base64::engine::general_purpose::STANDARD.encode(key);

        // The keyring may be a non-persistent store; only trust it after a fresh read-back.
        if self.write_keyring(&encoded) && self.read_keyring() == Some(key) {
            tracing::info!("stored credential encryption key in OS keyring");
            return Ok(key);
        }

        tracing::warn!(path = %self.key_file.display(), "OS keyring unavailable, storing encryption key on disk");
        self.write_file(&encoded)?;
        Ok(key)
    }

    fn read_keyring(&self) -> Option<[u8; 32]> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_ACCOUNT).ok()?;
        let value = entry.get_password().ok()?;
        decode_key(&value).ok()
    }

    fn write_keyring(&self, encoded: &str) -> bool {
        match keyring::Entry::new(KEYRING_SERVICE, KEYRING_ACCOUNT) {
            Ok(entry) => entry.set_password(encoded).is_ok(),
            Err(error) => {
                tracing::debug!(error = %error, "keyring entry unavailable");
                false
            }
        }
    }

    fn read_file(&self) -> AppResult<Option<[u8; 32]>> {
        if !self.key_file.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.key_file)?;
        decode_key(&raw).map(Some)
    }

    fn write_file(&self, encoded: &str) -> AppResult<()> {
        if let Some(parent) = self.key_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.key_file, encoded)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.key_file, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

fn decode_key(raw: &str) -> AppResult<[u8; 32]> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(raw.trim())
        .map_err(|error| AppError::Internal(format!("master key is not base64: {}", error)))?;
    if decoded.len() != 32 {
        return Err(AppError::Internal(format!(
            "master key must be 32 bytes, got {}",
            decoded.len()
        )));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&decoded);
    Ok(key)
}
