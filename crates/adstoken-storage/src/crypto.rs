//! At-rest encryption for token columns.
//!
//! AES-256-GCM with a random 96-bit nonce per value. The column name is bound
//! as associated data, so a ciphertext copied into another column fails to
//! open. Stored form is `hex(nonce || ciphertext || tag)`.

use anyhow::{Context, Result};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

/// Key length in bytes (AES-256)
pub const KEY_SIZE: usize = 32;

/// Encrypts and decrypts secret column values
pub struct TokenCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl TokenCipher {
    /// Create a cipher from raw key bytes
    pub fn new(key: &[u8; KEY_SIZE]) -> Result<Self> {
        let unbound = UnboundKey::new(&AES_256_GCM, key)
            .map_err(|_| anyhow::anyhow!("Invalid AES-256-GCM key"))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Create a cipher from a 64-character hex key
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(key_hex.trim()).context("Encryption key is not valid hex")?,
        );
        let key: Zeroizing<[u8; KEY_SIZE]> = Zeroizing::new(
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| anyhow::anyhow!("Encryption key must be {} bytes, got {}", KEY_SIZE, bytes.len()))?,
        );
        Self::new(&key)
    }

    /// Encrypt `plaintext` for storage in `column`
    pub fn seal(&self, column: &str, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| anyhow::anyhow!("Failed to generate nonce"))?;

        let mut buffer = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(column.as_bytes()),
                &mut buffer,
            )
            .map_err(|_| anyhow::anyhow!("Failed to encrypt {}", column))?;

        let mut stored = Vec::with_capacity(NONCE_LEN + buffer.len());
        stored.extend_from_slice(&nonce_bytes);
        stored.extend_from_slice(&buffer);
        Ok(hex::encode(stored))
    }

    /// Decrypt a value read from `column`
    pub fn open(&self, column: &str, stored_hex: &str) -> Result<String> {
        let stored = hex::decode(stored_hex)
            .with_context(|| format!("Stored {} is not valid hex", column))?;
        if stored.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            anyhow::bail!("Stored {} is too short to be a ciphertext", column);
        }

        let (nonce_bytes, sealed) = stored.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| anyhow::anyhow!("Invalid nonce in stored {}", column))?;

        let mut buffer = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(column.as_bytes()), &mut buffer)
            .map_err(|_| anyhow::anyhow!("Failed to decrypt {} - wrong key or corrupted data", column))?;

        String::from_utf8(plaintext.to_vec())
            .with_context(|| format!("Decrypted {} is not valid UTF-8", column))
    }
}

/// Generate a random key
pub fn generate_key() -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    SystemRandom::new()
        .fill(&mut key[..])
        .map_err(|_| anyhow::anyhow!("Failed to generate random key"))?;
    Ok(key)
}

/// Generate a random key as hex, suitable for `TOKEN_ENCRYPTION_KEY`
pub fn generate_key_hex() -> Result<String> {
    let key = generate_key()?;
    Ok(hex::encode(&key[..]))
}
