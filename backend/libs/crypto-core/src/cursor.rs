/// Opaque pagination cursors
///
/// A cursor seals `(offset, page_size, total, issued_at)` with AES-256-GCM so
/// clients can neither read nor forge it.
///
/// ## Encryption Format
///
/// ```text
/// base64url_nopad( nonce (12 bytes) || ciphertext (28 bytes) || tag (16 bytes) )
/// ```
///
/// The 28-byte plaintext is big-endian:
/// `offset u64 | page_size u32 | total u64 | issued_at i64 (unix seconds)`.
///
/// ## Key Handling
///
/// The key must be exactly 32 bytes. Shorter keys are zero-padded and longer
/// keys truncated, with a warning; production deployments should pass an
/// exact 256-bit key.
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use rand::Rng;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const PLAINTEXT_LEN: usize = 28;

/// Default cursor validity window
pub const DEFAULT_CURSOR_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cursors issued this far in the future are treated as forged
const ISSUED_AT_SKEW_SECS: i64 = 60;

/// Decoded cursor contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorContents {
    pub offset: u64,
    pub page_size: u32,
    pub total: u64,
    /// Unix seconds
    pub issued_at: i64,
}

impl CursorContents {
    pub fn new(offset: u64, page_size: u32, total: u64) -> Self {
        Self {
            offset,
            page_size,
            total,
            issued_at: Utc::now().timestamp(),
        }
    }

    fn to_bytes(self) -> [u8; PLAINTEXT_LEN] {
        let mut buf = [0u8; PLAINTEXT_LEN];
        buf[0..8].copy_from_slice(&self.offset.to_be_bytes());
        buf[8..12].copy_from_slice(&self.page_size.to_be_bytes());
        buf[12..20].copy_from_slice(&self.total.to_be_bytes());
        buf[20..28].copy_from_slice(&self.issued_at.to_be_bytes());
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CursorError> {
        let bytes: &[u8; PLAINTEXT_LEN] = bytes
            .try_into()
            .map_err(|_| CursorError::InvalidContents("unexpected plaintext length"))?;

        let mut offset = [0u8; 8];
        let mut page_size = [0u8; 4];
        let mut total = [0u8; 8];
        let mut issued_at = [0u8; 8];
        offset.copy_from_slice(&bytes[0..8]);
        page_size.copy_from_slice(&bytes[8..12]);
        total.copy_from_slice(&bytes[12..20]);
        issued_at.copy_from_slice(&bytes[20..28]);

        Ok(Self {
            offset: u64::from_be_bytes(offset),
            page_size: u32::from_be_bytes(page_size),
            total: u64::from_be_bytes(total),
            issued_at: i64::from_be_bytes(issued_at),
        })
    }
}

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("page token is not valid base64url")]
    Malformed,

    #[error("page token is too short")]
    TooShort,

    #[error("page token failed authentication")]
    Authentication,

    #[error("page token has expired")]
    Expired,

    #[error("page token contents are invalid: {0}")]
    InvalidContents(&'static str),

    #[error("failed to seal page token")]
    Encryption,
}

impl From<CursorError> for tonic::Status {
    fn from(err: CursorError) -> Self {
        match err {
            CursorError::Encryption => tonic::Status::internal("internal server error"),
            _ => tonic::Status::invalid_argument("invalid page token"),
        }
    }
}

/// Seals and opens pagination cursors
pub struct CursorCodec {
    cipher: Aes256Gcm,
    /// Saturates at `i64::MAX` for very long lifetimes
    ttl_secs: i64,
}

impl fmt::Debug for CursorCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorCodec")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl CursorCodec {
    pub fn new(key: &[u8], ttl: Duration) -> Self {
        if key.len() != KEY_LEN {
            warn!(
                key_len = key.len(),
                expected = KEY_LEN,
                "Cursor encryption key is not 256 bits; padding/truncating"
            );
        }

        let mut material = [0u8; KEY_LEN];
        let used = key.len().min(KEY_LEN);
        material[..used].copy_from_slice(&key[..used]);

        let key = Key::<Aes256Gcm>::from_slice(&material);
        Self {
            cipher: Aes256Gcm::new(key),
            ttl_secs: i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
        }
    }

    pub fn encode(&self, contents: &CursorContents) -> Result<String, CursorError> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::thread_rng().gen();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let plaintext = contents.to_bytes();
        let ciphertext = self
            .cipher
            .encrypt(nonce, Payload::from(plaintext.as_slice()))
            .map_err(|_| CursorError::Encryption)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    pub fn decode(&self, token: &str) -> Result<CursorContents, CursorError> {
        self.decode_at(token, Utc::now().timestamp())
    }

    fn decode_at(&self, token: &str, now: i64) -> Result<CursorContents, CursorError> {
        let sealed = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| CursorError::Malformed)?;

        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(CursorError::TooShort);
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), Payload::from(ciphertext))
            .map_err(|_| CursorError::Authentication)?;

        let contents = CursorContents::from_bytes(&plaintext)?;

        let age = now.saturating_sub(contents.issued_at);
        if age > self.ttl_secs {
            return Err(CursorError::Expired);
        }
        if age < -ISSUED_AT_SKEW_SECS {
            return Err(CursorError::InvalidContents("issued in the future"));
        }
        if contents.page_size == 0 {
            return Err(CursorError::InvalidContents("page size must be positive"));
        }
        if contents.offset > contents.total {
            return Err(CursorError::InvalidContents("offset beyond total"));
        }

        Ok(contents)
    }

    /// Offset encoded in `token`, or `fallback` when the token is empty or
    /// cannot be decoded
    pub fn calculate_offset(&self, token: &str, fallback: u64) -> u64 {
        if token.is_empty() {
            return fallback;
        }

        match self.decode(token) {
            Ok(contents) => contents.offset,
            Err(e) => {
                warn!(error = %e, fallback, "Discarding invalid page token");
                fallback
            }
        }
    }

    /// Token for the page after `current_offset`; empty when no page follows
    pub fn next_page_token(
        &self,
        current_offset: u64,
        page_size: u32,
        total: u64,
    ) -> Result<String, CursorError> {
        let next_offset = current_offset.saturating_add(u64::from(page_size));
        if page_size == 0 || next_offset >= total {
            return Ok(String::new());
        }

        self.encode(&CursorContents::new(next_offset, page_size, total))
    }
}
