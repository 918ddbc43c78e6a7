//! Cryptographic building blocks for the Medialib services
//!
//! - [`jwt`]: HS256 access/refresh token issuance and verification
//! - [`secret`]: secret strength checks and development secret generation
//! - [`cursor`]: AES-256-GCM sealed pagination cursors

pub mod cursor;
pub mod jwt;
pub mod secret;

pub use cursor::{CursorCodec, CursorContents, CursorError};
pub use jwt::{Identity, JwtError, TokenConfig, TokenKind, TokenManager};
