//! Secret strength validation
//!
//! Production startup refuses empty, well-known, or trivially weak HMAC
//! secrets.

const MIN_SECRET_LENGTH: usize = 32; // 256 bits minimum
const RECOMMENDED_SECRET_LENGTH: usize = 64;

/// Values that show up in sample configs and tutorials
const WELL_KNOWN_SECRETS: &[&str] = &[
    "secret",
    "changeme",
    "change-me",
    "password",
    "jwt-secret",
    "jwt_secret",
    "your-secret-key",
    "your-256-bit-secret",
    "supersecret",
    "development",
    "dev-secret",
    "test-secret",
];

/// Secret strength classification
#[derive(Debug, PartialEq, Eq)]
pub enum SecretStrength {
    /// Weak secret - REJECT in production
    Weak,
    /// Acceptable secret
    Acceptable,
    /// Strong secret
    Strong,
}

/// Whether the secret appears on the well-known list (case-insensitive)
pub fn is_well_known(secret: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(secret) else {
        return false;
    };
    let normalized = text.trim().to_ascii_lowercase();
    WELL_KNOWN_SECRETS.iter().any(|known| *known == normalized)
}

/// Classify an HMAC secret
///
/// **Criteria**:
/// - Not on the well-known list
/// - Minimum 32 bytes (256 bits)
/// - Shannon entropy > 3.5 bits/byte
/// - No runs of four repeated or sequential bytes
pub fn validate_secret_strength(secret: &[u8]) -> SecretStrength {
    if is_well_known(secret) || secret.len() < MIN_SECRET_LENGTH {
        return SecretStrength::Weak;
    }

    let entropy = calculate_shannon_entropy(secret);
    if entropy < 3.5 || has_obvious_patterns(secret) {
        return SecretStrength::Weak;
    }

    if secret.len() >= RECOMMENDED_SECRET_LENGTH && entropy >= 5.0 {
        SecretStrength::Strong
    } else {
        SecretStrength::Acceptable
    }
}

/// Returns bits per byte (0-8 scale)
fn calculate_shannon_entropy(data: &[u8]) -> f64 {
    let mut freq = [0u32; 256];
    let len = data.len() as f64;

    for &byte in data {
        freq[byte as usize] += 1;
    }

    let mut entropy = 0.0;
    for &count in freq.iter() {
        if count > 0 {
            let p = count as f64 / len;
            entropy -= p * p.log2();
        }
    }

    entropy
}

fn has_obvious_patterns(data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }

    // "aaaa", "1111"
    let mut consecutive_same = 1;
    for window in data.windows(2) {
        if window[0] == window[1] {
            consecutive_same += 1;
            if consecutive_same >= 4 {
                return true;
            }
        } else {
            consecutive_same = 1;
        }
    }

    // "abcd", "1234"
    let mut consecutive_seq = 1;
    for window in data.windows(2) {
        if window[1] as i16 - window[0] as i16 == 1 {
            consecutive_seq += 1;
            if consecutive_seq >= 4 {
                return true;
            }
        } else {
            consecutive_seq = 1;
        }
    }

    false
}
