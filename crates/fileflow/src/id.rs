//! Short, prefixed identifiers for pipeline runs.

use chrono::Utc;

/// Length of the random part of a [`crate::FileProcess`] id.
pub const FILE_PROCESS_ID_LENGTH: usize = 16;

/// Prefix of every [`crate::FileProcess`] id.
pub const FILE_PROCESS_ID_PREFIX: &str = "FP";

const ID_ALPHABET: &[u8; 64] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ-_";

/// Generates `<prefix>_<random>` with `length` characters drawn from a
/// URL-safe 64 symbol alphabet.
///
/// Falls back to the current Unix time in microseconds when the OS random
/// source is unavailable. An empty prefix yields the bare token.
pub fn nid(prefix: &str, length: usize) -> String {
    let token = random_token(length).unwrap_or_else(|e| {
        tracing::warn!("Random source unavailable ({}), using timestamp id", e);
        Utc::now().timestamp_micros().to_string()
    });

    if prefix.is_empty() {
        token
    } else {
        format!("{}_{}", prefix, token)
    }
}

fn random_token(length: usize) -> Result<String, getrandom::Error> {
    let mut bytes = vec![0u8; length];
    getrandom::fill(&mut bytes)?;

    // 64 symbols: masking the low six bits keeps the distribution uniform.
    Ok(bytes
        .iter()
        .map(|b| ID_ALPHABET[(b & 0x3f) as usize] as char)
        .collect())
}
