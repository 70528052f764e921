//! Room code generation and parsing
//!
//! Codes are short enough to read over a phone call and avoid the
//! visually ambiguous characters 0/O and 1/I.

/// Length of a room code in characters
pub const CODE_LENGTH: usize = 6;

/// Characters used in room codes (unambiguous set)
const CODE_CHARS: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Generate a random room code (e.g., "A2B3C4")
pub fn generate_code() -> String {
    let mut bytes = [0u8; CODE_LENGTH];
    getrandom::getrandom(&mut bytes).expect("RNG failed");

    bytes
        .iter()
        .map(|b| CODE_CHARS[(*b as usize) % CODE_CHARS.len()] as char)
        .collect()
}

/// Normalize a room code (strip whitespace and dashes, uppercase)
pub fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Validate a room code format
pub fn validate_code(code: &str) -> bool {
    let normalized = normalize_code(code);
    normalized.len() == CODE_LENGTH
        && normalized.bytes().all(|b| CODE_CHARS.contains(&b))
}
