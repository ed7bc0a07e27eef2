//! Remedial codes: the short tokens students type to mark attendance.

use uuid::Uuid;

pub const GENERATED_LEN: usize = 8;
pub const MAX_LEN: usize = 12;

/// Fresh code: the first eight hex digits of a v4 UUID, uppercased.
pub fn generate() -> String {
    let mut code = Uuid::new_v4().simple().to_string();
    code.truncate(GENERATED_LEN);
    code.make_ascii_uppercase();
    code
}

/// Canonical form used for lookups and storage.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Validates a caller-supplied code after normalization.
pub fn validate(code: &str) -> Result<(), String> {
    if code.is_empty() {
        return Err("remedialCode must not be empty".to_string());
    }
    if code.chars().count() > MAX_LEN {
        return Err(format!("remedialCode must be at most {} characters", MAX_LEN));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("remedialCode may only contain A-Z, 0-9 and '-'".to_string());
    }
    Ok(())
}
