//! Input validation for steps that accept free-form user input.
//!
//! Failures here are user-input errors: the step is not advanced and no
//! rate limit is charged.

use idv_types::Ssn;

use crate::FlowError;

/// Structural SSN check. Numbers in the 9xx area are accepted; they are the
/// synthetic range used by test identities.
pub fn validate_ssn(ssn: &Ssn) -> Result<(), FlowError> {
    let digits = ssn.expose();
    if digits.len() != 9 {
        return Err(FlowError::InvalidSsn("expected nine digits"));
    }
    match &digits[..3] {
        "000" => return Err(FlowError::InvalidSsn("area number 000")),
        "666" => return Err(FlowError::InvalidSsn("area number 666")),
        _ => {}
    }
    if &digits[3..5] == "00" {
        return Err(FlowError::InvalidSsn("group number 00"));
    }
    if &digits[5..] == "0000" {
        return Err(FlowError::InvalidSsn("serial number 0000"));
    }
    Ok(())
}

/// Validate a US phone number and return it in E.164 form (`+1NXXNXXXXXX`).
pub fn validate_phone(raw: &str) -> Result<String, FlowError> {
    let trimmed = raw.trim();
    if trimmed
        .chars()
        .any(|c| !(c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | ' ' | '(' | ')')))
    {
        return Err(FlowError::InvalidPhone("unexpected character"));
    }
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    let national = match digits.len() {
        10 => digits.as_str(),
        11 if digits.starts_with('1') => &digits[1..],
        _ => return Err(FlowError::InvalidPhone("expected a ten-digit US number")),
    };
    if matches!(national.as_bytes()[0], b'0' | b'1') {
        return Err(FlowError::InvalidPhone("area code cannot start with 0 or 1"));
    }
    if matches!(national.as_bytes()[3], b'0' | b'1') {
        return Err(FlowError::InvalidPhone("exchange cannot start with 0 or 1"));
    }
    Ok(format!("+1{national}"))
}
