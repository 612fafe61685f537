// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead field validation as plain result types, so the orchestrator can
//! match on failures and ask the user for a correction without unwinding.
//!
//! Phone numbers are normalized before validation: Russian `8XXXXXXXXXX`
//! and bare `7XXXXXXXXXX` forms become `+7...`; anything else gets a `+`
//! prefix and must then satisfy the E.164-style shape `+[1-9]` followed by
//! 1 to 14 digits.

use kiosk_core::KioskError;

/// Normalize and validate a phone number, returning the canonical form.
pub fn normalize_phone(raw: &str) -> Result<String, KioskError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    if cleaned.is_empty() || cleaned == "+" {
        return Err(KioskError::Validation(
            "phone must contain digits in international format".into(),
        ));
    }
    if cleaned.matches('+').count() > 1 || (cleaned.contains('+') && !cleaned.starts_with('+')) {
        return Err(KioskError::Validation("malformed phone number".into()));
    }

    let digits = cleaned.trim_start_matches('+');
    let normalized = if !cleaned.starts_with('+') && digits.len() == 11 && digits.starts_with('8') {
        format!("+7{}", &digits[1..])
    } else if !cleaned.starts_with('+') && digits.len() == 11 && digits.starts_with('7') {
        format!("+{digits}")
    } else if cleaned.starts_with('+') {
        cleaned.clone()
    } else {
        format!("+{digits}")
    };

    let body = &normalized[1..];
    let shape_ok = body.len() >= 2
        && body.len() <= 15
        && body.starts_with(|c: char| ('1'..='9').contains(&c))
        && body.chars().all(|c| c.is_ascii_digit());
    if !shape_ok {
        return Err(KioskError::Validation(format!(
            "phone {raw:?} is not a valid international number"
        )));
    }
    Ok(normalized)
}

/// Syntactic email check: one `@`, a non-empty local part, and a domain
/// with a dot. Deliverability is the CRM's problem.
pub fn validate_email(raw: &str) -> Result<String, KioskError> {
    let email = raw.trim();
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    let ok = !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace);
    if !ok {
        return Err(KioskError::Validation(format!(
            "email {raw:?} is not a valid address"
        )));
    }
    Ok(email.to_string())
}

/// Validate a last name: non-empty after trimming.
pub fn validate_last_name(raw: &str) -> Result<String, KioskError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(KioskError::Validation("last name must not be empty".into()));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn international_numbers_pass() {
        assert_eq!(normalize_phone("+79001234567").unwrap(), "+79001234567");
        assert_eq!(normalize_phone("+14155550123").unwrap(), "+14155550123");
    }

    #[test]
    fn russian_forms_normalize_to_plus_seven() {
        assert_eq!(normalize_phone("89001234567").unwrap(), "+79001234567");
        assert_eq!(normalize_phone("79001234567").unwrap(), "+79001234567");
        assert_eq!(normalize_phone("8 (900) 123-45-67").unwrap(), "+79001234567");
    }

    #[test]
    fn garbage_phones_fail() {
        assert!(normalize_phone("").is_err());
        assert!(normalize_phone("+").is_err());
        assert!(normalize_phone("call me").is_err());
        assert!(normalize_phone("+0123456").is_err(), "leading zero after +");
        assert!(normalize_phone("++79001234567").is_err());
        assert!(normalize_phone("+7900123456789012345").is_err(), "too long");
    }

    #[test]
    fn emails_validate_syntactically() {
        assert!(validate_email("ivan@example.com").is_ok());
        assert!(validate_email(" ivan@example.com ").is_ok());
        assert!(validate_email("ivan@example").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("ivan example@mail.com").is_err());
        assert!(validate_email("ivan@.com").is_err());
    }

    #[test]
    fn last_name_requires_content() {
        assert_eq!(validate_last_name(" Иванов ").unwrap(), "Иванов");
        assert!(validate_last_name("   ").is_err());
    }
}
