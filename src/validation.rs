/// Contact validation for incoming leads.
///
/// Checks here never block intake. A malformed phone or email is logged so the
/// dealer can follow up, and the submitted value is still used for matching.
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use std::sync::OnceLock;

use crate::models::LeadSubmission;

/// Region assumed for phone numbers submitted without a country code.
pub const DEFAULT_REGION: CountryId = CountryId::IN;

fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX.get_or_init(|| {
        // RFC 5322 simplified email regex
        // Matches: local@domain.tld
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
        )
        .expect("email regex is valid")
    })
}

/// Validate email address
///
/// Checks for:
/// - Basic email format (contains @ and .)
/// - Fake/placeholder patterns (repeated digits like 9999, 1111)
/// - Minimum length requirements
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }

    let fake_patterns = ["999999", "111111", "000000", "123456789"];
    if let Some(pattern) = fake_patterns.iter().find(|p| email.contains(*p)) {
        tracing::debug!("Email matches placeholder pattern '{}': {}", pattern, email);
        return false;
    }

    email_regex().is_match(email)
}

/// Validate and normalize a phone number for the given region.
///
/// Returns: (is_valid, normalized E.164 phone or error message)
pub fn validate_phone_for_region(region: CountryId, raw: &str) -> (bool, String) {
    if raw.trim().is_empty() || raw.len() < 8 {
        return (false, "Phone too short".to_string());
    }

    match phonenumber::parse(Some(region), raw) {
        Ok(number) if phonenumber::is_valid(&number) => {
            (true, number.format().mode(Mode::E164).to_string())
        }
        Ok(_) => (false, format!("Invalid phone number for region {:?}", region)),
        Err(e) => (false, format!("Parse error: {:?}", e)),
    }
}

/// Validate a phone number in the dealer network's home region.
pub fn validate_phone(raw: &str) -> (bool, String) {
    validate_phone_for_region(DEFAULT_REGION, raw)
}

/// Logs a warning for each malformed contact field and returns how many were flagged.
pub fn warn_on_suspicious_contacts(submission: &LeadSubmission) -> usize {
    let mut flagged = 0;

    if let Some(phone) = submission.phone_number.as_deref() {
        let (valid, detail) = validate_phone(phone);
        if !valid {
            tracing::warn!("⚠️  Suspicious phone number '{}': {}", phone, detail);
            flagged += 1;
        }
    }

    if let Some(email) = submission.email.as_deref() {
        if !is_valid_email(email) {
            tracing::warn!("⚠️  Suspicious email '{}'", email);
            flagged += 1;
        }
    }

    flagged
}
