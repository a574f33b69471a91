/// Input validators for staff and patient supplied fields
/// Features:
/// 1. DoS Protection: Input length limits
/// 2. Email and phone format checks
/// 3. Control character and SQL injection pattern rejection for names

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MAX_NAME_LENGTH: usize = 256;
const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_LENGTH: usize = 20;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();

    static ref PHONE_REGEX: Regex = Regex::new(r"^\+?[0-9][0-9 ()-]*[0-9]$").unwrap();

    static ref SQL_INJECTION_PATTERNS: [Regex; 4] = [
        // Union-based
        Regex::new(r"(?i)\s+UNION\s+").unwrap(),
        // Comments and statement separators
        Regex::new(r"(--|;|/\*|\*/)").unwrap(),
        // Time-based blind injection
        Regex::new(r"(?i)\b(SLEEP|WAITFOR|BENCHMARK|DBMS_LOCK)\b").unwrap(),
        // Boolean tautologies
        Regex::new(r#"(?i)(\bOR\b|\bAND\b)\s*(['"][0-9]*['"]|[0-9]+)\s*=\s*(['"][0-9]*['"]|[0-9]+|True|False)"#).unwrap(),
    ];
}

/// Validates an email address and returns it trimmed and lowercased
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    if let Some(at_pos) = trimmed.find('@') {
        if at_pos > 64 {
            return Err(ValidationError::SuspiciousContent("email".to_string()));
        }
    }

    if contains_sql_injection_patterns(trimmed) {
        return Err(ValidationError::PossibleSQLInjection);
    }

    Ok(trimmed.to_lowercase())
}

/// Validates a person's name (staff or patient)
pub fn is_valid_name(field: &str, name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field.to_string()));
    }

    if trimmed.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong(field.to_string(), MAX_NAME_LENGTH));
    }

    if has_suspicious_name_patterns(trimmed) {
        return Err(ValidationError::SuspiciousContent(field.to_string()));
    }

    if contains_sql_injection_patterns(trimmed) {
        return Err(ValidationError::PossibleSQLInjection);
    }

    Ok(trimmed.to_string())
}

/// Validates a phone number: digits with optional leading `+`, spaces,
/// dashes and parentheses
pub fn is_valid_phone(phone: &str) -> Result<String, ValidationError> {
    let trimmed = phone.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("phone".to_string()));
    }

    if trimmed.len() > MAX_PHONE_LENGTH {
        return Err(ValidationError::TooLong("phone".to_string(), MAX_PHONE_LENGTH));
    }

    let digits = trimmed.chars().filter(|c| c.is_ascii_digit()).count();
    if digits < MIN_PHONE_DIGITS || !PHONE_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("phone".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validates free text such as notes or line item descriptions.
/// Newlines and tabs are allowed, other control characters are not.
pub fn is_valid_text(field: &str, text: &str, max_length: usize) -> Result<String, ValidationError> {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field.to_string()));
    }

    if trimmed.chars().count() > max_length {
        return Err(ValidationError::TooLong(field.to_string(), max_length));
    }

    if trimmed
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\t' && c != '\r')
    {
        return Err(ValidationError::SuspiciousContent(field.to_string()));
    }

    Ok(trimmed.to_string())
}

fn has_suspicious_name_patterns(name: &str) -> bool {
    if name.chars().any(|c| c.is_control()) {
        return true;
    }

    let special_char_count = name
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace() && !matches!(c, '-' | '.' | '_' | '\''))
        .count();

    special_char_count > 5
}

fn contains_sql_injection_patterns(input: &str) -> bool {
    SQL_INJECTION_PATTERNS.iter().any(|pattern| pattern.is_match(input))
}
