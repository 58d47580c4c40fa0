//! Input format rules shared by the auth and user flows.

use lazy_static::lazy_static;
use regex::Regex;

pub const EMAIL_ERROR_MESSAGE: &str =
    "email must have a valid format (example: user@domain.com)";

pub const PASSWORD_ERROR_MESSAGE: &str = "password must be at least 8 characters long and \
     contain an uppercase letter, a lowercase letter, a digit and a special character (@#$%^&+=!)";

pub const NAME_ERROR_MESSAGE: &str = "name is required";

const PASSWORD_MIN_LEN: usize = 8;
const PASSWORD_SPECIALS: &str = "@#$%^&+=!";

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[A-Za-z0-9+_.-]+@(.+)$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn is_valid_password(password: &str) -> bool {
    password.chars().count() >= PASSWORD_MIN_LEN
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| PASSWORD_SPECIALS.contains(c))
        && !password.chars().any(char::is_whitespace)
}

/// True when the value is absent or only whitespace.
pub fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_accepts_simple_addresses() {
        assert!(is_valid_email("a@b.c"));
        assert!(is_valid_email("first.last+tag@example.com"));
        assert!(is_valid_email("under_score-dash@x"));
    }

    #[test]
    fn email_rejects_missing_parts() {
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@b.c"));
        assert!(!is_valid_email("a@"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("sp ace@b.c"));
    }

    #[test]
    fn password_accepts_complex_values() {
        assert!(is_valid_password("Abcdefg1!"));
        assert!(is_valid_password("Abcdef1!"));
    }

    #[test]
    fn password_rejects_each_missing_rule() {
        assert!(!is_valid_password("short1!"), "too short");
        assert!(!is_valid_password("alllowercase1!"), "no uppercase");
        assert!(!is_valid_password("ALLUPPERCASE1!"), "no lowercase");
        assert!(!is_valid_password("NoDigits!!"), "no digit");
        assert!(!is_valid_password("NoSpecial123"), "no special");
        assert!(!is_valid_password("Has Space1!"), "whitespace");
    }

    #[test]
    fn blank_detection() {
        assert!(is_blank(None));
        assert!(is_blank(Some("   ")));
        assert!(!is_blank(Some("x")));
    }
}
