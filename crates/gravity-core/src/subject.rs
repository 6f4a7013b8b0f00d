use rand::RngCore;

use crate::error::GravityError;

/// Token separator inside a subject.
pub const TOKEN_SEPARATOR: char = '.';
/// Matches exactly one token.
pub const SINGLE_WILDCARD: &str = "*";
/// Matches one or more trailing tokens.
pub const TAIL_WILDCARD: &str = ">";
/// Prefix of every per-call reply subject.
pub const INBOX_PREFIX: &str = "_INBOX.";
/// Pattern a cache node subscribes to: every single-token subject, i.e.
/// every valid key and never an inbox.
pub const ALL_KEYS_PATTERN: &str = SINGLE_WILDCARD;

/// Returns whether `c` has subject-level meaning.
pub fn is_reserved_char(c: char) -> bool {
    c == TOKEN_SEPARATOR || c == '*' || c == '>'
}

/// Validates a concrete (publishable) subject: non-empty tokens, no wildcards.
pub fn validate_subject(subject: &str) -> Result<(), GravityError> {
    if subject.is_empty() {
        return Err(GravityError::InvalidSubject("subject must not be empty"));
    }
    for token in subject.split(TOKEN_SEPARATOR) {
        if token.is_empty() {
            return Err(GravityError::InvalidSubject("empty token"));
        }
        if token.contains(['*', '>']) || token.chars().any(char::is_whitespace) {
            return Err(GravityError::InvalidSubject(
                "publish subject must not contain wildcards or whitespace",
            ));
        }
    }
    Ok(())
}

/// Validates a subscription pattern. `>` is only allowed as the last token.
pub fn validate_pattern(pattern: &str) -> Result<(), GravityError> {
    if pattern.is_empty() {
        return Err(GravityError::InvalidSubject("pattern must not be empty"));
    }
    let tokens: Vec<&str> = pattern.split(TOKEN_SEPARATOR).collect();
    for (idx, token) in tokens.iter().enumerate() {
        if token.is_empty() {
            return Err(GravityError::InvalidSubject("empty token"));
        }
        if *token == TAIL_WILDCARD {
            if idx + 1 != tokens.len() {
                return Err(GravityError::InvalidSubject(
                    "tail wildcard must be the last token",
                ));
            }
            continue;
        }
        if *token == SINGLE_WILDCARD {
            continue;
        }
        if token.contains(['*', '>']) || token.chars().any(char::is_whitespace) {
            return Err(GravityError::InvalidSubject(
                "wildcards must occupy a whole token",
            ));
        }
    }
    Ok(())
}

/// Token-wise subject match against a subscription pattern.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split(TOKEN_SEPARATOR);
    let mut subject_tokens = subject.split(TOKEN_SEPARATOR);
    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(TAIL_WILDCARD), Some(_)) => return true,
            (Some(SINGLE_WILDCARD), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Generates a fresh, never-reused reply subject.
pub fn new_inbox() -> String {
    let mut nonce = [0_u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);
    format!("{INBOX_PREFIX}{}", hex::encode(nonce))
}

/// Returns whether `subject` is a reply inbox.
pub fn is_inbox(subject: &str) -> bool {
    subject.starts_with(INBOX_PREFIX)
}
