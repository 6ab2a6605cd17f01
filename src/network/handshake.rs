//! Handshake Validation
//!
//! Checks applied to CREATE_ROOM and JOIN_ROOM before a player gets a seat:
//! the client protocol version gate and the nickname rules.

use thiserror::Error;

/// Shortest accepted nickname, in bytes.
pub const MIN_NICKNAME_LEN: usize = 3;

/// Longest accepted nickname, in bytes.
pub const MAX_NICKNAME_LEN: usize = 20;

/// Handshake errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// Client speaks another protocol version. Fatal for the connection.
    #[error("client version {got:?} does not match server version {expected:?}")]
    VersionMismatch {
        /// Version the server requires.
        expected: String,
        /// Version the client sent.
        got: String,
    },
    /// Nickname length out of range.
    #[error("nickname must be {MIN_NICKNAME_LEN}..={MAX_NICKNAME_LEN} bytes, got {0}")]
    NicknameLength(usize),
    /// Nickname contains a forbidden character.
    #[error("nickname contains forbidden character {0:?}")]
    NicknameCharacter(char),
}

impl HandshakeError {
    /// Check if the connection must be closed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HandshakeError::VersionMismatch { .. })
    }
}

/// Require an exact protocol version match.
pub fn check_client_version(required: &str, got: &str) -> Result<(), HandshakeError> {
    if required != got {
        return Err(HandshakeError::VersionMismatch {
            expected: required.to_string(),
            got: got.to_string(),
        });
    }
    Ok(())
}

/// Validate a display name.
pub fn validate_nickname(nickname: &str) -> Result<(), HandshakeError> {
    let len = nickname.len();
    if !(MIN_NICKNAME_LEN..=MAX_NICKNAME_LEN).contains(&len) {
        return Err(HandshakeError::NicknameLength(len));
    }

    match nickname.chars().find(|c| !is_nickname_char(*c)) {
        Some(c) => Err(HandshakeError::NicknameCharacter(c)),
        None => Ok(()),
    }
}

/// ASCII letters and digits, Cyrillic А-Я / а-я, space and underscore.
#[inline]
fn is_nickname_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c == ' '
        || c == '_'
        || ('А'..='Я').contains(&c)
        || ('а'..='я').contains(&c)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_gate() {
        assert!(check_client_version("1.0.0", "1.0.0").is_ok());

        let err = check_client_version("1.0.0", "1.0.1").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_valid_nicknames() {
        for name in ["Bob", "player_1", "Big Admiral", "Адмирал", "abc", "a2345678901234567890"] {
            assert!(validate_nickname(name).is_ok(), "{name} should be accepted");
        }
    }

    #[test]
    fn test_length_counts_bytes() {
        assert_eq!(validate_nickname("ab"), Err(HandshakeError::NicknameLength(2)));
        assert_eq!(validate_nickname(""), Err(HandshakeError::NicknameLength(0)));
        // 11 Cyrillic letters = 22 bytes.
        assert_eq!(validate_nickname("Адмиралтейс"), Err(HandshakeError::NicknameLength(22)));
    }

    #[test]
    fn test_forbidden_characters() {
        assert_eq!(validate_nickname("bob!"), Err(HandshakeError::NicknameCharacter('!')));
        assert_eq!(validate_nickname("ёжик"), Err(HandshakeError::NicknameCharacter('ё')));
        assert_eq!(validate_nickname("tab\tname"), Err(HandshakeError::NicknameCharacter('\t')));
    }
}
