//! Password strength scoring and generation.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StashError};

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Upper bound on generated password length.
pub const MAX_GENERATED_LENGTH: usize = 1024;

/// Coarse strength rating for a password.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordStrength {
    Weak,
    Fair,
    Good,
    Strong,
}

impl std::fmt::Display for PasswordStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PasswordStrength::Weak => "weak",
            PasswordStrength::Fair => "fair",
            PasswordStrength::Good => "good",
            PasswordStrength::Strong => "strong",
        };
        f.write_str(label)
    }
}

/// Reject empty passwords before any key derivation.
pub fn require_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(StashError::InvalidInput(
            "Password cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Score a password.
///
/// One point each for: at least 8 characters, at least 12 characters, a
/// lowercase letter, an uppercase letter, a digit, a symbol. Two or fewer
/// points is weak, four or fewer fair, five good, six strong.
pub fn check_password_strength(password: &str) -> PasswordStrength {
    let length = password.chars().count();
    let checks = [
        length >= 8,
        length >= 12,
        password.chars().any(char::is_lowercase),
        password.chars().any(char::is_uppercase),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| !c.is_alphanumeric()),
    ];
    let score = checks.iter().filter(|passed| **passed).count();

    match score {
        0..=2 => PasswordStrength::Weak,
        3..=4 => PasswordStrength::Fair,
        5 => PasswordStrength::Good,
        _ => PasswordStrength::Strong,
    }
}

/// Generate a random password from the OS RNG.
///
/// When `length` allows, one character from every required class is placed
/// first; the rest is drawn from the combined alphabet and the whole buffer
/// is shuffled so class characters do not sit at predictable positions.
///
/// # Errors
///
/// Returns `StashError::InvalidInput` if `length` is zero or above
/// [`MAX_GENERATED_LENGTH`].
pub fn generate_password(length: usize, include_symbols: bool) -> Result<String> {
    if length == 0 || length > MAX_GENERATED_LENGTH {
        return Err(StashError::InvalidInput(format!(
            "Password length must be between 1 and {}",
            MAX_GENERATED_LENGTH
        )));
    }

    let mut classes: Vec<&[u8]> = vec![LOWERCASE, UPPERCASE, DIGITS];
    if include_symbols {
        classes.push(SYMBOLS);
    }
    let alphabet: Vec<u8> = classes.concat();

    let mut rng = OsRng;
    let mut chars = Vec::with_capacity(length);
    if length >= classes.len() {
        for class in &classes {
            chars.push(class[rng.gen_range(0..class.len())]);
        }
    }
    while chars.len() < length {
        chars.push(alphabet[rng.gen_range(0..alphabet.len())]);
    }
    chars.shuffle(&mut rng);

    Ok(chars.into_iter().map(char::from).collect())
}
