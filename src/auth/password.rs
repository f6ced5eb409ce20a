// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password hashing, policy checks and placeholder generation.

use rand::seq::{IndexedRandom, SliceRandom};

use super::AuthError;

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SPECIAL: &[u8] = b"!@#$%&*";
const DIGITS: &[u8] = b"0123456789";

/// Password complexity rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub include_chars: bool,
    pub include_digits: bool,
    pub include_uppercase: bool,
    pub include_lowercase: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 6,
            max_length: 64,
            include_chars: true,
            include_digits: true,
            include_uppercase: false,
            include_lowercase: true,
        }
    }
}

impl PasswordPolicy {
    /// Whether `password` satisfies every enabled rule.
    pub fn check(&self, password: &str) -> bool {
        let len = password.chars().count();
        if len < self.min_length || len > self.max_length {
            return false;
        }
        if self.include_chars && !password.chars().any(char::is_alphabetic) {
            return false;
        }
        if self.include_digits && !password.chars().any(|c| c.is_ascii_digit()) {
            return false;
        }
        if self.include_lowercase && !password.chars().any(char::is_lowercase) {
            return false;
        }
        if self.include_uppercase && !password.chars().any(char::is_uppercase) {
            return false;
        }
        true
    }
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    bcrypt::hash(password, cost).map_err(|e| AuthError::InternalError(format!("hashing password: {e}")))
}

/// Compare a candidate with a stored hash. A malformed hash counts as a
/// mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Random password that satisfies `policy`, used as the credential of
/// accounts created through mobile OTP.
pub fn generate_password(policy: &PasswordPolicy) -> String {
    let mut rng = rand::rng();
    let mut chars: Vec<u8> = Vec::new();

    let mut take = |set: &[u8], count: usize, chars: &mut Vec<u8>| {
        for _ in 0..count {
            if let Some(c) = set.choose(&mut rng) {
                chars.push(*c);
            }
        }
    };

    take(SPECIAL, 2, &mut chars);
    if policy.include_digits {
        take(DIGITS, 3, &mut chars);
    }
    if policy.include_uppercase {
        take(UPPER, 3, &mut chars);
    }
    if policy.include_lowercase || policy.include_chars {
        take(LOWER, 3, &mut chars);
    }

    let all: Vec<u8> = [LOWER, UPPER, SPECIAL, DIGITS].concat();
    let target = (policy.min_length + 2).clamp(chars.len(), policy.max_length.max(chars.len()));
    let remaining = target.saturating_sub(chars.len());
    take(all.as_slice(), remaining, &mut chars);

    chars.shuffle(&mut rng);
    // Every byte comes from an ASCII set.
    chars.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_rules() {
        let policy = PasswordPolicy::default();
        assert!(policy.check("abc123"));
        assert!(!policy.check("ab12"), "too short");
        assert!(!policy.check("abcdefg"), "no digit");
        assert!(!policy.check("ABC123"), "no lowercase");
        assert!(!policy.check(&"a1".repeat(40)), "too long");
    }

    #[test]
    fn uppercase_rule_is_optional() {
        let policy = PasswordPolicy {
            include_uppercase: true,
            ..PasswordPolicy::default()
        };
        assert!(!policy.check("abc123"));
        assert!(policy.check("Abc123"));
    }

    #[test]
    fn generated_passwords_satisfy_policy() {
        let policies = [
            PasswordPolicy::default(),
            PasswordPolicy {
                include_uppercase: true,
                min_length: 10,
                ..PasswordPolicy::default()
            },
        ];
        for policy in &policies {
            for _ in 0..20 {
                let password = generate_password(policy);
                assert!(policy.check(&password), "{password} fails {policy:?}");
            }
        }
    }

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("s3cret", 4).unwrap();
        assert_ne!(hash, "s3cret");
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret", "not-a-bcrypt-hash"));
    }
}
