//! Username/password pair protecting the generation endpoint.
//!
//! Both sides are reduced to SHA-256 digests before comparison so the
//! check does not short-circuit on the first differing byte.

use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of a generated fallback password.
pub const GENERATED_PASSWORD_LENGTH: usize = 20;

/// The configured credential pair.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// The configured password. Only exposed so startup can report a
    /// generated one.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// `true` when both fields match exactly.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let user_ok = digest_eq(&self.username, username);
        let pass_ok = digest_eq(&self.password, password);
        user_ok & pass_ok
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Generate a random alphanumeric password.
pub fn generate_password() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(GENERATED_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

fn digest_eq(expected: &str, given: &str) -> bool {
    let a = Sha256::digest(expected.as_bytes());
    let b = Sha256::digest(given.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
