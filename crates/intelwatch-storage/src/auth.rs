use crate::error::Result;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generate a cryptographically random secret, e.g. for a JWT signing key
/// when none is configured.
pub fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

/// Hash a password with bcrypt.
pub fn hash_password(password: &str) -> Result<String> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

/// Verify a password against a stored bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_secret_is_random() {
        let a = generate_secret();
        let b = generate_secret();
        assert_ne!(a, b);
        assert_eq!(a.len(), 48);
    }

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("changeme").unwrap();
        assert!(verify_password("changeme", &hash));
        assert!(!verify_password("wrong", &hash));
    }
}
