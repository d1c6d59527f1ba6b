use tracing::error;

/// bcrypt work factor. Matches what the original deployment used, and is
/// the crate default.
pub const HASH_COST: u32 = bcrypt::DEFAULT_COST;

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    bcrypt::hash(plain, HASH_COST).map_err(|e| {
        error!(error = %e, "bcrypt hash error");
        anyhow::anyhow!(e.to_string())
    })
}

/// Verifies a candidate against a stored hash. bcrypt's comparison is
/// constant-time on the digest. Errors only when the stored hash is
/// malformed.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    bcrypt::verify(plain, hash).map_err(|e| {
        error!(error = %e, "bcrypt verify error");
        anyhow::anyhow!(e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert_ne!(hash, password);
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn cost_factor_is_twelve() {
        assert_eq!(HASH_COST, 12);
        let hash = hash_password("hunter2secret").expect("hashing should succeed");
        assert!(hash.contains("$12$"));
    }
}
