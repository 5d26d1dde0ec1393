//! Unsalted SHA-256 password digests.
//!
//! Stored hashes are lowercase hex of `sha256(password)`. There is no per-user
//! salt: equal passwords produce equal digests. Existing records depend on this
//! format, so changing it requires a migration of every stored hash.

use sha2::{Digest, Sha256};

pub fn hash_password(plain: &str) -> String {
    let digest = Sha256::digest(plain.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn verify_password(plain: &str, hash: &str) -> bool {
    hash_password(plain).as_bytes() == hash.as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password);
        assert!(verify_password(password, &hash));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hash = hash_password("correct-horse-battery-staple");
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn hash_is_deterministic_and_unsalted() {
        assert_eq!(hash_password("secret1"), hash_password("secret1"));
        assert_ne!(hash_password("secret1"), hash_password("secret2"));
    }

    #[test]
    fn hash_matches_known_sha256_hex() {
        assert_eq!(
            hash_password("password"),
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
    }

    #[test]
    fn verify_rejects_malformed_hash() {
        assert!(!verify_password("anything", "not-a-valid-hash"));
    }
}
