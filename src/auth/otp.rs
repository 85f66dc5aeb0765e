use rand::Rng;
use sha2::{Digest, Sha256};

pub const OTP_LENGTH: usize = 6;

pub fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{n:06}")
}

/// Codes are stored hashed and bound to the address they were sent to.
pub fn hash_code(identifier: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identifier.as_bytes());
    hasher.update(b":");
    hasher.update(code.trim().as_bytes());
    hex::encode(hasher.finalize())
}

pub fn is_well_formed(code: &str) -> bool {
    let code = code.trim();
    code.len() == OTP_LENGTH && code.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_code_shape() {
        for _ in 0..50 {
            assert!(is_well_formed(&generate_code()));
        }
    }

    #[test]
    fn test_hash_binds_identifier() {
        let a = hash_code("a@x.com", "123456");
        assert_eq!(a, hash_code("a@x.com", " 123456 "));
        assert_ne!(a, hash_code("b@x.com", "123456"));
        assert_eq!(a.len(), 64);
    }
}
