//! 密码哈希与校验（argon2，PHC 字符串格式）

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use hospital_core::{HospitalError, Result};
use rand_core::OsRng;
use std::sync::OnceLock;

/// 空密码的哈希，用户不存在时仍做一次完整校验，避免通过耗时区分用户是否存在
fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| hash_password("").unwrap_or_default())
}

/// 以随机盐计算密码哈希
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HospitalError::Internal(format!("password hashing failed: {}", e)))
}

/// 校验密码；`stored` 为 `None` 时对占位哈希校验并返回 false
pub fn verify_password(password: &str, stored: Option<&str>) -> bool {
    let found = stored.is_some();
    let stored = match stored {
        Some(hash) => hash,
        None => dummy_hash(),
    };

    let matches = match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    };
    found && matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", Some(&hash)));
        assert!(!verify_password("wrong", Some(&hash)));
    }

    #[test]
    fn test_missing_user_never_verifies() {
        assert!(!verify_password("", None));
        assert!(!verify_password("anything", None));
        assert!(!verify_password("x", Some("not-a-phc-string")));
    }
}
