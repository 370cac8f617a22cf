/// Password hashing and policy enforcement
///
/// Passwords are hashed with Argon2id using tunable cost parameters and a
/// random 16-byte salt per hash. The PHC string output embeds the parameters,
/// so verification keeps working after the cost is raised.
///
/// # Defaults
///
/// - **Memory**: 64 MB (65536 KB)
/// - **Iterations**: 3 passes
/// - **Parallelism**: 4 lanes
/// - **Output**: 32-byte hash
///
/// # Example
///
/// ```
/// use corebooks_identity::auth::password::{hash_password, verify_password, HashingParams};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let params = HashingParams::default();
/// let hash = hash_password("Secret123!", &params)?;
///
/// assert!(verify_password("Secret123!", &hash)?);
/// assert!(!verify_password("wrong", &hash)?);
/// # Ok(())
/// # }
/// ```

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder, Version,
};

use crate::auth::token::generate_secret;

/// Error type for password hashing operations
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// Failed to hash password
    #[error("Failed to hash password: {0}")]
    HashError(String),

    /// Failed to verify password
    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    /// Invalid password hash format
    #[error("Invalid password hash format: {0}")]
    InvalidHash(String),
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingParams {
    /// Memory cost in KiB
    pub memory_kib: u32,

    /// Number of passes
    pub iterations: u32,

    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for HashingParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl HashingParams {
    /// Minimal parameters for tests; never use in production
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Password strength rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    /// Minimum number of characters
    pub min_length: usize,

    /// Require at least one uppercase letter
    pub require_uppercase: bool,

    /// Require at least one lowercase letter
    pub require_lowercase: bool,

    /// Require at least one digit
    pub require_digit: bool,

    /// Require at least one non-alphanumeric character
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: false,
            require_digit: true,
            require_special: true,
        }
    }
}

impl PasswordPolicy {
    /// Checks a candidate password against the policy
    ///
    /// Returns the first violated rule as a human-readable message.
    ///
    /// # Example
    ///
    /// ```
    /// use corebooks_identity::auth::password::PasswordPolicy;
    ///
    /// let policy = PasswordPolicy::default();
    /// assert!(policy.validate("Secret123!").is_ok());
    /// assert!(policy.validate("short").is_err());
    /// ```
    pub fn validate(&self, password: &str) -> Result<(), String> {
        if password.chars().count() < self.min_length {
            return Err(format!(
                "Password must be at least {} characters long",
                self.min_length
            ));
        }

        if self.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
            return Err("Password must contain at least one uppercase letter".to_string());
        }

        if self.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
            return Err("Password must contain at least one lowercase letter".to_string());
        }

        if self.require_digit && !password.chars().any(|c| c.is_numeric()) {
            return Err("Password must contain at least one digit".to_string());
        }

        if self.require_special && !password.chars().any(|c| !c.is_alphanumeric()) {
            return Err("Password must contain at least one special character".to_string());
        }

        Ok(())
    }
}

/// Hashes a password using Argon2id
///
/// # Returns
///
/// PHC string format hash, e.g.
/// ```text
/// $argon2id$v=19$m=65536,t=3,p=4$c2FsdHNhbHRzYWx0$hash...
/// ```
///
/// # Errors
///
/// Returns `PasswordError::HashError` if the parameters are rejected or
/// hashing fails.
pub fn hash_password(password: &str, params: &HashingParams) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let params = ParamsBuilder::new()
        .m_cost(params.memory_kib)
        .t_cost(params.iterations)
        .p_cost(params.parallelism)
        .output_len(32)
        .build()
        .map_err(|e| PasswordError::HashError(format!("Invalid parameters: {}", e)))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashError(format!("Hash generation failed: {}", e)))?;

    Ok(password_hash.to_string())
}

/// Hash of a random secret at the given cost
///
/// Verifying against it takes as long as verifying a real credential, so a
/// login for an unknown account costs the same as one with a wrong password.
pub fn decoy_hash(params: &HashingParams) -> Result<String, PasswordError> {
    hash_password(&generate_secret(32), params)
}

/// Verifies a password against a PHC hash in constant time
///
/// # Returns
///
/// `Ok(true)` on match, `Ok(false)` on mismatch
///
/// # Errors
///
/// Returns an error if the stored hash cannot be parsed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| PasswordError::InvalidHash(format!("Failed to parse hash: {}", e)))?;

    // Parameters come from the hash itself
    let argon2 = Argon2::default();

    match argon2.verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerifyError(format!("Verification failed: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> HashingParams {
        HashingParams::insecure_fast()
    }

    #[test]
    fn test_hash_password_embeds_params() {
        let hash = hash_password("test_password_123", &HashingParams::default())
            .expect("Hash should succeed");

        assert!(hash.starts_with("$argon2id$"));
        assert!(hash.contains("v=19"));
        assert!(hash.contains("m=65536"));
        assert!(hash.contains("t=3"));
        assert!(hash.contains("p=4"));
    }

    #[test]
    fn test_decoy_hash_matches_cost_and_nothing_else() {
        let decoy = decoy_hash(&fast()).unwrap();
        assert!(decoy.contains("m=8"));
        assert!(!verify_password("Secret123!", &decoy).unwrap());
        assert!(!verify_password("", &decoy).unwrap());
    }

    #[test]
    fn test_hash_password_cost_is_tunable() {
        let hash = hash_password("pw", &fast()).expect("Hash should succeed");
        assert!(hash.contains("m=8"));
        assert!(hash.contains("t=1"));
        assert!(hash.contains("p=1"));
    }

    #[test]
    fn test_hash_password_produces_different_salts() {
        let hash1 = hash_password("same_password", &fast()).unwrap();
        let hash2 = hash_password("same_password", &fast()).unwrap();
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_verify_password() {
        let hash = hash_password("correct_password", &fast()).unwrap();

        assert!(verify_password("correct_password", &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
        assert!(!verify_password("", &hash).unwrap());
    }

    #[test]
    fn test_verify_password_invalid_hash() {
        assert!(verify_password("password", "invalid_hash").is_err());
        assert!(verify_password("password", "$argon2id$invalid").is_err());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = HashingParams {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        };
        assert!(matches!(
            hash_password("pw", &params),
            Err(PasswordError::HashError(_))
        ));
    }

    #[test]
    fn test_policy_default() {
        let policy = PasswordPolicy::default();

        assert!(policy.validate("Secret123!").is_ok());
        assert!(policy
            .validate("Sh0rt!")
            .unwrap_err()
            .contains("at least 8 characters"));
        assert!(policy
            .validate("lowercase1!")
            .unwrap_err()
            .contains("uppercase letter"));
        assert!(policy.validate("NoDigits!").unwrap_err().contains("digit"));
        assert!(policy
            .validate("NoSpecial123")
            .unwrap_err()
            .contains("special character"));
    }

    #[test]
    fn test_policy_length_only() {
        let policy = PasswordPolicy {
            min_length: 12,
            require_uppercase: false,
            require_lowercase: false,
            require_digit: false,
            require_special: false,
        };

        assert!(policy.validate("aaaaaaaaaaaa").is_ok());
        assert!(policy.validate("aaaaaaaaaaa").is_err());
    }

    #[test]
    fn test_policy_counts_characters_not_bytes() {
        let policy = PasswordPolicy {
            min_length: 4,
            require_uppercase: false,
            require_lowercase: false,
            require_digit: false,
            require_special: false,
        };

        // 3 characters, 9 bytes
        assert!(policy.validate("密码パ").is_err());
    }

    #[test]
    fn test_policy_lowercase_rule() {
        let policy = PasswordPolicy {
            require_lowercase: true,
            ..PasswordPolicy::default()
        };
        assert!(policy
            .validate("UPPERCASE1!")
            .unwrap_err()
            .contains("lowercase letter"));
    }
}
