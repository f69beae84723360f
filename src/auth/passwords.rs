use argon2::{
    Algorithm, Argon2, ParamsBuilder, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::auth::config::PasswordCost;
use crate::auth::{AuthError, AuthResult};

const SALT_LEN: usize = 16;
const DECOY_PASSWORD: &str = "decoy-password-for-unknown-accounts";

#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
    decoy_hash: String,
}

impl PasswordService {
    pub fn new(cost: PasswordCost) -> AuthResult<Self> {
        let mut builder = ParamsBuilder::new();
        builder.m_cost(cost.memory_kib);
        builder.t_cost(cost.iterations);
        builder.p_cost(cost.parallelism);
        let params = builder.build().map_err(AuthError::from)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let decoy_hash = hash_with(&argon2, DECOY_PASSWORD)?;
        Ok(Self { argon2, decoy_hash })
    }

    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        hash_with(&self.argon2, password)
    }

    /// Compares through argon2's own verifier, which is constant time in the
    /// derived key.
    pub fn verify_password(&self, password: &str, encoded: &str) -> AuthResult<bool> {
        let parsed = PasswordHash::new(encoded)?;
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(AuthError::from(err)),
        }
    }

    /// Burns the same work as a real verification so a missing account takes
    /// as long to reject as a wrong password.
    pub fn verify_decoy(&self, password: &str) {
        let _ = self.verify_password(password, &self.decoy_hash);
    }
}

fn hash_with(argon2: &Argon2<'static>, password: &str) -> AuthResult<String> {
    let mut salt_bytes = [0u8; SALT_LEN];
    OsRng.try_fill_bytes(&mut salt_bytes)?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(AuthError::from)?;
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(AuthError::from)?
        .to_string();
    Ok(hash)
}
