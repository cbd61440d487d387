use std::borrow::Cow;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::{info, warn};

use super::password::{
    compare_password, device_hash, generate_easy_alphanumeric_string, generate_random_string,
    hash_with_new_salt, is_standard_base64, is_url_safe_base64, EASY_STRING_LEN, HASH_LEN,
    SALT_LEN,
};
use crate::error::{ModelError, ModelResult};
use crate::store::Store;

pub const ACCESS_KEY_LEN: usize = 64;

/// Stored password hash and the salt it was derived with. The two fields
/// are only ever replaced together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Credentials {
    pub password: String,
    pub salt: String,
}

impl Credentials {
    pub fn validate_shape(&self) -> ModelResult<()> {
        let ok = |v: &str, len: usize| v.len() == len && is_url_safe_base64(v);
        if !ok(&self.password, HASH_LEN) || !ok(&self.salt, SALT_LEN) {
            return Err(ModelError::constraint("malformed password hash or salt"));
        }
        Ok(())
    }
}

/// How a concrete user kind turns a typed password into KDF input.
#[derive(Clone, Copy)]
pub struct HashScheme {
    pub name: &'static str,
    prepare: fn(&str) -> Cow<'_, str>,
}

fn as_typed(plain: &str) -> Cow<'_, str> {
    Cow::Borrowed(plain)
}

fn as_device_hash(plain: &str) -> Cow<'_, str> {
    Cow::Owned(device_hash(plain))
}

impl HashScheme {
    /// Browser logins: the KDF sees the password as typed.
    pub const WEB: HashScheme = HashScheme {
        name: "web",
        prepare: as_typed,
    };
    /// App logins: the device SHA-256s the password before sending it.
    pub const MOBILE: HashScheme = HashScheme {
        name: "mobile",
        prepare: as_device_hash,
    };

    pub fn generate(&self, plain: &str) -> ModelResult<Credentials> {
        let (password, salt) = hash_with_new_salt(&(self.prepare)(plain))?;
        Ok(Credentials { password, salt })
    }

    pub fn matches(&self, credentials: &Credentials, plain: &str) -> bool {
        compare_password(&(self.prepare)(plain), &credentials.salt, &credentials.password)
    }
}

/// Password behaviour shared by participants and researchers. Each kind
/// picks its [`HashScheme`] and says how its credentials are persisted.
#[async_trait]
pub trait PasswordUser: Send + Sync {
    const SCHEME: HashScheme;

    fn credentials(&self) -> &Credentials;
    fn replace_credentials(&mut self, credentials: Credentials);

    /// Writes hash and salt in one statement.
    async fn persist_credentials(
        &self,
        store: &dyn Store,
        credentials: &Credentials,
    ) -> ModelResult<()>;

    fn generate_hash_and_salt(&self, plain: &str) -> ModelResult<Credentials> {
        Self::SCHEME.generate(plain)
    }

    async fn set_password(&mut self, store: &dyn Store, plain: &str) -> ModelResult<()> {
        let credentials = self.generate_hash_and_salt(plain)?;
        self.persist_credentials(store, &credentials).await?;
        self.replace_credentials(credentials);
        Ok(())
    }

    /// Sets a random, easy-to-transcribe password and hands the plaintext
    /// back to the caller, who must deliver it.
    async fn reset_password(&mut self, store: &dyn Store) -> ModelResult<String> {
        let plain = generate_easy_alphanumeric_string(EASY_STRING_LEN);
        self.set_password(store, &plain).await?;
        info!(scheme = Self::SCHEME.name, "password reset");
        Ok(plain)
    }

    fn validate_password(&self, candidate: &str) -> bool {
        let ok = Self::SCHEME.matches(self.credentials(), candidate);
        if !ok {
            warn!(scheme = Self::SCHEME.name, "password mismatch");
        }
        ok
    }
}

/// Programmatic-access key pair. Only the hash of the secret is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKey {
    pub access_key_id: String,
    pub access_key_secret: String,
    pub access_key_secret_salt: String,
}

impl AccessKey {
    /// Generates a new id and secret. The plaintext secret is returned here
    /// and nowhere else.
    pub fn issue() -> ModelResult<(AccessKey, String)> {
        let access_key_id = generate_random_string(ACCESS_KEY_LEN);
        let secret = generate_random_string(ACCESS_KEY_LEN);
        let stored = HashScheme::WEB.generate(&secret)?;
        Ok((
            AccessKey {
                access_key_id,
                access_key_secret: stored.password,
                access_key_secret_salt: stored.salt,
            },
            secret,
        ))
    }

    pub fn validate(&self, candidate_secret: &str) -> bool {
        compare_password(
            candidate_secret,
            &self.access_key_secret_salt,
            &self.access_key_secret,
        )
    }

    pub fn validate_shape(&self) -> ModelResult<()> {
        if self.access_key_id.len() > ACCESS_KEY_LEN || !is_standard_base64(&self.access_key_id) {
            return Err(ModelError::constraint("malformed access key id"));
        }
        Credentials {
            password: self.access_key_secret.clone(),
            salt: self.access_key_secret_salt.clone(),
        }
        .validate_shape()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemes_validate_their_own_hashes() {
        let web = HashScheme::WEB.generate("letmein1").unwrap();
        assert!(web.validate_shape().is_ok());
        assert!(HashScheme::WEB.matches(&web, "letmein1"));
        assert!(!HashScheme::MOBILE.matches(&web, "letmein1"));

        let mobile = HashScheme::MOBILE.generate("letmein1").unwrap();
        assert!(HashScheme::MOBILE.matches(&mobile, "letmein1"));
        assert!(!HashScheme::WEB.matches(&mobile, "letmein1"));
    }

    #[test]
    fn mobile_scheme_stores_the_device_form() {
        let creds = HashScheme::MOBILE.generate("hunter22").unwrap();
        assert!(compare_password(&device_hash("hunter22"), &creds.salt, &creds.password));
        assert!(!compare_password("hunter22", &creds.salt, &creds.password));
    }

    #[test]
    fn issued_access_key_validates_only_its_secret() {
        let (key, secret) = AccessKey::issue().unwrap();
        assert_eq!(key.access_key_id.len(), ACCESS_KEY_LEN);
        assert_eq!(secret.len(), ACCESS_KEY_LEN);
        assert!(key.validate_shape().is_ok());
        assert!(key.validate(&secret));
        assert!(!key.validate(&key.access_key_id));

        let (next, _) = AccessKey::issue().unwrap();
        assert_ne!(key.access_key_id, next.access_key_id);
        assert!(!next.validate(&secret));
    }

    #[test]
    fn shape_check_rejects_truncated_hash() {
        let mut creds = HashScheme::WEB.generate("pw").unwrap();
        creds.password.truncate(10);
        assert!(matches!(
            creds.validate_shape(),
            Err(ModelError::ConstraintViolation(_))
        ));
    }
}
