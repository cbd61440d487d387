use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;

use crate::auth::{AccessKey, Credentials};
use crate::error::{ModelError, ModelResult};
use crate::models::{Label, Model, RecordRef};

pub const USERNAME_MAX_LEN: usize = 32;

/// Researcher record in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Researcher {
    pub id: i64,
    pub username: String, // unique, plain text
    pub credentials: Credentials,
    pub admin: bool,
    pub access_key: Option<AccessKey>, // None until first issued
    pub deleted: bool,
}

pub(crate) fn validate_username(username: &str) -> ModelResult<()> {
    if username.is_empty() || username.chars().count() > USERNAME_MAX_LEN {
        return Err(ModelError::constraint(format!(
            "username must be 1..={USERNAME_MAX_LEN} characters"
        )));
    }
    Ok(())
}

/// Raw researcher row; the three access-key columns are all set or all null.
#[derive(Debug, FromRow)]
pub struct ResearcherRow {
    pub id: i64,
    pub username: String,
    #[sqlx(flatten)]
    pub credentials: Credentials,
    pub admin: bool,
    pub access_key_id: Option<String>,
    pub access_key_secret: Option<String>,
    pub access_key_secret_salt: Option<String>,
    pub deleted: bool,
}

impl TryFrom<ResearcherRow> for Researcher {
    type Error = ModelError;

    fn try_from(r: ResearcherRow) -> Result<Self, Self::Error> {
        let access_key = match (r.access_key_id, r.access_key_secret, r.access_key_secret_salt) {
            (Some(access_key_id), Some(access_key_secret), Some(access_key_secret_salt)) => {
                Some(AccessKey {
                    access_key_id,
                    access_key_secret,
                    access_key_secret_salt,
                })
            }
            (None, None, None) => None,
            _ => {
                return Err(ModelError::constraint(format!(
                    "researcher {} has a partial access key",
                    r.id
                )))
            }
        };
        Ok(Self {
            id: r.id,
            username: r.username,
            credentials: r.credentials,
            admin: r.admin,
            access_key,
            deleted: r.deleted,
        })
    }
}

impl Model for Researcher {
    const KIND: &'static str = "Researcher";

    fn record(&self) -> RecordRef {
        RecordRef::Researcher(self.id)
    }

    fn set_deleted(&mut self) {
        self.deleted = true;
    }

    fn label(&self) -> Label<'_> {
        Label::Keyed(self.id.to_string())
    }

    fn as_native_json(&self) -> Value {
        let key = self.access_key.as_ref();
        json!({
            "id": self.id,
            "username": self.username,
            "password": self.credentials.password,
            "salt": self.credentials.salt,
            "admin": self.admin,
            "access_key_id": key.map(|k| &k.access_key_id),
            "access_key_secret": key.map(|k| &k.access_key_secret),
            "access_key_secret_salt": key.map(|k| &k.access_key_secret_salt),
            "deleted": self.deleted,
        })
    }
}
