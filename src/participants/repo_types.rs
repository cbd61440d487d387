use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;

use crate::auth::Credentials;
use crate::error::{ModelError, ModelResult};
use crate::models::{Label, Model, RecordRef};

pub const PARTICIPANT_ID_LEN: usize = 8;
pub const DEVICE_ID_MAX_LEN: usize = 256;

/// Eight characters from `1-9a-z`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
#[serde(try_from = "String", into = "String")]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn parse(raw: &str) -> ModelResult<Self> {
        lazy_static! {
            static ref ID_RE: Regex = Regex::new(r"^[1-9a-z]{8}$").unwrap();
        }
        if !ID_RE.is_match(raw) {
            return Err(ModelError::constraint(format!(
                "invalid participant id {raw:?}"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ParticipantId {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ParticipantId> for String {
    fn from(id: ParticipantId) -> Self {
        id.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mobile platform a participant's device runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "os_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OsType {
    Ios,
    Android,
}

/// Participant record in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Participant {
    pub patient_id: ParticipantId,
    #[sqlx(flatten)]
    pub credentials: Credentials,
    pub device_id: Option<String>, // None until a device registers
    pub os_type: Option<OsType>,
    pub study_id: i64,
    pub deleted: bool,
}

impl Model for Participant {
    const KIND: &'static str = "Participant";

    fn record(&self) -> RecordRef {
        RecordRef::Participant(self.patient_id.clone())
    }

    fn set_deleted(&mut self) {
        self.deleted = true;
    }

    fn label(&self) -> Label<'_> {
        Label::OwnedByStudy {
            key: self.patient_id.to_string(),
            study_id: Some(self.study_id),
        }
    }

    fn as_native_json(&self) -> Value {
        json!({
            "patient_id": self.patient_id,
            "password": self.credentials.password,
            "salt": self.credentials.salt,
            "device_id": self.device_id,
            "os_type": self.os_type,
            "study_id": self.study_id,
            "deleted": self.deleted,
        })
    }
}
