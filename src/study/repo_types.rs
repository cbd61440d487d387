use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;

use crate::models::{Label, Model, RecordRef};

/// Study record in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Study {
    pub id: i64,
    pub name: String,           // free text, any length
    pub encryption_key: String, // 32 chars, encrypts uploaded study data
    pub deleted: bool,
}

impl Model for Study {
    const KIND: &'static str = "Study";

    fn record(&self) -> RecordRef {
        RecordRef::Study(self.id)
    }

    fn set_deleted(&mut self) {
        self.deleted = true;
    }

    fn label(&self) -> Label<'_> {
        Label::Named(&self.name)
    }

    fn as_native_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "encryption_key": self.encryption_key,
            "deleted": self.deleted,
        })
    }
}
