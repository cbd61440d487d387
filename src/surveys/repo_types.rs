use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;

use crate::error::{ModelError, ModelResult};
use crate::models::{Label, Model, RecordRef};

/// Kind of survey; the app picks its interface from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "survey_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SurveyType {
    AudioSurvey,
    #[default]
    TrackingSurvey,
    ImageSurvey,
}

impl SurveyType {
    pub const ALL: [SurveyType; 3] = [
        SurveyType::AudioSurvey,
        SurveyType::TrackingSurvey,
        SurveyType::ImageSurvey,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SurveyType::AudioSurvey => "audio_survey",
            SurveyType::TrackingSurvey => "tracking_survey",
            SurveyType::ImageSurvey => "image_survey",
        }
    }
}

impl fmt::Display for SurveyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SurveyType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SurveyType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ModelError::constraint(format!("unsupported survey type {s:?}")))
    }
}

/// Trigger times per weekday, Sunday first, in seconds past midnight.
/// Inner lists need not be sorted or unique.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timings(pub [Vec<u32>; 7]);

impl Timings {
    /// Times for `weekday` (0 is Sunday), or `None` past Saturday.
    pub fn day(&self, weekday: usize) -> Option<&[u32]> {
        self.0.get(weekday).map(Vec::as_slice)
    }
}

impl TryFrom<Value> for Timings {
    type Error = ModelError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        serde_json::from_value(value).map_err(|e| {
            ModelError::constraint(format!("timings must be 7 lists of seconds: {e}"))
        })
    }
}

/// Survey record in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Survey {
    pub id: i64,
    pub survey_type: SurveyType,
    pub content: Value,  // list of question definitions
    pub settings: Value, // object
    pub timings: Timings,
    pub study_id: Option<i64>, // None once removed from its study
    pub deleted: bool,
}

/// Fields a caller supplies when creating a survey.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSurvey {
    pub study_id: i64,
    pub survey_type: SurveyType,
    pub content: Value,
    pub settings: Value,
    pub timings: Timings,
}

impl NewSurvey {
    pub fn new(study_id: i64, survey_type: SurveyType) -> Self {
        Self {
            study_id,
            survey_type,
            content: json!([]),
            settings: json!({}),
            timings: Timings::default(),
        }
    }
}

pub(crate) fn validate_json_shape(content: &Value, settings: &Value) -> ModelResult<()> {
    if !content.is_array() {
        return Err(ModelError::constraint("survey content must be a JSON list"));
    }
    if !settings.is_object() {
        return Err(ModelError::constraint("survey settings must be a JSON object"));
    }
    Ok(())
}

/// Raw survey row; `timings` is re-checked on the way out of the database.
#[derive(Debug, FromRow)]
pub struct SurveyRow {
    pub id: i64,
    pub survey_type: SurveyType,
    pub content: Value,
    pub settings: Value,
    pub timings: Value,
    pub study_id: Option<i64>,
    pub deleted: bool,
}

impl TryFrom<SurveyRow> for Survey {
    type Error = ModelError;

    fn try_from(r: SurveyRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            survey_type: r.survey_type,
            content: r.content,
            settings: r.settings,
            timings: Timings::try_from(r.timings)?,
            study_id: r.study_id,
            deleted: r.deleted,
        })
    }
}

impl Model for Survey {
    const KIND: &'static str = "Survey";

    fn record(&self) -> RecordRef {
        RecordRef::Survey(self.id)
    }

    fn set_deleted(&mut self) {
        self.deleted = true;
    }

    fn label(&self) -> Label<'_> {
        Label::OwnedByStudy {
            key: self.id.to_string(),
            study_id: self.study_id,
        }
    }

    fn as_native_json(&self) -> Value {
        json!({
            "id": self.id,
            "survey_type": self.survey_type,
            "content": self.content,
            "settings": self.settings,
            "timings": self.timings,
            "study_id": self.study_id,
            "deleted": self.deleted,
        })
    }
}
