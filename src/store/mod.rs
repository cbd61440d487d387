//! Persistence seam for the data model. Every method is one statement or
//! one transaction, so multi-column writes are never observed half-done.

use async_trait::async_trait;

use crate::auth::{AccessKey, Credentials};
use crate::device_settings::DeviceSettings;
use crate::error::ModelResult;
use crate::models::RecordRef;
use crate::participants::{OsType, Participant, ParticipantId};
use crate::researchers::Researcher;
use crate::study::Study;
use crate::surveys::{NewSurvey, Survey, SurveyType};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn mark_deleted(&self, record: &RecordRef) -> ModelResult<()>;

    // ---- studies ----

    /// Inserts the study and its device settings together. `settings.id`
    /// and `settings.study_id` are assigned by the store.
    async fn create_study(
        &self,
        name: &str,
        encryption_key: &str,
        settings: &DeviceSettings,
    ) -> ModelResult<(Study, DeviceSettings)>;
    async fn find_study(&self, id: i64) -> ModelResult<Option<Study>>;

    async fn add_study_researcher(&self, study_id: i64, researcher_id: i64) -> ModelResult<()>;
    async fn remove_study_researcher(&self, study_id: i64, researcher_id: i64) -> ModelResult<()>;
    async fn study_researcher_ids(&self, study_id: i64) -> ModelResult<Vec<i64>>;
    async fn researcher_study_ids(&self, researcher_id: i64) -> ModelResult<Vec<i64>>;

    // ---- surveys ----

    async fn insert_survey(&self, new: &NewSurvey) -> ModelResult<Survey>;
    async fn update_survey(&self, survey: &Survey) -> ModelResult<()>;
    async fn attach_survey(&self, study_id: i64, survey_id: i64) -> ModelResult<()>;
    /// Clears the survey's study only if it is currently `study_id`;
    /// returns whether anything changed.
    async fn detach_survey(&self, study_id: i64, survey_id: i64) -> ModelResult<bool>;
    async fn find_survey(&self, id: i64) -> ModelResult<Option<Survey>>;
    async fn list_surveys(&self, study_id: i64) -> ModelResult<Vec<Survey>>;
    async fn survey_ids(&self, study_id: i64, survey_type: SurveyType) -> ModelResult<Vec<i64>>;

    // ---- participants ----

    async fn insert_participant(&self, participant: &Participant) -> ModelResult<()>;
    async fn find_participant(&self, id: &ParticipantId) -> ModelResult<Option<Participant>>;
    async fn list_participants(&self, study_id: i64) -> ModelResult<Vec<Participant>>;
    async fn set_participant_credentials(
        &self,
        id: &ParticipantId,
        credentials: &Credentials,
    ) -> ModelResult<()>;
    async fn set_participant_device(
        &self,
        id: &ParticipantId,
        device_id: Option<&str>,
    ) -> ModelResult<()>;
    async fn set_participant_os_type(
        &self,
        id: &ParticipantId,
        os_type: Option<OsType>,
    ) -> ModelResult<()>;

    // ---- researchers ----

    async fn insert_researcher(
        &self,
        username: &str,
        credentials: &Credentials,
    ) -> ModelResult<Researcher>;
    async fn find_researcher(&self, id: i64) -> ModelResult<Option<Researcher>>;
    async fn find_researcher_by_username(&self, username: &str)
        -> ModelResult<Option<Researcher>>;
    async fn set_researcher_credentials(
        &self,
        id: i64,
        credentials: &Credentials,
    ) -> ModelResult<()>;
    async fn set_researcher_admin(&self, id: i64) -> ModelResult<()>;
    async fn set_access_key(&self, id: i64, key: &AccessKey) -> ModelResult<()>;

    // ---- device settings ----

    async fn find_device_settings(&self, study_id: i64) -> ModelResult<Option<DeviceSettings>>;
    async fn update_device_settings(&self, settings: &DeviceSettings) -> ModelResult<()>;
}
