use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::Store;
use crate::auth::{AccessKey, Credentials};
use crate::device_settings::DeviceSettings;
use crate::error::{ModelError, ModelResult};
use crate::models::RecordRef;
use crate::participants::{OsType, Participant, ParticipantId, DEVICE_ID_MAX_LEN};
use crate::researchers::Researcher;
use crate::study::Study;
use crate::surveys::{NewSurvey, Survey, SurveyType};

#[derive(Default)]
struct Tables {
    next_id: i64,
    studies: BTreeMap<i64, Study>,
    surveys: BTreeMap<i64, Survey>,
    participants: BTreeMap<ParticipantId, Participant>,
    researchers: BTreeMap<i64, Researcher>,
    device_settings: BTreeMap<i64, DeviceSettings>,
    // (study_id, researcher_id)
    study_researchers: BTreeSet<(i64, i64)>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn require_study(&self, study_id: i64) -> ModelResult<()> {
        if self.studies.contains_key(&study_id) {
            Ok(())
        } else {
            Err(ModelError::constraint(format!("study {study_id} does not exist")))
        }
    }
}

/// Process-local [`Store`] with the same constraints as the Postgres
/// schema. One lock guards all tables, so every call is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_device_id(device_id: &str) -> ModelResult<()> {
    if device_id.chars().count() > DEVICE_ID_MAX_LEN {
        return Err(ModelError::constraint(format!(
            "device id longer than {DEVICE_ID_MAX_LEN} characters"
        )));
    }
    Ok(())
}

fn missing(what: &str, key: impl std::fmt::Display) -> ModelError {
    ModelError::not_found(format!("{what} {key}"))
}

#[async_trait]
impl Store for MemoryStore {
    async fn mark_deleted(&self, record: &RecordRef) -> ModelResult<()> {
        let mut t = self.tables.lock().await;
        let flag = match record {
            RecordRef::Study(id) => t.studies.get_mut(id).map(|r| &mut r.deleted),
            RecordRef::Survey(id) => t.surveys.get_mut(id).map(|r| &mut r.deleted),
            RecordRef::Participant(id) => t.participants.get_mut(id).map(|r| &mut r.deleted),
            RecordRef::Researcher(id) => t.researchers.get_mut(id).map(|r| &mut r.deleted),
            RecordRef::DeviceSettings(id) => t.device_settings.get_mut(id).map(|r| &mut r.deleted),
        };
        match flag {
            Some(flag) => {
                *flag = true;
                Ok(())
            }
            None => Err(missing("record", format!("{record:?}"))),
        }
    }

    async fn create_study(
        &self,
        name: &str,
        encryption_key: &str,
        settings: &DeviceSettings,
    ) -> ModelResult<(Study, DeviceSettings)> {
        let mut t = self.tables.lock().await;
        let study = Study {
            id: t.next_id(),
            name: name.to_string(),
            encryption_key: encryption_key.to_string(),
            deleted: false,
        };
        let mut settings = settings.clone();
        settings.id = t.next_id();
        settings.study_id = study.id;
        t.studies.insert(study.id, study.clone());
        t.device_settings.insert(settings.id, settings.clone());
        Ok((study, settings))
    }

    async fn find_study(&self, id: i64) -> ModelResult<Option<Study>> {
        Ok(self.tables.lock().await.studies.get(&id).cloned())
    }

    async fn add_study_researcher(&self, study_id: i64, researcher_id: i64) -> ModelResult<()> {
        let mut t = self.tables.lock().await;
        t.require_study(study_id)?;
        if !t.researchers.contains_key(&researcher_id) {
            return Err(ModelError::constraint(format!(
                "researcher {researcher_id} does not exist"
            )));
        }
        t.study_researchers.insert((study_id, researcher_id));
        Ok(())
    }

    async fn remove_study_researcher(&self, study_id: i64, researcher_id: i64) -> ModelResult<()> {
        self.tables
            .lock()
            .await
            .study_researchers
            .remove(&(study_id, researcher_id));
        Ok(())
    }

    async fn study_researcher_ids(&self, study_id: i64) -> ModelResult<Vec<i64>> {
        let t = self.tables.lock().await;
        Ok(t.study_researchers
            .iter()
            .filter(|(s, _)| *s == study_id)
            .map(|(_, r)| *r)
            .collect())
    }

    async fn researcher_study_ids(&self, researcher_id: i64) -> ModelResult<Vec<i64>> {
        let t = self.tables.lock().await;
        Ok(t.study_researchers
            .iter()
            .filter(|(_, r)| *r == researcher_id)
            .map(|(s, _)| *s)
            .collect())
    }

    async fn insert_survey(&self, new: &NewSurvey) -> ModelResult<Survey> {
        let mut t = self.tables.lock().await;
        t.require_study(new.study_id)?;
        let survey = Survey {
            id: t.next_id(),
            survey_type: new.survey_type,
            content: new.content.clone(),
            settings: new.settings.clone(),
            timings: new.timings.clone(),
            study_id: Some(new.study_id),
            deleted: false,
        };
        t.surveys.insert(survey.id, survey.clone());
        Ok(survey)
    }

    async fn update_survey(&self, survey: &Survey) -> ModelResult<()> {
        let mut t = self.tables.lock().await;
        let row = t
            .surveys
            .get_mut(&survey.id)
            .ok_or_else(|| missing("survey", survey.id))?;
        row.survey_type = survey.survey_type;
        row.content = survey.content.clone();
        row.settings = survey.settings.clone();
        row.timings = survey.timings.clone();
        Ok(())
    }

    async fn attach_survey(&self, study_id: i64, survey_id: i64) -> ModelResult<()> {
        let mut t = self.tables.lock().await;
        t.require_study(study_id)?;
        let row = t
            .surveys
            .get_mut(&survey_id)
            .ok_or_else(|| missing("survey", survey_id))?;
        row.study_id = Some(study_id);
        Ok(())
    }

    async fn detach_survey(&self, study_id: i64, survey_id: i64) -> ModelResult<bool> {
        let mut t = self.tables.lock().await;
        match t.surveys.get_mut(&survey_id) {
            Some(row) if row.study_id == Some(study_id) => {
                row.study_id = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_survey(&self, id: i64) -> ModelResult<Option<Survey>> {
        Ok(self.tables.lock().await.surveys.get(&id).cloned())
    }

    async fn list_surveys(&self, study_id: i64) -> ModelResult<Vec<Survey>> {
        let t = self.tables.lock().await;
        Ok(t.surveys
            .values()
            .filter(|s| s.study_id == Some(study_id))
            .cloned()
            .collect())
    }

    async fn survey_ids(&self, study_id: i64, survey_type: SurveyType) -> ModelResult<Vec<i64>> {
        let t = self.tables.lock().await;
        Ok(t.surveys
            .values()
            .filter(|s| s.study_id == Some(study_id) && s.survey_type == survey_type)
            .map(|s| s.id)
            .collect())
    }

    async fn insert_participant(&self, participant: &Participant) -> ModelResult<()> {
        participant.credentials.validate_shape()?;
        if let Some(device_id) = &participant.device_id {
            check_device_id(device_id)?;
        }
        let mut t = self.tables.lock().await;
        t.require_study(participant.study_id)?;
        if t.participants.contains_key(&participant.patient_id) {
            return Err(ModelError::constraint(format!(
                "participant id {} already taken",
                participant.patient_id
            )));
        }
        t.participants
            .insert(participant.patient_id.clone(), participant.clone());
        Ok(())
    }

    async fn find_participant(&self, id: &ParticipantId) -> ModelResult<Option<Participant>> {
        Ok(self.tables.lock().await.participants.get(id).cloned())
    }

    async fn list_participants(&self, study_id: i64) -> ModelResult<Vec<Participant>> {
        let t = self.tables.lock().await;
        Ok(t.participants
            .values()
            .filter(|p| p.study_id == study_id)
            .cloned()
            .collect())
    }

    async fn set_participant_credentials(
        &self,
        id: &ParticipantId,
        credentials: &Credentials,
    ) -> ModelResult<()> {
        credentials.validate_shape()?;
        let mut t = self.tables.lock().await;
        let row = t.participants.get_mut(id).ok_or_else(|| missing("participant", id))?;
        row.credentials = credentials.clone();
        Ok(())
    }

    async fn set_participant_device(
        &self,
        id: &ParticipantId,
        device_id: Option<&str>,
    ) -> ModelResult<()> {
        if let Some(device_id) = device_id {
            check_device_id(device_id)?;
        }
        let mut t = self.tables.lock().await;
        let row = t.participants.get_mut(id).ok_or_else(|| missing("participant", id))?;
        row.device_id = device_id.map(str::to_string);
        Ok(())
    }

    async fn set_participant_os_type(
        &self,
        id: &ParticipantId,
        os_type: Option<OsType>,
    ) -> ModelResult<()> {
        let mut t = self.tables.lock().await;
        let row = t.participants.get_mut(id).ok_or_else(|| missing("participant", id))?;
        row.os_type = os_type;
        Ok(())
    }

    async fn insert_researcher(
        &self,
        username: &str,
        credentials: &Credentials,
    ) -> ModelResult<Researcher> {
        credentials.validate_shape()?;
        let mut t = self.tables.lock().await;
        if t.researchers.values().any(|r| r.username == username) {
            return Err(ModelError::constraint(format!(
                "username {username:?} already taken"
            )));
        }
        let researcher = Researcher {
            id: t.next_id(),
            username: username.to_string(),
            credentials: credentials.clone(),
            admin: false,
            access_key: None,
            deleted: false,
        };
        t.researchers.insert(researcher.id, researcher.clone());
        Ok(researcher)
    }

    async fn find_researcher(&self, id: i64) -> ModelResult<Option<Researcher>> {
        Ok(self.tables.lock().await.researchers.get(&id).cloned())
    }

    async fn find_researcher_by_username(
        &self,
        username: &str,
    ) -> ModelResult<Option<Researcher>> {
        let t = self.tables.lock().await;
        Ok(t.researchers
            .values()
            .find(|r| r.username == username)
            .cloned())
    }

    async fn set_researcher_credentials(
        &self,
        id: i64,
        credentials: &Credentials,
    ) -> ModelResult<()> {
        credentials.validate_shape()?;
        let mut t = self.tables.lock().await;
        let row = t.researchers.get_mut(&id).ok_or_else(|| missing("researcher", id))?;
        row.credentials = credentials.clone();
        Ok(())
    }

    async fn set_researcher_admin(&self, id: i64) -> ModelResult<()> {
        let mut t = self.tables.lock().await;
        let row = t.researchers.get_mut(&id).ok_or_else(|| missing("researcher", id))?;
        row.admin = true;
        Ok(())
    }

    async fn set_access_key(&self, id: i64, key: &AccessKey) -> ModelResult<()> {
        key.validate_shape()?;
        let mut t = self.tables.lock().await;
        let row = t.researchers.get_mut(&id).ok_or_else(|| missing("researcher", id))?;
        row.access_key = Some(key.clone());
        Ok(())
    }

    async fn find_device_settings(&self, study_id: i64) -> ModelResult<Option<DeviceSettings>> {
        let t = self.tables.lock().await;
        Ok(t.device_settings
            .values()
            .find(|s| s.study_id == study_id)
            .cloned())
    }

    async fn update_device_settings(&self, settings: &DeviceSettings) -> ModelResult<()> {
        let mut t = self.tables.lock().await;
        let row = t
            .device_settings
            .get_mut(&settings.id)
            .ok_or_else(|| missing("device settings", settings.id))?;
        if row.study_id != settings.study_id {
            return Err(ModelError::constraint("device settings cannot change study"));
        }
        *row = settings.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let store = MemoryStore::new();
        let err = store
            .insert_survey(&NewSurvey::new(42, SurveyType::TrackingSurvey))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::ConstraintViolation(_)));
        assert!(store.add_study_researcher(1, 2).await.is_err());
    }

    #[tokio::test]
    async fn malformed_credentials_are_rejected() {
        let store = MemoryStore::new();
        let bad = Credentials {
            password: "plaintext!".into(),
            salt: "s".into(),
        };
        let err = store.insert_researcher("ada", &bad).await.unwrap_err();
        assert!(matches!(err, ModelError::ConstraintViolation(_)));

        let good = crate::auth::HashScheme::WEB.generate("pw").unwrap();
        let r = store.insert_researcher("ada", &good).await.unwrap();
        let err = store.set_researcher_credentials(r.id, &bad).await.unwrap_err();
        assert!(matches!(err, ModelError::ConstraintViolation(_)));

        let (mut key, _) = AccessKey::issue().unwrap();
        key.access_key_secret_salt.clear();
        let err = store.set_access_key(r.id, &key).await.unwrap_err();
        assert!(matches!(err, ModelError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn device_ids_are_bounded() {
        let store = MemoryStore::new();
        let (study, _) = store
            .create_study("s", "k", &DeviceSettings::for_study(0))
            .await
            .unwrap();
        let participant = Participant {
            patient_id: ParticipantId::parse("abc12345").unwrap(),
            credentials: crate::auth::HashScheme::MOBILE.generate("pw").unwrap(),
            device_id: None,
            os_type: None,
            study_id: study.id,
            deleted: false,
        };
        store.insert_participant(&participant).await.unwrap();
        let id = &participant.patient_id;

        let longest = "d".repeat(DEVICE_ID_MAX_LEN);
        store.set_participant_device(id, Some(&longest)).await.unwrap();
        let too_long = "d".repeat(DEVICE_ID_MAX_LEN + 1);
        let err = store.set_participant_device(id, Some(&too_long)).await.unwrap_err();
        assert!(matches!(err, ModelError::ConstraintViolation(_)));
        let stored = store.find_participant(id).await.unwrap().unwrap();
        assert_eq!(stored.device_id.as_deref(), Some(longest.as_str()));
    }

    #[tokio::test]
    async fn updating_missing_rows_is_not_found() {
        let store = MemoryStore::new();
        let err = store.set_researcher_admin(99).await.unwrap_err();
        assert!(matches!(err, ModelError::NotFound(_)));
        let err = store.mark_deleted(&RecordRef::Survey(5)).await.unwrap_err();
        assert!(matches!(err, ModelError::NotFound(_)));
    }
}
