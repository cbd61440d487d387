use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::repo_types::{OsType, Participant, ParticipantId, PARTICIPANT_ID_LEN};
use crate::auth::password::{compare_password, generate_easy_alphanumeric_string, EASY_STRING_LEN};
use crate::auth::{Credentials, HashScheme, PasswordUser};
use crate::error::{ModelError, ModelResult};
use crate::store::Store;

/// Attempts at drawing an unused id before giving up.
const REGISTER_ATTEMPTS: usize = 10;

#[async_trait]
impl PasswordUser for Participant {
    const SCHEME: HashScheme = HashScheme::MOBILE;

    fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn replace_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    async fn persist_credentials(
        &self,
        store: &dyn Store,
        credentials: &Credentials,
    ) -> ModelResult<()> {
        store
            .set_participant_credentials(&self.patient_id, credentials)
            .await?;
        debug!(patient_id = %self.patient_id, "participant credentials updated");
        Ok(())
    }
}

impl Participant {
    pub async fn create(
        store: &dyn Store,
        study_id: i64,
        patient_id: ParticipantId,
        password: &str,
    ) -> ModelResult<Participant> {
        let participant = Participant {
            patient_id,
            credentials: Self::SCHEME.generate(password)?,
            device_id: None,
            os_type: None,
            study_id,
            deleted: false,
        };
        store.insert_participant(&participant).await?;
        info!(patient_id = %participant.patient_id, study_id, "participant created");
        Ok(participant)
    }

    /// Enrolls a participant under a freshly drawn id and password. The
    /// plaintext password is returned here only. A drawn id that is already
    /// taken, including by a concurrent insert, is redrawn.
    pub async fn register(store: &dyn Store, study_id: i64) -> ModelResult<(Participant, String)> {
        if store.find_study(study_id).await?.is_none() {
            return Err(ModelError::constraint(format!("study {study_id} does not exist")));
        }
        let password = generate_easy_alphanumeric_string(EASY_STRING_LEN);
        for _ in 0..REGISTER_ATTEMPTS {
            let id = ParticipantId::parse(&generate_easy_alphanumeric_string(PARTICIPANT_ID_LEN))?;
            match Self::create(store, study_id, id, &password).await {
                Ok(participant) => return Ok((participant, password)),
                Err(ModelError::ConstraintViolation(reason)) => {
                    debug!(%reason, "participant id collision");
                }
                Err(e) => return Err(e),
            }
        }
        warn!(study_id, "no free participant id");
        Err(ModelError::constraint(format!(
            "no free participant id after {REGISTER_ATTEMPTS} attempts"
        )))
    }

    pub async fn find(store: &dyn Store, id: &ParticipantId) -> ModelResult<Option<Participant>> {
        store.find_participant(id).await
    }

    /// Checks the password exactly as the app transmits it, already run
    /// through the device hash.
    pub fn validate_device_password(&self, hashed: &str) -> bool {
        let ok = compare_password(hashed, &self.credentials.salt, &self.credentials.password);
        if !ok {
            warn!(patient_id = %self.patient_id, "device password mismatch");
        }
        ok
    }

    pub async fn set_device(&mut self, store: &dyn Store, device_id: &str) -> ModelResult<()> {
        store
            .set_participant_device(&self.patient_id, Some(device_id))
            .await?;
        self.device_id = Some(device_id.to_string());
        debug!(patient_id = %self.patient_id, "device set");
        Ok(())
    }

    pub async fn set_os_type(&mut self, store: &dyn Store, os_type: OsType) -> ModelResult<()> {
        store
            .set_participant_os_type(&self.patient_id, Some(os_type))
            .await?;
        self.os_type = Some(os_type);
        debug!(patient_id = %self.patient_id, ?os_type, "os type set");
        Ok(())
    }

    /// Forgets the registered device so a new phone can register. The OS
    /// type is left alone.
    pub async fn clear_device(&mut self, store: &dyn Store) -> ModelResult<()> {
        store.set_participant_device(&self.patient_id, None).await?;
        self.device_id = None;
        debug!(patient_id = %self.patient_id, "device cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::{device_hash, generate_encryption_key};
    use crate::auth::AccessKey;
    use crate::device_settings::DeviceSettings;
    use crate::models::{display_name, mark_deleted, Model, RecordRef};
    use crate::researchers::Researcher;
    use crate::store::MemoryStore;
    use crate::study::Study;
    use crate::surveys::{NewSurvey, Survey, SurveyType};

    /// Delegates to a [`MemoryStore`], but answers the first few participant
    /// inserts as if another writer had just taken the id.
    struct CollidingStore {
        inner: MemoryStore,
        collisions: std::sync::Mutex<usize>,
    }

    #[async_trait]
    impl Store for CollidingStore {
        async fn mark_deleted(&self, record: &RecordRef) -> ModelResult<()> {
            self.inner.mark_deleted(record).await
        }
        async fn create_study(
            &self,
            name: &str,
            encryption_key: &str,
            settings: &DeviceSettings,
        ) -> ModelResult<(Study, DeviceSettings)> {
            self.inner.create_study(name, encryption_key, settings).await
        }
        async fn find_study(&self, id: i64) -> ModelResult<Option<Study>> {
            self.inner.find_study(id).await
        }
        async fn add_study_researcher(&self, study_id: i64, researcher_id: i64) -> ModelResult<()> {
            self.inner.add_study_researcher(study_id, researcher_id).await
        }
        async fn remove_study_researcher(&self, study_id: i64, researcher_id: i64) -> ModelResult<()> {
            self.inner.remove_study_researcher(study_id, researcher_id).await
        }
        async fn study_researcher_ids(&self, study_id: i64) -> ModelResult<Vec<i64>> {
            self.inner.study_researcher_ids(study_id).await
        }
        async fn researcher_study_ids(&self, researcher_id: i64) -> ModelResult<Vec<i64>> {
            self.inner.researcher_study_ids(researcher_id).await
        }
        async fn insert_survey(&self, new: &NewSurvey) -> ModelResult<Survey> {
            self.inner.insert_survey(new).await
        }
        async fn update_survey(&self, survey: &Survey) -> ModelResult<()> {
            self.inner.update_survey(survey).await
        }
        async fn attach_survey(&self, study_id: i64, survey_id: i64) -> ModelResult<()> {
            self.inner.attach_survey(study_id, survey_id).await
        }
        async fn detach_survey(&self, study_id: i64, survey_id: i64) -> ModelResult<bool> {
            self.inner.detach_survey(study_id, survey_id).await
        }
        async fn find_survey(&self, id: i64) -> ModelResult<Option<Survey>> {
            self.inner.find_survey(id).await
        }
        async fn list_surveys(&self, study_id: i64) -> ModelResult<Vec<Survey>> {
            self.inner.list_surveys(study_id).await
        }
        async fn survey_ids(&self, study_id: i64, survey_type: SurveyType) -> ModelResult<Vec<i64>> {
            self.inner.survey_ids(study_id, survey_type).await
        }
        async fn insert_participant(&self, participant: &Participant) -> ModelResult<()> {
            {
                let mut left = self.collisions.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    return Err(ModelError::constraint("duplicate key value violates unique constraint"));
                }
            }
            self.inner.insert_participant(participant).await
        }
        async fn find_participant(&self, id: &ParticipantId) -> ModelResult<Option<Participant>> {
            self.inner.find_participant(id).await
        }
        async fn list_participants(&self, study_id: i64) -> ModelResult<Vec<Participant>> {
            self.inner.list_participants(study_id).await
        }
        async fn set_participant_credentials(
            &self,
            id: &ParticipantId,
            credentials: &Credentials,
        ) -> ModelResult<()> {
            self.inner.set_participant_credentials(id, credentials).await
        }
        async fn set_participant_device(
            &self,
            id: &ParticipantId,
            device_id: Option<&str>,
        ) -> ModelResult<()> {
            self.inner.set_participant_device(id, device_id).await
        }
        async fn set_participant_os_type(
            &self,
            id: &ParticipantId,
            os_type: Option<OsType>,
        ) -> ModelResult<()> {
            self.inner.set_participant_os_type(id, os_type).await
        }
        async fn insert_researcher(
            &self,
            username: &str,
            credentials: &Credentials,
        ) -> ModelResult<Researcher> {
            self.inner.insert_researcher(username, credentials).await
        }
        async fn find_researcher(&self, id: i64) -> ModelResult<Option<Researcher>> {
            self.inner.find_researcher(id).await
        }
        async fn find_researcher_by_username(
            &self,
            username: &str,
        ) -> ModelResult<Option<Researcher>> {
            self.inner.find_researcher_by_username(username).await
        }
        async fn set_researcher_credentials(
            &self,
            id: i64,
            credentials: &Credentials,
        ) -> ModelResult<()> {
            self.inner.set_researcher_credentials(id, credentials).await
        }
        async fn set_researcher_admin(&self, id: i64) -> ModelResult<()> {
            self.inner.set_researcher_admin(id).await
        }
        async fn set_access_key(&self, id: i64, key: &AccessKey) -> ModelResult<()> {
            self.inner.set_access_key(id, key).await
        }
        async fn find_device_settings(&self, study_id: i64) -> ModelResult<Option<DeviceSettings>> {
            self.inner.find_device_settings(study_id).await
        }
        async fn update_device_settings(&self, settings: &DeviceSettings) -> ModelResult<()> {
            self.inner.update_device_settings(settings).await
        }
    }

    async fn setup() -> (MemoryStore, Study, Participant) {
        let store = MemoryStore::new();
        let (study, _) = Study::create(&store, "Gait", &generate_encryption_key())
            .await
            .unwrap();
        let participant = Participant::create(
            &store,
            study.id,
            ParticipantId::parse("abc12345").unwrap(),
            "hunter22",
        )
        .await
        .unwrap();
        (store, study, participant)
    }

    #[tokio::test]
    async fn device_lifecycle_leaves_os_type() {
        let (store, _, mut p) = setup().await;
        assert_eq!(p.device_id, None);
        p.set_os_type(&store, OsType::Android).await.unwrap();
        p.set_device(&store, "phone-42").await.unwrap();
        assert_eq!(p.device_id.as_deref(), Some("phone-42"));
        p.clear_device(&store).await.unwrap();

        let stored = Participant::find(&store, &p.patient_id).await.unwrap().unwrap();
        assert_eq!(stored.device_id, None);
        assert_eq!(stored.os_type, Some(OsType::Android));
        assert_eq!(stored, p);
    }

    #[tokio::test]
    async fn password_round_trip() {
        let (store, _, mut p) = setup().await;
        assert!(p.validate_password("hunter22"));
        assert!(p.validate_device_password(&device_hash("hunter22")));
        assert!(!p.validate_device_password("hunter22"));

        p.set_password(&store, "correct horse").await.unwrap();
        assert!(p.validate_password("correct horse"));
        assert!(!p.validate_password("hunter22"));

        let stored = Participant::find(&store, &p.patient_id).await.unwrap().unwrap();
        assert!(stored.validate_password("correct horse"));
    }

    #[tokio::test]
    async fn reset_password_invalidates_the_old_one() {
        let (store, _, mut p) = setup().await;
        let before = p.credentials.clone();
        let plain = p.reset_password(&store).await.unwrap();
        assert_eq!(plain.len(), EASY_STRING_LEN);
        assert_ne!(p.credentials, before);
        assert!(!p.validate_password("hunter22"));
        assert!(p.validate_password(&plain));
    }

    #[tokio::test]
    async fn duplicate_id_is_a_constraint_violation() {
        let (store, study, _) = setup().await;
        let err = Participant::create(
            &store,
            study.id,
            ParticipantId::parse("abc12345").unwrap(),
            "x",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ModelError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn register_draws_id_and_password() {
        let (store, study, _) = setup().await;
        let (p, plain) = Participant::register(&store, study.id).await.unwrap();
        assert_eq!(p.patient_id.as_str().len(), PARTICIPANT_ID_LEN);
        assert!(p.validate_password(&plain));
        assert_eq!(study.get_participants(&store).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn register_requires_existing_study() {
        let store = MemoryStore::new();
        let err = Participant::register(&store, 404).await.unwrap_err();
        assert!(matches!(err, ModelError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn register_retries_ids_taken_after_the_draw() {
        let (store, study, _) = setup().await;
        let racing = CollidingStore {
            inner: store,
            collisions: std::sync::Mutex::new(3),
        };
        let (p, plain) = Participant::register(&racing, study.id).await.unwrap();
        assert!(p.validate_password(&plain));
        assert_eq!(*racing.collisions.lock().unwrap(), 0);
        assert!(Participant::find(&racing, &p.patient_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn labels_and_serialization() {
        let (store, study, mut p) = setup().await;
        assert_eq!(
            display_name(&p, &store).await.unwrap(),
            "Participant abc12345 of Study Gait"
        );
        let out = p.as_native_json();
        assert_eq!(out["study_id"], serde_json::json!(study.id));
        assert_eq!(out["device_id"], serde_json::Value::Null);

        mark_deleted(&mut p, &store).await.unwrap();
        assert!(Participant::find(&store, &p.patient_id).await.unwrap().unwrap().deleted);
    }
}
