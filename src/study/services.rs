use serde_json::Value;
use tracing::{debug, info, warn};

use super::repo_types::Study;
use crate::auth::password::ENCRYPTION_KEY_LEN;
use crate::device_settings::DeviceSettings;
use crate::error::{ModelError, ModelResult};
use crate::models::Model;
use crate::participants::Participant;
use crate::researchers::{Researcher, ResearcherKey};
use crate::store::Store;
use crate::surveys::{Survey, SurveyType};

impl Study {
    /// Creates the study together with its default device settings, so no
    /// study is ever visible without them.
    pub async fn create(
        store: &dyn Store,
        name: &str,
        encryption_key: &str,
    ) -> ModelResult<(Study, DeviceSettings)> {
        if encryption_key.chars().count() != ENCRYPTION_KEY_LEN {
            warn!(len = encryption_key.len(), "rejected encryption key");
            return Err(ModelError::constraint(format!(
                "encryption key must be {ENCRYPTION_KEY_LEN} characters"
            )));
        }
        let defaults = DeviceSettings::for_study(0);
        let (study, settings) = store.create_study(name, encryption_key, &defaults).await?;
        info!(study_id = study.id, name = %study.name, "study created");
        Ok((study, settings))
    }

    pub async fn find(store: &dyn Store, id: i64) -> ModelResult<Option<Study>> {
        store.find_study(id).await
    }

    /// Accepts a [`Researcher`] or a bare researcher id. Adding an existing
    /// member is a no-op.
    pub async fn add_researcher<R>(&self, store: &dyn Store, researcher: &R) -> ModelResult<()>
    where
        R: ResearcherKey + ?Sized,
    {
        let researcher_id = researcher.researcher_id();
        store.add_study_researcher(self.id, researcher_id).await?;
        debug!(study_id = self.id, researcher_id, "researcher added");
        Ok(())
    }

    /// Removing a non-member is a no-op, unlike [`Study::remove_survey`].
    pub async fn remove_researcher<R>(&self, store: &dyn Store, researcher: &R) -> ModelResult<()>
    where
        R: ResearcherKey + ?Sized,
    {
        let researcher_id = researcher.researcher_id();
        store.remove_study_researcher(self.id, researcher_id).await?;
        debug!(study_id = self.id, researcher_id, "researcher removed");
        Ok(())
    }

    pub async fn get_researchers(&self, store: &dyn Store) -> ModelResult<Vec<Researcher>> {
        let mut out = Vec::new();
        for id in store.study_researcher_ids(self.id).await? {
            if let Some(r) = store.find_researcher(id).await? {
                out.push(r);
            }
        }
        Ok(out)
    }

    /// Moves `survey` into this study. Adding a current member is a no-op.
    pub async fn add_survey(&self, store: &dyn Store, survey: &mut Survey) -> ModelResult<()> {
        store.attach_survey(self.id, survey.id).await?;
        survey.study_id = Some(self.id);
        debug!(study_id = self.id, survey_id = survey.id, "survey added");
        Ok(())
    }

    /// Fails with `NotFound` when `survey` is not currently in this study.
    pub async fn remove_survey(&self, store: &dyn Store, survey: &mut Survey) -> ModelResult<()> {
        if !store.detach_survey(self.id, survey.id).await? {
            warn!(study_id = self.id, survey_id = survey.id, "survey not in study");
            return Err(ModelError::not_found(format!(
                "Survey {} of Study {}",
                survey.id, self.name
            )));
        }
        survey.study_id = None;
        debug!(study_id = self.id, survey_id = survey.id, "survey removed");
        Ok(())
    }

    /// Every survey of the study in its structured form. Order is not
    /// guaranteed.
    pub async fn get_surveys_for_study(&self, store: &dyn Store) -> ModelResult<Vec<Value>> {
        let surveys = store.list_surveys(self.id).await?;
        Ok(surveys.iter().map(Model::as_native_json).collect())
    }

    /// Ids of this study's surveys of one kind; pass
    /// `SurveyType::default()` for tracking surveys.
    pub async fn get_survey_ids_for_study(
        &self,
        store: &dyn Store,
        survey_type: SurveyType,
    ) -> ModelResult<Vec<i64>> {
        store.survey_ids(self.id, survey_type).await
    }

    pub async fn get_participants(&self, store: &dyn Store) -> ModelResult<Vec<Participant>> {
        store.list_participants(self.id).await
    }

    /// # Panics
    ///
    /// If the study has no device settings. [`Study::create`] always makes
    /// them, so their absence means the data is corrupt.
    pub async fn get_study_device_settings(&self, store: &dyn Store) -> ModelResult<DeviceSettings> {
        match store.find_device_settings(self.id).await? {
            Some(settings) => Ok(settings),
            None => panic!("Study {} ({}) has no device settings", self.id, self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::auth::password::generate_encryption_key;
    use crate::models::{display_name, mark_deleted};
    use crate::store::MemoryStore;
    use crate::surveys::{NewSurvey, Timings};

    async fn study(store: &MemoryStore) -> Study {
        let (study, _) = Study::create(store, "Sleep and Mood", &generate_encryption_key())
            .await
            .expect("create study");
        study
    }

    #[tokio::test]
    async fn create_makes_device_settings() {
        let store = MemoryStore::new();
        let study = study(&store).await;
        let settings = study.get_study_device_settings(&store).await.unwrap();
        assert_eq!(settings.study_id, study.id);
        assert!(settings.gps);
    }

    #[tokio::test]
    async fn create_rejects_short_key() {
        let store = MemoryStore::new();
        let err = Study::create(&store, "x", "short").await.unwrap_err();
        assert!(matches!(err, ModelError::ConstraintViolation(_)));
    }

    #[tokio::test]
    #[should_panic(expected = "has no device settings")]
    async fn missing_device_settings_panics() {
        let store = MemoryStore::new();
        let orphan = Study {
            id: 404,
            name: "orphan".into(),
            encryption_key: generate_encryption_key(),
            deleted: false,
        };
        let _ = orphan.get_study_device_settings(&store).await;
    }

    #[tokio::test]
    async fn tracking_survey_scenario() {
        let store = MemoryStore::new();
        let study = study(&store).await;
        let survey = Survey::create(
            &store,
            NewSurvey {
                timings: Timings::try_from(json!([[3600], [], [], [], [], [], []])).unwrap(),
                ..NewSurvey::new(study.id, SurveyType::TrackingSurvey)
            },
        )
        .await
        .unwrap();

        let tracking = study
            .get_survey_ids_for_study(&store, SurveyType::default())
            .await
            .unwrap();
        assert_eq!(tracking, vec![survey.id]);
        let audio = study
            .get_survey_ids_for_study(&store, SurveyType::AudioSurvey)
            .await
            .unwrap();
        assert!(audio.is_empty());
    }

    #[tokio::test]
    async fn add_survey_twice_keeps_one_association() {
        let store = MemoryStore::new();
        let study = study(&store).await;
        let mut survey = Survey::create(&store, NewSurvey::new(study.id, SurveyType::AudioSurvey))
            .await
            .unwrap();
        study.add_survey(&store, &mut survey).await.unwrap();
        study.add_survey(&store, &mut survey).await.unwrap();
        let all = study.get_surveys_for_study(&store).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0]["id"], json!(survey.id));
        assert_eq!(all[0]["study_id"], json!(study.id));
    }

    #[tokio::test]
    async fn surveys_serialize_with_nested_content() {
        let store = MemoryStore::new();
        let study = study(&store).await;
        Survey::create(
            &store,
            NewSurvey {
                content: json!([{"prompt": "Q1"}]),
                ..NewSurvey::new(study.id, SurveyType::TrackingSurvey)
            },
        )
        .await
        .unwrap();
        let all = study.get_surveys_for_study(&store).await.unwrap();
        assert_eq!(all[0]["content"], json!([{"prompt": "Q1"}]));
    }

    #[tokio::test]
    async fn remove_survey_requires_membership() {
        let store = MemoryStore::new();
        let first = study(&store).await;
        let second = study(&store).await;
        let mut survey = Survey::create(&store, NewSurvey::new(first.id, SurveyType::TrackingSurvey))
            .await
            .unwrap();

        let err = second.remove_survey(&store, &mut survey).await.unwrap_err();
        assert!(matches!(err, ModelError::NotFound(_)));
        assert_eq!(survey.study_id, Some(first.id));

        first.remove_survey(&store, &mut survey).await.unwrap();
        assert_eq!(survey.study_id, None);
        assert!(first.get_surveys_for_study(&store).await.unwrap().is_empty());

        let err = first.remove_survey(&store, &mut survey).await.unwrap_err();
        assert!(matches!(err, ModelError::NotFound(_)));
    }

    #[tokio::test]
    async fn researcher_membership_is_a_set() {
        let store = MemoryStore::new();
        let study = study(&store).await;
        let ada = Researcher::create(&store, "ada", "analytical").await.unwrap();

        study.remove_researcher(&store, &ada).await.unwrap();

        study.add_researcher(&store, &ada).await.unwrap();
        study.add_researcher(&store, &ada.id).await.unwrap();
        let members = study.get_researchers(&store).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].username, "ada");
        assert_eq!(ada.get_studies(&store).await.unwrap()[0].id, study.id);

        study.remove_researcher(&store, &ada.id).await.unwrap();
        study.remove_researcher(&store, &ada).await.unwrap();
        assert!(study.get_researchers(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_deleted_is_idempotent() {
        let store = MemoryStore::new();
        let mut study = study(&store).await;
        mark_deleted(&mut study, &store).await.unwrap();
        mark_deleted(&mut study, &store).await.unwrap();
        assert!(study.deleted);
        assert!(Study::find(&store, study.id).await.unwrap().unwrap().deleted);
    }

    #[tokio::test]
    async fn display_names_follow_entity_kind() {
        let store = MemoryStore::new();
        let study = study(&store).await;
        let survey = Survey::create(&store, NewSurvey::new(study.id, SurveyType::TrackingSurvey))
            .await
            .unwrap();
        assert_eq!(
            display_name(&study, &store).await.unwrap(),
            "Study Sleep and Mood"
        );
        assert_eq!(
            display_name(&survey, &store).await.unwrap(),
            format!("Survey {} of Study Sleep and Mood", survey.id)
        );
    }
}
