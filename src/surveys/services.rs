use serde_json::Value;
use tracing::{debug, warn};

use super::repo_types::{validate_json_shape, NewSurvey, Survey, Timings};
use crate::error::ModelResult;
use crate::store::Store;

impl Survey {
    /// Inserts a survey owned by `new.study_id`. Shape is checked before
    /// anything is written.
    pub async fn create(store: &dyn Store, new: NewSurvey) -> ModelResult<Survey> {
        if let Err(e) = validate_json_shape(&new.content, &new.settings) {
            warn!(study_id = new.study_id, error = %e, "rejected survey");
            return Err(e);
        }
        let survey = store.insert_survey(&new).await?;
        debug!(survey_id = survey.id, study_id = new.study_id, kind = %survey.survey_type, "survey created");
        Ok(survey)
    }

    pub async fn find(store: &dyn Store, id: i64) -> ModelResult<Option<Survey>> {
        store.find_survey(id).await
    }

    /// Writes type, content, settings and timings back. Study membership
    /// is changed through the study, not here.
    pub async fn save(&self, store: &dyn Store) -> ModelResult<()> {
        validate_json_shape(&self.content, &self.settings)?;
        store.update_survey(self).await?;
        debug!(survey_id = self.id, "survey saved");
        Ok(())
    }

    /// Replaces the schedule from untrusted JSON, e.g. an admin form.
    pub fn set_timings_json(&mut self, raw: Value) -> ModelResult<()> {
        self.timings = Timings::try_from(raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::auth::password::generate_encryption_key;
    use crate::error::ModelError;
    use crate::store::MemoryStore;
    use crate::study::Study;
    use crate::surveys::SurveyType;

    #[tokio::test]
    async fn create_rejects_non_list_content() {
        let store = MemoryStore::new();
        let (study, _) = Study::create(&store, "s", &generate_encryption_key()).await.unwrap();
        let err = Survey::create(
            &store,
            NewSurvey {
                content: json!("[]"),
                ..NewSurvey::new(study.id, SurveyType::AudioSurvey)
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ModelError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn create_requires_existing_study() {
        let store = MemoryStore::new();
        let err = Survey::create(&store, NewSurvey::new(77, SurveyType::ImageSurvey))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn save_persists_new_timings() {
        let store = MemoryStore::new();
        let (study, _) = Study::create(&store, "s", &generate_encryption_key()).await.unwrap();
        let mut survey = Survey::create(&store, NewSurvey::new(study.id, SurveyType::TrackingSurvey))
            .await
            .unwrap();

        assert!(survey.set_timings_json(json!([[1], [2]])).is_err());
        survey
            .set_timings_json(json!([[], [], [], [], [], [], [82800]]))
            .unwrap();
        survey.save(&store).await.unwrap();

        let stored = Survey::find(&store, survey.id).await.unwrap().unwrap();
        assert_eq!(stored.timings.day(6), Some(&[82800][..]));
    }
}
