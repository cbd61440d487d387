use anyhow::Context;
use async_trait::async_trait;
use lazy_static::lazy_static;
use sqlx::{
    postgres::{PgArguments, PgPoolOptions},
    query::Query,
    types::Json,
    PgPool, Postgres, Row,
};
use tracing::debug;

use super::Store;
use crate::auth::{AccessKey, Credentials};
use crate::config::AppConfig;
use crate::device_settings::DeviceSettings;
use crate::error::{ModelError, ModelResult};
use crate::models::RecordRef;
use crate::participants::{OsType, Participant, ParticipantId};
use crate::researchers::{Researcher, ResearcherRow};
use crate::study::Study;
use crate::surveys::{NewSurvey, Survey, SurveyRow, SurveyType};

const SURVEY_COLUMNS: &str = "id, survey_type, content, settings, timings, study_id, deleted";
const PARTICIPANT_COLUMNS: &str = "patient_id, password, salt, device_id, os_type, study_id, deleted";
const RESEARCHER_COLUMNS: &str = "id, username, password, salt, admin, access_key_id, \
     access_key_secret, access_key_secret_salt, deleted";

/// Bound in this order by [`bind_settings`], after `study_id`.
const SETTINGS_COLUMNS: [&str; 37] = [
    "accelerometer",
    "gps",
    "calls",
    "texts",
    "wifi",
    "bluetooth",
    "power_state",
    "proximity",
    "gyro",
    "magnetometer",
    "devicemotion",
    "reachability",
    "allow_upload_over_cellular_data",
    "accelerometer_off_duration_seconds",
    "accelerometer_on_duration_seconds",
    "bluetooth_on_duration_seconds",
    "bluetooth_total_duration_seconds",
    "bluetooth_global_offset_seconds",
    "check_for_new_surveys_frequency_seconds",
    "create_new_data_files_frequency_seconds",
    "gps_off_duration_seconds",
    "gps_on_duration_seconds",
    "seconds_before_auto_logout",
    "upload_data_files_frequency_seconds",
    "voice_recording_max_time_length_seconds",
    "wifi_log_frequency_seconds",
    "gyro_off_duration_seconds",
    "gyro_on_duration_seconds",
    "magnetometer_off_duration_seconds",
    "magnetometer_on_duration_seconds",
    "devicemotion_off_duration_seconds",
    "devicemotion_on_duration_seconds",
    "about_page_text",
    "call_clinician_button_text",
    "consent_form_text",
    "survey_submit_success_toast_text",
    "consent_sections",
];

lazy_static! {
    static ref INSERT_SETTINGS_SQL: String = format!(
        "INSERT INTO device_settings (study_id, {}) VALUES ({}) RETURNING id",
        SETTINGS_COLUMNS.join(", "),
        (1..=SETTINGS_COLUMNS.len() + 1)
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", "),
    );
    static ref UPDATE_SETTINGS_SQL: String = format!(
        "UPDATE device_settings SET {} WHERE study_id = $1 AND id = ${}",
        SETTINGS_COLUMNS
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{c} = ${}", i + 2))
            .collect::<Vec<_>>()
            .join(", "),
        SETTINGS_COLUMNS.len() + 2,
    );
    static ref SELECT_SETTINGS_SQL: String = format!(
        "SELECT id, study_id, {}, deleted FROM device_settings WHERE study_id = $1",
        SETTINGS_COLUMNS.join(", "),
    );
}

fn bind_settings<'q>(
    q: Query<'q, Postgres, PgArguments>,
    s: &'q DeviceSettings,
) -> Query<'q, Postgres, PgArguments> {
    q.bind(s.study_id)
        .bind(s.accelerometer)
        .bind(s.gps)
        .bind(s.calls)
        .bind(s.texts)
        .bind(s.wifi)
        .bind(s.bluetooth)
        .bind(s.power_state)
        .bind(s.proximity)
        .bind(s.gyro)
        .bind(s.magnetometer)
        .bind(s.devicemotion)
        .bind(s.reachability)
        .bind(s.allow_upload_over_cellular_data)
        .bind(s.accelerometer_off_duration_seconds)
        .bind(s.accelerometer_on_duration_seconds)
        .bind(s.bluetooth_on_duration_seconds)
        .bind(s.bluetooth_total_duration_seconds)
        .bind(s.bluetooth_global_offset_seconds)
        .bind(s.check_for_new_surveys_frequency_seconds)
        .bind(s.create_new_data_files_frequency_seconds)
        .bind(s.gps_off_duration_seconds)
        .bind(s.gps_on_duration_seconds)
        .bind(s.seconds_before_auto_logout)
        .bind(s.upload_data_files_frequency_seconds)
        .bind(s.voice_recording_max_time_length_seconds)
        .bind(s.wifi_log_frequency_seconds)
        .bind(s.gyro_off_duration_seconds)
        .bind(s.gyro_on_duration_seconds)
        .bind(s.magnetometer_off_duration_seconds)
        .bind(s.magnetometer_on_duration_seconds)
        .bind(s.devicemotion_off_duration_seconds)
        .bind(s.devicemotion_on_duration_seconds)
        .bind(&s.about_page_text)
        .bind(&s.call_clinician_button_text)
        .bind(&s.consent_form_text)
        .bind(&s.survey_submit_success_toast_text)
        .bind(&s.consent_sections)
}

/// Turns an UPDATE that touched no row into `NotFound`.
fn expect_row(rows: u64, what: impl FnOnce() -> String) -> ModelResult<()> {
    if rows == 0 {
        Err(ModelError::NotFound(what()))
    } else {
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(config.require_database_url()?)
            .await
            .context("connect to database")?;
        Ok(Self::new(db))
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .context("run migrations")?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn mark_deleted(&self, record: &RecordRef) -> ModelResult<()> {
        let result = match record {
            RecordRef::Study(id) => {
                sqlx::query("UPDATE studies SET deleted = TRUE WHERE id = $1").bind(id)
            }
            RecordRef::Survey(id) => {
                sqlx::query("UPDATE surveys SET deleted = TRUE WHERE id = $1").bind(id)
            }
            RecordRef::Participant(id) => {
                sqlx::query("UPDATE participants SET deleted = TRUE WHERE patient_id = $1").bind(id)
            }
            RecordRef::Researcher(id) => {
                sqlx::query("UPDATE researchers SET deleted = TRUE WHERE id = $1").bind(id)
            }
            RecordRef::DeviceSettings(id) => {
                sqlx::query("UPDATE device_settings SET deleted = TRUE WHERE id = $1").bind(id)
            }
        }
        .execute(&self.db)
        .await?;
        expect_row(result.rows_affected(), || format!("record {record:?}"))
    }

    async fn create_study(
        &self,
        name: &str,
        encryption_key: &str,
        settings: &DeviceSettings,
    ) -> ModelResult<(Study, DeviceSettings)> {
        let mut tx = self.db.begin().await?;
        let study = sqlx::query_as::<_, Study>(
            r#"
            INSERT INTO studies (name, encryption_key)
            VALUES ($1, $2)
            RETURNING id, name, encryption_key, deleted
            "#,
        )
        .bind(name)
        .bind(encryption_key)
        .fetch_one(&mut *tx)
        .await?;

        let mut settings = settings.clone();
        settings.study_id = study.id;
        let row = bind_settings(sqlx::query(INSERT_SETTINGS_SQL.as_str()), &settings)
            .fetch_one(&mut *tx)
            .await?;
        let settings_id: i64 = row.try_get("id")?;
        tx.commit().await?;

        settings.id = settings_id;
        debug!(study_id = study.id, settings_id, "study and device settings inserted");
        Ok((study, settings))
    }

    async fn find_study(&self, id: i64) -> ModelResult<Option<Study>> {
        let study = sqlx::query_as::<_, Study>(
            r#"SELECT id, name, encryption_key, deleted FROM studies WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(study)
    }

    async fn add_study_researcher(&self, study_id: i64, researcher_id: i64) -> ModelResult<()> {
        sqlx::query(
            r#"
            INSERT INTO study_researchers (study_id, researcher_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(study_id)
        .bind(researcher_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn remove_study_researcher(&self, study_id: i64, researcher_id: i64) -> ModelResult<()> {
        sqlx::query("DELETE FROM study_researchers WHERE study_id = $1 AND researcher_id = $2")
            .bind(study_id)
            .bind(researcher_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn study_researcher_ids(&self, study_id: i64) -> ModelResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT researcher_id FROM study_researchers WHERE study_id = $1 ORDER BY researcher_id",
        )
        .bind(study_id)
        .fetch_all(&self.db)
        .await?;
        Ok(ids)
    }

    async fn researcher_study_ids(&self, researcher_id: i64) -> ModelResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT study_id FROM study_researchers WHERE researcher_id = $1 ORDER BY study_id",
        )
        .bind(researcher_id)
        .fetch_all(&self.db)
        .await?;
        Ok(ids)
    }

    async fn insert_survey(&self, new: &NewSurvey) -> ModelResult<Survey> {
        let row = sqlx::query_as::<_, SurveyRow>(&format!(
            r#"
            INSERT INTO surveys (survey_type, content, settings, timings, study_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {SURVEY_COLUMNS}
            "#
        ))
        .bind(new.survey_type)
        .bind(&new.content)
        .bind(&new.settings)
        .bind(Json(&new.timings))
        .bind(new.study_id)
        .fetch_one(&self.db)
        .await?;
        row.try_into()
    }

    async fn update_survey(&self, survey: &Survey) -> ModelResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE surveys
               SET survey_type = $2, content = $3, settings = $4, timings = $5
             WHERE id = $1
            "#,
        )
        .bind(survey.id)
        .bind(survey.survey_type)
        .bind(&survey.content)
        .bind(&survey.settings)
        .bind(Json(&survey.timings))
        .execute(&self.db)
        .await?;
        expect_row(result.rows_affected(), || format!("survey {}", survey.id))
    }

    async fn attach_survey(&self, study_id: i64, survey_id: i64) -> ModelResult<()> {
        let result = sqlx::query("UPDATE surveys SET study_id = $1 WHERE id = $2")
            .bind(study_id)
            .bind(survey_id)
            .execute(&self.db)
            .await?;
        expect_row(result.rows_affected(), || format!("survey {survey_id}"))
    }

    async fn detach_survey(&self, study_id: i64, survey_id: i64) -> ModelResult<bool> {
        let result =
            sqlx::query("UPDATE surveys SET study_id = NULL WHERE id = $2 AND study_id = $1")
                .bind(study_id)
                .bind(survey_id)
                .execute(&self.db)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_survey(&self, id: i64) -> ModelResult<Option<Survey>> {
        let row = sqlx::query_as::<_, SurveyRow>(&format!(
            "SELECT {SURVEY_COLUMNS} FROM surveys WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(Survey::try_from).transpose()
    }

    async fn list_surveys(&self, study_id: i64) -> ModelResult<Vec<Survey>> {
        let rows = sqlx::query_as::<_, SurveyRow>(&format!(
            "SELECT {SURVEY_COLUMNS} FROM surveys WHERE study_id = $1 ORDER BY id"
        ))
        .bind(study_id)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(Survey::try_from).collect()
    }

    async fn survey_ids(&self, study_id: i64, survey_type: SurveyType) -> ModelResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM surveys WHERE study_id = $1 AND survey_type = $2 ORDER BY id",
        )
        .bind(study_id)
        .bind(survey_type)
        .fetch_all(&self.db)
        .await?;
        Ok(ids)
    }

    async fn insert_participant(&self, p: &Participant) -> ModelResult<()> {
        sqlx::query(
            r#"
            INSERT INTO participants (patient_id, password, salt, device_id, os_type, study_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&p.patient_id)
        .bind(&p.credentials.password)
        .bind(&p.credentials.salt)
        .bind(&p.device_id)
        .bind(p.os_type)
        .bind(p.study_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find_participant(&self, id: &ParticipantId) -> ModelResult<Option<Participant>> {
        let participant = sqlx::query_as::<_, Participant>(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE patient_id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(participant)
    }

    async fn list_participants(&self, study_id: i64) -> ModelResult<Vec<Participant>> {
        let rows = sqlx::query_as::<_, Participant>(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE study_id = $1 ORDER BY patient_id"
        ))
        .bind(study_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn set_participant_credentials(
        &self,
        id: &ParticipantId,
        credentials: &Credentials,
    ) -> ModelResult<()> {
        let result =
            sqlx::query("UPDATE participants SET password = $2, salt = $3 WHERE patient_id = $1")
                .bind(id)
                .bind(&credentials.password)
                .bind(&credentials.salt)
                .execute(&self.db)
                .await?;
        expect_row(result.rows_affected(), || format!("participant {id}"))
    }

    async fn set_participant_device(
        &self,
        id: &ParticipantId,
        device_id: Option<&str>,
    ) -> ModelResult<()> {
        let result = sqlx::query("UPDATE participants SET device_id = $2 WHERE patient_id = $1")
            .bind(id)
            .bind(device_id)
            .execute(&self.db)
            .await?;
        expect_row(result.rows_affected(), || format!("participant {id}"))
    }

    async fn set_participant_os_type(
        &self,
        id: &ParticipantId,
        os_type: Option<OsType>,
    ) -> ModelResult<()> {
        let result = sqlx::query("UPDATE participants SET os_type = $2 WHERE patient_id = $1")
            .bind(id)
            .bind(os_type)
            .execute(&self.db)
            .await?;
        expect_row(result.rows_affected(), || format!("participant {id}"))
    }

    async fn insert_researcher(
        &self,
        username: &str,
        credentials: &Credentials,
    ) -> ModelResult<Researcher> {
        let row = sqlx::query_as::<_, ResearcherRow>(&format!(
            r#"
            INSERT INTO researchers (username, password, salt)
            VALUES ($1, $2, $3)
            RETURNING {RESEARCHER_COLUMNS}
            "#
        ))
        .bind(username)
        .bind(&credentials.password)
        .bind(&credentials.salt)
        .fetch_one(&self.db)
        .await?;
        row.try_into()
    }

    async fn find_researcher(&self, id: i64) -> ModelResult<Option<Researcher>> {
        let row = sqlx::query_as::<_, ResearcherRow>(&format!(
            "SELECT {RESEARCHER_COLUMNS} FROM researchers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(Researcher::try_from).transpose()
    }

    async fn find_researcher_by_username(
        &self,
        username: &str,
    ) -> ModelResult<Option<Researcher>> {
        let row = sqlx::query_as::<_, ResearcherRow>(&format!(
            "SELECT {RESEARCHER_COLUMNS} FROM researchers WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        row.map(Researcher::try_from).transpose()
    }

    async fn set_researcher_credentials(
        &self,
        id: i64,
        credentials: &Credentials,
    ) -> ModelResult<()> {
        let result = sqlx::query("UPDATE researchers SET password = $2, salt = $3 WHERE id = $1")
            .bind(id)
            .bind(&credentials.password)
            .bind(&credentials.salt)
            .execute(&self.db)
            .await?;
        expect_row(result.rows_affected(), || format!("researcher {id}"))
    }

    async fn set_researcher_admin(&self, id: i64) -> ModelResult<()> {
        let result = sqlx::query("UPDATE researchers SET admin = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        expect_row(result.rows_affected(), || format!("researcher {id}"))
    }

    async fn set_access_key(&self, id: i64, key: &AccessKey) -> ModelResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE researchers
               SET access_key_id = $2, access_key_secret = $3, access_key_secret_salt = $4
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&key.access_key_id)
        .bind(&key.access_key_secret)
        .bind(&key.access_key_secret_salt)
        .execute(&self.db)
        .await?;
        expect_row(result.rows_affected(), || format!("researcher {id}"))
    }

    async fn find_device_settings(&self, study_id: i64) -> ModelResult<Option<DeviceSettings>> {
        let settings = sqlx::query_as::<_, DeviceSettings>(SELECT_SETTINGS_SQL.as_str())
            .bind(study_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(settings)
    }

    async fn update_device_settings(&self, settings: &DeviceSettings) -> ModelResult<()> {
        let result = bind_settings(sqlx::query(UPDATE_SETTINGS_SQL.as_str()), settings)
            .bind(settings.id)
            .execute(&self.db)
            .await?;
        expect_row(result.rows_affected(), || {
            format!("device settings {} of study {}", settings.id, settings.study_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_sql_placeholders_line_up() {
        let n = SETTINGS_COLUMNS.len();
        assert!(INSERT_SETTINGS_SQL.contains(&format!("${}", n + 1)));
        assert!(!INSERT_SETTINGS_SQL.contains(&format!("${}", n + 2)));
        assert!(UPDATE_SETTINGS_SQL.ends_with(&format!("id = ${}", n + 2)));
        assert!(UPDATE_SETTINGS_SQL.contains("consent_sections = $38"));
    }

    #[test]
    fn every_timer_has_a_column() {
        let settings = DeviceSettings::for_study(1);
        for (name, _) in settings.durations() {
            assert!(SETTINGS_COLUMNS.contains(&name), "{name} missing");
        }
    }
}
