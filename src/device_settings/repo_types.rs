use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;

use super::defaults::{
    default_consent_sections, ABOUT_PAGE_TEXT, CALL_CLINICIAN_BUTTON_TEXT, CONSENT_FORM_TEXT,
    SURVEY_SUBMIT_SUCCESS_TOAST_TEXT,
};
use crate::error::{ModelError, ModelResult};
use crate::models::{Label, Model, RecordRef};

/// Settings pushed to the devices of every participant in one study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DeviceSettings {
    pub id: i64,
    pub study_id: i64,

    // Data streams
    pub accelerometer: bool,
    pub gps: bool,
    pub calls: bool,
    pub texts: bool,
    pub wifi: bool,
    pub bluetooth: bool,
    pub power_state: bool,

    // iOS-only data streams
    pub proximity: bool,
    pub gyro: bool,
    pub magnetometer: bool,
    pub devicemotion: bool,
    pub reachability: bool,

    pub allow_upload_over_cellular_data: bool,

    // Timers, seconds
    pub accelerometer_off_duration_seconds: i32,
    pub accelerometer_on_duration_seconds: i32,
    pub bluetooth_on_duration_seconds: i32,
    pub bluetooth_total_duration_seconds: i32,
    pub bluetooth_global_offset_seconds: i32,
    pub check_for_new_surveys_frequency_seconds: i32,
    pub create_new_data_files_frequency_seconds: i32,
    pub gps_off_duration_seconds: i32,
    pub gps_on_duration_seconds: i32,
    pub seconds_before_auto_logout: i32,
    pub upload_data_files_frequency_seconds: i32,
    pub voice_recording_max_time_length_seconds: i32,
    pub wifi_log_frequency_seconds: i32,

    // iOS-only timers, seconds
    pub gyro_off_duration_seconds: i32,
    pub gyro_on_duration_seconds: i32,
    pub magnetometer_off_duration_seconds: i32,
    pub magnetometer_on_duration_seconds: i32,
    pub devicemotion_off_duration_seconds: i32,
    pub devicemotion_on_duration_seconds: i32,

    // App copy
    pub about_page_text: String,
    pub call_clinician_button_text: String,
    pub consent_form_text: String,
    pub survey_submit_success_toast_text: String,

    pub consent_sections: Value,

    pub deleted: bool,
}

impl DeviceSettings {
    /// Default settings for `study_id`; `id` is assigned on insert.
    pub fn for_study(study_id: i64) -> Self {
        Self {
            id: 0,
            study_id,
            accelerometer: true,
            gps: true,
            calls: true,
            texts: true,
            wifi: true,
            bluetooth: false,
            power_state: true,
            proximity: false,
            gyro: false,
            magnetometer: false,
            devicemotion: false,
            reachability: true,
            allow_upload_over_cellular_data: false,
            accelerometer_off_duration_seconds: 10,
            accelerometer_on_duration_seconds: 10,
            bluetooth_on_duration_seconds: 60,
            bluetooth_total_duration_seconds: 300,
            bluetooth_global_offset_seconds: 0,
            check_for_new_surveys_frequency_seconds: 3600 * 6,
            create_new_data_files_frequency_seconds: 15 * 60,
            gps_off_duration_seconds: 600,
            gps_on_duration_seconds: 60,
            seconds_before_auto_logout: 600,
            upload_data_files_frequency_seconds: 3600,
            voice_recording_max_time_length_seconds: 240,
            wifi_log_frequency_seconds: 300,
            gyro_off_duration_seconds: 600,
            gyro_on_duration_seconds: 60,
            magnetometer_off_duration_seconds: 600,
            magnetometer_on_duration_seconds: 60,
            devicemotion_off_duration_seconds: 600,
            devicemotion_on_duration_seconds: 60,
            about_page_text: ABOUT_PAGE_TEXT.to_string(),
            call_clinician_button_text: CALL_CLINICIAN_BUTTON_TEXT.to_string(),
            consent_form_text: CONSENT_FORM_TEXT.to_string(),
            survey_submit_success_toast_text: SURVEY_SUBMIT_SUCCESS_TOAST_TEXT.to_string(),
            consent_sections: default_consent_sections(),
            deleted: false,
        }
    }

    pub fn durations(&self) -> [(&'static str, i32); 19] {
        [
            ("accelerometer_off_duration_seconds", self.accelerometer_off_duration_seconds),
            ("accelerometer_on_duration_seconds", self.accelerometer_on_duration_seconds),
            ("bluetooth_on_duration_seconds", self.bluetooth_on_duration_seconds),
            ("bluetooth_total_duration_seconds", self.bluetooth_total_duration_seconds),
            ("bluetooth_global_offset_seconds", self.bluetooth_global_offset_seconds),
            ("check_for_new_surveys_frequency_seconds", self.check_for_new_surveys_frequency_seconds),
            ("create_new_data_files_frequency_seconds", self.create_new_data_files_frequency_seconds),
            ("gps_off_duration_seconds", self.gps_off_duration_seconds),
            ("gps_on_duration_seconds", self.gps_on_duration_seconds),
            ("seconds_before_auto_logout", self.seconds_before_auto_logout),
            ("upload_data_files_frequency_seconds", self.upload_data_files_frequency_seconds),
            ("voice_recording_max_time_length_seconds", self.voice_recording_max_time_length_seconds),
            ("wifi_log_frequency_seconds", self.wifi_log_frequency_seconds),
            ("gyro_off_duration_seconds", self.gyro_off_duration_seconds),
            ("gyro_on_duration_seconds", self.gyro_on_duration_seconds),
            ("magnetometer_off_duration_seconds", self.magnetometer_off_duration_seconds),
            ("magnetometer_on_duration_seconds", self.magnetometer_on_duration_seconds),
            ("devicemotion_off_duration_seconds", self.devicemotion_off_duration_seconds),
            ("devicemotion_on_duration_seconds", self.devicemotion_on_duration_seconds),
        ]
    }

    pub fn validate(&self) -> ModelResult<()> {
        if let Some((name, value)) = self.durations().into_iter().find(|(_, v)| *v < 0) {
            return Err(ModelError::constraint(format!(
                "{name} must be non-negative, got {value}"
            )));
        }
        if !self.consent_sections.is_array() {
            return Err(ModelError::constraint("consent_sections must be a JSON list"));
        }
        Ok(())
    }
}

impl Model for DeviceSettings {
    const KIND: &'static str = "DeviceSettings";

    fn record(&self) -> RecordRef {
        RecordRef::DeviceSettings(self.id)
    }

    fn set_deleted(&mut self) {
        self.deleted = true;
    }

    fn label(&self) -> Label<'_> {
        Label::OwnedByStudy {
            key: self.id.to_string(),
            study_id: Some(self.study_id),
        }
    }

    fn as_native_json(&self) -> Value {
        let mut out = json!({
            "id": self.id,
            "study_id": self.study_id,
            "accelerometer": self.accelerometer,
            "gps": self.gps,
            "calls": self.calls,
            "texts": self.texts,
            "wifi": self.wifi,
            "bluetooth": self.bluetooth,
            "power_state": self.power_state,
            "proximity": self.proximity,
            "gyro": self.gyro,
            "magnetometer": self.magnetometer,
            "devicemotion": self.devicemotion,
            "reachability": self.reachability,
            "allow_upload_over_cellular_data": self.allow_upload_over_cellular_data,
            "about_page_text": self.about_page_text,
            "call_clinician_button_text": self.call_clinician_button_text,
            "consent_form_text": self.consent_form_text,
            "survey_submit_success_toast_text": self.survey_submit_success_toast_text,
            "consent_sections": self.consent_sections,
            "deleted": self.deleted,
        });
        if let Value::Object(map) = &mut out {
            for (name, value) in self.durations() {
                map.insert(name.to_string(), json!(value));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = DeviceSettings::for_study(1);
        assert!(s.validate().is_ok());
        assert!(s.gps && !s.bluetooth);
        assert_eq!(s.check_for_new_surveys_frequency_seconds, 21_600);
        assert_eq!(s.consent_sections.as_array().map(Vec::len), Some(8));
    }

    #[test]
    fn negative_duration_is_rejected() {
        let mut s = DeviceSettings::for_study(1);
        s.gps_on_duration_seconds = -1;
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("gps_on_duration_seconds"));
    }

    #[test]
    fn native_json_lists_timers_and_sections() {
        let out = DeviceSettings::for_study(5).as_native_json();
        assert_eq!(out["study_id"], json!(5));
        assert_eq!(out["wifi_log_frequency_seconds"], json!(300));
        assert_eq!(out["consent_sections"][0]["type"], json!("welcome"));
    }
}
