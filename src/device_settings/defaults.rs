use serde_json::{json, Value};

pub const ABOUT_PAGE_TEXT: &str = "This application runs on your phone and helps researchers \
learn about your behaviour. It may ask you to fill out short surveys or to record your voice, \
and it may collect information about your location and how much you move. It never records \
the names or phone numbers of the people you communicate with, nor the content of your calls \
or messages.\n\nThe data is processed to protect your privacy: the study knows you only by an \
identification number. Because of this it cannot contact your clinician if you are ill or in \
danger, and researchers will not review your data until the study ends. Use the \
'Call My Clinician' button at the bottom of every page to reach your clinician.";

pub const CALL_CLINICIAN_BUTTON_TEXT: &str = "Call My Clinician";

pub const CONSENT_FORM_TEXT: &str = "I have read and understood the information about the \
study and all of my questions about the study have been answered by the study researchers.";

pub const SURVEY_SUBMIT_SUCCESS_TOAST_TEXT: &str = "Thank you for completing the survey. \
A clinician will not see your answers immediately, so if you need help or are thinking about \
harming yourself, please contact your clinician. You can also press the 'Call My Clinician' \
button.";

const CONSENT_SECTION_TYPES: [&str; 8] = [
    "welcome",
    "data_gathering",
    "privacy",
    "data_use",
    "time_commitment",
    "study_survey",
    "study_tasks",
    "withdrawing",
];

/// Consent screens in the order the app shows them; researchers fill in
/// the copy per study.
pub fn default_consent_sections() -> Value {
    Value::Array(
        CONSENT_SECTION_TYPES
            .iter()
            .map(|t| json!({ "type": t, "text": "", "more": "" }))
            .collect(),
    )
}
