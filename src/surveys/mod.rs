mod repo_types;
mod services;

pub use repo_types::{NewSurvey, Survey, SurveyRow, SurveyType, Timings};
