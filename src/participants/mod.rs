mod repo_types;
mod services;

pub use repo_types::{OsType, Participant, ParticipantId, DEVICE_ID_MAX_LEN, PARTICIPANT_ID_LEN};
