mod repo_types;
mod services;

pub use repo_types::{Researcher, ResearcherRow, USERNAME_MAX_LEN};
pub use services::ResearcherKey;
