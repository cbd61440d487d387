//! Behaviour every persisted entity shares: the soft-delete flag, a
//! structured JSON rendering, and a human-readable label.

use serde_json::Value;
use tracing::debug;

use crate::error::ModelResult;
use crate::participants::ParticipantId;
use crate::store::Store;

/// Primary key of a row in one of the entity tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordRef {
    Study(i64),
    Survey(i64),
    Participant(ParticipantId),
    Researcher(i64),
    DeviceSettings(i64),
}

/// How an entity names itself in logs and admin pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label<'a> {
    /// Rendered as `<Kind> <key> of Study <study name>`.
    OwnedByStudy { key: String, study_id: Option<i64> },
    /// Rendered as `<Kind> <name>`.
    Named(&'a str),
    /// Rendered as `<Kind> <key>`.
    Keyed(String),
}

pub trait Model {
    const KIND: &'static str;

    fn record(&self) -> RecordRef;
    fn set_deleted(&mut self);
    fn label(&self) -> Label<'_>;

    /// Every stored attribute by name. Relations appear as `<name>_id`;
    /// JSON columns appear as nested structure.
    fn as_native_json(&self) -> Value;
}

/// Flags the entity as deleted. The row is kept; calling this again is a
/// no-op beyond rewriting the same flag.
pub async fn mark_deleted<M>(model: &mut M, store: &dyn Store) -> ModelResult<()>
where
    M: Model + Send,
{
    store.mark_deleted(&model.record()).await?;
    model.set_deleted();
    debug!(kind = M::KIND, record = ?model.record(), "marked deleted");
    Ok(())
}

pub async fn display_name<M>(model: &M, store: &dyn Store) -> ModelResult<String>
where
    M: Model + Sync,
{
    Ok(match model.label() {
        Label::OwnedByStudy {
            key,
            study_id: Some(study_id),
        } => match store.find_study(study_id).await? {
            Some(study) => format!("{} {} of Study {}", M::KIND, key, study.name),
            None => format!("{} {} of Study {}", M::KIND, key, study_id),
        },
        Label::OwnedByStudy {
            key,
            study_id: None,
        } => format!("{} {}", M::KIND, key),
        Label::Named(name) => format!("{} {}", M::KIND, name),
        Label::Keyed(key) => format!("{} {}", M::KIND, key),
    })
}
