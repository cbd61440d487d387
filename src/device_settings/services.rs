use tracing::{debug, warn};

use super::repo_types::DeviceSettings;
use crate::error::ModelResult;
use crate::store::Store;

impl DeviceSettings {
    /// Writes every field back after checking durations and consent
    /// sections. The owning study cannot be changed.
    pub async fn save(&self, store: &dyn Store) -> ModelResult<()> {
        if let Err(e) = self.validate() {
            warn!(study_id = self.study_id, error = %e, "rejected device settings");
            return Err(e);
        }
        store.update_device_settings(self).await?;
        debug!(settings_id = self.id, study_id = self.study_id, "device settings saved");
        Ok(())
    }
}
