use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::repo_types::{validate_username, Researcher};
use crate::auth::{AccessKey, Credentials, HashScheme, PasswordUser};
use crate::error::ModelResult;
use crate::store::Store;
use crate::study::Study;

/// Anything that identifies a researcher: the record itself or its id.
pub trait ResearcherKey: Sync {
    fn researcher_id(&self) -> i64;
}

impl ResearcherKey for i64 {
    fn researcher_id(&self) -> i64 {
        *self
    }
}

impl ResearcherKey for Researcher {
    fn researcher_id(&self) -> i64 {
        self.id
    }
}

#[async_trait]
impl PasswordUser for Researcher {
    const SCHEME: HashScheme = HashScheme::WEB;

    fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn replace_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    async fn persist_credentials(
        &self,
        store: &dyn Store,
        credentials: &Credentials,
    ) -> ModelResult<()> {
        store.set_researcher_credentials(self.id, credentials).await?;
        debug!(researcher_id = self.id, "researcher credentials updated");
        Ok(())
    }
}

impl Researcher {
    pub async fn create(store: &dyn Store, username: &str, password: &str) -> ModelResult<Researcher> {
        if let Err(e) = validate_username(username) {
            warn!(error = %e, "rejected username");
            return Err(e);
        }
        let credentials = Self::SCHEME.generate(password)?;
        let researcher = store.insert_researcher(username, &credentials).await?;
        info!(researcher_id = researcher.id, username, "researcher created");
        Ok(researcher)
    }

    pub async fn find(store: &dyn Store, id: i64) -> ModelResult<Option<Researcher>> {
        store.find_researcher(id).await
    }

    pub async fn find_by_username(
        store: &dyn Store,
        username: &str,
    ) -> ModelResult<Option<Researcher>> {
        store.find_researcher_by_username(username).await
    }

    /// False for unknown usernames as well as wrong passwords.
    pub async fn check_password(
        store: &dyn Store,
        username: &str,
        candidate: &str,
    ) -> ModelResult<bool> {
        match Self::find_by_username(store, username).await? {
            Some(researcher) => Ok(researcher.validate_password(candidate)),
            None => {
                warn!(username, "login for unknown researcher");
                Ok(false)
            }
        }
    }

    /// There is no way back: admin rights are never revoked through here.
    pub async fn elevate_to_admin(&mut self, store: &dyn Store) -> ModelResult<()> {
        store.set_researcher_admin(self.id).await?;
        self.admin = true;
        info!(researcher_id = self.id, "researcher elevated to admin");
        Ok(())
    }

    pub fn validate_access_credentials(&self, candidate_secret: &str) -> bool {
        let ok = self
            .access_key
            .as_ref()
            .is_some_and(|key| key.validate(candidate_secret));
        if !ok {
            warn!(researcher_id = self.id, "access key mismatch");
        }
        ok
    }

    /// Issues a new key pair, replacing any previous one in the same write.
    /// Returns `(access_key_id, secret)`; the secret cannot be recovered
    /// later.
    pub async fn reset_access_credentials(
        &mut self,
        store: &dyn Store,
    ) -> ModelResult<(String, String)> {
        let (key, secret) = AccessKey::issue()?;
        store.set_access_key(self.id, &key).await?;
        let id = key.access_key_id.clone();
        self.access_key = Some(key);
        info!(researcher_id = self.id, "access key issued");
        Ok((id, secret))
    }

    pub async fn get_studies(&self, store: &dyn Store) -> ModelResult<Vec<Study>> {
        let mut out = Vec::new();
        for id in store.researcher_study_ids(self.id).await? {
            if let Some(study) = store.find_study(id).await? {
                out.push(study);
            }
        }
        Ok(out)
    }
}
