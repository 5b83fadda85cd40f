//! Category and folder provisioning on the target mailbox
use crate::client::MailboxClient;
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// Ensures the resources a run depends on exist on the mailbox.
///
/// Nothing is cached: every run re-reads categories and folders so a resource
/// deleted between runs is recreated.
pub struct MailboxProvisioner {
    client: Arc<dyn MailboxClient>,
}

impl MailboxProvisioner {
    pub fn new(client: Arc<dyn MailboxClient>) -> Self {
        Self { client }
    }

    /// Creates the master category if no category with this display name exists.
    ///
    /// An existing category is left as is, even when its color differs.
    ///
    /// # Returns
    /// * `Ok(true)` - the category was created
    /// * `Ok(false)` - the category already existed
    pub async fn ensure_category(&self, name: &str, color: &str) -> Result<bool> {
        let categories = self.client.list_categories().await?;

        if categories.iter().any(|c| c.display_name == name) {
            debug!("Message category '{}' already exists", name);
            return Ok(false);
        }

        info!("Message category '{}' not found. Creating it.", name);
        self.client.create_category(name, color).await?;
        Ok(true)
    }

    /// Returns the id of the named folder, creating the folder first if needed.
    ///
    /// `None` means the folder could not be located even after creation.
    pub async fn ensure_folder(&self, name: &str) -> Result<Option<String>> {
        let mut folders = self.client.list_folders().await?;

        debug!("Looking for the existence of mail folder '{}'", name);
        if !folders.iter().any(|f| f.display_name == name) {
            info!("Mail folder '{}' was not found. Creating it.", name);
            self.client.create_folder(name).await?;
            info!("Mail folder '{}' successfully created", name);

            folders = self.client.list_folders().await?;
        } else {
            debug!("Mail folder '{}' was located", name);
        }

        Ok(folders
            .into_iter()
            .find(|f| f.display_name == name)
            .map(|f| f.id))
    }
}
