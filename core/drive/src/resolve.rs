//! Name-to-identifier resolution against the Drive namespace.
//!
//! Every resolution is a fresh query; nothing is cached between calls.
//! First match wins throughout, and duplicate names are not disambiguated.
//! The scoping is deliberately asymmetric: folders resolve under root only,
//! while file lookup searches the whole accessible namespace (the
//! root-scoped variant exists for delete).

use tracing::info;

use drivecli_common::Result;

use crate::client::{DriveClient, RemoteObject, FOLDER_MIME_TYPE};

/// Query matching everything directly under the root folder.
pub(crate) const ROOT_QUERY: &str = "'root' in parents";

/// Escape single quotes for embedding a name in a query literal.
fn escape(name: &str) -> String {
    name.replace('\'', "\\'")
}

/// Query for a folder with an exact name directly under root.
fn folder_query(name: &str) -> String {
    format!(
        "mimeType = '{}' and name = '{}' and 'root' in parents",
        FOLDER_MIME_TYPE,
        escape(name)
    )
}

/// Query for a file by exact name anywhere in the accessible namespace.
fn file_query(name: &str) -> String {
    format!("name = '{}'", escape(name))
}

/// Query for a file by exact name directly under root.
fn root_file_query(name: &str) -> String {
    format!("name = '{}' and 'root' in parents", escape(name))
}

/// Resolves human-readable names to service-assigned identifiers.
pub struct NameResolver<'a> {
    client: &'a DriveClient,
}

impl<'a> NameResolver<'a> {
    pub fn new(client: &'a DriveClient) -> Self {
        Self { client }
    }

    /// Resolve a folder name under root to its identifier.
    pub async fn resolve_folder(&self, name: &str) -> Result<Option<String>> {
        let matches = self.client.query(&folder_query(name)).await?;
        Ok(matches.into_iter().next().map(|folder| folder.id))
    }

    /// Resolve a file name to its remote entry, searching everywhere.
    pub async fn resolve_file(&self, name: &str) -> Result<Option<RemoteObject>> {
        let matches = self.client.query(&file_query(name)).await?;
        Ok(matches.into_iter().next())
    }

    /// Resolve a file name directly under root.
    pub async fn resolve_file_at_root(&self, name: &str) -> Result<Option<RemoteObject>> {
        let matches = self.client.query(&root_file_query(name)).await?;
        Ok(matches.into_iter().next())
    }

    /// Create a folder and return its identifier.
    ///
    /// There is no check-and-create atomicity: two concurrent runs can both
    /// miss on resolve and create duplicate folders.
    pub async fn create_folder(&self, name: &str) -> Result<String> {
        let id = self.client.create_folder(name).await?;
        info!(folder = name, id = %id, "created folder");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_query_is_scoped_to_root() {
        let q = folder_query("reports");
        assert_eq!(
            q,
            "mimeType = 'application/vnd.google-apps.folder' and name = 'reports' and 'root' in parents"
        );
    }

    #[test]
    fn test_file_query_is_unscoped() {
        assert_eq!(file_query("notes.txt"), "name = 'notes.txt'");
    }

    #[test]
    fn test_root_file_query_is_scoped_to_root() {
        assert_eq!(
            root_file_query("notes.txt"),
            "name = 'notes.txt' and 'root' in parents"
        );
    }

    #[test]
    fn test_names_with_quotes_are_escaped() {
        assert_eq!(file_query("it's here"), "name = 'it\\'s here'");
        assert!(folder_query("o'brien").contains("name = 'o\\'brien'"));
    }
}
