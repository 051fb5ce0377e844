//! Storage operations and their dispatcher.
//!
//! Not-found outcomes are reported to the user and end the operation as a
//! normal result; local I/O and transport failures propagate to the caller
//! and terminate the run.

use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;

use drivecli_common::{Error, Result};

use crate::client::{DriveClient, RemoteObject};
use crate::resolve::{NameResolver, ROOT_QUERY};

/// One resolved unit of work, constructed once per invocation from the CLI
/// flags and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// List everything directly under the root folder.
    List,
    /// Upload a local file, optionally into a named folder under root.
    Upload {
        source: PathBuf,
        folder: Option<String>,
    },
    /// Download a file by name, or interactively when no name is given.
    Download {
        file: Option<String>,
        dest: PathBuf,
    },
    /// Delete a file by name, or interactively when no name is given.
    Delete { file: Option<String> },
}

/// Executes operations against the remote service.
pub struct Dispatcher {
    client: DriveClient,
}

impl Dispatcher {
    pub fn new(client: DriveClient) -> Self {
        Self { client }
    }

    /// Run the requested operation to completion.
    ///
    /// Not-found outcomes are converted to a message here; everything else
    /// propagates and terminates the run.
    pub async fn run(&self, operation: Operation) -> Result<()> {
        match self.execute(operation).await {
            Err(Error::NotFound(message)) => {
                println!("{}", message);
                Ok(())
            }
            other => other,
        }
    }

    async fn execute(&self, operation: Operation) -> Result<()> {
        debug!(?operation, "dispatching");
        match operation {
            Operation::List => self.list().await,
            Operation::Upload { source, folder } => {
                self.upload(&source, folder.as_deref()).await
            }
            Operation::Download { file, dest } => self.download(file.as_deref(), &dest).await,
            Operation::Delete { file } => self.delete(file.as_deref()).await,
        }
    }

    /// List root-level objects with name, kind, and modification time.
    async fn list(&self) -> Result<()> {
        let entries = self.client.query(ROOT_QUERY).await?;
        if entries.is_empty() {
            println!("No files found.");
            return Ok(());
        }

        println!("Listing files in the root folder:");
        for entry in &entries {
            let kind = if entry.is_folder() { "folder" } else { "file" };
            let modified = entry
                .modified_time
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string());
            println!("  {}  [{}]  modified {}", entry.name, kind, modified);
        }
        Ok(())
    }

    /// Upload a local file, resolving or creating the target folder.
    async fn upload(&self, source: &Path, folder: Option<&str>) -> Result<()> {
        let source = absolutize(source)?;
        if !source.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Local file does not exist: {}", source.display()),
            )));
        }

        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Source path has no file name: {}",
                    source.display()
                ))
            })?;

        let resolver = NameResolver::new(&self.client);
        let parent_id = match folder {
            Some(folder_name) => match resolver.resolve_folder(folder_name).await? {
                Some(id) => Some(id),
                None => {
                    println!("Folder '{}' not found. Creating it...", folder_name);
                    let id = resolver.create_folder(folder_name).await?;
                    println!("Created folder '{}' with ID: {}", folder_name, id);
                    Some(id)
                }
            },
            None => None,
        };

        let id = self
            .client
            .upload_file(&source, name, parent_id.as_deref())
            .await?;
        println!("Uploaded {} with file ID: {}", source.display(), id);
        Ok(())
    }

    /// Download a file by name, or via the interactive fallback.
    ///
    /// The interactive pick is re-resolved by its name through the same
    /// unscoped lookup as an explicit `--file` argument.
    async fn download(&self, file: Option<&str>, dest: &Path) -> Result<()> {
        let name = match file {
            Some(name) => name.to_string(),
            None => match self.pick_from_root("download").await? {
                Some(entry) => entry.name,
                None => return Ok(()),
            },
        };

        let resolver = NameResolver::new(&self.client);
        let entry = match resolver.resolve_file(&name).await? {
            Some(entry) => entry,
            None => {
                println!("No file found with the name '{}'.", name);
                return Ok(());
            }
        };
        println!("Found file: {} (ID: {})", entry.name, entry.id);

        let target = dest.join(&entry.name);
        self.fetch_to(&entry.id, &target).await?;
        println!("Downloaded file to {}", target.display());
        Ok(())
    }

    /// Delete a file by name (root-scoped), or via the interactive fallback
    /// (deleted directly by the chosen identifier).
    async fn delete(&self, file: Option<&str>) -> Result<()> {
        let resolver = NameResolver::new(&self.client);
        let target = match file {
            Some(name) => match resolver.resolve_file_at_root(name).await? {
                Some(entry) => entry,
                None => {
                    println!("File with name {} not found.", name);
                    return Ok(());
                }
            },
            None => match self.pick_from_root("deletion").await? {
                Some(entry) => entry,
                None => return Ok(()),
            },
        };

        self.client.delete(&target.id).await?;
        println!("Removed file with name: {} (ID: {})", target.name, target.id);
        Ok(())
    }

    /// Stream a file's content to `target`, reporting fractional progress
    /// after each chunk.
    async fn fetch_to(&self, file_id: &str, target: &Path) -> Result<()> {
        let mut response = self.client.download_stream(file_id).await?;
        let total = response.content_length();

        let mut out = tokio::fs::File::create(target).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::Transport(format!("Download stream failed: {}", e)))?
        {
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
            match total {
                Some(total) if total > 0 => {
                    println!("Download progress: {}%", written * 100 / total);
                }
                _ => println!("Downloaded {} bytes so far", written),
            }
        }

        out.flush().await?;
        Ok(())
    }

    /// Interactive fallback: list root entries, prompt once for a 1-based
    /// choice, and return the selection. Invalid input or an empty listing
    /// aborts with a message rather than re-prompting.
    async fn pick_from_root(&self, purpose: &str) -> Result<Option<RemoteObject>> {
        println!("Listing files to choose a file for {}...", purpose);
        let entries = self.client.query(ROOT_QUERY).await?;
        if entries.is_empty() {
            println!("No files found.");
            return Ok(None);
        }

        println!("Select a file by number:");
        for (index, entry) in entries.iter().enumerate() {
            println!("{}. {}", index + 1, entry.name);
        }
        print!("Enter the number of the file: ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;

        match select(&entries, &line) {
            Some(entry) => Ok(Some(entry.clone())),
            None => {
                println!("Invalid choice.");
                Ok(None)
            }
        }
    }
}

/// Map raw menu input to the chosen entry.
///
/// Out-of-range or non-numeric input yields `None`; the caller aborts
/// instead of retrying.
fn select<'a>(entries: &'a [RemoteObject], input: &str) -> Option<&'a RemoteObject> {
    let choice: usize = input.trim().parse().ok()?;
    if choice < 1 || choice > entries.len() {
        return None;
    }
    Some(&entries[choice - 1])
}

/// Absolutize a path against the current directory.
fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(names: &[&str]) -> Vec<RemoteObject> {
        names
            .iter()
            .enumerate()
            .map(|(index, name)| RemoteObject {
                id: format!("id-{}", index + 1),
                name: name.to_string(),
                mime_type: "text/plain".to_string(),
                modified_time: None,
            })
            .collect()
    }

    #[test]
    fn test_select_picks_by_one_based_index() {
        let entries = listing(&["a.txt", "b.txt", "c.txt"]);

        let chosen = select(&entries, "2").unwrap();
        assert_eq!(chosen.name, "b.txt");
        assert_eq!(chosen.id, "id-2");

        assert_eq!(select(&entries, "1").unwrap().name, "a.txt");
        assert_eq!(select(&entries, "3").unwrap().name, "c.txt");
    }

    #[test]
    fn test_select_trims_input() {
        let entries = listing(&["a.txt", "b.txt"]);
        assert_eq!(select(&entries, " 2\n").unwrap().name, "b.txt");
    }

    #[test]
    fn test_select_rejects_out_of_range() {
        let entries = listing(&["a.txt", "b.txt", "c.txt"]);
        assert!(select(&entries, "0").is_none());
        assert!(select(&entries, "5").is_none());
    }

    #[test]
    fn test_select_rejects_non_numeric() {
        let entries = listing(&["a.txt", "b.txt", "c.txt"]);
        assert!(select(&entries, "abc").is_none());
        assert!(select(&entries, "").is_none());
        assert!(select(&entries, "-1").is_none());
    }

    #[test]
    fn test_absolutize_keeps_absolute_paths() {
        let path = Path::new("/tmp/file.txt");
        assert_eq!(absolutize(path).unwrap(), PathBuf::from("/tmp/file.txt"));
    }

    #[test]
    fn test_absolutize_joins_relative_paths() {
        let resolved = absolutize(Path::new("file.txt")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("file.txt"));
    }
}
