//! Google Drive command-line client.
//!
//! Authenticates against Google Drive, reusing, refreshing, or interactively
//! re-acquiring the stored credential, then runs exactly one file operation
//! per invocation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use drivecli_drive::auth::{
    AuthConfig, AuthManager, CredentialManager, CLIENT_SECRETS_FILE, CREDENTIALS_FILE,
};
use drivecli_drive::client::DriveClient;
use drivecli_drive::ops::{Dispatcher, Operation};
use drivecli_drive::store::CredentialStore;

#[derive(Parser)]
#[command(name = "drivecli")]
#[command(about = "Google Drive command-line client")]
#[command(version)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["list", "upload", "download", "delete"]),
))]
struct Cli {
    /// List files in the Drive root folder.
    #[arg(long)]
    list: bool,

    /// Upload a local file to Google Drive.
    #[arg(long, value_name = "PATH")]
    upload: Option<PathBuf>,

    /// Download a file from Google Drive.
    #[arg(long)]
    download: bool,

    /// Delete a file from Google Drive.
    #[arg(long)]
    delete: bool,

    /// Drive folder name to upload into (created when missing).
    #[arg(long, value_name = "NAME")]
    folder: Option<String>,

    /// File name to download or delete.
    #[arg(long, value_name = "NAME")]
    file: Option<String>,

    /// Destination folder for downloads.
    #[arg(long, value_name = "DIR", default_value = ".")]
    dest: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Map the parsed flags to the single requested operation.
    fn operation(&self) -> Operation {
        if self.list {
            Operation::List
        } else if let Some(source) = &self.upload {
            Operation::Upload {
                source: source.clone(),
                folder: self.folder.clone(),
            }
        } else if self.download {
            Operation::Download {
                file: self.file.clone(),
                dest: self.dest.clone(),
            }
        } else {
            Operation::Delete {
                file: self.file.clone(),
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = AuthConfig::from_secrets_file(Path::new(CLIENT_SECRETS_FILE))
        .context("Failed to load OAuth client secrets")?;
    let manager = CredentialManager::new(
        CredentialStore::new(CREDENTIALS_FILE),
        AuthManager::new(&config)?,
    );
    let credential = manager
        .authenticate()
        .await
        .context("Authentication failed")?;

    let client = DriveClient::new(&credential)?;
    let dispatcher = Dispatcher::new(client);
    dispatcher
        .run(cli.operation())
        .await
        .context("Operation failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one_action_is_required() {
        assert!(Cli::try_parse_from(["drivecli"]).is_err());
        assert!(Cli::try_parse_from(["drivecli", "--list", "--download"]).is_err());
        assert!(Cli::try_parse_from(["drivecli", "--list"]).is_ok());
    }

    #[test]
    fn test_list_flag_maps_to_list() {
        let cli = Cli::try_parse_from(["drivecli", "--list"]).unwrap();
        assert_eq!(cli.operation(), Operation::List);
    }

    #[test]
    fn test_upload_flags_map_to_upload() {
        let cli =
            Cli::try_parse_from(["drivecli", "--upload", "notes.txt", "--folder", "reports"])
                .unwrap();
        assert_eq!(
            cli.operation(),
            Operation::Upload {
                source: PathBuf::from("notes.txt"),
                folder: Some("reports".to_string()),
            }
        );
    }

    #[test]
    fn test_download_defaults_to_current_directory() {
        let cli = Cli::try_parse_from(["drivecli", "--download", "--file", "notes.txt"]).unwrap();
        assert_eq!(
            cli.operation(),
            Operation::Download {
                file: Some("notes.txt".to_string()),
                dest: PathBuf::from("."),
            }
        );
    }

    #[test]
    fn test_download_without_name_falls_back_to_interactive() {
        let cli = Cli::try_parse_from(["drivecli", "--download"]).unwrap();
        assert_eq!(
            cli.operation(),
            Operation::Download {
                file: None,
                dest: PathBuf::from("."),
            }
        );
    }

    #[test]
    fn test_delete_flags_map_to_delete() {
        let cli = Cli::try_parse_from(["drivecli", "--delete", "--file", "old.txt"]).unwrap();
        assert_eq!(
            cli.operation(),
            Operation::Delete {
                file: Some("old.txt".to_string()),
            }
        );
    }
}
