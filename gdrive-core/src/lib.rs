mod client;
mod download;
mod oauth;

pub use client::{DriveClient, DriveError, DriveFile, FOLDER_MIME_TYPE, FileList};
pub use download::{DEFAULT_CHUNK_SIZE, DownloadState, MediaDownload};
pub use oauth::{OAuthClient, OAuthError, OAuthToken};
