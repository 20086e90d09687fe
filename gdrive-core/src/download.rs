use reqwest::{StatusCode, header};

use crate::client::{DriveClient, DriveError};

/// Default chunk size for media downloads, 8 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Pending,
    InProgress,
    Done,
}

/// Chunked download of a file's media content.
///
/// Each [`next_chunk`](MediaDownload::next_chunk) call issues one ranged
/// request and appends the returned bytes to an internal buffer. The download
/// is complete once the server has handed out the final byte of the
/// advertised total, or answered a plain 200 with the whole object. A failed
/// chunk request is not retried.
pub struct MediaDownload<'a> {
    client: &'a DriveClient,
    file_id: String,
    chunk_size: u64,
    buffer: Vec<u8>,
    offset: u64,
    state: DownloadState,
}

impl<'a> MediaDownload<'a> {
    pub fn new(client: &'a DriveClient, file_id: impl Into<String>) -> Self {
        Self {
            client,
            file_id: file_id.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            buffer: Vec::new(),
            offset: 0,
            state: DownloadState::Pending,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn state(&self) -> DownloadState {
        self.state
    }

    /// Requests the next chunk and returns the state after it was consumed.
    pub async fn next_chunk(&mut self) -> Result<DownloadState, DriveError> {
        if self.state == DownloadState::Done {
            return Ok(DownloadState::Done);
        }
        self.state = DownloadState::InProgress;

        let mut url = self
            .client
            .endpoint(&format!("/drive/v3/files/{}", self.file_id))?;
        url.query_pairs_mut().append_pair("alt", "media");
        let range_end = self.offset + self.chunk_size - 1;
        let response = self
            .client
            .http()
            .get(url)
            .header(header::AUTHORIZATION, self.client.auth_header_value())
            .header(header::RANGE, format!("bytes={}-{}", self.offset, range_end))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DriveError::NotFound(self.file_id.clone()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Api { status, body });
        }

        let total = if status == StatusCode::PARTIAL_CONTENT {
            response
                .headers()
                .get(header::CONTENT_RANGE)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_content_range_total)
        } else {
            None
        };

        let chunk = response.bytes().await?;
        self.buffer.extend_from_slice(&chunk);
        self.offset += chunk.len() as u64;

        let done = match (status, total) {
            (StatusCode::PARTIAL_CONTENT, Some(total)) => self.offset >= total,
            // 206 without a parsable Content-Range: a short read means the
            // server ran out of bytes.
            (StatusCode::PARTIAL_CONTENT, None) => (chunk.len() as u64) < self.chunk_size,
            // A plain 200 carries the whole object in one response.
            _ => true,
        };
        if done {
            self.state = DownloadState::Done;
        }
        Ok(self.state)
    }

    /// Drives the download to completion and returns the assembled bytes.
    pub async fn download_all(mut self) -> Result<Vec<u8>, DriveError> {
        while self.next_chunk().await? != DownloadState::Done {}
        Ok(self.buffer)
    }
}

/// Extracts the total length from a `Content-Range` value like `bytes 0-3/11`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_total_from_content_range() {
        assert_eq!(parse_content_range_total("bytes 0-3/11"), Some(11));
        assert_eq!(parse_content_range_total("bytes 8-10/11"), Some(11));
    }

    #[test]
    fn rejects_unknown_content_range_total() {
        assert_eq!(parse_content_range_total("bytes 0-3/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }
}
