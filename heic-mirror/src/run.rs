use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::Context;
use gdrive_core::DriveClient;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use crate::auth;
use crate::config::RunConfig;
use crate::mirror::{self, Walker};

/// Drives one conversion run end to end: overwrite confirmation, credential
/// resolution, advisory count, then the walk. The confirmation gate comes
/// first so a declined run performs no network activity at all.
pub async fn run_conversion(config: &RunConfig, input: impl BufRead) -> anyhow::Result<()> {
    if config.local_root.exists() && !confirm_overwrite(&config.local_root, input)? {
        warn!("operation cancelled by the user");
        return Ok(());
    }

    let credentials = auth::resolve_credentials(config, None)
        .await
        .context("failed to resolve Drive credentials")?;
    let client = DriveClient::new(credentials.access_token)?;

    run_with_client(config, &client).await
}

/// Counts, then walks. Split from credential handling so tests can point it
/// at a mock server.
pub async fn run_with_client(config: &RunConfig, client: &DriveClient) -> anyhow::Result<()> {
    let total = mirror::count_files(client, &config.root_folder_id)
        .await
        .context("failed to count remote files")?;
    let progress = overall_progress_bar(total);
    let walker = Walker::new(client, &config.local_root, config.format, &progress);

    // An interrupt is caught only here, around the top-level walk; the
    // dropped walk leaves partially written files on disk as-is.
    tokio::select! {
        result = walker.walk(&config.root_folder_id) => {
            result.context("walk aborted")?;
            progress.finish();
        }
        _ = tokio::signal::ctrl_c() => {
            progress.abandon();
            warn!("process interrupted by user, exiting");
        }
    }
    Ok(())
}

fn confirm_overwrite(local_root: &Path, mut input: impl BufRead) -> anyhow::Result<bool> {
    print!(
        "The directory '{}' already exists. Overwrite? (y/n): ",
        local_root.display()
    );
    std::io::stdout().flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn overall_progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")
            .expect("progress template is valid")
            .progress_chars("━━╌"),
    );
    bar.set_message("Overall Progress");
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetFormat;
    use gdrive_core::FOLDER_MIME_TYPE;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path as url_path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_in(dir: &TempDir) -> RunConfig {
        let mut config =
            RunConfig::new("root", dir.path().join("mirror"), false, TargetFormat::Jpg);
        // Credential files deliberately absent: reaching the auth chain in a
        // declined run would fail the test with NoUsableCredentials.
        config.token_cache_path = dir.path().join("token.json");
        config.client_secrets_path = dir.path().join("credentials.json");
        config.fallback_credentials_path = dir.path().join("default_credentials.json");
        config
    }

    #[test]
    fn affirmative_answer_is_y_case_insensitive() {
        let root = Path::new("mirror");
        assert!(confirm_overwrite(root, &b"y\n"[..]).unwrap());
        assert!(confirm_overwrite(root, &b"Y\n"[..]).unwrap());
        assert!(!confirm_overwrite(root, &b"n\n"[..]).unwrap());
        assert!(!confirm_overwrite(root, &b"yes\n"[..]).unwrap());
        assert!(!confirm_overwrite(root, &b"\n"[..]).unwrap());
    }

    #[tokio::test]
    async fn declined_overwrite_exits_cleanly_before_any_network_call() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.local_root = dir.path().to_path_buf();

        run_conversion(&config, &b"n\n"[..]).await.unwrap();

        // Nothing was written next to the pre-existing destination.
        assert!(!config.token_cache_path.exists());
    }

    #[tokio::test]
    async fn accepted_overwrite_proceeds_to_credential_resolution() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.local_root = dir.path().to_path_buf();

        let err = run_conversion(&config, &b"y\n"[..])
            .await
            .expect_err("no credentials are available");

        assert!(err.to_string().contains("credentials"));
    }

    #[tokio::test]
    async fn walks_and_mirrors_after_counting() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/drive/v3/files"))
            .and(query_param("q", "'root' in parents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [
                    { "id": "f1", "name": "b.txt", "mimeType": "text/plain" },
                    { "id": "d1", "name": "sub", "mimeType": FOLDER_MIME_TYPE }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/drive/v3/files"))
            .and(query_param("q", "'d1' in parents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [{ "id": "f2", "name": "c.txt", "mimeType": "text/plain" }]
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let client = DriveClient::with_base_url(&server.uri(), "test-token").unwrap();

        run_with_client(&config, &client).await.unwrap();

        assert!(config.local_root.join("sub").is_dir());
        assert!(!config.local_root.join("b.txt").exists());
    }

    #[tokio::test]
    async fn unresolved_root_aborts_the_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let client = DriveClient::with_base_url(&server.uri(), "test-token").unwrap();

        let err = run_with_client(&config, &client)
            .await
            .expect_err("expected count to fail");

        assert!(err.to_string().contains("count"));
        assert!(!config.local_root.exists());
    }
}
