/// Model file download from HuggingFace.
///
/// Fetches the ONNX model and tokenizer files that are missing from the
/// model directory. Uses blocking HTTP; call from a blocking context.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

pub const HF_BASE: &str = "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main";

/// (local file name, path below the repository root)
const MODEL_FILES: &[(&str, &str)] = &[
    ("model.onnx", "onnx/model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
    ("config.json", "config.json"),
    ("special_tokens_map.json", "special_tokens_map.json"),
    ("tokenizer_config.json", "tokenizer_config.json"),
];

#[must_use]
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("models/all-MiniLM-L6-v2")
}

#[must_use]
pub fn all_files_present(model_dir: &Path) -> bool {
    MODEL_FILES
        .iter()
        .all(|(name, _)| model_dir.join(name).exists())
}

pub fn download_model_files(model_dir: &Path) -> Result<()> {
    download_model_files_from(HF_BASE, model_dir)
}

/// Download every missing model file from `base_url`. Files already on disk
/// are left alone; a failed download leaves no partial file behind.
pub fn download_model_files_from(base_url: &str, model_dir: &Path) -> Result<()> {
    fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create model directory: {}", model_dir.display()))?;

    if all_files_present(model_dir) {
        info!("All model files found in {}", model_dir.display());
        return Ok(());
    }

    info!("Downloading embedding model into {}", model_dir.display());
    let client = reqwest::blocking::Client::builder()
        .timeout(None)
        .build()
        .context("failed to build HTTP client")?;

    for &(filename, url_path) in MODEL_FILES {
        let dest = model_dir.join(filename);
        if dest.exists() {
            continue;
        }

        let url = format!("{}/{url_path}", base_url.trim_end_matches('/'));
        info!("Downloading {filename}");
        download_file(&client, &dest, &url)
            .with_context(|| format!("failed to download {filename}"))?;
    }

    info!("Model download complete");
    Ok(())
}

fn download_file(client: &reqwest::blocking::Client, dest: &Path, url: &str) -> Result<()> {
    let resp = client
        .get(url)
        .send()
        .with_context(|| format!("HTTP request failed: {url}"))?;

    if !resp.status().is_success() {
        anyhow::bail!("bad status: {} for {url}", resp.status());
    }

    let pb = match resp.content_length() {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes}) {msg}")
                    .context("invalid progress template")?
                    .progress_chars("█▓░"),
            );
            pb
        }
        _ => ProgressBar::new_spinner(),
    };

    let partial = dest.with_extension("part");
    let mut file = fs::File::create(&partial)
        .with_context(|| format!("failed to create file: {}", partial.display()))?;

    let copied = io::copy(&mut pb.wrap_read(resp), &mut file);
    pb.finish_and_clear();
    if let Err(e) = copied {
        let _ = fs::remove_file(&partial);
        return Err(e).context("failed to write model file");
    }

    fs::rename(&partial, dest)
        .with_context(|| format!("failed to move {} into place", partial.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_all_files_present_empty_dir() {
        let dir = tempdir().unwrap();
        assert!(!all_files_present(dir.path()));
    }

    #[test]
    fn test_all_files_present_partial_and_complete() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("tokenizer.json"), "dummy").unwrap();
        assert!(!all_files_present(dir.path()));

        for &(name, _) in MODEL_FILES {
            fs::write(dir.path().join(name), "dummy").unwrap();
        }
        assert!(all_files_present(dir.path()));
    }

    #[test]
    fn test_default_model_dir() {
        assert!(default_model_dir().ends_with("all-MiniLM-L6-v2"));
    }

    #[tokio::test]
    async fn test_downloads_only_missing_files() {
        let server = MockServer::start().await;
        for &(name, url_path) in MODEL_FILES {
            Mock::given(method("GET"))
                .and(path(format!("/{url_path}")))
                .respond_with(ResponseTemplate::new(200).set_body_string(format!("body of {name}")))
                .mount(&server)
                .await;
        }

        let dir = tempdir().unwrap();
        fs::write(dir.path().join("config.json"), "local").unwrap();

        let base = server.uri();
        let model_dir = dir.path().to_path_buf();
        tokio::task::spawn_blocking(move || download_model_files_from(&base, &model_dir))
            .await
            .unwrap()
            .unwrap();

        assert!(all_files_present(dir.path()));
        assert_eq!(
            fs::read_to_string(dir.path().join("model.onnx")).unwrap(),
            "body of model.onnx"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("config.json")).unwrap(),
            "local"
        );
        assert!(!dir.path().join("model.part").exists());
    }

    #[tokio::test]
    async fn test_http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let base = server.uri();
        let model_dir = dir.path().to_path_buf();
        let result =
            tokio::task::spawn_blocking(move || download_model_files_from(&base, &model_dir))
                .await
                .unwrap();
        assert!(result.is_err());
        assert!(!dir.path().join("model.onnx").exists());
    }
}
