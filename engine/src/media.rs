use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use bytes::Bytes;
use log::info;

use crate::{Result, task::Asset};

/// Videos can be large, so transfers get more time than API calls.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);

/// Fetches a generated file. Result URLs are pre-signed, so no credential is sent.
pub async fn download(http: &reqwest::Client, url: &str) -> Result<Bytes> {
    Ok(http
        .get(url)
        .timeout(TRANSFER_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?)
}

/// Downloads `url` into `path` and returns the number of bytes written.
pub async fn save_url(http: &reqwest::Client, url: &str, path: &Path) -> Result<usize> {
    let data = download(http, url).await?;
    save_bytes(&data, path).await?;
    Ok(data.len())
}

pub async fn save_bytes(data: &[u8], path: &Path) -> Result<()> {
    tokio::fs::write(path, data).await?;
    info!("Saved {} bytes to {}", data.len(), path.display());
    Ok(())
}

/// Saves every asset next to `path`. A single asset goes to `path` itself,
/// several get numbered: `out.png`, `out-2.png`, ...
pub async fn save_assets(
    http: &reqwest::Client,
    assets: &[Asset],
    path: &Path,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(assets.len());
    for (i, asset) in assets.iter().enumerate() {
        let target = numbered(path, i);
        save_url(http, &asset.url, &target).await?;
        written.push(target);
    }
    Ok(written)
}

fn numbered(path: &Path, index: usize) -> PathBuf {
    if index == 0 {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{}.{}", index + 1, ext.to_string_lossy()),
        None => format!("{stem}-{}", index + 1),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod test {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;

    #[test]
    fn numbering() {
        assert_eq!(numbered(Path::new("out/rose.png"), 0), Path::new("out/rose.png"));
        assert_eq!(numbered(Path::new("out/rose.png"), 2), Path::new("out/rose-3.png"));
        assert_eq!(numbered(Path::new("rose"), 1), Path::new("rose-2"));
    }

    #[tokio::test]
    async fn saves_downloaded_assets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"first".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/2.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"second".to_vec()))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let assets = [
            Asset::new(format!("{}/1.png", server.uri())),
            Asset::new(format!("{}/2.png", server.uri())),
        ];

        let written = save_assets(&reqwest::Client::new(), &assets, &dir.path().join("rose.png"))
            .await
            .unwrap();

        assert_eq!(written.len(), 2);
        assert_eq!(std::fs::read(&written[0]).unwrap(), b"first");
        assert_eq!(std::fs::read(dir.path().join("rose-2.png")).unwrap(), b"second");
    }

    #[tokio::test]
    async fn expired_url_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("gone.png");

        let result = save_url(&reqwest::Client::new(), &server.uri(), &target).await;

        assert!(matches!(result, Err(crate::Error::Transport(_))));
        assert!(!target.exists());
    }
}
