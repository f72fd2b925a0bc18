use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use courier_types::StoreError;
use courier_types::models::DEFAULT_PROFILE_PIC;

/// 5 MB limit for an uploaded profile picture
const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;

/// What the caller handed in for a profile picture.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfilePicture {
    Absent,
    /// An `http(s)://` URL, stored verbatim.
    Url(String),
    /// Raw image bytes to hand to the asset host.
    Image(Vec<u8>),
}

impl ProfilePicture {
    /// Accepts nothing, a URL, or a `data:<mime>;base64,<payload>` URI.
    pub fn parse(input: Option<&str>) -> Result<Self, StoreError> {
        let input = match input.map(str::trim) {
            None | Some("") => return Ok(Self::Absent),
            Some(input) => input,
        };

        if input.starts_with("https://") || input.starts_with("http://") {
            return Ok(Self::Url(input.to_string()));
        }

        let payload = input
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(";base64,"))
            .map(|(_mime, payload)| payload)
            .ok_or_else(|| StoreError::validation("profile_pic must be a URL or a base64 data URI"))?;

        let bytes = B64
            .decode(payload)
            .map_err(|_| StoreError::validation("profile_pic data URI is not valid base64"))?;
        if bytes.is_empty() {
            return Err(StoreError::validation("profile_pic image is empty"));
        }
        if bytes.len() > MAX_IMAGE_SIZE {
            return Err(StoreError::validation("profile_pic image is too large"));
        }

        Ok(Self::Image(bytes))
    }
}

/// Something that can take image bytes and give back a stable URL for them.
pub trait AssetHost: Send + Sync + 'static {
    fn store(&self, image: Vec<u8>) -> impl Future<Output = Result<String>> + Send;
}

/// Resolve a profile picture to the URL that gets persisted.
pub async fn resolve_profile_pic<A: AssetHost>(assets: &A, picture: ProfilePicture) -> Result<String> {
    match picture {
        ProfilePicture::Absent => Ok(DEFAULT_PROFILE_PIC.to_string()),
        ProfilePicture::Url(url) => Ok(url),
        ProfilePicture::Image(bytes) => assets.store(bytes).await,
    }
}

/// Content-addressed image files on local disk, served under `/assets/`.
pub struct DiskAssetHost {
    dir: PathBuf,
    public_base: String,
}

impl DiskAssetHost {
    pub async fn new(dir: PathBuf, public_base: &str) -> Result<Self> {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create asset directory {}", dir.display()))?;
        info!("Asset directory: {}", dir.display());
        Ok(Self {
            dir,
            public_base: public_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

impl AssetHost for DiskAssetHost {
    async fn store(&self, image: Vec<u8>) -> Result<String> {
        let digest = hex::encode(Sha256::digest(&image));
        let path = self.dir.join(&digest);

        // Same bytes, same name: an existing file is already correct.
        if !tokio::fs::try_exists(&path).await? {
            tokio::fs::write(&path, &image)
                .await
                .with_context(|| format!("Failed to write asset {}", path.display()))?;
            debug!("Stored asset {} ({} bytes)", digest, image.len());
        }

        Ok(format!("{}/assets/{}", self.public_base, digest))
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

/// Uploads to a remote image host that answers `{"secure_url": "..."}`.
pub struct HttpAssetHost {
    client: reqwest::Client,
    upload_url: String,
}

impl HttpAssetHost {
    pub fn new(upload_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_url,
        }
    }
}

impl AssetHost for HttpAssetHost {
    async fn store(&self, image: Vec<u8>) -> Result<String> {
        let response: UploadResponse = self
            .client
            .post(&self.upload_url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image)
            .send()
            .await
            .context("Asset upload request failed")?
            .error_for_status()
            .context("Asset host rejected upload")?
            .json()
            .await
            .context("Asset host returned an unexpected body")?;

        Ok(response.secure_url)
    }
}

/// The asset host picked at startup.
pub enum AssetBackend {
    Disk(DiskAssetHost),
    Remote(HttpAssetHost),
}

impl AssetHost for AssetBackend {
    async fn store(&self, image: Vec<u8>) -> Result<String> {
        match self {
            Self::Disk(host) => host.store(image).await,
            Self::Remote(host) => host.store(image).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{Json, Router, body::Bytes, http::StatusCode, routing::post};
    use chrono::Duration;

    use courier_db::Database;

    use crate::{IdentityStore, TokenIssuer};

    /// Local image host: `/upload` answers with a `secure_url`, `/broken`
    /// always fails.
    async fn image_host() -> String {
        let app = Router::new()
            .route(
                "/upload",
                post(|body: Bytes| async move {
                    Json(serde_json::json!({ "secure_url": format!("https://img.test/{}", body.len()) }))
                }),
            )
            .route("/broken", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn http_host_returns_secure_url() {
        let base = image_host().await;
        let host = HttpAssetHost::new(format!("{base}/upload"));

        let url = host.store(b"hello".to_vec()).await.unwrap();
        assert_eq!(url, "https://img.test/5");

        let broken = HttpAssetHost::new(format!("{base}/broken"));
        assert!(broken.store(b"hello".to_vec()).await.is_err());
    }

    #[tokio::test]
    async fn register_reports_failed_upload_as_storage_error() {
        let base = image_host().await;
        let identity = IdentityStore::new(
            Arc::new(Database::open_in_memory().unwrap()),
            Arc::new(AssetBackend::Remote(HttpAssetHost::new(format!("{base}/broken")))),
            TokenIssuer::new("test-secret", Duration::hours(1)),
        );

        let err = identity
            .register("Alice", "a@x.com", "pw1", Some("data:image/png;base64,aGVsbG8="))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        assert!(identity.list_all().unwrap().is_empty());

        // a URL never touches the host
        let user = identity
            .register("Alice", "a@x.com", "pw1", Some("https://cdn.example.com/a.png"))
            .await
            .unwrap();
        assert_eq!(user.profile_pic, "https://cdn.example.com/a.png");
    }

    #[test]
    fn parse_picture_inputs() {
        assert_eq!(ProfilePicture::parse(None).unwrap(), ProfilePicture::Absent);
        assert_eq!(ProfilePicture::parse(Some("  ")).unwrap(), ProfilePicture::Absent);
        assert_eq!(
            ProfilePicture::parse(Some("https://cdn.example.com/me.png")).unwrap(),
            ProfilePicture::Url("https://cdn.example.com/me.png".into())
        );

        let uri = format!("data:image/png;base64,{}", B64.encode(b"\x89PNG fake"));
        assert_eq!(
            ProfilePicture::parse(Some(&uri)).unwrap(),
            ProfilePicture::Image(b"\x89PNG fake".to_vec())
        );
    }

    #[test]
    fn parse_rejects_unknown_forms() {
        for input in ["/home/me/pic.png", "data:image/png;base64,!!!", "data:image/png;base64,"] {
            assert!(matches!(
                ProfilePicture::parse(Some(input)),
                Err(StoreError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn absent_picture_gets_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let host = DiskAssetHost::new(dir.path().to_path_buf(), "http://localhost").await.unwrap();
        let url = resolve_profile_pic(&host, ProfilePicture::Absent).await.unwrap();
        assert_eq!(url, DEFAULT_PROFILE_PIC);
    }

    #[tokio::test]
    async fn disk_host_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let host = DiskAssetHost::new(dir.path().join("assets"), "http://localhost:8080/")
            .await
            .unwrap();

        let first = host.store(b"image-bytes".to_vec()).await.unwrap();
        let again = host.store(b"image-bytes".to_vec()).await.unwrap();
        let other = host.store(b"other-bytes".to_vec()).await.unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert!(first.starts_with("http://localhost:8080/assets/"));

        let digest = first.rsplit('/').next().unwrap();
        let stored = std::fs::read(host.dir().join(digest)).unwrap();
        assert_eq!(stored, b"image-bytes");
    }
}
