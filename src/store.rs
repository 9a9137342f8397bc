//! Object storage for run artifacts and published models.
//!
//! Two backends sit behind [`ObjectStore`]: a directory tree on the local
//! filesystem (`file://` endpoints) and an S3-compatible HTTP gateway using
//! path-style `PUT`/`GET {endpoint}/{bucket}/{key}` requests. HTTP requests
//! carry at most a bearer token and are not SigV4 signed.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, error, info};

use crate::config::AwsConfig;
use crate::error::{PipelineError, Result};
use crate::model_io::model_from_bytes;
use crate::models::RandomForest;

/// Environment variable holding an optional bearer token for [`HttpStore`].
pub const TOKEN_ENV: &str = "OBJECT_STORE_TOKEN";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimal bucket/key storage.
pub trait ObjectStore {
    /// Store `body` under `bucket/key` and return the object's URI.
    fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<String>;

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}

/// Store rooted at a local directory; each bucket is a sub-directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.root.join(bucket);
        path.extend(key.split('/').filter(|part| !part.is_empty()));
        path
    }
}

impl ObjectStore for FsStore {
    fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<String> {
        let path = self.object_path(bucket, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::write(parent, e))?;
        }
        fs::write(&path, body).map_err(|e| PipelineError::write(&path, e))?;
        Ok(format!("file://{}", path.display()))
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, key);
        fs::read(&path).map_err(|e| PipelineError::read(&path, e))
    }
}

/// S3-compatible store reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStore {
    endpoint: String,
    token: Option<String>,
    client: Client,
}

impl HttpStore {
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(PipelineError::HttpClient)?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, bucket, key.trim_start_matches('/'))
    }
}

impl ObjectStore for HttpStore {
    fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<String> {
        let url = self.object_url(bucket, key);
        let mut request = self.client.put(&url).body(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
            .send()
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| PipelineError::Upload(format!("PUT {url}: {e}")))?;
        Ok(format!("s3://{bucket}/{key}"))
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let url = self.object_url(bucket, key);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let bytes = request
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.bytes())
            .map_err(|e| PipelineError::Upload(format!("GET {url}: {e}")))?;
        Ok(bytes.to_vec())
    }
}

/// Pick the backend for `endpoint`: `file://<dir>` or `http(s)://...`.
pub fn store_from_endpoint(endpoint: &str) -> Result<Box<dyn ObjectStore>> {
    if let Some(root) = endpoint.strip_prefix("file://") {
        return Ok(Box::new(FsStore::new(root)));
    }
    if endpoint.starts_with("http") {
        let token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty());
        return Ok(Box::new(HttpStore::new(endpoint, token)?));
    }
    Err(PipelineError::Upload(format!(
        "unsupported object store endpoint '{endpoint}'"
    )))
}

/// Key of an uploaded artifact: `prefix/timestamp/relative_path`.
pub fn object_key(prefix: &str, timestamp: &str, relative: &str) -> String {
    [prefix.trim_matches('/'), timestamp, relative]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/")
}

/// Every file under `dir`, recursively, sorted, as `/`-separated relative paths.
fn relative_files(dir: &Path) -> Result<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = fs::read_dir(&current).map_err(|e| PipelineError::read(&current, e))?;
        for entry in entries {
            let path = entry.map_err(|e| PipelineError::read(&current, e))?.path();
            if path.is_dir() {
                pending.push(path);
            } else if let Ok(rel) = path.strip_prefix(dir) {
                let rel = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((path, rel));
            }
        }
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

/// Upload every file of `artifacts_dir` into `aws.bucket_name` and return
/// the object URIs.
pub fn upload_artifacts<P: AsRef<Path>>(
    artifacts_dir: P,
    aws: &AwsConfig,
    timestamp: &str,
) -> Result<Vec<String>> {
    let artifacts_dir = artifacts_dir.as_ref();
    let bucket = aws
        .bucket_name
        .as_deref()
        .filter(|b| !b.trim().is_empty())
        .ok_or_else(|| PipelineError::Upload("no bucket name configured".into()))?;
    debug!(
        "Uploading artifacts from {} to bucket {} under prefix '{}'.",
        artifacts_dir.display(),
        bucket,
        aws.prefix
    );

    let store = store_from_endpoint(aws.endpoint()?)?;
    let mut uris = Vec::new();
    for (path, rel) in relative_files(artifacts_dir)? {
        let body = fs::read(&path).map_err(|e| PipelineError::read(&path, e))?;
        let key = object_key(&aws.prefix, timestamp, &rel);
        let uri = store.put(bucket, &key, body)?;
        debug!("Uploaded {}.", uri);
        uris.push(uri);
    }
    info!("{} artifacts uploaded to {}.", uris.len(), bucket);
    Ok(uris)
}

/// Download and decode `prefix/model_name` from `bucket`.
///
/// Any failure is logged and yields `None`.
pub fn fetch_model(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    model_name: &str,
) -> Option<RandomForest> {
    let key = object_key(prefix, "", model_name);
    debug!("Fetching model {} from bucket {}.", key, bucket);
    let fetched = store.get(bucket, &key).and_then(|bytes| model_from_bytes(&bytes));
    match fetched {
        Ok(model) => {
            info!("Model {} loaded.", key);
            Some(model)
        }
        Err(e) => {
            error!("Could not load model {} from bucket {}: {}", key, bucket, e);
            None
        }
    }
}
