//! Remote cache tier
//!
//! The remote protocol is three operations over a flat key namespace:
//! head (existence and size), get (stream to a local file) and put
//! (stream from a local file). Objects are never deleted.

use crate::cache::EntryMeta;
use crate::config::schema::RemoteConfig;
use crate::config::CONFIG_FILE_NAME;
use crate::error::{TarmacError, TarmacResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

/// A keyed blob store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Metadata when the object exists, `None` when it does not
    async fn head(&self, object: &str) -> TarmacResult<Option<EntryMeta>>;

    /// Stream the object into `to`
    async fn get(&self, object: &str, to: &Path) -> TarmacResult<()>;

    /// Stream `from` into the object
    async fn put(&self, object: &str, from: &Path) -> TarmacResult<()>;

    /// Human-readable location for messages
    fn describe(&self) -> String;
}

/// Build the configured remote tier, if any
pub fn from_config(config: &RemoteConfig) -> TarmacResult<Option<Arc<dyn RemoteStore>>> {
    let Some(url) = config.url.as_deref().filter(|u| !u.is_empty()) else {
        debug!("No remote cache configured, running local-only");
        return Ok(None);
    };

    if let Some(path) = url.strip_prefix("file://") {
        let mut dir = PathBuf::from(path);
        if let Some(ref bucket) = config.bucket {
            dir = dir.join(bucket);
        }
        return Ok(Some(Arc::new(DirectoryRemote::new(dir))));
    }

    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(Some(Arc::new(HttpRemote::new(
            url,
            config.bucket.as_deref(),
            config.token.clone(),
        ))));
    }

    Err(TarmacError::ConfigInvalid {
        path: PathBuf::from(CONFIG_FILE_NAME),
        reason: format!("unsupported remote.url scheme: {}", url),
    })
}

/// HTTP blob store: `HEAD/GET/PUT {base}/{bucket}/{object}`
pub struct HttpRemote {
    agent: ureq::Agent,
    base: String,
    token: Option<String>,
}

impl HttpRemote {
    /// Create a client for `base_url`, optionally scoped to a bucket
    pub fn new(base_url: &str, bucket: Option<&str>, token: Option<String>) -> Self {
        let mut base = base_url.trim_end_matches('/').to_string();
        if let Some(bucket) = bucket.map(|b| b.trim_matches('/')).filter(|b| !b.is_empty()) {
            base.push('/');
            base.push_str(bucket);
        }

        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build();

        Self {
            agent: ureq::Agent::new_with_config(config),
            base,
            token,
        }
    }

    /// URL of one object
    pub fn object_url(&self, object: &str) -> String {
        format!("{}/{}", self.base, object)
    }

    fn auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }

    /// Run a blocking request on the blocking pool
    async fn blocking<T, F>(object: &str, f: F) -> TarmacResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> TarmacResult<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| TarmacError::transport(object, format!("request task failed: {}", e)))?
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn head(&self, object: &str) -> TarmacResult<Option<EntryMeta>> {
        let agent = self.agent.clone();
        let url = self.object_url(object);
        let auth = self.auth_header();
        let key = object.to_string();
        debug!("HEAD {}", url);

        Self::blocking(object, move || {
            let mut request = agent.head(&url);
            if let Some(auth) = auth {
                request = request.header("Authorization", auth);
            }
            let response = request.call().map_err(|e| TarmacError::transport(&key, e))?;

            match response.status().as_u16() {
                200..=299 => {
                    let size = response
                        .headers()
                        .get("content-length")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(0);
                    Ok(Some(EntryMeta { size }))
                }
                404 => Ok(None),
                status => Err(TarmacError::RemoteStatus { key, status }),
            }
        })
        .await
    }

    async fn get(&self, object: &str, to: &Path) -> TarmacResult<()> {
        let agent = self.agent.clone();
        let url = self.object_url(object);
        let auth = self.auth_header();
        let key = object.to_string();
        let to = to.to_path_buf();
        debug!("GET {} -> {}", url, to.display());

        Self::blocking(object, move || {
            let mut request = agent.get(&url);
            if let Some(auth) = auth {
                request = request.header("Authorization", auth);
            }
            let response = request.call().map_err(|e| TarmacError::transport(&key, e))?;

            let status = response.status().as_u16();
            if !(200..=299).contains(&status) {
                return Err(TarmacError::RemoteStatus { key, status });
            }

            let mut file = std::fs::File::create(&to)
                .map_err(|e| TarmacError::io(format!("creating {}", to.display()), e))?;
            let mut reader = response.into_body().into_reader();
            std::io::copy(&mut reader, &mut file).map_err(|e| TarmacError::transport(&key, e))?;
            file.sync_all()
                .map_err(|e| TarmacError::io(format!("writing {}", to.display()), e))
        })
        .await
    }

    async fn put(&self, object: &str, from: &Path) -> TarmacResult<()> {
        let agent = self.agent.clone();
        let url = self.object_url(object);
        let auth = self.auth_header();
        let key = object.to_string();
        let from = from.to_path_buf();
        debug!("PUT {} <- {}", url, from.display());

        Self::blocking(object, move || {
            let file = std::fs::File::open(&from)
                .map_err(|e| TarmacError::io(format!("opening {}", from.display()), e))?;
            let size = file
                .metadata()
                .map_err(|e| TarmacError::io(format!("inspecting {}", from.display()), e))?
                .len();

            let mut request = agent
                .put(&url)
                .header("Content-Type", "application/x-tar")
                .header("Content-Length", size.to_string());
            if let Some(auth) = auth {
                request = request.header("Authorization", auth);
            }
            let response = request
                .send(file)
                .map_err(|e| TarmacError::transport(&key, e))?;

            match response.status().as_u16() {
                200..=299 => Ok(()),
                status => Err(TarmacError::RemoteStatus { key, status }),
            }
        })
        .await
    }

    fn describe(&self) -> String {
        self.base.clone()
    }
}

/// A shared directory used as the remote tier
pub struct DirectoryRemote {
    dir: PathBuf,
    partial_seq: AtomicU64,
}

impl DirectoryRemote {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            partial_seq: AtomicU64::new(0),
        }
    }

    fn object_path(&self, object: &str) -> PathBuf {
        self.dir.join(object)
    }

    /// Unique scratch path for one upload, named like the local tier's
    fn partial_path(&self, object: &str) -> PathBuf {
        let seq = self.partial_seq.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!(".{}.{}.{}.partial", object, std::process::id(), seq))
    }
}

#[async_trait]
impl RemoteStore for DirectoryRemote {
    async fn head(&self, object: &str) -> TarmacResult<Option<EntryMeta>> {
        match fs::metadata(self.object_path(object)).await {
            Ok(meta) if meta.is_file() => Ok(Some(EntryMeta { size: meta.len() })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TarmacError::transport(object, e)),
        }
    }

    async fn get(&self, object: &str, to: &Path) -> TarmacResult<()> {
        fs::copy(self.object_path(object), to)
            .await
            .map(|_| ())
            .map_err(|e| TarmacError::transport(object, e))
    }

    async fn put(&self, object: &str, from: &Path) -> TarmacResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| TarmacError::transport(object, e))?;

        // Same scratch-then-rename discipline as the local tier
        let scratch = self.partial_path(object);
        if let Err(e) = fs::copy(from, &scratch).await {
            crate::cache::local::discard(&scratch).await;
            return Err(TarmacError::transport(object, e));
        }
        if let Err(e) = fs::rename(&scratch, self.object_path(object)).await {
            crate::cache::local::discard(&scratch).await;
            return Err(TarmacError::transport(object, e));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file://{}", self.dir.display())
    }
}
