/// Remote transfer endpoint for slugs and finished archives
///
/// A session is opened for exactly one push and released afterwards, on the
/// error path as well as on success.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use std::path::Path;
use std::time::Duration;

/// Connection settings of the transfer endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteTarget {
    pub namespace: String,
    pub host: String,
    pub port: String,
    pub user: String,
    pub password: String,
}

impl RemoteTarget {
    /// Host and port are both required for remote pushes
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.port.is_empty()
    }
}

#[async_trait]
pub trait TransferClient: Send + Sync {
    async fn open(&self, target: &RemoteTarget) -> Result<Box<dyn TransferSession>>;
}

#[async_trait]
pub trait TransferSession: Send {
    /// Push a local file to `remote_path`, returning the bytes sent
    async fn push_file(&mut self, local: &Path, remote_path: &str) -> Result<u64>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Open a session, push one file and release the session whatever the
/// outcome of the push
pub async fn push_scoped(
    client: &dyn TransferClient,
    target: &RemoteTarget,
    local: &Path,
    remote_path: &str,
) -> Result<u64> {
    let mut session = client
        .open(target)
        .await
        .with_context(|| format!("Failed to connect to {}:{}", target.host, target.port))?;

    let pushed = session.push_file(local, remote_path).await;
    let closed = session.close().await;

    let size = pushed.with_context(|| {
        format!("Failed to push {} to {}", local.display(), remote_path)
    })?;
    if let Err(e) = closed {
        tracing::warn!(remote = remote_path, "failed to close transfer session: {:#}", e);
    }
    Ok(size)
}

/// Transfer client that uploads files with HTTP `PUT`
#[derive(Debug, Clone)]
pub struct HttpTransferClient {
    scheme: String,
    timeout: Duration,
}

impl HttpTransferClient {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            timeout: Duration::from_secs(60 * 60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn base_url(&self, target: &RemoteTarget) -> String {
        format!("{}://{}:{}", self.scheme, target.host, target.port)
    }
}

#[async_trait]
impl TransferClient for HttpTransferClient {
    async fn open(&self, target: &RemoteTarget) -> Result<Box<dyn TransferSession>> {
        if !target.is_configured() {
            bail!("Transfer endpoint host and port must be set");
        }

        let client = reqwest::Client::builder()
            .user_agent(format!("groupapp-backup/{}", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .build()
            .context("Failed to build transfer client")?;

        Ok(Box::new(HttpSession {
            client: Some(client),
            base_url: self.base_url(target),
            user: target.user.clone(),
            password: target.password.clone(),
        }))
    }
}

struct HttpSession {
    client: Option<reqwest::Client>,
    base_url: String,
    user: String,
    password: String,
}

#[async_trait]
impl TransferSession for HttpSession {
    async fn push_file(&mut self, local: &Path, remote_path: &str) -> Result<u64> {
        let client = self
            .client
            .as_ref()
            .context("Transfer session already closed")?;

        let file = tokio::fs::File::open(local)
            .await
            .with_context(|| format!("Failed to open {}", local.display()))?;
        let size = file.metadata().await?.len();

        let url = format!("{}/{}", self.base_url, remote_path.trim_start_matches('/'));
        let mut request = client.put(&url).header(CONTENT_LENGTH, size).body(file);
        if !self.user.is_empty() {
            request = request.basic_auth(&self.user, Some(&self.password));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to upload to {}", url))?;
        if !response.status().is_success() {
            bail!("Upload to {} failed: HTTP {}", url, response.status());
        }

        Ok(size)
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        self.client.take();
        Ok(())
    }
}

impl Drop for HttpSession {
    fn drop(&mut self) {
        if self.client.take().is_some() {
            tracing::debug!(endpoint = %self.base_url, "transfer session released without close");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryTransfer;
    use super::*;
    use tempfile::TempDir;

    fn target() -> RemoteTarget {
        RemoteTarget {
            namespace: "team".into(),
            host: "10.0.0.5".into(),
            port: "8080".into(),
            user: "backup".into(),
            password: "secret".into(),
        }
    }

    #[test]
    fn test_target_configuration() {
        assert!(target().is_configured());
        assert!(!RemoteTarget {
            port: String::new(),
            ..target()
        }
        .is_configured());
    }

    #[test]
    fn test_base_url() {
        let client = HttpTransferClient::new("https");
        assert_eq!(client.base_url(&target()), "https://10.0.0.5:8080");
    }

    #[test]
    fn test_with_timeout_overrides_default() {
        let client = HttpTransferClient::new("http");
        assert_eq!(client.timeout, Duration::from_secs(3600));
        let client = client.with_timeout(Duration::from_secs(90));
        assert_eq!(client.timeout, Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_http_open_requires_host_and_port() {
        let client = HttpTransferClient::new("http");
        assert!(client.open(&RemoteTarget::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_push_scoped_releases_session_on_success() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("slug.tgz");
        std::fs::write(&local, b"slug").unwrap();

        let transfer = MemoryTransfer::default();
        let size = push_scoped(&transfer, &target(), &local, "team/backup/a.tgz")
            .await
            .unwrap();
        assert_eq!(size, 4);
        assert_eq!(transfer.open_close(), (1, 1));
    }

    #[tokio::test]
    async fn test_push_scoped_releases_session_on_failure() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("slug.tgz");
        std::fs::write(&local, b"slug").unwrap();

        let transfer = MemoryTransfer::failing();
        let result = push_scoped(&transfer, &target(), &local, "team/backup/a.tgz").await;
        assert!(result.is_err());
        assert_eq!(transfer.open_close(), (1, 1));
        assert!(transfer.files().is_empty());
    }
}
