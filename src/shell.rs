//! Process-level plumbing shared by the desktop app and the headless
//! backend: runtime configuration, tracing, the embedded HTTP backend and
//! the health poll that gates the UI.

use crate::api::{self, SharedBridge};
use crate::bridge::BridgeCore;
use crate::errors::{AppError, AppResult};
use crate::form::{BackendApi, HttpBackend};
use crate::models::AppSettings;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing_appender::non_blocking::WorkerGuard;

pub const DATA_DIR_ENV: &str = "CHAT_TO_NOTION_DATA_DIR";
pub const PORT_ENV: &str = "CHAT_TO_NOTION_PORT";
pub const DEFAULT_PORT: u16 = 5000;
pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(1000);
pub const HEALTH_POLL_ATTEMPTS: u32 = 30;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Bootstrap settings read from the environment before the database exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub data_dir: Option<PathBuf>,
    pub host: IpAddr,
    pub port: u16,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let mut config = Self::default();
        if let Some(dir) = lookup(DATA_DIR_ENV).filter(|dir| !dir.trim().is_empty()) {
            config.data_dir = Some(PathBuf::from(dir.trim()));
        }
        if let Some(raw) = lookup(PORT_ENV).filter(|raw| !raw.trim().is_empty()) {
            config.port = raw
                .trim()
                .parse()
                .map_err(|_| AppError::InvalidInput(format!("{} must be a port number, got '{}'", PORT_ENV, raw)))?;
        }
        Ok(config)
    }

    pub fn data_dir_or(&self, fallback: impl Into<PathBuf>) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| fallback.into())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Installs the JSON file logger under `<data_dir>/logs`. Safe to call more
/// than once; later calls report the subscriber as already set.
pub fn init_tracing(data_dir: &Path, file_name: &str) -> AppResult<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}

/// Polls `/api/health` until it answers or `attempts` polls have failed.
pub async fn wait_for_backend(backend: &dyn BackendApi, interval: Duration, attempts: u32) -> AppResult<()> {
    for attempt in 1..=attempts {
        match backend.health().await {
            Ok(health) => {
                tracing::info!(attempt, status = %health.status, "backend is ready");
                return Ok(());
            }
            Err(error) => tracing::debug!(attempt, error = %error, "backend not ready yet"),
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }
    Err(AppError::Io(format!(
        "Backend did not become ready after {} attempts",
        attempts
    )))
}

/// The `/api/*` server running inside this process.
#[derive(Debug)]
pub struct EmbeddedBackend {
    address: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<AppResult<()>>>,
}

impl EmbeddedBackend {
    /// Binds `address` (port 0 picks a free port) and serves in a
    /// background task.
    pub async fn start(bridge: SharedBridge, address: SocketAddr) -> AppResult<Self> {
        let listener = TcpListener::bind(address).await?;
        let address = listener.local_addr()?;
        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(api::serve(listener, bridge, async move {
            let _ = signal.await;
        }));
        Ok(Self {
            address,
            shutdown: Some(shutdown),
            task: Some(task),
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.address)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Signals graceful shutdown and waits for the server task.
    pub async fn stop(mut self) -> AppResult<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|error| AppError::Internal(format!("backend task failed: {}", error)))?,
            None => Ok(()),
        }
    }
}

impl Drop for EmbeddedBackend {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// A started backend plus a client that already saw it answer.
#[derive(Debug)]
pub struct LaunchedBackend {
    pub server: EmbeddedBackend,
    pub client: Arc<HttpBackend>,
    pub settings: AppSettings,
}

/// Opens the backend store in `data_dir`, serves it on `address` and waits
/// for it to report healthy.
pub async fn launch_backend(data_dir: PathBuf, address: SocketAddr) -> AppResult<LaunchedBackend> {
    let bridge = BridgeCore::new(data_dir)?;
    let settings = bridge.settings()?;
    let server = EmbeddedBackend::start(bridge, address).await?;
    let client = Arc::new(HttpBackend::new(
        server.base_url(),
        Duration::from_secs(settings.request_timeout_secs.max(1)),
    )?);
    wait_for_backend(client.as_ref(), HEALTH_POLL_INTERVAL, HEALTH_POLL_ATTEMPTS).await?;
    Ok(LaunchedBackend {
        server,
        client,
        settings,
    })
}
