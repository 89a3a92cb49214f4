use crate::config::HubConfig;
use crate::html::render_fallback;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use devdash_core::{
    merge, project_view, LogRegistry, LogStore, Manifest, ProjectPath, Registry, ServiceRecord,
    ServiceStore, ServiceView, StoreRegistry,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    io,
    net::{Ipv4Addr, SocketAddr},
    path::Path,
    sync::{
        atomic::{AtomicU16, AtomicU64, Ordering},
        Arc, OnceLock, Weak,
    },
    time::Duration,
};
use thiserror::Error;
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc, watch, Notify},
    task::JoinHandle,
};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, error, info, warn};

const PORT_RANGE_START: u16 = 40000;
const PORT_RANGE_SIZE: u32 = 10000;
const MAX_PORT_ATTEMPTS: u16 = 15;
const STOP_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_LOG_TAIL: usize = 500;
const ALLOWED_ORIGINS: [&str; 4] = [
    "http://localhost",
    "http://127.0.0.1",
    "https://localhost",
    "https://127.0.0.1",
];

#[derive(Debug, Error)]
pub enum HubError {
    #[error("dashboard for {0} is already started")]
    AlreadyStarted(String),
    #[error("dashboard for {0} has been stopped")]
    Stopped(String),
    #[error("failed to bind dashboard listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

enum Lifecycle {
    Created,
    Starting,
    Running { task: JoinHandle<()> },
    Stopped,
}

struct Client {
    sender: mpsc::Sender<Message>,
    kick: Arc<Notify>,
}

#[derive(Debug, Serialize)]
struct ProjectInfo {
    name: String,
    dir: String,
}

/// Query string of the log endpoints. `tail` is parsed leniently: anything
/// that is not a number falls back to the default.
#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub tail: Option<String>,
}

impl LogQuery {
    fn service(&self) -> Option<&str> {
        self.service.as_deref().filter(|name| !name.is_empty())
    }

    fn tail(&self) -> usize {
        self.tail
            .as_deref()
            .and_then(|tail| tail.trim().parse().ok())
            .unwrap_or(DEFAULT_LOG_TAIL)
    }
}

/// Per-project dashboard: status API, WebSocket push and fallback page.
pub struct DashboardServer {
    project: ProjectPath,
    store: Arc<ServiceStore>,
    logs: Arc<LogStore>,
    config: HubConfig,
    registry: Weak<Registry<DashboardServer>>,
    conn_counter: AtomicU64,
    port: AtomicU16,
    clients: Mutex<HashMap<String, Client>>,
    lifecycle: Mutex<Lifecycle>,
    shutdown: watch::Sender<bool>,
}

impl DashboardServer {
    fn new(
        project: ProjectPath,
        store: Arc<ServiceStore>,
        logs: Arc<LogStore>,
        config: HubConfig,
        registry: Weak<Registry<DashboardServer>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            project,
            store,
            logs,
            config,
            registry,
            conn_counter: AtomicU64::new(0),
            port: AtomicU16::new(0),
            clients: Mutex::new(HashMap::new()),
            lifecycle: Mutex::new(Lifecycle::Created),
            shutdown,
        }
    }

    pub fn project(&self) -> &ProjectPath {
        &self.project
    }

    pub fn store(&self) -> &Arc<ServiceStore> {
        &self.store
    }

    pub fn logs(&self) -> &Arc<LogStore> {
        &self.logs
    }

    /// Bound port, `0` until the server has been started.
    pub fn port(&self) -> u16 {
        self.port.load(Ordering::SeqCst)
    }

    pub fn url(&self) -> Option<String> {
        match self.port() {
            0 => None,
            port => Some(format!("http://localhost:{port}")),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Running { .. })
    }

    pub fn is_stopped(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Stopped)
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Declared services merged with the live store. The manifest is read on
    /// the blocking pool.
    pub async fn services(&self) -> Vec<ServiceView> {
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || project_view(&store)).await {
            Ok(views) => views,
            Err(err) => {
                warn!(event = "service_view_error", project = %self.project, error = %err);
                merge(&[], &self.store.list())
            }
        }
    }

    /// Binds the listener and serves in the background. `Some(0)` asks the OS
    /// for an ephemeral port; `None` tries the project's preferred port range
    /// first. Returns the dashboard URL.
    pub async fn start(self: &Arc<Self>, port: Option<u16>) -> Result<String, HubError> {
        {
            let mut lifecycle = self.lifecycle.lock();
            match *lifecycle {
                Lifecycle::Created => *lifecycle = Lifecycle::Starting,
                Lifecycle::Stopped => return Err(HubError::Stopped(self.project.to_string())),
                Lifecycle::Starting | Lifecycle::Running { .. } => {
                    return Err(HubError::AlreadyStarted(self.project.to_string()))
                }
            }
        }

        let listener = match self.bind(port).await {
            Ok(listener) => listener,
            Err(err) => {
                let mut lifecycle = self.lifecycle.lock();
                if matches!(*lifecycle, Lifecycle::Starting) {
                    *lifecycle = Lifecycle::Created;
                }
                return Err(err);
            }
        };
        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(source) => {
                let mut lifecycle = self.lifecycle.lock();
                if matches!(*lifecycle, Lifecycle::Starting) {
                    *lifecycle = Lifecycle::Created;
                }
                return Err(HubError::Bind {
                    addr: SocketAddr::from((Ipv4Addr::LOCALHOST, port.unwrap_or(0))),
                    source,
                });
            }
        };

        let app = self.router();
        let mut shutdown = self.shutdown.subscribe();
        let project = self.project.to_string();
        let task = tokio::spawn(async move {
            let signal = async move { wait_for_shutdown(&mut shutdown).await };
            if let Err(err) = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(signal)
            .await
            {
                error!(event = "dashboard_error", project = %project, error = %err);
            }
        });

        {
            let mut lifecycle = self.lifecycle.lock();
            if matches!(*lifecycle, Lifecycle::Stopped) {
                task.abort();
                return Err(HubError::Stopped(self.project.to_string()));
            }
            *lifecycle = Lifecycle::Running { task };
        }
        self.port.store(addr.port(), Ordering::SeqCst);

        let url = format!("http://localhost:{}", addr.port());
        info!(event = "dashboard_start", project = %self.project, url = %url);
        Ok(url)
    }

    /// Halts serving, closes every client and leaves the registry. Repeated
    /// calls are no-ops.
    pub async fn stop(self: &Arc<Self>) {
        let task = {
            let mut lifecycle = self.lifecycle.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Stopped => return,
                Lifecycle::Running { task } => Some(task),
                Lifecycle::Created | Lifecycle::Starting => None,
            }
        };

        self.shutdown.send_replace(true);
        let clients: Vec<_> = {
            let mut clients = self.clients.lock();
            clients.drain().collect()
        };
        for (conn_id, client) in clients {
            let _ = client.sender.try_send(Message::Close(Some(CloseFrame {
                code: 1001,
                reason: "dashboard stopped".into(),
            })));
            client.kick.notify_one();
            debug!(event = "client_closed", conn_id = %conn_id, reason = "stop");
        }

        if let Some(registry) = self.registry.upgrade() {
            registry.remove_instance(self.project.key(), self);
        }

        if let Some(mut task) = task {
            if tokio::time::timeout(STOP_TIMEOUT, &mut task).await.is_err() {
                warn!(event = "dashboard_stop_timeout", project = %self.project);
                task.abort();
            }
        }
        info!(event = "dashboard_stop", project = %self.project);
    }

    /// Pushes `services` to every connected client. Clients whose queue is full
    /// or closed are dropped; the others are unaffected. Returns the number of
    /// clients the frame was queued for.
    pub fn broadcast_update(&self, services: &[ServiceRecord]) -> usize {
        let views: Vec<ServiceView> = services.iter().map(ServiceView::from).collect();
        self.broadcast_views(&views)
    }

    /// Re-merges manifest and live state and pushes the result.
    pub async fn broadcast_current(&self) -> usize {
        let views = self.services().await;
        self.broadcast_views(&views)
    }

    fn broadcast_views(&self, views: &[ServiceView]) -> usize {
        let frame = match serde_json::to_string(views) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(event = "broadcast_encode_error", error = %err);
                return 0;
            }
        };

        let targets: Vec<(String, mpsc::Sender<Message>)> = self
            .clients
            .lock()
            .iter()
            .map(|(conn_id, client)| (conn_id.clone(), client.sender.clone()))
            .collect();

        let mut delivered = 0;
        let mut dropped = Vec::new();
        for (conn_id, sender) in targets {
            match sender.try_send(Message::Text(frame.clone())) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(event = "slow_consumer", conn_id = %conn_id);
                    dropped.push((conn_id, "slow_consumer"));
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(event = "send_error", conn_id = %conn_id);
                    dropped.push((conn_id, "send_error"));
                }
            }
        }
        for (conn_id, reason) in dropped {
            self.remove_client(&conn_id, reason);
        }
        debug!(event = "broadcast", services = views.len(), delivered);
        delivered
    }

    fn next_conn_id(&self) -> String {
        let id = self.conn_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("conn-{id}")
    }

    fn register_client(&self, conn_id: &str, client: Client) -> bool {
        let mut clients = self.clients.lock();
        if *self.shutdown.borrow() {
            return false;
        }
        clients.insert(conn_id.to_string(), client);
        info!(event = "client_connected", conn_id = %conn_id, project = %self.project);
        true
    }

    fn remove_client(&self, conn_id: &str, reason: &str) {
        let removed = self.clients.lock().remove(conn_id);
        if let Some(client) = removed {
            client.kick.notify_one();
            info!(event = "client_disconnected", conn_id = %conn_id, reason = reason);
        }
    }

    async fn bind(&self, port: Option<u16>) -> Result<TcpListener, HubError> {
        let candidates = match port {
            Some(port) => vec![port],
            None => candidate_ports(self.project.key()),
        };

        let mut last_error = None;
        for candidate in candidates {
            let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, candidate));
            match TcpListener::bind(addr).await {
                Ok(listener) => return Ok(listener),
                Err(err) => {
                    debug!(event = "dashboard_port_busy", port = candidate, error = %err);
                    last_error = Some(HubError::Bind { addr, source: err });
                }
            }
        }
        Err(last_error.unwrap_or_else(|| HubError::Bind {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            source: io::Error::new(io::ErrorKind::AddrNotAvailable, "no candidate ports"),
        }))
    }

    fn router(self: &Arc<Self>) -> Router {
        let router = Router::new()
            .route("/api/services", get(handle_get_services))
            .route("/api/project", get(handle_get_project))
            .route("/api/logs", get(handle_get_logs))
            .route("/api/logs/stream", get(handle_log_stream))
            .route("/api/ws", get(handle_websocket))
            .route("/health", get(|| async { "ok" }));
        let router = match self.config.ui_assets() {
            Some(dir) => {
                let index = ServeFile::new(dir.join("index.html"));
                router.fallback_service(ServeDir::new(dir).fallback(index))
            }
            None => router.fallback(handle_fallback),
        };
        router.with_state(self.clone())
    }

    async fn handle_socket(self: Arc<Self>, socket: WebSocket, remote: SocketAddr) {
        let (ws_sender, mut ws_receiver) = socket.split();
        let (tx, write_task) = spawn_writer(ws_sender, &self.config);

        let conn_id = self.next_conn_id();
        let kick = Arc::new(Notify::new());
        let mut shutdown = self.shutdown.subscribe();
        let registered = self.register_client(
            &conn_id,
            Client {
                sender: tx.clone(),
                kick: kick.clone(),
            },
        );

        if registered {
            debug!(event = "handshake_ok", conn_id = %conn_id, remote = %remote);
            match serde_json::to_string(&self.services().await) {
                Ok(snapshot) => {
                    if tx.try_send(Message::Text(snapshot)).is_err() {
                        self.remove_client(&conn_id, "snapshot_error");
                    }
                }
                Err(err) => warn!(event = "snapshot_encode_error", error = %err),
            }

            loop {
                tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => break,
                    _ = kick.notified() => break,
                    next = ws_receiver.next() => match next {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(event = "read_error", conn_id = %conn_id, error = %err);
                            break;
                        }
                    },
                }
            }
            self.remove_client(&conn_id, "disconnect");
        }

        drop(tx);
        let _ = write_task.await;
    }

    async fn stream_logs(self: Arc<Self>, socket: WebSocket, query: LogQuery, remote: SocketAddr) {
        let (ws_sender, mut ws_receiver) = socket.split();
        let (tx, write_task) = spawn_writer(ws_sender, &self.config);
        let subscription = match query.service() {
            Some(name) => self.logs.buffer(name).map(|buffer| buffer.subscribe()),
            None => Some(self.logs.subscribe_all()),
        };

        let Some(mut entries) = subscription else {
            let name = query.service().unwrap_or_default();
            let error = serde_json::json!({ "error": format!("Service '{name}' not found") });
            let _ = tx.try_send(Message::Text(error.to_string()));
            drop(tx);
            let _ = write_task.await;
            return;
        };

        let conn_id = self.next_conn_id();
        debug!(event = "log_stream_open", conn_id = %conn_id, remote = %remote, service = ?query.service());
        let mut shutdown = self.shutdown.subscribe();
        let reason = loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => {
                    let _ = tx.try_send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "dashboard stopped".into(),
                    })));
                    break "stop";
                }
                entry = entries.recv() => match entry {
                    Ok(entry) => {
                        let frame = match serde_json::to_string(&entry) {
                            Ok(frame) => frame,
                            Err(err) => {
                                warn!(event = "log_encode_error", error = %err);
                                continue;
                            }
                        };
                        if tx.try_send(Message::Text(frame)).is_err() {
                            warn!(event = "slow_consumer", conn_id = %conn_id);
                            break "slow_consumer";
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(event = "log_stream_lagged", conn_id = %conn_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break "log_closed",
                },
                next = ws_receiver.next() => match next {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break "disconnect",
                    Some(Ok(_)) => {}
                },
            }
        };
        debug!(event = "log_stream_closed", conn_id = %conn_id, reason);

        drop(tx);
        let _ = write_task.await;
    }
}

/// Per-client outbound queue drained by a dedicated writer task. A frame that
/// cannot be written within the write timeout ends the connection.
fn spawn_writer(
    mut ws_sender: SplitSink<WebSocket, Message>,
    config: &HubConfig,
) -> (mpsc::Sender<Message>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Message>(config.queue_capacity.max(1));
    let write_timeout = config.write_timeout;
    let task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            match tokio::time::timeout(write_timeout, ws_sender.send(msg)).await {
                Ok(Ok(())) if !closing => {}
                _ => return,
            }
        }
        let _ = ws_sender.close().await;
    });
    (tx, task)
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

/// Preferred port for a project: stable across runs, spread over
/// `40000..50000`. Followed by its neighbours and finally an ephemeral port.
fn candidate_ports(key: &str) -> Vec<u16> {
    let preferred = derive_port(key);
    let offset = preferred - PORT_RANGE_START;
    let mut ports: Vec<u16> = (0..MAX_PORT_ATTEMPTS)
        .map(|attempt| {
            let slot = (u32::from(offset) + u32::from(attempt)) % PORT_RANGE_SIZE;
            PORT_RANGE_START + slot as u16
        })
        .collect();
    ports.push(0);
    ports
}

fn derive_port(key: &str) -> u16 {
    let mut hash: u32 = 2166136261;
    for byte in key.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    PORT_RANGE_START + (hash % PORT_RANGE_SIZE) as u16
}

fn origin_allowed(origin: Option<&HeaderValue>) -> bool {
    let Some(origin) = origin else {
        return true;
    };
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    ALLOWED_ORIGINS.iter().any(|allowed| {
        origin == *allowed
            || origin
                .strip_prefix(allowed)
                .is_some_and(|rest| rest.starts_with(':'))
    })
}

pub async fn handle_get_services(State(server): State<Arc<DashboardServer>>) -> Response {
    Json(server.services().await).into_response()
}

pub async fn handle_get_project(State(server): State<Arc<DashboardServer>>) -> Response {
    let path = server.project.path().to_path_buf();
    let name = match tokio::task::spawn_blocking(move || Manifest::load(&path)).await {
        Ok(Ok(Some(Manifest {
            name: Some(name), ..
        }))) => name,
        Ok(Ok(_)) => server.project.display_name(),
        Ok(Err(err)) => {
            warn!(event = "manifest_error", project = %server.project, error = %err);
            server.project.display_name()
        }
        Err(err) => {
            warn!(event = "manifest_error", project = %server.project, error = %err);
            server.project.display_name()
        }
    };
    Json(ProjectInfo {
        name,
        dir: server.project.to_string(),
    })
    .into_response()
}

pub async fn handle_fallback(State(server): State<Arc<DashboardServer>>) -> Response {
    let name = server.project.display_name();
    Html(render_fallback(&name, &server.services().await)).into_response()
}

/// Recent log lines for one service (`?service=`) or all of them, oldest
/// first, at most `?tail=` lines.
pub async fn handle_get_logs(
    State(server): State<Arc<DashboardServer>>,
    Query(query): Query<LogQuery>,
) -> Response {
    let tail = query.tail();
    let entries = match query.service() {
        Some(name) => match server.logs.buffer(name) {
            Some(buffer) => buffer.recent(tail),
            None => {
                return (StatusCode::NOT_FOUND, format!("Service '{name}' not found"))
                    .into_response()
            }
        },
        None => server.logs.recent_all(tail),
    };
    Json(entries).into_response()
}

fn upgrade_allowed(remote: &SocketAddr, headers: &HeaderMap) -> bool {
    if remote.ip().is_loopback() && origin_allowed(headers.get(header::ORIGIN)) {
        return true;
    }
    warn!(event = "ws_rejected", remote = %remote);
    false
}

pub async fn handle_log_stream(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(server): State<Arc<DashboardServer>>,
    Query(query): Query<LogQuery>,
) -> Response {
    if !upgrade_allowed(&remote, &headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    if server.is_stopped() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| async move {
        server.stream_logs(socket, query, remote).await;
    })
}

pub async fn handle_websocket(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(server): State<Arc<DashboardServer>>,
) -> Response {
    if !upgrade_allowed(&remote, &headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    if server.is_stopped() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| async move {
        server.handle_socket(socket, remote).await;
    })
}

/// Keyed-singleton registry of dashboard servers, one per canonical project path.
pub struct ServerRegistry {
    servers: Arc<Registry<DashboardServer>>,
    stores: Arc<StoreRegistry>,
    logs: Arc<LogRegistry>,
    config: HubConfig,
}

static GLOBAL_SERVERS: OnceLock<ServerRegistry> = OnceLock::new();

impl ServerRegistry {
    pub fn new(stores: Arc<StoreRegistry>, logs: Arc<LogRegistry>, config: HubConfig) -> Self {
        Self {
            servers: Arc::new(Registry::new()),
            stores,
            logs,
            config,
        }
    }

    /// Fresh registry with its own stores and log buffers.
    pub fn isolated(config: HubConfig) -> Self {
        Self::new(
            Arc::new(StoreRegistry::new()),
            Arc::new(LogRegistry::new()),
            config,
        )
    }

    /// Process-wide registry backed by the process-wide store and log registries.
    pub fn global() -> &'static ServerRegistry {
        Self::install_global(HubConfig::default())
    }

    /// Like [`ServerRegistry::global`], using `config` if this is the first
    /// call in the process.
    pub fn install_global(config: HubConfig) -> &'static ServerRegistry {
        GLOBAL_SERVERS.get_or_init(|| ServerRegistry::new(StoreRegistry::global(), LogRegistry::global(), config))
    }

    pub fn get_or_create(&self, dir: impl AsRef<Path>) -> Arc<DashboardServer> {
        let registry = Arc::downgrade(&self.servers);
        self.servers.get_or_create_with(dir, |project| {
            let store = self.stores.get_or_create(project.path());
            let logs = self.logs.get_or_create(project.path());
            DashboardServer::new(project, store, logs, self.config.clone(), registry)
        })
    }

    pub fn get(&self, dir: impl AsRef<Path>) -> Option<Arc<DashboardServer>> {
        self.servers.get(dir)
    }

    pub fn contains(&self, dir: impl AsRef<Path>) -> bool {
        self.servers.contains(dir)
    }

    pub fn remove(&self, dir: impl AsRef<Path>) -> Option<Arc<DashboardServer>> {
        self.servers.remove(dir)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn stores(&self) -> &Arc<StoreRegistry> {
        &self.stores
    }

    pub fn logs(&self) -> &Arc<LogRegistry> {
        &self.logs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_port_is_stable_and_in_range() {
        let first = derive_port("/srv/shop");
        assert_eq!(first, derive_port("/srv/shop"));
        assert!((PORT_RANGE_START..PORT_RANGE_START + PORT_RANGE_SIZE as u16).contains(&first));
    }

    #[test]
    fn candidate_ports_wrap_and_end_ephemeral() {
        let ports = candidate_ports("/srv/shop");
        assert_eq!(ports.len(), MAX_PORT_ATTEMPTS as usize + 1);
        assert_eq!(ports[0], derive_port("/srv/shop"));
        assert_eq!(ports.last(), Some(&0));
        assert!(ports[..ports.len() - 1]
            .iter()
            .all(|port| *port >= PORT_RANGE_START && u32::from(*port) < 50000));
    }

    #[test]
    fn origins_are_limited_to_localhost() {
        assert!(origin_allowed(None));
        assert!(origin_allowed(Some(&HeaderValue::from_static(
            "http://localhost:5173"
        ))));
        assert!(origin_allowed(Some(&HeaderValue::from_static(
            "https://127.0.0.1:40001"
        ))));
        assert!(!origin_allowed(Some(&HeaderValue::from_static(
            "http://localhost.evil.com"
        ))));
        assert!(!origin_allowed(Some(&HeaderValue::from_static(
            "https://example.com"
        ))));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn manifest_is_loaded_off_the_async_runtime() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(devdash_core::MANIFEST_FILE),
            "name: shop\nservices:\n  api:\n    language: python\n",
        )
        .expect("write manifest");
        let registry = ServerRegistry::isolated(HubConfig::default());
        let server = registry.get_or_create(dir.path());

        let views = server.services().await;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].name, "api");
        assert_eq!(server.broadcast_current().await, 0);
    }

    #[test]
    fn log_query_tail_is_lenient() {
        let query = |tail: Option<&str>| LogQuery {
            service: Some(String::new()),
            tail: tail.map(str::to_string),
        };
        assert_eq!(query(None).tail(), DEFAULT_LOG_TAIL);
        assert_eq!(query(Some("-1")).tail(), DEFAULT_LOG_TAIL);
        assert_eq!(query(Some(" 25 ")).tail(), 25);
        assert_eq!(query(None).service(), None);
    }

    #[tokio::test]
    async fn new_server_is_created_not_started() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = ServerRegistry::isolated(HubConfig::default());
        let server = registry.get_or_create(dir.path());
        assert_eq!(server.port(), 0);
        assert!(server.url().is_none());
        assert!(!server.is_running());
        assert!(!server.is_stopped());
        assert_eq!(server.client_count(), 0);
    }
}
