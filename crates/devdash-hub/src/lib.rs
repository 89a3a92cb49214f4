//! Per-project development dashboard: a JSON status API, WebSocket push of the
//! merged service view, service log tails and streams, and a fallback HTML page
//! when no built UI is present.

pub mod config;
pub mod html;
pub mod server;

pub use config::HubConfig;
pub use server::{
    handle_fallback, handle_get_logs, handle_get_project, handle_get_services, handle_log_stream,
    DashboardServer, HubError, LogQuery, ServerRegistry,
};
