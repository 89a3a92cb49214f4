use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct HubConfig {
    /// Upper bound for writing one frame to one WebSocket client.
    pub write_timeout: Duration,
    /// Frames buffered per client before it is treated as a slow consumer.
    pub queue_capacity: usize,
    /// Directory holding a built dashboard UI (`index.html` and assets).
    pub ui_dir: Option<PathBuf>,
    /// Period of the binary's broadcast ticker. Zero disables it.
    pub broadcast_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            ui_dir: None,
            broadcast_interval: DEFAULT_BROADCAST_INTERVAL,
        }
    }
}

impl HubConfig {
    /// The UI directory, if it actually contains a built bundle.
    pub fn ui_assets(&self) -> Option<PathBuf> {
        self.ui_dir
            .as_ref()
            .filter(|dir| dir.join("index.html").is_file())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_assets_require_index_html() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = HubConfig {
            ui_dir: Some(dir.path().to_path_buf()),
            ..HubConfig::default()
        };
        assert!(config.ui_assets().is_none());

        std::fs::write(dir.path().join("index.html"), "<html></html>").expect("write");
        assert_eq!(config.ui_assets(), Some(dir.path().to_path_buf()));
    }
}
