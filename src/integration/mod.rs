use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenv::dotenv;
use log::LevelFilter;
use simplelog::{ColorChoice, TermLogger, TerminalMode};

pub mod backend;
pub mod polls;
pub mod storage;

pub use self::backend::{Backend, BackendClient};
pub use self::polls::{PollBackend, Polls};
pub use self::storage::{FileStorage, Storage};

pub type Result<T> = std::result::Result<T, Error>;

const MB: u64 = 1024 * 1024;

#[derive(Clone)]
pub struct Config {
    pub page_size: usize,
    pub max_upload_bytes: u64,
    pub typing_expiry: Duration,
    pub typing_broadcast_window: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_upload_bytes: 20 * MB,
            typing_expiry: Duration::from_secs(6),
            typing_broadcast_window: Duration::from_secs(3),
        }
    }
}

impl Config {
    pub fn env() -> Self {
        dotenv().ok();

        let defaults = Self::default();

        Self {
            page_size: env_parsed("SYNC_PAGE_SIZE").unwrap_or(defaults.page_size),
            max_upload_bytes: env_parsed("SYNC_MAX_UPLOAD_MB")
                .map(|mb: u64| mb * MB)
                .unwrap_or(defaults.max_upload_bytes),
            typing_expiry: env_parsed("SYNC_TYPING_EXPIRY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.typing_expiry),
            typing_broadcast_window: env_parsed("SYNC_TYPING_BROADCAST_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.typing_broadcast_window),
        }
    }
}

fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

pub fn init_logging() {
    let rust_log = env::var("RUST_LOG").unwrap_or("info".into());
    let level = LevelFilter::from_str(&rust_log).unwrap_or(LevelFilter::Info);

    let _ = TermLogger::init(
        level,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("backend request failed: {0}")]
    Backend(String),
    #[error("storage request failed: {0}")]
    Storage(String),
    #[error("poll backend request failed: {0}")]
    Polls(String),
}
