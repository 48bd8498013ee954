/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// Pipeline settings (workspace, providers, timeouts) live in
/// [`clipforge_pipeline::PipelineConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Time allowed for in-flight work to drain after a shutdown signal
    /// (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Upper bound on jobs executing at the same time (default: `3`).
    pub max_concurrent_jobs: usize,
    /// Seconds between backend reachability checks (default: `60`).
    pub backend_refresh_secs: u64,
    /// Seconds between WebSocket keep-alive pings (default: `30`).
    pub ws_heartbeat_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                    |
    /// |-------------------------|----------------------------|
    /// | `HOST`                  | `0.0.0.0`                  |
    /// | `PORT`                  | `8000`                     |
    /// | `CORS_ORIGINS`          | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                       |
    /// | `MAX_CONCURRENT_JOBS`   | `3`                        |
    /// | `BACKEND_REFRESH_SECS`  | `60`                       |
    /// | `WS_HEARTBEAT_SECS`     | `30`                       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let max_concurrent_jobs: usize = std::env::var("MAX_CONCURRENT_JOBS")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("MAX_CONCURRENT_JOBS must be a valid usize");

        let backend_refresh_secs: u64 = std::env::var("BACKEND_REFRESH_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("BACKEND_REFRESH_SECS must be a valid u64");

        let ws_heartbeat_secs: u64 = std::env::var("WS_HEARTBEAT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("WS_HEARTBEAT_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            max_concurrent_jobs: max_concurrent_jobs.max(1),
            backend_refresh_secs: backend_refresh_secs.max(1),
            ws_heartbeat_secs: ws_heartbeat_secs.max(1),
        }
    }
}
