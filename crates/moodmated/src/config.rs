use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interface to bind (default: 0.0.0.0).
    pub host: String,
    /// HTTP port (default: 7860).
    pub port: u16,
    /// ONNX emotion classifier.
    pub model_path: PathBuf,
    /// CSV music library.
    pub music_path: PathBuf,
    /// Return internal error text to clients on 500s.
    pub expose_errors: bool,
    /// Maximum accepted request body, in bytes.
    pub max_body_bytes: usize,
    /// Pending requests the engine thread will queue before callers wait.
    pub engine_queue: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7860,
            model_path: moodmate_core::default_model_path(),
            music_path: moodmate_core::default_music_path(),
            expose_errors: true,
            max_body_bytes: 10 * 1024 * 1024,
            engine_queue: 16,
        }
    }
}

impl Config {
    /// Load configuration from `PORT` and `MOODMATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: std::env::var("MOODMATE_HOST").unwrap_or(defaults.host),
            port: env_parse("PORT", defaults.port),
            model_path: std::env::var("MOODMATE_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            music_path: std::env::var("MOODMATE_MUSIC_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.music_path),
            expose_errors: std::env::var("MOODMATE_EXPOSE_ERRORS")
                .map(|v| v != "0")
                .unwrap_or(defaults.expose_errors),
            max_body_bytes: env_parse("MOODMATE_MAX_BODY_BYTES", defaults.max_body_bytes),
            engine_queue: env_parse("MOODMATE_ENGINE_QUEUE", defaults.engine_queue).max(1),
        }
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
