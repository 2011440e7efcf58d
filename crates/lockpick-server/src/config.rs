//! Environment-driven configuration.

/// Server settings, sourced from the environment with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub redis_addr: String,
    pub redis_password: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: env_or("PORT", "8103").parse().unwrap_or(8103),
            redis_addr: env_or("REDIS_ADDR", "localhost:6379"),
            redis_password: env_or("REDIS_PASSWORD", ""),
        }
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}
