//! Application configuration

use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Socket address the HTTP server binds
    pub bind_address: String,
    /// Origins allowed by CORS
    pub allowed_origins: Vec<String>,
    /// Expose the manual test-activation endpoint. Never enable in
    /// production: it bypasses all billing verification.
    pub enable_test_endpoints: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3001".to_string()),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:8080,http://127.0.0.1:8080".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            enable_test_endpoints: env::var("ENABLE_TEST_ENDPOINTS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure config tests run serially (they modify shared env vars)
    static CONFIG_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_endpoints_default_off() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap();
        env::remove_var("ENABLE_TEST_ENDPOINTS");

        let config = Config::from_env();
        assert!(!config.enable_test_endpoints);
    }

    #[test]
    fn test_endpoints_opt_in() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap();
        env::set_var("ENABLE_TEST_ENDPOINTS", "true");

        let config = Config::from_env();
        assert!(config.enable_test_endpoints);

        env::remove_var("ENABLE_TEST_ENDPOINTS");
    }

    #[test]
    fn allowed_origins_are_split_and_trimmed() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap();
        env::set_var("ALLOWED_ORIGINS", "https://a.example, https://b.example ,");

        let config = Config::from_env();
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );

        env::remove_var("ALLOWED_ORIGINS");
    }
}
