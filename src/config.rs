use std::time::Duration;

pub const DEFAULT_STORE_URL: &str = "http://localhost:9200";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8081";
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;

/// Process settings, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub store_url: String,
    pub listen_addr: String,
    pub store_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_url = lookup("ROLL_STORE_URL").unwrap_or_else(|| DEFAULT_STORE_URL.to_string());
        let listen_addr = lookup("ROLL_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let timeout_secs = match lookup("ROLL_STORE_TIMEOUT_SECS") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(
                    "ROLL_STORE_TIMEOUT_SECS={} is not a number, using {}",
                    raw,
                    DEFAULT_STORE_TIMEOUT_SECS
                );
                DEFAULT_STORE_TIMEOUT_SECS
            }),
            None => DEFAULT_STORE_TIMEOUT_SECS,
        };

        Self {
            store_url,
            listen_addr,
            store_timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(|_| None);
        assert_eq!(settings.store_url, DEFAULT_STORE_URL);
        assert_eq!(settings.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(settings.store_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ROLL_STORE_URL", "https://search.internal:9200"),
            ("ROLL_STORE_TIMEOUT_SECS", "5"),
        ]);
        let settings = Settings::from_lookup(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(settings.store_url, "https://search.internal:9200");
        assert_eq!(settings.store_timeout, Duration::from_secs(5));

        let settings = Settings::from_lookup(|key| {
            (key == "ROLL_STORE_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert_eq!(settings.store_timeout, Duration::from_secs(30));
    }
}
