pub const API_KEY_ENV: &str = "SCRAPER_API_KEY";
pub const CORS_ORIGINS_ENV: &str = "CORS_ORIGINS";

/// Settings the HTTP layer reads from the environment at startup.
#[derive(Clone)]
pub struct ServerConfig {
    api_key: String,
    cors_origins: Vec<String>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("api_key_set", &!self.api_key.is_empty())
            .field("cors_origins", &self.cors_origins)
            .finish()
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::new(
            std::env::var(API_KEY_ENV).ok(),
            std::env::var(CORS_ORIGINS_ENV).ok(),
        )
    }

    /// An unset or blank key rejects every scrape. Unset origins allow `*`.
    pub fn new(api_key: Option<String>, cors_origins: Option<String>) -> Self {
        let api_key = api_key.map(|v| v.trim().to_string()).unwrap_or_default();
        let mut origins = cors_origins
            .as_deref()
            .unwrap_or("*")
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>();
        if origins.is_empty() {
            origins.push("*".to_string());
        }
        Self {
            api_key,
            cors_origins: origins,
        }
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.cors_origins
    }

    pub fn api_key_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn is_authorized(&self, provided: Option<&str>) -> bool {
        self.api_key_configured() && provided == Some(self.api_key.as_str())
    }

    /// Value for `Access-Control-Allow-Origin` given the request's `Origin`.
    pub fn allow_origin(&self, origin: Option<&str>) -> &str {
        if self.cors_origins.iter().any(|o| o == "*") {
            return "*";
        }
        if let Some(origin) = origin {
            if let Some(allowed) = self.cors_origins.iter().find(|o| *o == origin) {
                return allowed;
            }
        }
        &self.cors_origins[0]
    }
}
