use std::time::Duration;

const DEFAULT_INSURANCE_VENDOR_NO: &str = "FZ-000003";

/// Connection settings for the NAV SOAP endpoints.
///
/// Loaded once at startup and handed to every transport; the gateways never
/// read the environment themselves.
#[derive(Debug, Clone)]
pub struct NavConfig {
    pub base_url: String,
    pub user: String,
    pub pass: String,
    pub timeout: Duration,
    /// Insurer vendor number stamped on every contract.
    pub insurance_vendor_no: String,
}

impl NavConfig {
    pub fn new(base_url: impl Into<String>, user: impl Into<String>, pass: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            base_url,
            user: user.into(),
            pass: pass.into(),
            timeout: Duration::from_secs(30),
            insurance_vendor_no: DEFAULT_INSURANCE_VENDOR_NO.to_string(),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let base_url = std::env::var("NAV_BASE_URL")
            .map_err(|_| anyhow::anyhow!("NAV_BASE_URL environment variable required"))
            .and_then(|url| {
                if url.trim().is_empty() {
                    anyhow::bail!("NAV_BASE_URL cannot be empty");
                }
                let parsed = url::Url::parse(&url)
                    .map_err(|e| anyhow::anyhow!("NAV_BASE_URL is not a valid URL: {}", e))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    anyhow::bail!("NAV_BASE_URL must start with http:// or https://");
                }
                Ok(url)
            })?;
        let user = std::env::var("NAV_USER")
            .map_err(|_| anyhow::anyhow!("NAV_USER environment variable required"))
            .and_then(|user| {
                if user.trim().is_empty() {
                    anyhow::bail!("NAV_USER cannot be empty");
                }
                Ok(user)
            })?;
        let pass = std::env::var("NAV_PASS")
            .map_err(|_| anyhow::anyhow!("NAV_PASS environment variable required"))
            .and_then(|pass| {
                if pass.trim().is_empty() {
                    anyhow::bail!("NAV_PASS cannot be empty");
                }
                Ok(pass)
            })?;
        let timeout_secs: u64 = std::env::var("NAV_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("NAV_TIMEOUT_SECS must be a whole number of seconds"))?;
        if timeout_secs == 0 {
            anyhow::bail!("NAV_TIMEOUT_SECS must be greater than zero");
        }

        let mut nav = Self::new(base_url, user, pass);
        nav.timeout = Duration::from_secs(timeout_secs);
        if let Some(vendor) = std::env::var("NAV_INSURANCE_VENDOR_NO")
            .ok()
            .filter(|s| !s.trim().is_empty())
        {
            nav.insurance_vendor_no = vendor;
        }

        Ok(nav)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub nav: NavConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            nav: NavConfig::from_env()?,
        };

        // Never log credentials
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            url_prefix(&config.database_url)
        );
        tracing::debug!("NAV Base URL: {}", config.nav.base_url);
        tracing::debug!("NAV timeout: {:?}", config.nav.timeout);
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

/// First 20 characters of a URL, enough to tell hosts apart in logs
/// without printing the password.
fn url_prefix(url: &str) -> String {
    url.chars().take(20).collect()
}
