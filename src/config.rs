//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// One upstream mailbox account, selected by the domain of the requested alias.
#[derive(Debug, Clone)]
pub struct MailAccount {
    /// Stable identifier (`primary`, `secondary`).
    pub id: String,
    /// IMAP login.
    pub user: String,
    pub password: SecretString,
    pub host: String,
    pub imap_port: u16,
    /// Domain served by this mailbox, lowercased.
    pub domain: String,
}

/// Server configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    /// Location of the allowlist JSON document.
    pub prefix_db_path: PathBuf,
    /// Domains an alias may belong to, lowercased.
    pub allowed_domains: Vec<String>,
    /// Admin key; when `None` every admin call is rejected.
    pub admin_key: Option<SecretString>,
    /// How long a cached result may serve polling calls.
    pub cache_ttl: Duration,
    /// Socket read timeout for IMAP sessions.
    pub imap_timeout: Duration,
    pub accounts: Vec<MailAccount>,
}

impl AppConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable source.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = parse_or(&get, "PORT", 3000u16)?;
        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string());
        let prefix_db_path = get("PREFIX_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/prefixes.json"));

        let allowed_domains: Vec<String> = get("ALLOWED_DOMAINS")
            .unwrap_or_default()
            .split(',')
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();

        let admin_key = get("ADMIN_KEY").map(SecretString::from);
        let cache_ttl = Duration::from_secs(parse_or(&get, "CACHE_TTL_SECS", 300u64)?);
        let imap_timeout = Duration::from_secs(parse_or(&get, "IMAP_TIMEOUT_SECS", 30u64)?);

        let mut accounts = Vec::new();
        for (id, prefix) in [("primary", "MAIN_EMAIL"), ("secondary", "SECOND_EMAIL")] {
            let server_prefix = if id == "primary" {
                "MAIL_SERVER"
            } else {
                "SECOND_MAIL_SERVER"
            };
            let domain_key = if id == "primary" {
                "MAIL_DOMAIN"
            } else {
                "SECOND_MAIL_DOMAIN"
            };

            let (Some(user), Some(host), Some(domain)) =
                (get(prefix), get(server_prefix), get(domain_key))
            else {
                continue;
            };

            accounts.push(MailAccount {
                id: id.to_string(),
                user,
                password: SecretString::from(get(&format!("{prefix}_PASSWORD")).unwrap_or_default()),
                host,
                imap_port: parse_or(&get, &format!("{server_prefix}_IMAP_PORT"), 993u16)?,
                domain: domain.to_lowercase(),
            });
        }

        Ok(Self {
            bind_addr,
            port,
            prefix_db_path,
            allowed_domains,
            admin_key,
            cache_ttl,
            imap_timeout,
            accounts,
        })
    }

    /// Whether `domain` is one of the allowed alias domains.
    pub fn is_domain_allowed(&self, domain: &str) -> bool {
        let domain = domain.to_lowercase();
        self.allowed_domains.iter().any(|d| *d == domain)
    }

    /// Mailbox account serving `domain`.
    pub fn account_for_domain(&self, domain: &str) -> Option<&MailAccount> {
        self.accounts
            .iter()
            .find(|a| a.domain.eq_ignore_ascii_case(domain))
    }

    /// Mailbox account by id, falling back to the first one.
    pub fn account_by_id(&self, id: &str) -> Option<&MailAccount> {
        self.accounts
            .iter()
            .find(|a| a.id == id)
            .or_else(|| self.accounts.first())
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}

/// Client polling cadences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    /// Interval while the client is visible.
    pub foreground: Duration,
    /// Interval while the client is hidden.
    pub background: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            foreground: Duration::from_secs(30),
            background: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_empty() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.bind_addr, "0.0.0.0");
        assert_eq!(cfg.prefix_db_path, PathBuf::from("./data/prefixes.json"));
        assert!(cfg.allowed_domains.is_empty());
        assert!(cfg.admin_key.is_none());
        assert_eq!(cfg.cache_ttl, Duration::from_secs(300));
        assert!(cfg.accounts.is_empty());
    }

    #[test]
    fn allowed_domains_are_trimmed_and_lowercased() {
        let cfg = config_from(&[("ALLOWED_DOMAINS", " Example.com, ,other.org ")]).unwrap();
        assert_eq!(cfg.allowed_domains, vec!["example.com", "other.org"]);
        assert!(cfg.is_domain_allowed("EXAMPLE.COM"));
        assert!(!cfg.is_domain_allowed("evil.com"));
    }

    #[test]
    fn accounts_require_user_host_and_domain() {
        let cfg = config_from(&[
            ("MAIN_EMAIL", "inbox@example.com"),
            ("MAIN_EMAIL_PASSWORD", "pw"),
            ("MAIL_SERVER", "imap.example.com"),
            ("MAIL_DOMAIN", "Example.com"),
            ("SECOND_EMAIL", "inbox@other.org"),
            ("SECOND_MAIL_SERVER", "imap.other.org"),
        ])
        .unwrap();

        assert_eq!(cfg.accounts.len(), 1);
        let primary = &cfg.accounts[0];
        assert_eq!(primary.id, "primary");
        assert_eq!(primary.imap_port, 993);
        assert_eq!(primary.domain, "example.com");
        assert_eq!(primary.password.expose_secret(), "pw");
        assert!(cfg.account_for_domain("EXAMPLE.COM").is_some());
        assert!(cfg.account_for_domain("other.org").is_none());
    }

    #[test]
    fn second_account_port_override() {
        let cfg = config_from(&[
            ("SECOND_EMAIL", "inbox@other.org"),
            ("SECOND_MAIL_SERVER", "imap.other.org"),
            ("SECOND_MAIL_DOMAIN", "other.org"),
            ("SECOND_MAIL_SERVER_IMAP_PORT", "1993"),
        ])
        .unwrap();
        assert_eq!(cfg.accounts[0].id, "secondary");
        assert_eq!(cfg.accounts[0].imap_port, 1993);
        assert_eq!(cfg.account_by_id("missing").unwrap().id, "secondary");
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = config_from(&[("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "PORT"));
    }

    #[test]
    fn polling_defaults() {
        let cfg = PollingConfig::default();
        assert_eq!(cfg.foreground, Duration::from_secs(30));
        assert_eq!(cfg.background, Duration::from_secs(60));
    }
}
