use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://bato.to";

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ConnectorConfig {
    pub base_url: String,
    pub user_agent: String,
    /// Minimum spacing between two requests.
    pub rate_limit_ms: u64,
    pub call_timeout_ms: u64,
    /// Requests slower than this are logged at warn level.
    pub slow_warn_ms: u64,
    /// Host allow-list, `*.example.com` matches the domain and its subdomains.
    /// `None` allows every host, an empty list blocks all of them.
    pub allowed_hosts: Option<Vec<String>>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: concat!("batoto-connector/", env!("CARGO_PKG_VERSION")).to_string(),
            rate_limit_ms: 150,
            call_timeout_ms: 15_000,
            slow_warn_ms: 5_000,
            allowed_hosts: None,
        }
    }
}

impl ConnectorConfig {
    /// Reads `path` when given (it must exist), else `config.toml` in the
    /// platform config dir when present, else defaults. Environment overrides
    /// are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                if !p.exists() {
                    bail!("config file not found: {}", p.display());
                }
                Self::from_file(p)?
            }
            None => match default_config_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        cfg.apply_overrides(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config: {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parsing config: {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// `BATOTO_BASE_URL`, `BATOTO_RATE_LIMIT_MS` and `BATOTO_TIMEOUT_MS`.
    /// Unparseable numbers are ignored.
    pub fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = var("BATOTO_BASE_URL").filter(|s| !s.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        if let Some(ms) = var("BATOTO_RATE_LIMIT_MS").and_then(|s| s.trim().parse().ok()) {
            self.rate_limit_ms = ms;
        }
        if let Some(ms) = var("BATOTO_TIMEOUT_MS").and_then(|s| s.trim().parse().ok()) {
            self.call_timeout_ms = ms;
        }
    }

    /// Lowercased allow-list entries with blanks removed.
    pub fn normalized_allowed_hosts(&self) -> Option<Vec<String>> {
        self.allowed_hosts.as_ref().map(|list| {
            list.iter()
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect()
        })
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("to", "bato", "batoto-connector").map(|p| p.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = ConnectorConfig::from_toml_str("rate_limit_ms = 500\nallowed_hosts = [\"bato.to\", \"*.mbcdn.xyz\"]\n").unwrap();
        assert_eq!(cfg.rate_limit_ms, 500);
        assert_eq!(cfg.call_timeout_ms, 15_000);
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.allowed_hosts.unwrap().len(), 2);
    }

    #[test]
    fn load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "base_url = \"https://mirror.example\"\nslow_warn_ms = 100").unwrap();
        let cfg = ConnectorConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.slow_warn_ms, 100);
        // BATOTO_BASE_URL may be set in the environment running the tests
        if std::env::var("BATOTO_BASE_URL").is_err() {
            assert_eq!(cfg.base_url, "https://mirror.example");
        }
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConnectorConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn malformed_file_names_the_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "rate_limit_ms = \"fast\"").unwrap();
        let err = ConnectorConfig::load(Some(file.path())).unwrap_err();
        assert!(format!("{:#}", err).contains("parsing config"));
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            ("BATOTO_BASE_URL", " https://alt.example "),
            ("BATOTO_RATE_LIMIT_MS", "0"),
            ("BATOTO_TIMEOUT_MS", "soon"),
        ]
        .into_iter()
        .collect();
        let mut cfg = ConnectorConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.base_url, "https://alt.example");
        assert_eq!(cfg.rate_limit_ms, 0);
        assert_eq!(cfg.call_timeout_ms, 15_000);
    }

    #[test]
    fn allowed_hosts_are_normalized() {
        let cfg = ConnectorConfig {
            allowed_hosts: Some(vec![" Bato.TO ".into(), "".into(), "*.CDN.example".into()]),
            ..Default::default()
        };
        assert_eq!(cfg.normalized_allowed_hosts().unwrap(), vec!["bato.to", "*.cdn.example"]);
        assert_eq!(ConnectorConfig::default().normalized_allowed_hosts(), None);
    }
}
