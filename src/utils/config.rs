use std::path::{Path, PathBuf};
use serde::Deserialize;
use crate::utils::errors::{AppError, ConfigError, Result};

pub const DEFAULT_CONFIG_NAME: &str = "opskit.toml";
pub const TOKEN_ENV_VAR: &str = "CVAAS_TOKEN";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ripestat: RipeStatConfig,
    pub bgp: BgpConfig,
    pub dashboard: DashboardConfig,
    pub qr: QrConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RipeStatConfig {
    pub base_url: String,
    pub source_app: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RipeStatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://stat.ripe.net".to_string(),
            source_app: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BgpConfig {
    pub prefix: Option<String>,
    #[serde(deserialize_with = "optional_asn")]
    pub origin_asn: Option<String>,
    pub upstreams: Vec<Upstream>,
    /// Empty means all route collectors.
    pub collectors: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Upstream {
    pub name: String,
    #[serde(deserialize_with = "asn_value")]
    pub asn: String,
}

impl Upstream {
    /// Parse a `NAME=ASN` command line override.
    pub fn parse_override(value: &str) -> Result<Self> {
        let (name, asn) = value.split_once('=').ok_or_else(|| {
            ConfigError::InvalidValue { field: "upstream".to_string(), value: value.to_string() }
        })?;
        let upstream = Upstream { name: name.trim().to_string(), asn: normalize_asn(asn)? };
        if upstream.name.is_empty() {
            return Err(ConfigError::InvalidValue { field: "upstream".to_string(), value: value.to_string() }.into());
        }
        Ok(upstream)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub base_url: String,
    pub access_token: Option<String>,
    pub accept_invalid_certs: bool,
    pub utc_offset_hours: i32,
    pub from_offset_ms: i64,
    pub to_offset_ms: i64,
    pub webdriver_url: String,
    pub browser: String,
    pub browser_args: Vec<String>,
    pub page_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub download_wait_secs: u64,
    pub reports: Vec<ReportConfig>,
    pub exports: Vec<ExportLinkConfig>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.cv-prod-euwest-2.arista.io".to_string(),
            access_token: None,
            accept_invalid_certs: false,
            utc_offset_hours: 1,
            from_offset_ms: 1000,
            to_offset_ms: 86_400_000,
            webdriver_url: "http://localhost:4444".to_string(),
            browser: "msedge".to_string(),
            browser_args: vec!["--start-maximized".to_string()],
            page_timeout_secs: 12,
            poll_interval_ms: 500,
            download_wait_secs: 5,
            reports: Vec::new(),
            exports: Vec::new(),
        }
    }
}

impl DashboardConfig {
    /// Access token from the config file, falling back to `CVAAS_TOKEN`.
    pub fn token(&self) -> Result<String> {
        if let Some(token) = self.access_token.as_ref().filter(|t| !t.trim().is_empty()) {
            return Ok(token.trim().to_string());
        }
        std::env::var(TOKEN_ENV_VAR)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField(format!("dashboard.access_token (or ${})", TOKEN_ENV_VAR)).into())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    pub title: String,
    #[serde(default)]
    pub unit: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<ReportRowConfig>,
}

/// One raw-data page for `dashboard export-batch`. The URL may be a saved
/// dashboard link or carry `{active}`, `{from_offset}` and `{to_offset}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportLinkConfig {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportRowConfig {
    pub name: String,
    pub links: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QrConfig {
    pub fill: String,
    pub background: String,
    pub box_size: u32,
    pub border: u32,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            fill: "black".to_string(),
            background: "white".to_string(),
            box_size: 10,
            border: 4,
        }
    }
}

impl Config {
    /// Loads the first config file found, or built-in defaults when none exists.
    /// An explicitly requested path must exist.
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(Path::new(path));
        }

        for candidate in Self::candidate_paths() {
            if candidate.exists() {
                log::debug!("Using configuration file {}", candidate.display());
                return Self::from_file(&candidate);
            }
        }

        log::debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(DEFAULT_CONFIG_NAME)];
        if let Ok(home) = std::env::var("HOME") {
            paths.push(Path::new(&home).join(".config").join("opskit").join(DEFAULT_CONFIG_NAME));
        }
        paths
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::InvalidFile(format!("{}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| match e {
                AppError::Config(ConfigError::InvalidFile(msg)) => {
                    ConfigError::InvalidFile(format!("{}: {}", path.display(), msg)).into()
                }
                other => other,
            })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)
            .map_err(|e| ConfigError::InvalidFile(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<()> {
        if let Some(asn) = self.bgp.origin_asn.take() {
            self.bgp.origin_asn = Some(normalize_asn(&asn)?);
        }
        for upstream in &mut self.bgp.upstreams {
            upstream.asn = normalize_asn(&upstream.asn)?;
        }

        for report in &self.dashboard.reports {
            if report.columns.is_empty() {
                return Err(ConfigError::MissingField(format!("dashboard.reports[{}].columns", report.title)).into());
            }
            for row in &report.rows {
                if row.links.len() != report.columns.len() {
                    return Err(ConfigError::InvalidValue {
                        field: format!("dashboard.reports[{}].rows[{}].links", report.title, row.name),
                        value: format!("{} links for {} columns", row.links.len(), report.columns.len()),
                    }.into());
                }
            }
        }

        if let Some(link) = self.dashboard.exports.iter().find(|l| l.url.trim().is_empty()) {
            return Err(ConfigError::MissingField(format!("dashboard.exports[{}].url", link.name)).into());
        }

        if self.qr.box_size == 0 {
            return Err(ConfigError::InvalidValue { field: "qr.box_size".to_string(), value: "0".to_string() }.into());
        }

        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AsnValue {
    Number(u64),
    Text(String),
}

impl From<AsnValue> for String {
    fn from(value: AsnValue) -> Self {
        match value {
            AsnValue::Number(n) => n.to_string(),
            AsnValue::Text(s) => s,
        }
    }
}

// ASNs are written either as `asn = 37148` or `asn = "AS37148"` in the TOML file.
fn asn_value<'de, D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    AsnValue::deserialize(deserializer).map(String::from)
}

fn optional_asn<'de, D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    Option::<AsnValue>::deserialize(deserializer).map(|v| v.map(String::from))
}

/// Accepts `329001` or `AS329001` and returns the bare number as a string.
pub fn normalize_asn(value: &str) -> Result<String> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("AS")
        .or_else(|| trimmed.strip_prefix("as"))
        .unwrap_or(trimmed);
    digits
        .parse::<u32>()
        .map(|n| n.to_string())
        .map_err(|_| ConfigError::InvalidValue { field: "asn".to_string(), value: value.to_string() }.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
[bgp]
prefix = "102.217.0.0/22"
origin_asn = "AS329001"

[[bgp.upstreams]]
name = "GLO"
asn = "37148"

[[bgp.upstreams]]
name = "Dolphin"
asn = 37613

[dashboard]
utc_offset_hours = 1

[[dashboard.reports]]
title = "Bitrate Summary"
unit = "Mbps"
columns = ["Inbound", "Outbound"]

[[dashboard.reports.rows]]
name = "Glo"
links = ["https://example.test/in?active=1", "https://example.test/out?active=1"]

[[dashboard.exports]]
name = "Glo bitrate"
url = "https://example.test/raw?active={active}&fromOffset={from_offset}&toOffset={to_offset}"

[[dashboard.exports]]
name = "Glo jitter"
url = "https://example.test/jitter?active=1700000000000"
"#;

    #[test]
    fn loads_sample_config() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.bgp.origin_asn.as_deref(), Some("329001"));
        assert_eq!(config.bgp.upstreams.len(), 2);
        assert_eq!(config.bgp.upstreams[1], Upstream { name: "Dolphin".into(), asn: "37613".into() });
        assert_eq!(config.ripestat.base_url, "https://stat.ripe.net");
        assert_eq!(config.dashboard.reports[0].unit.as_deref(), Some("Mbps"));
        assert_eq!(config.dashboard.page_timeout_secs, 12);
        assert_eq!(config.qr.box_size, 10);
    }

    #[test]
    fn rejects_row_with_wrong_link_count() {
        let broken = SAMPLE.replace(
            r#"links = ["https://example.test/in?active=1", "https://example.test/out?active=1"]"#,
            r#"links = ["https://example.test/in?active=1"]"#,
        );
        let err = Config::from_toml(&broken).unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::InvalidValue { .. })), "{}", err);
    }

    #[test]
    fn rejects_bad_asn() {
        let broken = SAMPLE.replace("AS329001", "ASX");
        assert!(Config::from_toml(&broken).is_err());
    }

    #[test]
    fn upstream_override_parsing() {
        let upstream = Upstream::parse_override("GLO=AS37148").unwrap();
        assert_eq!(upstream, Upstream { name: "GLO".into(), asn: "37148".into() });
        assert!(Upstream::parse_override("37148").is_err());
        assert!(Upstream::parse_override("=37148").is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load(missing.to_str()).is_err());

        let present = dir.path().join("opskit.toml");
        std::fs::write(&present, SAMPLE).unwrap();
        let config = Config::load(present.to_str()).unwrap();
        assert_eq!(config.bgp.prefix.as_deref(), Some("102.217.0.0/22"));
    }

    #[test]
    fn export_links_load_in_order_and_need_a_url() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let names: Vec<&str> = config.dashboard.exports.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Glo bitrate", "Glo jitter"]);

        let broken = SAMPLE.replace("https://example.test/jitter?active=1700000000000", " ");
        let err = Config::from_toml(&broken).unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::MissingField(ref f)) if f == "dashboard.exports[Glo jitter].url"));

        assert!(Config::default().dashboard.exports.is_empty());
    }
}
