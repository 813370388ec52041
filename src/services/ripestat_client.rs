use std::time::Duration;
use reqwest::blocking::Client;
use serde_json::Value;
use crate::bgp::{AsPath, EventKind, RouteEvent};
use crate::utils::config::RipeStatConfig;
use crate::utils::errors::{AppError, ServiceError, Result};
use crate::utils::time_window::api_timestamp;

/// Initial routing state plus update events for one resource and window.
#[derive(Debug, Clone, Default)]
pub struct BgplayData {
    pub initial_state: Vec<AsPath>,
    pub events: Vec<RouteEvent>,
}

pub struct RipeStatClient {
    http: Client,
    base_url: String,
    source_app: Option<String>,
}

impl RipeStatClient {
    pub fn new(config: &RipeStatConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("opskit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            source_app: config.source_app.clone(),
        })
    }

    pub fn fetch_bgplay(&self, resource: &str, start: i64, end: i64, collectors: Option<&str>) -> Result<BgplayData> {
        let mut params = vec![
            ("resource", resource.to_string()),
            ("starttime", api_timestamp(start)),
            ("endtime", api_timestamp(end)),
            ("unix_timestamps", "true".to_string()),
        ];
        if let Some(collectors) = collectors.filter(|c| !c.trim().is_empty()) {
            params.push(("collectors", collectors.to_string()));
        }

        log::debug!("Fetching BGPlay data for {} ({} .. {})", resource, start, end);
        let body = self.get_data("bgplay", params)?;
        let data = parse_bgplay(&body);
        log::debug!(
            "BGPlay returned {} initial paths and {} events for {}",
            data.initial_state.len(),
            data.events.len(),
            resource
        );
        Ok(data)
    }

    pub fn announced_prefixes(&self, asn: &str, start: i64, end: i64) -> Result<Vec<String>> {
        let params = vec![
            ("resource", asn.to_string()),
            ("starttime", api_timestamp(start)),
            ("endtime", api_timestamp(end)),
        ];
        let body = self.get_data("announced-prefixes", params)?;
        Ok(parse_announced_prefixes(&body))
    }

    /// Link to the interactive BGPlay page for a prefix and window.
    pub fn bgplay_page_url(&self, prefix: &str, start: i64, end: i64) -> String {
        format!("{}/bgplay/{}#starttime={}&endtime={}", self.base_url, prefix, start, end)
    }

    fn get_data(&self, call: &str, mut params: Vec<(&'static str, String)>) -> Result<Value> {
        if let Some(app) = &self.source_app {
            params.push(("sourceapp", app.clone()));
        }
        let url = format!("{}/data/{}/data.json", self.base_url, call);

        let response = self.http.get(&url).query(&params).send()?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(AppError::Service(ServiceError::OperationFailed(format!(
                "RIPEstat {} returned {}: {}",
                call,
                status,
                text.chars().take(200).collect::<String>()
            ))));
        }

        Ok(response.json::<Value>()?)
    }
}

/// Parses a BGPlay response body. A missing `data` object yields empty data.
pub fn parse_bgplay(body: &Value) -> BgplayData {
    let null = Value::Null;
    let data = body.get("data").unwrap_or(&null);

    let initial_state = data
        .get("initial_state")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().map(extract_path).filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    let events = data
        .get("events")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .map(|e| RouteEvent {
                    timestamp: e.get("timestamp").map(timestamp_value).unwrap_or(0),
                    kind: EventKind::classify(e.get("type").and_then(Value::as_str).unwrap_or("")),
                    path: extract_path(e),
                })
                .collect()
        })
        .unwrap_or_default();

    BgplayData { initial_state, events }
}

pub fn parse_announced_prefixes(body: &Value) -> Vec<String> {
    body.get("data")
        .and_then(|d| d.get("prefixes"))
        .and_then(Value::as_array)
        .map(|prefixes| {
            prefixes
                .iter()
                .filter_map(|p| p.get("prefix").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// The path sits either on the entry itself or under `attrs`, named `path` or `as_path`.
fn extract_path(entry: &Value) -> AsPath {
    let candidates = [
        entry.get("path"),
        entry.get("as_path"),
        entry.get("attrs").and_then(|a| a.get("path")),
        entry.get("attrs").and_then(|a| a.get("as_path")),
    ];

    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_array)
        .find(|asns| !asns.is_empty())
        .map(|asns| AsPath(asns.iter().filter_map(asn_text).collect()))
        .unwrap_or_default()
}

fn asn_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

// Unparseable, non-finite or out-of-range values read as 0.
fn timestamp_value(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(seconds_from_float)).unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(seconds_from_float))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

fn seconds_from_float(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
    (f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64).then(|| f.trunc() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_mixed_bgplay_shapes() {
        let body = json!({
            "data": {
                "initial_state": [
                    {"path": [3356, 37148, 329001], "source_id": "00-1"},
                    {"as_path": ["1299", "37613", "329001"]},
                    {"path": []}
                ],
                "events": [
                    {"timestamp": 1749823200, "type": "A", "attrs": {"path": [174, 37148, 329001]}},
                    {"timestamp": "1749823300.7", "type": "W", "path": [3356, 37148, 329001]},
                    {"type": "A", "as_path": [6939, 329001]}
                ]
            }
        });

        let data = parse_bgplay(&body);
        assert_eq!(
            data.initial_state,
            vec![AsPath::new(["3356", "37148", "329001"]), AsPath::new(["1299", "37613", "329001"])]
        );
        assert_eq!(data.events.len(), 3);
        assert_eq!(data.events[0].path, AsPath::new(["174", "37148", "329001"]));
        assert_eq!(data.events[1].timestamp, 1_749_823_300);
        assert_eq!(data.events[1].kind, EventKind::Withdraw);
        assert_eq!(data.events[2].timestamp, 0);
    }

    #[test]
    fn out_of_range_timestamps_read_as_zero() {
        let body = json!({"data": {"events": [
            {"timestamp": "-1e30", "type": "A", "path": [1, 2]},
            {"timestamp": "NaN", "type": "A", "path": [1, 2]},
            {"timestamp": 1e300, "type": "A", "path": [1, 2]},
            {"timestamp": "1749823200", "type": "A", "path": [1, 2]},
            {"timestamp": 1749823200.9, "type": "A", "path": [1, 2]}
        ]}});
        let stamps: Vec<i64> = parse_bgplay(&body).events.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![0, 0, 0, 1_749_823_200, 1_749_823_200]);
    }

    #[test]
    fn missing_data_is_empty() {
        let data = parse_bgplay(&json!({"status": "ok"}));
        assert!(data.initial_state.is_empty());
        assert!(data.events.is_empty());
        assert!(parse_announced_prefixes(&json!({"data": null})).is_empty());
    }

    #[test]
    fn announced_prefixes_skip_entries_without_prefix() {
        let body = json!({"data": {"prefixes": [
            {"prefix": "102.217.0.0/22", "timelines": []},
            {"timelines": []},
            {"prefix": "2c0f:f000::/32"}
        ]}});
        assert_eq!(parse_announced_prefixes(&body), vec!["102.217.0.0/22", "2c0f:f000::/32"]);
    }

    #[test]
    fn bgplay_page_url_uses_unix_window() {
        let client = RipeStatClient::new(&RipeStatConfig::default()).unwrap();
        assert_eq!(
            client.bgplay_page_url("102.217.0.0/22", 1_756_684_800, 1_759_190_400),
            "https://stat.ripe.net/bgplay/102.217.0.0/22#starttime=1756684800&endtime=1759190400"
        );
    }
}
