use std::time::Duration;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use crate::utils::config::DashboardConfig;
use crate::utils::errors::{AppError, ServiceError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub hostname: String,
    pub serial_number: String,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

/// REST access to a CloudVision as a Service tenant.
pub struct CvaasClient {
    http: Client,
    base_url: String,
    token: String,
}

impl CvaasClient {
    pub fn new(config: &DashboardConfig, token: String) -> Result<Self> {
        if config.accept_invalid_certs {
            log::warn!("TLS certificate verification disabled for {}", config.base_url);
        }
        let http = Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn inventory(&self) -> Result<Vec<Device>> {
        let url = format!("{}/cvpservice/inventory/devices", self.base_url);
        log::info!("Fetching inventory from CVaaS...");

        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Service(ServiceError::OperationFailed(format!(
                "CVaaS inventory returned {}",
                status
            ))));
        }

        let devices: Vec<Device> = response.json()?;
        log::debug!("Inventory lists {} devices", devices.len());
        Ok(devices)
    }

    /// Magic link that signs the browser in with the access token.
    pub fn login_url(&self) -> String {
        format!("{}/api/v1/oauth?invitation={}", self.base_url, self.token)
    }

    /// Raw-data panel of the inbound bitrate chart for one interface.
    pub fn ethernet_raw_data_url(&self, serial: &str, interface: &str) -> Result<String> {
        let params = json!({
            "datasetId": serial,
            "metricKey": "INTERFACE_IN_BITRATE",
            "metricParams": {
                "aggregationIntervalOverride": "default",
                "deviceId": serial,
                "intf": interface,
            },
        })
        .to_string();
        let mut url = Url::parse(&format!("{}/cv/devices/ethernet-stats/{}", self.base_url, serial))
            .map_err(|e| AppError::InvalidInput(format!("Bad CVaaS URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("modal", "true")
            .append_pair("modalParams", &params)
            .append_pair("modalPanel", "RAW_DATA");
        Ok(url.to_string())
    }
}

pub fn device_serial(devices: &[Device], hostname: &str) -> Result<String> {
    devices
        .iter()
        .find(|d| d.hostname == hostname)
        .map(|d| d.serial_number.clone())
        .ok_or_else(|| ServiceError::NotFound(format!("Device {}", hostname)).into())
}
