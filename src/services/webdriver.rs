use std::time::Duration;
use reqwest::blocking::Client;
use serde_json::{json, Value};
use crate::utils::errors::{AppError, ServiceError, Result};

/// Browser operations the dashboard scrapers need. Implemented by
/// `WebDriverSession`; tests provide their own page fakes.
pub trait PageDriver {
    fn navigate(&mut self, url: &str) -> Result<()>;
    fn current_url(&mut self) -> Result<String>;
    fn execute(&mut self, script: &str, args: Vec<Value>) -> Result<Value>;

    fn body_text(&mut self) -> Result<String> {
        let value = self.execute("return document.body ? document.body.innerText : '';", Vec::new())?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn ready_state(&mut self) -> Result<String> {
        let value = self.execute("return document.readyState;", Vec::new())?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

/// A session against a W3C WebDriver endpoint (msedgedriver, chromedriver, geckodriver).
pub struct WebDriverSession {
    http: Client,
    base_url: String,
    session_id: Option<String>,
}

impl WebDriverSession {
    pub fn start(webdriver_url: &str, browser: &str, args: &[String]) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| AppError::Network(format!("Failed to build WebDriver client: {}", e)))?;
        let base_url = webdriver_url.trim_end_matches('/').to_string();

        let capabilities = new_session_capabilities(browser, args);
        log::info!("Opening {} through WebDriver at {}", browser, base_url);
        let response = send(http.post(format!("{}/session", base_url)).json(&capabilities))?;

        let session_id = response
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::BadResponse("new session response without sessionId".to_string()))?
            .to_string();
        log::debug!("WebDriver session {} started", session_id);

        Ok(Self { http, base_url, session_id: Some(session_id) })
    }

    pub fn quit(&mut self) -> Result<()> {
        if let Some(id) = self.session_id.take() {
            send(self.http.delete(format!("{}/session/{}", self.base_url, id)))?;
            log::debug!("WebDriver session {} closed", id);
        }
        Ok(())
    }

    fn session_url(&self, suffix: &str) -> Result<String> {
        let id = self
            .session_id
            .as_ref()
            .ok_or_else(|| ServiceError::OperationFailed("WebDriver session already closed".to_string()))?;
        Ok(format!("{}/session/{}/{}", self.base_url, id, suffix))
    }
}

impl PageDriver for WebDriverSession {
    fn navigate(&mut self, url: &str) -> Result<()> {
        let endpoint = self.session_url("url")?;
        send(self.http.post(endpoint).json(&json!({ "url": url })))?;
        Ok(())
    }

    fn current_url(&mut self) -> Result<String> {
        let endpoint = self.session_url("url")?;
        let value = send(self.http.get(endpoint))?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn execute(&mut self, script: &str, args: Vec<Value>) -> Result<Value> {
        let endpoint = self.session_url("execute/sync")?;
        send(self.http.post(endpoint).json(&json!({ "script": script, "args": args })))
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if let Err(e) = self.quit() {
            log::warn!("Failed to close WebDriver session: {}", e);
        }
    }
}

/// Capabilities for `POST /session`, with browser arguments under the vendor key.
pub fn new_session_capabilities(browser: &str, args: &[String]) -> Value {
    let (browser_name, options_key) = match browser.to_lowercase().as_str() {
        "chrome" | "chromium" => ("chrome", "goog:chromeOptions"),
        "firefox" => ("firefox", "moz:firefoxOptions"),
        _ => ("msedge", "ms:edgeOptions"),
    };

    let mut always_match = serde_json::Map::new();
    always_match.insert("browserName".to_string(), json!(browser_name));
    always_match.insert(options_key.to_string(), json!({ "args": args }));

    json!({ "capabilities": { "alwaysMatch": always_match } })
}

// Every WebDriver response wraps its payload in `value`; errors carry `value.error`.
fn send(request: reqwest::blocking::RequestBuilder) -> Result<Value> {
    let response = request.send()?;
    let status = response.status();
    let body: Value = response.json()?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if !status.is_success() {
        let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
        let message = value.get("message").and_then(Value::as_str).unwrap_or("");
        return Err(AppError::Service(ServiceError::OperationFailed(format!(
            "WebDriver {}: {} {}",
            status, error, message
        ))));
    }

    Ok(value)
}
