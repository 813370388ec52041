use std::sync::OnceLock;
use std::time::{Duration, Instant};
use chrono::{FixedOffset, NaiveDate, NaiveTime, TimeZone};
use regex::Regex;
use serde_json::Value;
use crate::services::report_export::{MetricTable, MinMax};
use crate::services::webdriver::PageDriver;
use crate::utils::config::{ExportLinkConfig, ReportConfig};
use crate::utils::errors::{AppError, ServiceError, Result};

/// Dashboard time window: local midnight of the target day plus the two offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub active_ms: i64,
    pub from_offset_ms: i64,
    pub to_offset_ms: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub timeout: Duration,
    pub interval: Duration,
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-+]?[0-9]+(?:[,.][0-9]+)*").expect("valid number regex"))
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Min,
    Max,
}

impl Bound {
    fn label(self) -> &'static str {
        match self {
            Bound::Min => "min",
            Bound::Max => "max",
        }
    }
}

fn labelled_re(bound: Bound) -> &'static Regex {
    static MIN: OnceLock<Regex> = OnceLock::new();
    static MAX: OnceLock<Regex> = OnceLock::new();
    let cell = match bound {
        Bound::Min => &MIN,
        Bound::Max => &MAX,
    };
    // label, then anything that is not a digit, newline, `$` or `-`, then the number
    cell.get_or_init(|| {
        Regex::new(&format!(r"(?i){}[^0-9\n\r$\-]*([0-9]+(?:[,.][0-9]+)*)", bound.label()))
            .expect("valid label regex")
    })
}

const WINDOW_KEYS: [&str; 3] = ["active", "fromOffset", "toOffset"];

fn query_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        WINDOW_KEYS
            .iter()
            .map(|key| Regex::new(&format!(r"([?&]){}=[^&#]*", key)).expect("valid query regex"))
            .collect()
    })
}

/// Accepts `M/D/YYYY` (the portal's format) or ISO `YYYY-MM-DD`.
pub fn parse_target_date(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%m/%d/%Y")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .map_err(|e| AppError::Parse(format!("Invalid target date '{}': {}", value, e)))
}

/// Milliseconds since the epoch of local midnight on `date`.
pub fn active_for_date(date: NaiveDate, utc_offset_hours: i32) -> Result<i64> {
    let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
        .ok_or_else(|| AppError::InvalidInput(format!("UTC offset out of range: {}", utc_offset_hours)))?;
    let local = offset
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .single()
        .ok_or_else(|| AppError::InvalidInput(format!("Ambiguous local midnight for {}", date)))?;
    Ok(local.timestamp_millis())
}

/// Points a saved dashboard link at the requested window. Existing
/// `active`/`fromOffset`/`toOffset` values are replaced and `{active}`,
/// `{from_offset}`, `{to_offset}` placeholders are filled in.
pub fn normalize_url(url: &str, window: &TimeWindow) -> String {
    let mut out = url
        .replace("{active}", &window.active_ms.to_string())
        .replace("{from_offset}", &window.from_offset_ms.to_string())
        .replace("{to_offset}", &window.to_offset_ms.to_string());

    let values = [window.active_ms, window.from_offset_ms, window.to_offset_ms];
    for ((key, re), value) in WINDOW_KEYS.iter().zip(query_res()).zip(values) {
        out = re
            .replace_all(&out, format!("${{1}}{}={}", key, value).as_str())
            .into_owned();
    }
    out
}

/// First number in `text`, with non-breaking spaces treated as spaces. Empty when none.
pub fn extract_first_number(text: &str) -> String {
    let cleaned = text.replace('\u{a0}', " ");
    number_re()
        .find(&cleaned)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Min and max figures from a statistics panel's text.
pub fn find_min_max(text: &str) -> MinMax {
    let lines: Vec<&str> = text.lines().collect();
    let find = |bound: Bound| {
        let on_lines = labelled_line_value(&lines, bound.label());
        if !on_lines.is_empty() {
            return on_lines;
        }
        labelled_re(bound)
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    };

    MinMax { min: find(Bound::Min), max: find(Bound::Max) }
}

// First line mentioning the label; if that line carries no number the
// value is usually rendered on the following line.
fn labelled_line_value(lines: &[&str], label: &str) -> String {
    let Some(idx) = lines.iter().position(|l| l.to_lowercase().contains(label)) else {
        return String::new();
    };
    let on_line = extract_first_number(lines[idx]);
    if !on_line.is_empty() {
        return on_line;
    }
    lines
        .get(idx + 1)
        .map(|next| extract_first_number(next))
        .unwrap_or_default()
}

/// Re-reads the page until both values show up or the timeout passes,
/// returning whatever was found.
pub fn poll_min_max<D: PageDriver>(driver: &mut D, label: &str, poll: PollSettings) -> MinMax {
    let started = Instant::now();
    let mut best = MinMax::default();

    loop {
        match driver.body_text() {
            Ok(text) => {
                let found = find_min_max(&text);
                if !found.min.is_empty() && found.min != best.min {
                    log::info!("Found MIN for {}: {}", label, found.min);
                    best.min = found.min;
                }
                if !found.max.is_empty() && found.max != best.max {
                    log::info!("Found MAX for {}: {}", label, found.max);
                    best.max = found.max;
                }
            }
            Err(e) => log::debug!("Reading page text for {} failed: {}", label, e),
        }

        if best.is_complete() || started.elapsed() >= poll.timeout {
            return best;
        }
        std::thread::sleep(poll.interval);
    }
}

/// Visits every link of a report and collects its min/max. A page that fails
/// to load leaves its cell empty.
pub fn collect_report<D: PageDriver>(
    driver: &mut D,
    report: &ReportConfig,
    window: &TimeWindow,
    poll: PollSettings,
) -> MetricTable {
    let mut table = MetricTable::new(&report.title, report.unit.clone(), report.columns.clone());

    for row in &report.rows {
        let mut cells = Vec::with_capacity(report.columns.len());
        for (column, link) in report.columns.iter().zip(&row.links) {
            let label = format!("{} {}", row.name, column);
            let url = normalize_url(link, window);
            log::info!("Opening {} ...", label);

            let cell = match driver.navigate(&url) {
                Ok(()) => {
                    let found = poll_min_max(driver, &label, poll);
                    log::info!("Result {} -> min: '{}', max: '{}'", label, found.min, found.max);
                    found
                }
                Err(e) => {
                    log::warn!("Error collecting {}: {}", label, e);
                    MinMax::default()
                }
            };
            cells.push(cell);
        }
        table.push_row(&row.name, cells);
    }

    table
}

/// Opens the invitation link and waits until the portal has redirected or finished loading.
pub fn login<D: PageDriver>(driver: &mut D, login_url: &str, poll: PollSettings) -> Result<()> {
    log::info!("Opening CVaaS login link...");
    driver.navigate(login_url)?;

    let started = Instant::now();
    while started.elapsed() < poll.timeout {
        let redirected = driver.current_url().map(|u| u != login_url).unwrap_or(false);
        let complete = driver.ready_state().map(|s| s == "complete").unwrap_or(false);
        if redirected || complete {
            return Ok(());
        }
        std::thread::sleep(poll.interval);
    }
    log::warn!("Login page did not settle within {:?}, continuing", poll.timeout);
    Ok(())
}

const CLICK_EXPORT_SCRIPT: &str = r#"
const keywords = ["export", "download", "csv"];
const iconHints = ["download", "export", "arrow-down", "fa-download", "bi-download", "chevron-down"];
const attrs = (el, names) => names.map(n => el.getAttribute(n) || "").join(" ").toLowerCase();
const visible = el => !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
for (const el of document.querySelectorAll("button, a, [role='button']")) {
  if (!visible(el)) continue;
  const hay = ((el.innerText || "") + " " +
    attrs(el, ["aria-label", "title", "id", "value", "data-testid", "data-qa", "class"])).toLowerCase();
  let match = keywords.some(k => hay.includes(k));
  if (!match) {
    for (const icon of el.querySelectorAll("svg, i, span")) {
      const iconHay = attrs(icon, ["aria-label", "title", "class", "id", "data-icon"]);
      if (iconHints.some(k => iconHay.includes(k))) { match = true; break; }
    }
  }
  if (match) {
    el.scrollIntoView({block: "center"});
    el.click();
    return (el.innerText || el.getAttribute("aria-label") || el.tagName).trim();
  }
}
return null;
"#;

/// Finds the raw-data export control and clicks it, retrying until the timeout.
pub fn click_export<D: PageDriver>(driver: &mut D, poll: PollSettings) -> Result<String> {
    let started = Instant::now();
    loop {
        match driver.execute(CLICK_EXPORT_SCRIPT, Vec::new()) {
            Ok(Value::String(clicked)) => {
                log::info!("Export triggered via '{}'", clicked);
                return Ok(clicked);
            }
            Ok(_) => {}
            Err(e) => log::debug!("Export button lookup failed: {}", e),
        }
        if started.elapsed() >= poll.timeout {
            return Err(ServiceError::Timeout("export button".to_string()).into());
        }
        std::thread::sleep(poll.interval);
    }
}

/// Result of one raw-data export attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    pub name: String,
    pub url: String,
    pub elapsed: Duration,
    pub succeeded: bool,
}

/// Opens every export link for the window and clicks its export control.
/// A link that fails to load or has no export control is logged and skipped.
pub fn export_links<D: PageDriver>(
    driver: &mut D,
    links: &[ExportLinkConfig],
    window: &TimeWindow,
    poll: PollSettings,
) -> Vec<ExportOutcome> {
    let mut outcomes = Vec::with_capacity(links.len());

    for link in links {
        let url = normalize_url(&link.url, window);
        log::info!("Opening {} ...", link.name);
        let started = Instant::now();

        let result = driver.navigate(&url).and_then(|()| click_export(driver, poll));
        let succeeded = match result {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Export failed for {}: {}", link.name, e);
                false
            }
        };
        let elapsed = started.elapsed();
        log::info!(
            "Export {} for {} ({:.2}s)",
            if succeeded { "triggered" } else { "failed" },
            link.name,
            elapsed.as_secs_f64()
        );

        outcomes.push(ExportOutcome { name: link.name.clone(), url, elapsed, succeeded });
    }

    outcomes
}

const SUMMARY_URL_WIDTH: usize = 80;

/// Totals, run time and one `NN. <url> -> 1.23s OK|FAIL` line per link.
pub fn export_summary_lines(outcomes: &[ExportOutcome], total: Duration) -> Vec<String> {
    let succeeded = outcomes.iter().filter(|o| o.succeeded).count();
    let average = if outcomes.is_empty() { 0.0 } else { total.as_secs_f64() / outcomes.len() as f64 };

    let mut lines = vec![
        "Export summary:".to_string(),
        format!(
            " - Total URLs: {}, Succeeded: {}, Failed: {}",
            outcomes.len(),
            succeeded,
            outcomes.len() - succeeded
        ),
        format!(" - Total run time: {:.2}s, Avg per URL: {:.2}s", total.as_secs_f64(), average),
    ];
    for (i, outcome) in outcomes.iter().enumerate() {
        lines.push(format!(
            "   {:02}. {} [{}] -> {:.2}s {}",
            i + 1,
            shorten(&outcome.url, SUMMARY_URL_WIDTH),
            outcome.name,
            outcome.elapsed.as_secs_f64(),
            if outcome.succeeded { "OK" } else { "FAIL" }
        ));
    }
    lines
}

fn shorten(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let head: String = text.chars().take(width - 3).collect();
    format!("{}...", head)
}
