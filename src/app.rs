use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use chrono::{NaiveDate, NaiveDateTime};

use crate::bgp::replay::{origin_paths, unique_upstreams, upstream_presence};
use crate::bgp::{Replayer, SamplingMode, UpstreamPresence};
use crate::services::cvaas_client::{device_serial, CvaasClient, Device};
use crate::services::dashboard_metrics::{self, ExportOutcome, PollSettings, TimeWindow};
use crate::services::fortigate_log::{ConversionSummary, FortigateParser};
use crate::services::qr_render::{self, QrOptions};
use crate::services::report_export::{self, MetricTable};
use crate::services::ripestat_client::{BgplayData, RipeStatClient};
use crate::services::webdriver::{PageDriver, WebDriverSession};
use crate::utils::config::{normalize_asn, Config, Upstream};
use crate::utils::errors::{AppError, ConfigError, Result};
use crate::utils::time_window::{day_bounds, days_inclusive};

/// Command line overrides for the `[bgp]` section.
#[derive(Debug, Clone, Default)]
pub struct BgpOverrides {
    pub prefix: Option<String>,
    pub origin_asn: Option<String>,
    pub upstreams: Vec<String>,
}

/// Fully resolved subject of a BGP check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgpTarget {
    pub prefix: String,
    pub origin_asn: String,
    pub upstreams: Vec<Upstream>,
    pub collectors: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayUpstreams {
    pub date: NaiveDate,
    pub presence: Vec<UpstreamPresence>,
}

#[derive(Debug, Clone, Default)]
pub struct QrOverrides {
    pub fill: Option<String>,
    pub background: Option<String>,
    pub box_size: Option<u32>,
}

pub struct App {
    config: Config,
}

impl App {
    pub fn new(config_path: Option<String>) -> Result<Self> {
        let config = Config::load(config_path.as_deref())?;
        Ok(Self::with_config(config))
    }

    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Merges command line overrides over the config file.
    pub fn bgp_target(&self, overrides: &BgpOverrides) -> Result<BgpTarget> {
        let bgp = &self.config.bgp;

        let prefix = overrides
            .prefix
            .clone()
            .or_else(|| bgp.prefix.clone())
            .ok_or_else(|| ConfigError::MissingField("bgp.prefix (or --prefix)".to_string()))?;

        let origin_asn = match &overrides.origin_asn {
            Some(asn) => normalize_asn(asn)?,
            None => bgp
                .origin_asn
                .clone()
                .ok_or_else(|| ConfigError::MissingField("bgp.origin_asn (or --origin-asn)".to_string()))?,
        };

        let upstreams = if overrides.upstreams.is_empty() {
            bgp.upstreams.clone()
        } else {
            overrides
                .upstreams
                .iter()
                .map(|u| Upstream::parse_override(u))
                .collect::<Result<Vec<_>>>()?
        };

        Ok(BgpTarget {
            prefix,
            origin_asn,
            upstreams,
            collectors: bgp.collectors.clone(),
        })
    }

    fn ripestat(&self) -> Result<RipeStatClient> {
        RipeStatClient::new(&self.config.ripestat)
    }

    /// Active paths for the origin at one instant, with a Yes/No per watched upstream.
    pub fn bgp_check_at(&self, target: &BgpTarget, instant: NaiveDateTime, brief: bool) -> Result<()> {
        let (start, end) = day_bounds(instant.date());
        let data = self
            .ripestat()?
            .fetch_bgplay(&target.prefix, start, end, target.collectors.as_deref())?;

        for line in check_at_lines(data, target, instant, brief) {
            println!("{}", line);
        }
        Ok(())
    }

    /// One line per UTC day saying whether each watched upstream carried the
    /// origin's routes at any point that day.
    pub fn bgp_daily(
        &self,
        target: &BgpTarget,
        from: NaiveDate,
        to: NaiveDate,
        mode: SamplingMode,
        csv_path: Option<&Path>,
    ) -> Result<Vec<DayUpstreams>> {
        let client = self.ripestat()?;
        scan_days(target, from, to, mode, csv_path, |start, end| {
            client.fetch_bgplay(&target.prefix, start, end, target.collectors.as_deref())
        })
    }

    /// Whether the origin and each watched upstream announced the prefix, per day.
    pub fn bgp_announced(&self, target: &BgpTarget, from: NaiveDate, to: NaiveDate) -> Result<()> {
        let client = self.ripestat()?;
        let mut announcers = vec![Upstream { name: "My ASN".to_string(), asn: target.origin_asn.clone() }];
        announcers.extend(target.upstreams.iter().cloned());

        for date in days_inclusive(from, to) {
            let (start, end) = day_bounds(date);
            println!("{}", date.format("%Y-%m-%d"));

            let mut verdicts = Vec::new();
            for announcer in &announcers {
                let prefixes = client.announced_prefixes(&announcer.asn, start, end)?;
                println!(
                    "  {} ({}) announces {} prefixes: {}",
                    announcer.name,
                    announcer.asn,
                    prefixes.len(),
                    prefixes.join(", ")
                );
                let announced = prefixes.iter().any(|p| p == &target.prefix);
                verdicts.push(format!("{}: {}", announcer.name, if announced { "Yes" } else { "No" }));
            }
            println!("  Is {} announced? {}\n", target.prefix, verdicts.join(", "));
        }
        Ok(())
    }

    /// BGPlay page link for the window between two midnights (UTC).
    pub fn bgp_play_url(&self, target: &BgpTarget, from: NaiveDate, to: NaiveDate, open: bool) -> Result<String> {
        let (start, _) = day_bounds(from);
        let (end, _) = day_bounds(to);
        let url = self.ripestat()?.bgplay_page_url(&target.prefix, start, end);
        println!("{}", url);
        if open {
            open_in_browser(&url)?;
            log::info!("Opened: {}", url);
        }
        Ok(url)
    }

    pub fn dashboard_inventory(&self) -> Result<Vec<Device>> {
        let dashboard = &self.config.dashboard;
        let client = CvaasClient::new(dashboard, dashboard.token()?)?;
        let devices = client.inventory()?;
        for device in &devices {
            println!(
                "{:<30} {:<14} {:<16} {}",
                device.hostname,
                device.serial_number,
                device.model_name.as_deref().unwrap_or("-"),
                device.ip_address.as_deref().unwrap_or("-")
            );
        }
        Ok(devices)
    }

    /// Scrapes min/max for every configured report on the target day, prints
    /// the tables and saves CSV and DOCX copies in `out_dir`.
    pub fn dashboard_stats(&self, date: NaiveDate, out_dir: &Path) -> Result<Vec<MetricTable>> {
        let dashboard = &self.config.dashboard;
        if dashboard.reports.is_empty() {
            return Err(ConfigError::MissingField("dashboard.reports".to_string()).into());
        }

        let client = CvaasClient::new(dashboard, dashboard.token()?)?;
        let window = self.dashboard_window(date)?;
        let poll = self.poll_settings();

        let mut session = WebDriverSession::start(&dashboard.webdriver_url, &dashboard.browser, &dashboard.browser_args)?;
        dashboard_metrics::login(&mut session, &client.login_url(), poll)?;

        let mut tables = Vec::new();
        for report in &dashboard.reports {
            log::info!("Collecting {}...", report.title);
            tables.push(dashboard_metrics::collect_report(&mut session, report, &window, poll));
        }

        let saved = save_tables(&tables, out_dir).map(|()| tables);
        after_quit(saved, session.quit())
    }

    /// Opens the raw-data panel of a device interface and triggers its CSV export.
    pub fn dashboard_export(&self, hostname: &str, interface: &str) -> Result<()> {
        let dashboard = &self.config.dashboard;
        let client = CvaasClient::new(dashboard, dashboard.token()?)?;

        let devices = client.inventory()?;
        let serial = device_serial(&devices, hostname)?;
        log::info!("Found {} with serial {}", hostname, serial);

        let poll = self.poll_settings();
        let mut session = WebDriverSession::start(&dashboard.webdriver_url, &dashboard.browser, &dashboard.browser_args)?;
        dashboard_metrics::login(&mut session, &client.login_url(), poll)?;

        let url = client.ethernet_raw_data_url(&serial, interface)?;
        session.navigate(&url)?;
        let clicked = dashboard_metrics::click_export(
            &mut session,
            PollSettings { timeout: Duration::from_secs(20), interval: poll.interval },
        )?;
        println!("Export triggered ({}), check the browser's download folder", clicked);

        std::thread::sleep(Duration::from_secs(dashboard.download_wait_secs));
        after_quit(Ok(()), session.quit())
    }

    /// Triggers the raw-data export of every configured link for the target
    /// day, then prints a per-link OK/FAIL summary. A failing link is skipped.
    pub fn dashboard_export_batch(&self, date: NaiveDate) -> Result<Vec<ExportOutcome>> {
        let dashboard = &self.config.dashboard;
        if dashboard.exports.is_empty() {
            return Err(ConfigError::MissingField("dashboard.exports".to_string()).into());
        }

        let client = CvaasClient::new(dashboard, dashboard.token()?)?;
        let window = self.dashboard_window(date)?;
        let poll = self.poll_settings();

        let started = Instant::now();
        let mut session = WebDriverSession::start(&dashboard.webdriver_url, &dashboard.browser, &dashboard.browser_args)?;
        dashboard_metrics::login(&mut session, &client.login_url(), poll)?;

        let outcomes = dashboard_metrics::export_links(&mut session, &dashboard.exports, &window, poll);
        if outcomes.last().is_some_and(|o| o.succeeded) {
            log::info!("Last export succeeded, waiting {}s for the download", dashboard.download_wait_secs);
            std::thread::sleep(Duration::from_secs(dashboard.download_wait_secs));
        }
        let outcomes = after_quit(Ok(outcomes), session.quit())?;

        println!();
        for line in dashboard_metrics::export_summary_lines(&outcomes, started.elapsed()) {
            println!("{}", line);
        }
        Ok(outcomes)
    }

    pub fn qr(&self, text: &str, output: &Path, overrides: &QrOverrides) -> Result<()> {
        let mut qr_config = self.config.qr.clone();
        if let Some(fill) = &overrides.fill {
            qr_config.fill = fill.clone();
        }
        if let Some(background) = &overrides.background {
            qr_config.background = background.clone();
        }
        if let Some(box_size) = overrides.box_size {
            if box_size == 0 {
                return Err(AppError::InvalidInput("box size must be at least 1".to_string()));
            }
            qr_config.box_size = box_size;
        }

        let options = QrOptions::from_config(&qr_config)?;
        qr_render::save_qr(text, &options, output)?;
        println!("QR code saved at {}", output.display());
        Ok(())
    }

    pub fn fortigate(&self, path: &Path) -> Result<Vec<ConversionSummary>> {
        let parser = FortigateParser::new()?;
        let summaries = parser.convert_path(path)?;
        for summary in &summaries {
            if summary.rows == 0 {
                println!("{}: no valid log entries found", summary.input.display());
            } else {
                println!("{} -> {} ({} rows)", summary.input.display(), summary.output.display(), summary.rows);
            }
        }
        Ok(summaries)
    }

    fn dashboard_window(&self, date: NaiveDate) -> Result<TimeWindow> {
        let dashboard = &self.config.dashboard;
        Ok(TimeWindow {
            active_ms: dashboard_metrics::active_for_date(date, dashboard.utc_offset_hours)?,
            from_offset_ms: dashboard.from_offset_ms,
            to_offset_ms: dashboard.to_offset_ms,
        })
    }

    fn poll_settings(&self) -> PollSettings {
        PollSettings {
            timeout: Duration::from_secs(self.config.dashboard.page_timeout_secs),
            interval: Duration::from_millis(self.config.dashboard.poll_interval_ms),
        }
    }
}

/// Console lines for `bgp check-at`, from the BGPlay data of the day that
/// contains `instant`.
pub fn check_at_lines(data: BgplayData, target: &BgpTarget, instant: NaiveDateTime, brief: bool) -> Vec<String> {
    let replay = Replayer::new(data.initial_state, data.events);
    let active = replay.active_at(instant.and_utc().timestamp());
    let mine = origin_paths(&active, &target.origin_asn);

    if brief {
        return vec![format_presence(&upstream_presence(&mine, &target.upstreams))];
    }

    let when = instant.format("%Y-%m-%d %H:%M:%S");
    let mut lines = Vec::new();
    if mine.is_empty() {
        lines.push(format!("No active paths for {} at {} UTC", target.origin_asn, when));
    } else {
        lines.push(format!("Active paths for {} at {} UTC:", target.origin_asn, when));
        for (i, path) in mine.iter().enumerate() {
            lines.push(format!("Path {}: {}", i + 1, path));
            lines.push(format!("  Upstream ASNs: [{}]", path.upstreams().join(", ")));
            for upstream in &target.upstreams {
                lines.push(format!(
                    "  {} ({}) upstream?: {}",
                    upstream.name,
                    upstream.asn,
                    if path.has_upstream(&upstream.asn) { "Yes" } else { "No" }
                ));
            }
            lines.push(String::new());
        }
    }
    lines.push(format!("Unique upstream ASNs at {} UTC: [{}]", when, unique_upstreams(&mine).join(", ")));
    lines
}

/// Scans each UTC day of `[from, to]` with data from `fetch(day_start, day_end)`.
/// Each day is printed and appended to the CSV (parent directories created)
/// as soon as it completes, so a failure part-way keeps the earlier rows.
pub fn scan_days<F>(
    target: &BgpTarget,
    from: NaiveDate,
    to: NaiveDate,
    mode: SamplingMode,
    csv_path: Option<&Path>,
    mut fetch: F,
) -> Result<Vec<DayUpstreams>>
where
    F: FnMut(i64, i64) -> Result<BgplayData>,
{
    let mut writer = match csv_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let mut w = csv::Writer::from_path(path)?;
            w.write_record(daily_csv_header(&target.upstreams))?;
            w.flush()?;
            Some(w)
        }
        None => None,
    };

    let mut days = Vec::new();
    for date in days_inclusive(from, to) {
        let (start, end) = day_bounds(date);
        let data = fetch(start, end)?;
        let replay = Replayer::new(data.initial_state, data.events);
        let presence = replay.scan_window(start, end, &target.origin_asn, &target.upstreams, mode);
        let day = DayUpstreams { date, presence };

        if let Some(w) = writer.as_mut() {
            w.write_record(daily_csv_row(&day))?;
            w.flush()?;
        }
        println!("{}", format_day_line(&day));
        days.push(day);
    }

    if let Some(path) = csv_path {
        log::info!("Wrote {} day(s) to {}", days.len(), path.display());
    }
    Ok(days)
}

/// Prints each table and writes `{slug}.csv` and `{slug}.docx` into `out_dir`.
fn save_tables(tables: &[MetricTable], out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir)?;
    for table in tables {
        println!("{}\n", report_export::render_fixed_width(table));
        let base = out_dir.join(table.slug());
        report_export::write_csv(&base.with_extension("csv"), table)?;
        report_export::write_docx(&base.with_extension("docx"), table)?;
    }
    Ok(())
}

// `result` is settled before the browser closes, so a failed quit is only logged.
fn after_quit<T>(result: Result<T>, quit: Result<()>) -> Result<T> {
    if let Err(e) = quit {
        log::warn!("Failed to close WebDriver session: {}", e);
    }
    result
}

/// CSV file name used when only a directory is given.
pub fn daily_csv_path(dir: &Path, from: NaiveDate, to: NaiveDate) -> PathBuf {
    dir.join(format!("data_{}_to_{}.csv", from.format("%Y-%m-%d"), to.format("%Y-%m-%d")))
}

pub fn daily_csv_header(upstreams: &[Upstream]) -> Vec<String> {
    std::iter::once("Date".to_string())
        .chain(upstreams.iter().map(|u| format!("{}_upstream", u.name)))
        .collect()
}

pub fn daily_csv_row(day: &DayUpstreams) -> Vec<String> {
    std::iter::once(day.date.format("%Y-%m-%d").to_string())
        .chain(day.presence.iter().map(|p| p.yes_no().to_string()))
        .collect()
}

/// `GLO upstream: Yes | Dolphin upstream: No`
pub fn format_presence(presence: &[UpstreamPresence]) -> String {
    presence
        .iter()
        .map(|p| format!("{} upstream: {}", p.upstream.name, p.yes_no()))
        .collect::<Vec<_>>()
        .join(" | ")
}

pub fn format_day_line(day: &DayUpstreams) -> String {
    let presence = format_presence(&day.presence);
    if presence.is_empty() {
        day.date.format("%Y-%m-%d").to_string()
    } else {
        format!("{} | {}", day.date.format("%Y-%m-%d"), presence)
    }
}

fn open_in_browser(url: &str) -> Result<()> {
    let mut command = if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", "", url]);
        c
    } else if cfg!(target_os = "macos") {
        let mut c = Command::new("open");
        c.arg(url);
        c
    } else {
        let mut c = Command::new("xdg-open");
        c.arg(url);
        c
    };

    let status = command
        .status()
        .map_err(|e| AppError::InvalidInput(format!("Failed to launch browser: {}", e)))?;
    if !status.success() {
        log::warn!("Browser launcher exited with {}", status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgp::{AsPath, EventKind, RouteEvent};
    use pretty_assertions::assert_eq;

    fn app() -> App {
        let config = Config::from_toml(
            r#"
[bgp]
prefix = "102.217.0.0/22"
origin_asn = 329001
upstreams = [{ name = "GLO", asn = 37148 }, { name = "Dolphin", asn = "AS37613" }]
"#,
        )
        .unwrap();
        App::with_config(config)
    }

    fn glo() -> Upstream {
        Upstream { name: "GLO".into(), asn: "37148".into() }
    }

    fn dolphin() -> Upstream {
        Upstream { name: "Dolphin".into(), asn: "37613".into() }
    }

    #[test]
    fn target_comes_from_config() {
        let target = app().bgp_target(&BgpOverrides::default()).unwrap();
        assert_eq!(target, BgpTarget {
            prefix: "102.217.0.0/22".into(),
            origin_asn: "329001".into(),
            upstreams: vec![glo(), dolphin()],
            collectors: None,
        });
    }

    #[test]
    fn overrides_replace_config_values() {
        let overrides = BgpOverrides {
            prefix: Some("192.0.2.0/24".into()),
            origin_asn: Some("AS64500".into()),
            upstreams: vec!["Transit=64501".into()],
        };
        let target = app().bgp_target(&overrides).unwrap();
        assert_eq!(target.prefix, "192.0.2.0/24");
        assert_eq!(target.origin_asn, "64500");
        assert_eq!(target.upstreams, vec![Upstream { name: "Transit".into(), asn: "64501".into() }]);
    }

    #[test]
    fn missing_prefix_is_a_config_error() {
        let app = App::with_config(Config::default());
        let err = app.bgp_target(&BgpOverrides::default()).unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::MissingField(_))));
    }

    #[test]
    fn day_line_and_csv_row() {
        let day = DayUpstreams {
            date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            presence: vec![
                UpstreamPresence { upstream: glo(), present: true },
                UpstreamPresence { upstream: dolphin(), present: false },
            ],
        };
        assert_eq!(format_day_line(&day), "2025-09-01 | GLO upstream: Yes | Dolphin upstream: No");
        assert_eq!(daily_csv_header(&[glo(), dolphin()]), vec!["Date", "GLO_upstream", "Dolphin_upstream"]);
        assert_eq!(daily_csv_row(&day), vec!["2025-09-01", "Yes", "No"]);
    }

    #[test]
    fn csv_path_from_directory() {
        let path = daily_csv_path(
            Path::new("/tmp/routes"),
            NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 9, 30).unwrap(),
        );
        assert_eq!(path, PathBuf::from("/tmp/routes/data_2025-09-01_to_2025-09-30.csv"));
    }

    #[test]
    fn qr_rejects_zero_box_size() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("qr.png");
        let overrides = QrOverrides { box_size: Some(0), ..QrOverrides::default() };
        assert!(app().qr("hi", &output, &overrides).is_err());
        assert!(!output.exists());

        let overrides = QrOverrides { fill: Some("red".into()), background: Some("pink".into()), box_size: Some(2) };
        app().qr("hi", &output, &overrides).unwrap();
        assert!(output.exists());
    }

    #[test]
    fn dashboard_stats_needs_reports() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 9, 18).unwrap();
        let err = app().dashboard_stats(date, dir.path()).unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::MissingField(_))));
    }

    #[test]
    fn dashboard_export_batch_needs_links() {
        let date = NaiveDate::from_ymd_opt(2025, 9, 18).unwrap();
        let err = app().dashboard_export_batch(date).unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::MissingField(ref f)) if f == "dashboard.exports"));
    }

    fn target() -> BgpTarget {
        app().bgp_target(&BgpOverrides::default()).unwrap()
    }

    // 2025-09-01: GLO path from midnight, a Dolphin path announced at 12:01:00
    fn sample_day() -> BgplayData {
        BgplayData {
            initial_state: vec![AsPath::new(["3356", "37148", "329001"]), AsPath::new(["174", "64500"])],
            events: vec![RouteEvent {
                timestamp: 1_756_728_060,
                kind: EventKind::Announce,
                path: AsPath::new(["1299", "37613", "329001"]),
            }],
        }
    }

    fn at(hms: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("2025-09-01 {}", hms), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn check_at_lists_origin_paths_and_upstreams() {
        let lines = check_at_lines(sample_day(), &target(), at("12:00:00"), false);
        assert_eq!(
            lines,
            vec![
                "Active paths for 329001 at 2025-09-01 12:00:00 UTC:",
                "Path 1: [3356, 37148, 329001]",
                "  Upstream ASNs: [3356, 37148]",
                "  GLO (37148) upstream?: Yes",
                "  Dolphin (37613) upstream?: No",
                "",
                "Unique upstream ASNs at 2025-09-01 12:00:00 UTC: [3356, 37148]",
            ]
        );

        let brief = check_at_lines(sample_day(), &target(), at("12:01:00"), true);
        assert_eq!(brief, vec!["GLO upstream: Yes | Dolphin upstream: Yes"]);
    }

    #[test]
    fn check_at_without_origin_paths() {
        let mut other = target();
        other.origin_asn = "64501".into();
        let lines = check_at_lines(sample_day(), &other, at("08:30:00"), false);
        assert_eq!(
            lines,
            vec![
                "No active paths for 64501 at 2025-09-01 08:30:00 UTC",
                "Unique upstream ASNs at 2025-09-01 08:30:00 UTC: []",
            ]
        );
    }

    #[test]
    fn scan_days_writes_nested_csv() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("reports").join("september").join("routes.csv");
        let mut windows = Vec::new();

        let days = scan_days(
            &target(),
            NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 9, 2).unwrap(),
            SamplingMode::EventDriven,
            Some(&csv_path),
            |start, end| {
                windows.push((start, end));
                Ok(sample_day())
            },
        )
        .unwrap();

        assert_eq!(windows, vec![(1_756_684_800, 1_756_771_199), (1_756_771_200, 1_756_857_599)]);
        assert_eq!(days.len(), 2);
        assert_eq!(format_day_line(&days[0]), "2025-09-01 | GLO upstream: Yes | Dolphin upstream: Yes");
        assert_eq!(
            std::fs::read_to_string(&csv_path).unwrap(),
            "Date,GLO_upstream,Dolphin_upstream\n2025-09-01,Yes,Yes\n2025-09-02,Yes,Yes\n"
        );
    }

    #[test]
    fn scan_days_keeps_finished_rows_when_a_fetch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("out").join("routes.csv");
        let mut calls = 0;

        let result = scan_days(
            &target(),
            NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 9, 5).unwrap(),
            SamplingMode::EventDriven,
            Some(&csv_path),
            |_, _| {
                calls += 1;
                if calls == 3 {
                    return Err(AppError::Network("connection reset".into()));
                }
                Ok(BgplayData {
                    initial_state: vec![AsPath::new(["37613", "329001"])],
                    events: Vec::new(),
                })
            },
        );

        assert!(matches!(result, Err(AppError::Network(_))));
        assert_eq!(calls, 3);
        assert_eq!(
            std::fs::read_to_string(&csv_path).unwrap(),
            "Date,GLO_upstream,Dolphin_upstream\n2025-09-01,No,Yes\n2025-09-02,No,Yes\n"
        );
    }

    #[test]
    fn failed_quit_keeps_saved_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = MetricTable::new("Bitrate Summary", Some("Mbps".into()), vec!["Inbound".into()]);
        table.push_row("Glo", vec![report_export::MinMax { min: "1.5".into(), max: "9".into() }]);
        let quit_error = || Err(AppError::Network("driver went away".into()));

        let saved = save_tables(std::slice::from_ref(&table), dir.path()).map(|()| vec![table.clone()]);
        let tables = after_quit(saved, quit_error()).unwrap();
        assert_eq!(tables.len(), 1);
        assert!(dir.path().join(format!("{}.csv", table.slug())).exists());
        assert!(dir.path().join(format!("{}.docx", table.slug())).exists());

        let failed: Result<()> = Err(AppError::Export("disk full".into()));
        assert!(matches!(after_quit(failed, Ok(())), Err(AppError::Export(_))));
    }
}
