use std::path::{Path, PathBuf};
use regex::Regex;
use crate::utils::errors::{AppError, Result};

/// Columns written to the CSV, in order. `msg` is always last.
pub const FIELDS: [&str; 20] = [
    "date", "time", "eventtime", "tz", "logid", "type", "subtype", "level", "vd", "logdesc",
    "sn", "user", "ui", "method", "srcip", "dstip", "action", "status", "reason", "msg",
];

const LOG_EXTENSIONS: [&str; 2] = ["log", "txt"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub rows: usize,
}

pub struct FortigateParser {
    field_patterns: Vec<(&'static str, Regex)>,
    msg_pattern: Regex,
}

impl FortigateParser {
    pub fn new() -> Result<Self> {
        let field_patterns = FIELDS[..FIELDS.len() - 1]
            .iter()
            .map(|field| {
                let pattern = format!(r#"{}=(?:"(.*?)"|([^\s"]+))\s"#, regex::escape(field));
                Regex::new(&pattern)
                    .map(|re| (*field, re))
                    .map_err(|e| AppError::Parse(format!("Bad pattern for field {}: {}", field, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let msg_pattern = Regex::new(r#"msg="(.*?)"(?:\s*$|\s+\w+=)"#)
            .map_err(|e| AppError::Parse(format!("Bad msg pattern: {}", e)))?;

        Ok(Self { field_patterns, msg_pattern })
    }

    /// Splits one log line into the known columns. Blank lines yield `None`;
    /// fields that are not present stay empty.
    pub fn parse_line(&self, line: &str) -> Option<Vec<String>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let mut values = vec![String::new(); FIELDS.len()];
        let mut remaining = line;

        for (idx, (_, pattern)) in self.field_patterns.iter().enumerate() {
            if let Some(caps) = pattern.captures(remaining) {
                let value = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or("");
                values[idx] = value.to_string();
                let consumed = caps.get(0).map(|m| m.end()).unwrap_or(0);
                remaining = remaining[consumed..].trim_start();
            }
        }

        // msg is matched against the full line; a trailing space lets the last field terminate
        let padded = format!("{} ", line);
        if let Some(caps) = self.msg_pattern.captures(&padded) {
            if let Some(m) = caps.get(1) {
                values[FIELDS.len() - 1] = m.as_str().replace("\"\"", "\"");
            }
        }

        Some(values)
    }

    /// Converts one log file. Nothing is written when no line parses.
    pub fn convert_file(&self, input: &Path, output: &Path) -> Result<ConversionSummary> {
        log::info!("Processing: {}", display_name(input));

        let bytes = std::fs::read(input)?;
        let content = String::from_utf8_lossy(&bytes);

        let rows: Vec<Vec<String>> = content.lines().filter_map(|line| self.parse_line(line)).collect();

        if rows.is_empty() {
            log::warn!("No valid log entries found in {}", display_name(input));
            return Ok(ConversionSummary { input: input.to_path_buf(), output: output.to_path_buf(), rows: 0 });
        }

        let mut writer = csv::Writer::from_path(output)?;
        writer.write_record(FIELDS)?;
        for row in &rows {
            writer.write_record(row)?;
        }
        writer.flush()?;

        log::info!("CSV created: {} ({} rows)", display_name(output), rows.len());
        Ok(ConversionSummary { input: input.to_path_buf(), output: output.to_path_buf(), rows: rows.len() })
    }

    /// Converts a single `.log`/`.txt` file, or every such file in a directory.
    /// Each CSV lands next to its source with the same stem.
    pub fn convert_path(&self, path: &Path) -> Result<Vec<ConversionSummary>> {
        if path.is_file() {
            if !is_log_file(path) {
                return Err(AppError::InvalidInput(format!(
                    "{} is not a .log or .txt file",
                    path.display()
                )));
            }
            let output = path.with_extension("csv");
            return Ok(vec![self.convert_file(path, &output)?]);
        }

        if path.is_dir() {
            let mut log_files: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_log_file(p))
                .collect();
            log_files.sort();

            if log_files.is_empty() {
                log::warn!("No .log or .txt files found in {}", path.display());
                return Ok(Vec::new());
            }

            log::info!("Found {} log file(s) to convert", log_files.len());
            let mut summaries = Vec::new();
            for input in log_files {
                let output = input.with_extension("csv");
                match self.convert_file(&input, &output) {
                    Ok(summary) => summaries.push(summary),
                    Err(e) => log::warn!("Could not convert {}: {}", input.display(), e),
                }
            }
            return Ok(summaries);
        }

        Err(AppError::InvalidInput(format!("{} is not a valid file or folder", path.display())))
    }
}

fn is_log_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| LOG_EXTENSIONS.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed)))
        .unwrap_or(false)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
