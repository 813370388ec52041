use std::path::Path;
use docx_rs::{Docx, Paragraph, Run, Table, TableCell, TableRow};
use unicode_width::UnicodeWidthStr;
use crate::utils::errors::{AppError, Result};

const NAME_WIDTH: usize = 15;
const VALUE_WIDTH: usize = 12;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinMax {
    pub min: String,
    pub max: String,
}

impl MinMax {
    pub fn is_complete(&self) -> bool {
        !self.min.is_empty() && !self.max.is_empty()
    }
}

/// A summary table: one row per link, a Min/Max pair per column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricTable {
    pub title: String,
    pub unit: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<(String, Vec<MinMax>)>,
}

impl MetricTable {
    pub fn new(title: &str, unit: Option<String>, columns: Vec<String>) -> Self {
        Self { title: title.to_string(), unit, columns, rows: Vec::new() }
    }

    pub fn push_row(&mut self, name: &str, cells: Vec<MinMax>) {
        self.rows.push((name.to_string(), cells));
    }

    /// Value with the unit appended; empty values stay empty.
    fn with_unit(&self, value: &str) -> String {
        match &self.unit {
            Some(unit) if !value.is_empty() => format!("{} {}", value, unit),
            _ => value.to_string(),
        }
    }

    fn cell<'a>(cells: &'a [MinMax], idx: usize) -> (&'a str, &'a str) {
        cells
            .get(idx)
            .map(|c| (c.min.as_str(), c.max.as_str()))
            .unwrap_or(("", ""))
    }

    /// File-name friendly form of the title, e.g. `bitrate-summary`.
    pub fn slug(&self) -> String {
        let slug: String = self
            .title
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        slug.split('-').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("-")
    }
}

fn center(text: &str, width: usize) -> String {
    let len = UnicodeWidthStr::width(text);
    if len >= width {
        return text.to_string();
    }
    let left = (width - len) / 2;
    let right = width - len - left;
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(right))
}

fn ljust(text: &str, width: usize) -> String {
    let len = UnicodeWidthStr::width(text);
    format!("{}{}", text, " ".repeat(width.saturating_sub(len)))
}

/// Console rendering with grouped Min/Max columns under each heading.
pub fn render_fixed_width(table: &MetricTable) -> String {
    let mut lines = vec![table.title.clone()];

    let mut header = ljust("Link name", NAME_WIDTH);
    let mut sub = ljust("", NAME_WIDTH);
    for column in &table.columns {
        header.push_str("  ");
        header.push_str(&center(column, VALUE_WIDTH * 2 + 1));
        sub.push_str("  ");
        sub.push_str(&center("Min", VALUE_WIDTH));
        sub.push(' ');
        sub.push_str(&center("Max", VALUE_WIDTH));
    }
    lines.push(header.trim_end().to_string());
    lines.push(sub.trim_end().to_string());
    lines.push("-".repeat(NAME_WIDTH + table.columns.len() * (VALUE_WIDTH * 2 + 3)));

    for (name, cells) in &table.rows {
        let mut line = ljust(name, NAME_WIDTH);
        for idx in 0..table.columns.len() {
            let (min, max) = MetricTable::cell(cells, idx);
            line.push_str("  ");
            line.push_str(&center(min, VALUE_WIDTH));
            line.push(' ');
            line.push_str(&center(max, VALUE_WIDTH));
        }
        lines.push(line.trim_end().to_string());
    }

    lines.join("\n")
}

/// CSV with the title on its own row, then `Link name, <Col> Min, <Col> Max, ...`.
pub fn write_csv(path: &Path, table: &MetricTable) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_path(path)?;
    writer.write_record([table.title.as_str()])?;

    let mut header = vec!["Link name".to_string()];
    for column in &table.columns {
        header.push(format!("{} Min", column));
        header.push(format!("{} Max", column));
    }
    writer.write_record(&header)?;

    for (name, cells) in &table.rows {
        let mut record = vec![name.clone()];
        for idx in 0..table.columns.len() {
            let (min, max) = MetricTable::cell(cells, idx);
            record.push(table.with_unit(min));
            record.push(table.with_unit(max));
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;

    log::info!("Saved CSV to: {}", path.display());
    Ok(())
}

fn docx_cell(text: &str, bold: bool) -> TableCell {
    let mut run = Run::new().add_text(text);
    if bold {
        run = run.bold();
    }
    TableCell::new().add_paragraph(Paragraph::new().add_run(run))
}

/// Word document with a heading and a merged two-row header.
pub fn write_docx(path: &Path, table: &MetricTable) -> Result<()> {
    let mut header = vec![docx_cell("Link name", true)];
    let mut sub = vec![docx_cell("", true)];
    for column in &table.columns {
        header.push(docx_cell(column, true).grid_span(2));
        sub.push(docx_cell("Min", true));
        sub.push(docx_cell("Max", true));
    }

    let mut rows = vec![TableRow::new(header), TableRow::new(sub)];
    for (name, cells) in &table.rows {
        let mut row = vec![docx_cell(name, false)];
        for idx in 0..table.columns.len() {
            let (min, max) = MetricTable::cell(cells, idx);
            row.push(docx_cell(&table.with_unit(min), false));
            row.push(docx_cell(&table.with_unit(max), false));
        }
        rows.push(TableRow::new(row));
    }

    let heading = Paragraph::new()
        .add_run(Run::new().add_text(table.title.as_str()).bold())
        .style("Heading2");

    let file = std::fs::File::create(path)?;
    Docx::new()
        .add_paragraph(heading)
        .add_table(Table::new(rows))
        .build()
        .pack(file)
        .map_err(|e| AppError::Export(format!("Failed to write {}: {}", path.display(), e)))?;

    log::info!("Saved DOCX to: {}", path.display());
    Ok(())
}
