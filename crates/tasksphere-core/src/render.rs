use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{DisplayZone, format_iso};
use crate::task::{Task, TaskStatus};
use crate::theme::Theme;

const STRIKE: &str = "9";
const OVERDUE: &str = "31";

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    theme: Theme,
    zone: DisplayZone,
}

impl Renderer {
    pub fn new(cfg: &Config, theme: Theme, zone: DisplayZone) -> anyhow::Result<Self> {
        let color_cfg = cfg
            .get("display.color")
            .unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.trim().to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid display.color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
            theme,
            zone,
        })
    }

    pub fn plain(zone: DisplayZone) -> Self {
        Self {
            color: false,
            theme: Theme::default(),
            zone,
        }
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    #[tracing::instrument(skip(self, out, tasks, now))]
    pub fn write_task_table<W: Write>(
        &self,
        mut out: W,
        tasks: &[Task],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if tasks.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        let headers = ["ID", "Status", "Title", "Due", "Created"]
            .iter()
            .map(|h| self.paint(h, self.header_code()))
            .collect::<Vec<_>>();

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id = self.paint(&task.short_id(), self.accent_code());

            let title = if task.status == TaskStatus::Completed {
                self.paint(&task.title, STRIKE)
            } else {
                task.title.clone()
            };

            let due = task
                .due_date
                .map(|due| self.zone.format_due(due))
                .unwrap_or_default();
            let due = if task.is_overdue(now) {
                self.paint(&due, OVERDUE)
            } else {
                due
            };

            rows.push(vec![
                id,
                task.status.label().to_string(),
                title,
                due,
                self.zone.format_timestamp(task.created_at),
            ]);
        }

        write_table(&mut out, headers, rows)?;
        writeln!(out, "{} task(s)", tasks.len())?;
        Ok(())
    }

    pub fn write_task_detail<W: Write>(&self, mut out: W, task: &Task) -> anyhow::Result<()> {
        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "title     {}", task.title)?;
        writeln!(out, "status    {}", task.status)?;
        writeln!(out, "created   {}", format_iso(task.created_at))?;
        writeln!(out, "updated   {}", format_iso(task.updated_at))?;
        if let Some(due) = task.due_date {
            writeln!(out, "due       {} ({})", self.zone.format_due(due), format_iso(due))?;
        }
        Ok(())
    }

    pub fn write_theme<W: Write>(&self, mut out: W) -> anyhow::Result<()> {
        let name = if self.theme.is_dark { "dark" } else { "light" };
        writeln!(out, "theme: {}", self.paint(name, self.accent_code()))?;
        Ok(())
    }

    pub fn write_notice<W: Write>(&self, mut out: W, message: &str) -> anyhow::Result<()> {
        writeln!(out, "{message}")?;
        Ok(())
    }

    fn header_code(&self) -> &'static str {
        if self.theme.is_dark { "1;97" } else { "1;30" }
    }

    fn accent_code(&self) -> &'static str {
        if self.theme.is_dark { "93" } else { "34" }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || text.is_empty() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(header).as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (idx, header) in headers.iter().enumerate() {
        write_cell(&mut writer, header, widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            write_cell(&mut writer, cell, widths[idx])?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn write_cell<W: Write>(writer: &mut W, cell: &str, width: usize) -> io::Result<()> {
    let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
    let padding = width.saturating_sub(visible_width);
    write!(writer, "{}{} ", cell, " ".repeat(padding))
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
