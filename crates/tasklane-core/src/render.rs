use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{Month, Weekday};
use tasklane_shared::{Task, TaskPriority, TodoItem};
use unicode_width::UnicodeWidthStr;

use crate::bucket::month_grid;
use crate::config::Config;
use crate::datetime::CalendarDay;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    /// Month grid, one row per week, each cell `day` or `day(count)`.
    #[tracing::instrument(skip(self, out, counts))]
    pub fn write_month<W: Write>(
        &self,
        mut out: W,
        year: i32,
        month0: u32,
        week_start: Weekday,
        counts: &BTreeMap<u32, usize>,
        today: Option<CalendarDay>,
    ) -> anyhow::Result<()> {
        let month_name = u8::try_from(month0 + 1)
            .ok()
            .and_then(|m| Month::try_from(m).ok())
            .map(|m| m.name())
            .unwrap_or("?");
        writeln!(out, "{month_name} {year}")?;

        let headers: Vec<String> = (0..7)
            .scan(week_start, |day, _| {
                let name = weekday_label(*day);
                *day = day.succ();
                Some(name.to_string())
            })
            .collect();

        let rows: Vec<Vec<String>> = month_grid(year, month0, week_start)
            .chunks(7)
            .map(|week| {
                week.iter()
                    .map(|cell| match cell {
                        None => String::new(),
                        Some(day) => {
                            let label = match counts.get(day) {
                                Some(count) if *count > 0 => format!("{day}({count})"),
                                _ => day.to_string(),
                            };
                            let is_today = today.is_some_and(|t| {
                                t.year() == year && t.month0() == month0 && t.day() == *day
                            });
                            if is_today {
                                self.paint(&label, "7")
                            } else {
                                label
                            }
                        }
                    })
                    .collect()
            })
            .collect();

        write_table(&mut out, headers, rows)
    }

    #[tracing::instrument(skip(self, out, tasks))]
    pub fn write_day<W: Write>(
        &self,
        mut out: W,
        day: CalendarDay,
        tasks: &[&Task],
    ) -> anyhow::Result<()> {
        writeln!(out, "{day}")?;
        if tasks.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Priority".to_string(),
            "Status".to_string(),
            "Assignee".to_string(),
            "Hours".to_string(),
            "Title".to_string(),
            "Files".to_string(),
        ];
        let rows: Vec<Vec<String>> = tasks
            .iter()
            .map(|task| {
                vec![
                    self.paint(&short_id(&task.id.to_string()), "33"),
                    self.priority_cell(task.priority),
                    serde_json::to_value(task.status)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default(),
                    task.assigned_to.clone().unwrap_or_default(),
                    task.estimated_hours
                        .map(|h| format!("{h}"))
                        .unwrap_or_default(),
                    task.title.clone(),
                    attachment_count(task.attachments.len()),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)
    }

    #[tracing::instrument(skip(self, out, todos))]
    pub fn write_todos<W: Write>(&self, mut out: W, todos: &[TodoItem]) -> anyhow::Result<()> {
        if todos.is_empty() {
            writeln!(out, "No todos.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Done".to_string(),
            "Priority".to_string(),
            "Title".to_string(),
            "Files".to_string(),
        ];
        let rows: Vec<Vec<String>> = todos
            .iter()
            .map(|todo| {
                vec![
                    self.paint(&short_id(&todo.id.to_string()), "33"),
                    if todo.completed { "x" } else { "" }.to_string(),
                    todo.priority
                        .map(|p| self.priority_cell(p))
                        .unwrap_or_default(),
                    todo.title.clone(),
                    attachment_count(todo.attachments.len()),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)
    }

    #[tracing::instrument(skip(self, out, tasks))]
    pub fn write_trash<W: Write>(&self, mut out: W, tasks: &[Task]) -> anyhow::Result<()> {
        if tasks.is_empty() {
            writeln!(out, "Trash is empty.")?;
            return Ok(());
        }

        let headers = vec!["ID".to_string(), "Created".to_string(), "Title".to_string()];
        let rows: Vec<Vec<String>> = tasks
            .iter()
            .map(|task| {
                vec![
                    self.paint(&task.id.to_string(), "33"),
                    task.created_at.clone().unwrap_or_default(),
                    task.title.clone(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)
    }

    #[tracing::instrument(skip(self, out, task), fields(task_id = %task.id))]
    pub fn write_task_detail<W: Write>(&self, mut out: W, task: &Task) -> anyhow::Result<()> {
        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "title     {}", task.title)?;
        if !task.description.is_empty() {
            writeln!(out, "desc      {}", task.description)?;
        }
        writeln!(out, "priority  {}", self.priority_cell(task.priority))?;
        writeln!(
            out,
            "assignee  {}",
            task.assigned_to.as_deref().unwrap_or("-")
        )?;
        if let Some(created_at) = &task.created_at {
            writeln!(out, "scheduled {created_at}")?;
        }
        if let Some(due) = &task.due_date {
            writeln!(out, "due       {due}")?;
        }
        if let Some(hours) = task.estimated_hours {
            writeln!(out, "hours     {hours}")?;
        }
        for attachment in &task.attachments {
            writeln!(
                out,
                "file      {} {}",
                attachment.name,
                attachment.url().unwrap_or("(pending)")
            )?;
        }
        Ok(())
    }

    fn priority_cell(&self, priority: TaskPriority) -> String {
        match priority {
            TaskPriority::Urgent => self.paint(priority.as_str(), "31"),
            TaskPriority::High => self.paint(priority.as_str(), "33"),
            _ => priority.as_str().to_string(),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn weekday_label(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn attachment_count(count: usize) -> String {
    if count == 0 {
        String::new()
    } else {
        count.to_string()
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(header.as_str()))
        .collect();

    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, &width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for &width in &widths {
        write!(writer, "{:-<width$} ", "")?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, width) in widths.iter().enumerate().take(column_count) {
            let cell = row.get(idx).map(String::as_str).unwrap_or("");
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
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
