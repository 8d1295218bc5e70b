use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::is_passed;
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self { color: cfg.color() }
    }

    #[tracing::instrument(skip(self, tasks, now))]
    pub fn print_task_table<'a, I>(&mut self, tasks: I, now: DateTime<Utc>) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = &'a Task>,
    {
        let mut out = io::stdout().lock();
        let rows: Vec<Vec<String>> = tasks
            .into_iter()
            .map(|task| self.task_row(task, now))
            .collect();
        write_table(&mut out, table_headers(), rows)?;
        Ok(())
    }

    fn task_row(&self, task: &Task, now: DateTime<Utc>) -> Vec<String> {
        let id = self.paint(&task.id.to_string(), "33");

        // Overdue only matters while the task is still open.
        let deadline = if !task.is_done && is_passed(&task.deadline, now) == Some(true) {
            self.paint(&task.deadline, "31")
        } else {
            task.deadline.clone()
        };

        let name = if task.is_done {
            self.paint(&task.name, "9")
        } else {
            task.name.clone()
        };

        vec![
            id,
            deadline,
            task.tag.clone(),
            name,
            task.status_label().to_string(),
        ]
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&mut self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        write_task_info(&mut out, task)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn table_headers() -> Vec<String> {
    ["ID", "Deadline", "Tag", "Task Name", "Status"]
        .iter()
        .map(|h| h.to_string())
        .collect()
}

fn write_task_info<W: Write>(mut out: W, task: &Task) -> anyhow::Result<()> {
    writeln!(out, "id          {}", task.id)?;
    writeln!(out, "name        {}", task.name)?;
    writeln!(
        out,
        "description {}",
        task.description.clone().unwrap_or_default()
    )?;
    writeln!(out, "deadline    {}", task.deadline)?;
    writeln!(out, "tag         {}", task.tag)?;
    writeln!(out, "status      {}", task.status_label())?;
    Ok(())
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_pads_by_visible_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["A".into(), "B".into()],
            vec![
                vec!["\x1b[31mred\x1b[0m".into(), "x".into()],
                vec!["日本".into(), "y".into()],
            ],
        )
        .expect("write table");

        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "A    B ");
        assert_eq!(lines[1], "---- - ");
        assert_eq!(strip_ansi(lines[2]), "red  x ");
        assert_eq!(lines[3], "日本 y ");
    }

    #[test]
    fn info_lists_every_field() {
        let mut task = Task::new("Pay rent".into(), "2024-01-01".into(), "bills".into());
        task.id = 9;
        task.is_done = true;

        let mut buf = Vec::new();
        write_task_info(&mut buf, &task).expect("write info");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("id          9"));
        assert!(text.contains("tag         bills"));
        assert!(text.contains("status      Completed"));
    }
}
