use std::io::Cursor;

use anyhow::{Context, anyhow};
use calamine::{Data, Reader, Xlsx, open_workbook_from_rs};
use rust_xlsxwriter::Workbook;
use tracing::{debug, instrument, warn};

use crate::datetime::format_excel_datetime;
use crate::task::Task;

pub const SHEET_NAME: &str = "myTodoList";
pub const DEFAULT_EXPORT_FILE: &str = "myTodoList.xlsx";

/// Header label and column width for each exported column.
pub const COLUMNS: [(&str, f64); 4] = [
    ("Task Name", 30.0),
    ("Deadline", 20.0),
    ("Tag", 15.0),
    ("Status", 20.0),
];

/// Build an `.xlsx` workbook with one row per task, in iteration order.
#[instrument(skip(tasks))]
pub fn export_workbook<'a, I>(tasks: I) -> anyhow::Result<Vec<u8>>
where
    I: IntoIterator<Item = &'a Task>,
{
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, (header, width)) in (0u16..).zip(COLUMNS) {
        sheet.set_column_width(col, width)?;
        sheet.write_string(0, col, header)?;
    }

    let mut rows = 0u32;
    for task in tasks {
        rows += 1;
        sheet.write_string(rows, 0, task.name.as_str())?;
        sheet.write_string(rows, 1, task.deadline.as_str())?;
        sheet.write_string(rows, 2, task.tag.as_str())?;
        sheet.write_string(rows, 3, task.status_label())?;
    }

    let buffer = workbook
        .save_to_buffer()
        .context("failed to encode workbook")?;
    debug!(rows, bytes = buffer.len(), "encoded workbook");
    Ok(buffer)
}

/// Read draft tasks from the first worksheet of an `.xlsx` workbook.
///
/// Row 1 is the header. Columns A, B and C become name, deadline and tag for
/// every later row up to the last used one, blank rows included. Cells are
/// taken as they come; ids are left at 0 for the caller to assign.
#[instrument(skip(bytes), fields(bytes = bytes.len()))]
pub fn import_workbook(bytes: &[u8]) -> anyhow::Result<Vec<Task>> {
    let mut workbook: Xlsx<_> =
        open_workbook_from_rs(Cursor::new(bytes)).context("failed to open workbook")?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("workbook has no worksheets"))?
        .context("failed to read first worksheet")?;

    let Some((last_row, _)) = range.end() else {
        debug!("first worksheet is empty");
        return Ok(Vec::new());
    };

    let cell = |row: u32, col: u32| -> String {
        range
            .get_value((row, col))
            .map(cell_text)
            .unwrap_or_default()
    };

    let tasks: Vec<Task> = (1..=last_row)
        .map(|row| Task::new(cell(row, 0), cell(row, 1), cell(row, 2)))
        .collect();

    debug!(rows = tasks.len(), "parsed workbook rows");
    Ok(tasks)
}

fn cell_text(value: &Data) -> String {
    match value {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => format_excel_datetime(naive),
            None => dt.as_f64().to_string(),
        },
        Data::Error(err) => {
            warn!(error = ?err, "cell holds an error value");
            String::new()
        }
    }
}
