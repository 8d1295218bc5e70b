use chrono::{
  DateTime,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Utc
};

const NAIVE_DATETIME_FORMATS: [&str; 4] = [
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M"
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a stored deadline string.
///
/// Date-only values resolve to UTC midnight. Naive datetimes are taken as
/// UTC, not as local time the way a browser `Date` would read them.
/// Returns `None` for anything that is not an ISO date or datetime.
#[tracing::instrument(level = "trace", fields(input = input))]
pub fn parse_deadline(
  input: &str
) -> Option<DateTime<Utc>> {
  let token = input.trim();
  if token.is_empty() {
    return None;
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(dt.with_timezone(&Utc));
  }

  for fmt in NAIVE_DATETIME_FORMATS {
    if let Ok(naive) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Some(naive.and_utc());
    }
  }

  match NaiveDate::parse_from_str(
    token,
    DATE_FORMAT
  ) {
    | Ok(date) => {
      Some(
        date
          .and_time(NaiveTime::MIN)
          .and_utc()
      )
    }
    | Err(err) => {
      tracing::trace!(
        error = %err,
        "deadline is not an ISO date"
      );
      None
    }
  }
}

/// `Some(true)` when the deadline lies strictly before `now`, `None` when
/// the deadline cannot be parsed.
#[must_use]
pub fn is_passed(
  deadline: &str,
  now: DateTime<Utc>
) -> Option<bool> {
  parse_deadline(deadline)
    .map(|at| at < now)
}

/// Render a workbook date cell the way deadlines are stored.
#[must_use]
pub fn format_excel_datetime(
  value: NaiveDateTime
) -> String {
  if value.time() == NaiveTime::MIN {
    value.format(DATE_FORMAT).to_string()
  } else {
    value
      .format("%Y-%m-%dT%H:%M:%S")
      .to_string()
  }
}
