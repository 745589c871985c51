use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::{
  DateTime,
  Datelike,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  SecondsFormat,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::{
  CoreError,
  Result
};

const TIMEZONE_CONFIG_FILE: &str =
  "tasklane-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "TASKLANE_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "TASKLANE_TIME_CONFIG";
const DEFAULT_PROJECT_TIMEZONE: &str =
  "UTC";

/// Local hour a dropped item is pinned
/// to; must stay away from midnight.
pub const DROP_ANCHOR_HOUR: u32 = 12;

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// A single calendar cell. `month0` is
/// zero-based (January = 0) everywhere
/// in the calendar API.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
)]
pub struct CalendarDay {
  date: NaiveDate
}

impl CalendarDay {
  pub fn new(
    year: i32,
    month0: u32,
    day: u32
  ) -> Result<Self> {
    if month0 > 11 {
      return Err(CoreError::validation(
        format!(
          "month index out of range: \
           {month0}"
        )
      ));
    }
    let Some(date) =
      NaiveDate::from_ymd_opt(
        year,
        month0 + 1,
        day
      )
    else {
      return Err(CoreError::validation(
        format!(
          "no such day: {year}-{:02}-{day:02}",
          month0 + 1
        )
      ));
    };
    Ok(Self { date })
  }

  /// Resolve a grid cell. Padding cells
  /// (`None`) have no bucket.
  pub fn from_cell(
    year: i32,
    month0: u32,
    day: Option<u32>
  ) -> Result<Self> {
    let Some(day) = day else {
      return Err(CoreError::validation(
        "calendar cell has no day \
         (padding cell)"
      ));
    };
    Self::new(year, month0, day)
  }

  pub fn from_naive(
    date: NaiveDate
  ) -> Self {
    Self { date }
  }

  pub fn year(&self) -> i32 {
    self.date.year()
  }

  pub fn month0(&self) -> u32 {
    self.date.month0()
  }

  pub fn day(&self) -> u32 {
    self.date.day()
  }

  pub fn naive(&self) -> NaiveDate {
    self.date
  }

  pub fn key(&self) -> String {
    self.date.format("%Y-%m-%d").to_string()
  }
}

impl fmt::Display for CalendarDay {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(&self.key())
  }
}

pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

/// `YYYY-MM-DD` of the instant as seen
/// on a wall clock in `tz`.
#[must_use]
pub fn date_key(
  instant: DateTime<Utc>,
  tz: Tz
) -> String {
  calendar_day_of(instant, tz).key()
}

#[must_use]
pub fn calendar_day_of(
  instant: DateTime<Utc>,
  tz: Tz
) -> CalendarDay {
  CalendarDay::from_naive(
    instant.with_timezone(&tz).date_naive()
  )
}

/// Local noon of `day` in `tz`.
pub fn target_timestamp_for_drop(
  day: CalendarDay,
  tz: Tz
) -> Result<DateTime<Tz>> {
  let naive = day
    .naive()
    .and_hms_opt(DROP_ANCHOR_HOUR, 0, 0)
    .ok_or_else(|| {
      CoreError::validation(
        "failed to construct local noon"
      )
    })?;
  local_to_zoned(tz, naive, "drop-target")
}

/// RFC 3339 with the zone's offset, e.g.
/// `2024-06-10T12:00:00-04:00`.
#[must_use]
pub fn format_timestamp(
  instant: &DateTime<Tz>
) -> String {
  instant.to_rfc3339_opts(
    SecondsFormat::Secs,
    false
  )
}

/// Parse a stored timestamp. Offset-less
/// forms are wall-clock times in `tz`;
/// a bare date is local midnight, never
/// UTC midnight.
pub fn parse_timestamp(
  raw: &str,
  tz: Tz
) -> Option<DateTime<Utc>> {
  let token = raw.trim();
  if token.is_empty() {
    return None;
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(dt.with_timezone(&Utc));
  }

  if let Ok(ndt) =
    NaiveDateTime::parse_from_str(
      token,
      "%Y%m%dT%H%M%SZ"
    )
  {
    return Some(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
  }

  for fmt in [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M"
  ] {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return local_to_zoned(tz, ndt, fmt)
        .ok()
        .map(|dt| dt.with_timezone(&Utc));
    }
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    let midnight =
      date.and_hms_opt(0, 0, 0)?;
    return local_to_zoned(
      tz, midnight, "date"
    )
    .ok()
    .map(|dt| dt.with_timezone(&Utc));
  }

  tracing::trace!(
    raw = %token,
    "unparseable timestamp"
  );
  None
}

/// Parse a calendar day given on the
/// command line: `today`, `tomorrow`,
/// `yesterday` or `YYYY-MM-DD`.
pub fn parse_day_arg(
  input: &str,
  now: DateTime<Utc>,
  tz: Tz
) -> Result<CalendarDay> {
  let token = input.trim();
  let today = calendar_day_of(now, tz);

  let shifted = |days: i64| {
    today
      .naive()
      .checked_add_signed(Duration::days(
        days
      ))
      .map(CalendarDay::from_naive)
      .ok_or_else(|| {
        CoreError::validation(
          "date out of range"
        )
      })
  };

  match token
    .to_ascii_lowercase()
    .as_str()
  {
    | "today" => return Ok(today),
    | "tomorrow" => return shifted(1),
    | "yesterday" => return shifted(-1),
    | _ => {}
  }

  NaiveDate::parse_from_str(
    token, "%Y-%m-%d"
  )
  .map(CalendarDay::from_naive)
  .map_err(|err| {
    CoreError::validation(format!(
      "expected YYYY-MM-DD, today, \
       tomorrow or yesterday; got \
       {input:?} ({err})"
    ))
  })
}

fn local_to_zoned(
  tz: Tz,
  local_naive: NaiveDateTime,
  context: &str
) -> Result<DateTime<Tz>> {
  match tz
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt)
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      Ok(if first <= second {
        first
      } else {
        second
      })
    }
    | LocalResult::None => {
      Err(CoreError::validation(
        format!(
          "local datetime {local_naive} \
           does not exist in {tz} \
           ({context})"
        )
      ))
    }
  }
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_PROJECT_TIMEZONE,
    "DEFAULT_PROJECT_TIMEZONE"
  )
  .unwrap_or(chrono_tz::UTC)
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

pub fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "resolved project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}
