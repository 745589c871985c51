//! Calendar placement of tasks.
//!
//! A task sits on the wall-clock date of
//! its `created_at` in the bucketer's
//! timezone. Tasks whose `created_at` is
//! missing or unparseable sit nowhere.

use std::collections::BTreeMap;

use chrono::{
  DateTime,
  Datelike,
  Duration,
  Months,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use tasklane_shared::Task;
use tracing::{
  debug,
  trace
};

use crate::datetime::{
  CalendarDay,
  calendar_day_of,
  parse_timestamp,
  project_timezone,
  target_timestamp_for_drop
};
use crate::error::Result;

/// Narrows a day bucket to one person.
///
/// `employee_id` wins over
/// `current_user_only` when both are set.
#[derive(Debug, Clone, Default)]
pub struct DayFilter {
  pub employee_id:       Option<String>,
  pub current_user_only: bool
}

impl DayFilter {
  pub fn employee(
    id: impl Into<String>
  ) -> Self {
    Self {
      employee_id:       Some(id.into()),
      current_user_only: false
    }
  }

  pub fn mine() -> Self {
    Self {
      employee_id:       None,
      current_user_only: true
    }
  }
}

#[derive(Debug, Clone)]
pub struct DateBucketer {
  tz:           Tz,
  current_user: Option<String>
}

impl DateBucketer {
  pub fn new(tz: Tz) -> Self {
    Self {
      tz,
      current_user: None
    }
  }

  pub fn project() -> Self {
    Self::new(*project_timezone())
  }

  pub fn with_current_user(
    mut self,
    user_id: impl Into<String>
  ) -> Self {
    self.current_user =
      Some(user_id.into());
    self
  }

  pub fn timezone(&self) -> Tz {
    self.tz
  }

  pub fn date_key(
    &self,
    instant: DateTime<Utc>
  ) -> String {
    crate::datetime::date_key(
      instant, self.tz
    )
  }

  /// The cell a task is drawn in, if any.
  pub fn placement(
    &self,
    task: &Task
  ) -> Option<CalendarDay> {
    let raw = task.created_at.as_deref()?;
    let Some(instant) =
      parse_timestamp(raw, self.tz)
    else {
      trace!(
        task_id = %task.id,
        created_at = %raw,
        "skipping task with unparseable created_at"
      );
      return None;
    };
    Some(calendar_day_of(instant, self.tz))
  }

  #[tracing::instrument(
    skip(self, tasks, day, filter),
    fields(day = %day, count = tasks.len())
  )]
  pub fn tasks_for_day<'a>(
    &self,
    tasks: &'a [Task],
    day: CalendarDay,
    filter: &DayFilter
  ) -> Vec<&'a Task> {
    let assignee = self.assignee(filter);
    let matched: Vec<&Task> = tasks
      .iter()
      .filter(|task| {
        self.is_on_day(
          task,
          day,
          assignee.as_deref()
        )
      })
      .collect();
    trace!(
      matched = matched.len(),
      "bucketed day"
    );
    matched
  }

  pub fn has_tasks_on_day(
    &self,
    tasks: &[Task],
    day: CalendarDay,
    filter: &DayFilter
  ) -> bool {
    let assignee = self.assignee(filter);
    tasks.iter().any(|task| {
      self.is_on_day(
        task,
        day,
        assignee.as_deref()
      )
    })
  }

  /// One pass over `tasks`, grouped by
  /// day-of-month for the given month.
  pub fn bucket_month<'a>(
    &self,
    tasks: &'a [Task],
    year: i32,
    month0: u32,
    filter: &DayFilter
  ) -> BTreeMap<u32, Vec<&'a Task>> {
    let assignee = self.assignee(filter);
    let mut buckets: BTreeMap<
      u32,
      Vec<&Task>
    > = BTreeMap::new();

    for task in tasks {
      if !matches_assignee(
        task,
        assignee.as_deref()
      ) {
        continue;
      }
      let Some(cell) = self.placement(task)
      else {
        continue;
      };
      if cell.year() == year
        && cell.month0() == month0
      {
        buckets
          .entry(cell.day())
          .or_default()
          .push(task);
      }
    }

    debug!(
      year,
      month = month0 + 1,
      days = buckets.len(),
      "bucketed month"
    );
    buckets
  }

  pub fn target_timestamp_for_drop(
    &self,
    day: CalendarDay
  ) -> Result<DateTime<Tz>> {
    target_timestamp_for_drop(day, self.tz)
  }

  pub fn today(
    &self,
    now: DateTime<Utc>
  ) -> CalendarDay {
    calendar_day_of(now, self.tz)
  }

  fn assignee(
    &self,
    filter: &DayFilter
  ) -> Option<String> {
    if let Some(employee) =
      filter.employee_id.as_ref()
    {
      return Some(employee.clone());
    }
    if filter.current_user_only {
      if self.current_user.is_none() {
        debug!(
          "current-user filter requested \
           without a current user; \
           showing everyone"
        );
      }
      return self.current_user.clone();
    }
    None
  }

  fn is_on_day(
    &self,
    task: &Task,
    day: CalendarDay,
    assignee: Option<&str>
  ) -> bool {
    matches_assignee(task, assignee)
      && self.placement(task) == Some(day)
  }
}

fn matches_assignee(
  task: &Task,
  assignee: Option<&str>
) -> bool {
  match assignee {
    | Some(id) => {
      task.assigned_to.as_deref()
        == Some(id)
    }
    | None => true
  }
}

/// Cells of a month laid out in whole
/// weeks: leading and trailing padding
/// is `None`.
pub fn month_grid(
  year: i32,
  month0: u32,
  week_start: Weekday
) -> Vec<Option<u32>> {
  let Some(first) =
    NaiveDate::from_ymd_opt(
      year,
      month0 + 1,
      1
    )
  else {
    return Vec::new();
  };
  let days = days_in_month(first);
  let lead = days_from_week_start(
    first.weekday(),
    week_start
  );

  let mut cells: Vec<Option<u32>> =
    Vec::with_capacity(42);
  cells.extend(
    std::iter::repeat_n(None, lead)
  );
  cells.extend((1..=days).map(Some));
  while cells.len() % 7 != 0 {
    cells.push(None);
  }
  cells
}

fn days_in_month(first: NaiveDate) -> u32 {
  first
    .checked_add_months(Months::new(1))
    .and_then(|next| next.pred_opt())
    .map(|last| last.day())
    .unwrap_or(28)
}

fn days_from_week_start(
  day: Weekday,
  week_start: Weekday
) -> usize {
  let offset = (7
    + day.num_days_from_monday()
    - week_start.num_days_from_monday())
    % 7;
  offset as usize
}

pub fn parse_week_start(
  raw: &str
) -> Weekday {
  if raw
    .trim()
    .eq_ignore_ascii_case("sunday")
  {
    Weekday::Sun
  } else {
    Weekday::Mon
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum CalendarViewMode {
  Month,
  Week,
  Day
}

impl CalendarViewMode {
  pub fn from_key(
    raw: &str
  ) -> Option<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "month" => Some(Self::Month),
      | "week" => Some(Self::Week),
      | "day" => Some(Self::Day),
      | _ => None
    }
  }

  pub fn as_key(&self) -> &'static str {
    match self {
      | Self::Month => "month",
      | Self::Week => "week",
      | Self::Day => "day"
    }
  }
}

/// What the calendar currently shows.
/// One type serves the month, week and
/// day layouts.
#[derive(Debug, Clone, Copy)]
pub struct CalendarView {
  pub mode:       CalendarViewMode,
  pub anchor:     CalendarDay,
  pub week_start: Weekday
}

impl CalendarView {
  pub fn new(
    mode: CalendarViewMode,
    anchor: CalendarDay,
    week_start: Weekday
  ) -> Self {
    Self {
      mode,
      anchor,
      week_start
    }
  }

  pub fn cells(
    &self
  ) -> Vec<Option<CalendarDay>> {
    match self.mode {
      | CalendarViewMode::Month => {
        let year = self.anchor.year();
        let month0 = self.anchor.month0();
        month_grid(
          year,
          month0,
          self.week_start
        )
        .into_iter()
        .map(|cell| {
          cell.and_then(|day| {
            CalendarDay::new(
              year, month0, day
            )
            .ok()
          })
        })
        .collect()
      }
      | CalendarViewMode::Week => {
        let anchor = self.anchor.naive();
        let back = days_from_week_start(
          anchor.weekday(),
          self.week_start
        );
        let start = anchor
          - Duration::days(back as i64);
        (0..7)
          .map(|offset| {
            start
              .checked_add_signed(
                Duration::days(offset)
              )
              .map(CalendarDay::from_naive)
          })
          .collect()
      }
      | CalendarViewMode::Day => {
        vec![Some(self.anchor)]
      }
    }
  }

  /// Move by `step` months, weeks or
  /// days. Month steps clamp the day to
  /// the target month's length.
  pub fn shift(&mut self, step: i32) {
    let anchor = self.anchor.naive();
    let moved = match self.mode {
      | CalendarViewMode::Month => {
        shift_months(anchor, step)
      }
      | CalendarViewMode::Week => {
        anchor.checked_add_signed(
          Duration::weeks(step as i64)
        )
      }
      | CalendarViewMode::Day => {
        anchor.checked_add_signed(
          Duration::days(step as i64)
        )
      }
    };

    match moved {
      | Some(date) => {
        self.anchor =
          CalendarDay::from_naive(date);
      }
      | None => {
        tracing::warn!(
          anchor = %self.anchor,
          step,
          "calendar shift out of range; ignoring"
        );
      }
    }
  }

  pub fn focus(&mut self, day: CalendarDay) {
    debug!(
      from = %self.anchor,
      to = %day,
      "calendar focus moved"
    );
    self.anchor = day;
  }
}

fn shift_months(
  date: NaiveDate,
  step: i32
) -> Option<NaiveDate> {
  let months = Months::new(
    step.unsigned_abs()
  );
  if step >= 0 {
    date.checked_add_months(months)
  } else {
    date.checked_sub_months(months)
  }
}

#[cfg(test)]
mod tests {
  use chrono_tz::America;
  use tasklane_shared::{
    TaskPriority,
    TaskStatus
  };
  use uuid::Uuid;

  use super::*;

  fn task(
    title: &str,
    created_at: Option<&str>,
    assigned_to: Option<&str>
  ) -> Task {
    Task {
      id:              Uuid::new_v4(),
      title:           title.to_string(),
      description:     String::new(),
      created_at:      created_at
        .map(ToString::to_string),
      due_date:        None,
      assigned_to:     assigned_to
        .map(ToString::to_string),
      status:          TaskStatus::Planned,
      priority:        TaskPriority::Medium,
      estimated_hours: None,
      attachments:     vec![]
    }
  }

  fn day(
    year: i32,
    month0: u32,
    day: u32
  ) -> CalendarDay {
    CalendarDay::new(year, month0, day)
      .expect("valid day")
  }

  fn titles(tasks: Vec<&Task>) -> Vec<&str> {
    tasks
      .into_iter()
      .map(|t| t.title.as_str())
      .collect()
  }

  #[test]
  fn late_evening_task_stays_on_local_day() {
    let bucketer =
      DateBucketer::new(America::New_York);
    // 23:30 local on the 15th is 03:30Z
    // on the 16th.
    let tasks = vec![task(
      "late",
      Some("2023-06-16T03:30:00Z"),
      None
    )];

    let on_15 = bucketer.tasks_for_day(
      &tasks,
      day(2023, 5, 15),
      &DayFilter::default()
    );
    let on_16 = bucketer.tasks_for_day(
      &tasks,
      day(2023, 5, 16),
      &DayFilter::default()
    );
    assert_eq!(titles(on_15), vec!["late"]);
    assert!(on_16.is_empty());
  }

  #[test]
  fn missing_or_garbled_created_at_is_skipped() {
    let bucketer =
      DateBucketer::new(chrono_tz::UTC);
    let tasks = vec![
      task("none", None, None),
      task("garbled", Some("soon"), None),
      task(
        "ok",
        Some("2024-03-01T09:00:00Z"),
        None
      ),
    ];

    let hits = bucketer.tasks_for_day(
      &tasks,
      day(2024, 2, 1),
      &DayFilter::default()
    );
    assert_eq!(titles(hits), vec!["ok"]);
  }

  #[test]
  fn bucketing_ignores_due_date() {
    let bucketer =
      DateBucketer::new(chrono_tz::UTC);
    let mut t = task(
      "placed",
      Some("2024-03-01T09:00:00Z"),
      None
    );
    t.due_date =
      Some("2024-03-09T09:00:00Z".to_string());
    let tasks = vec![t];

    assert!(bucketer.has_tasks_on_day(
      &tasks,
      day(2024, 2, 1),
      &DayFilter::default()
    ));
    assert!(!bucketer.has_tasks_on_day(
      &tasks,
      day(2024, 2, 9),
      &DayFilter::default()
    ));
  }

  #[test]
  fn explicit_employee_beats_current_user() {
    let bucketer =
      DateBucketer::new(chrono_tz::UTC)
        .with_current_user("me");
    let stamp = Some("2024-03-01T09:00:00Z");
    let tasks = vec![
      task("mine", stamp, Some("me")),
      task("theirs", stamp, Some("emp-7")),
      task("nobody", stamp, None),
    ];
    let target = day(2024, 2, 1);

    let both = bucketer.tasks_for_day(
      &tasks,
      target,
      &DayFilter {
        employee_id:       Some(
          "emp-7".to_string()
        ),
        current_user_only: true
      }
    );
    let employee_only = bucketer
      .tasks_for_day(
        &tasks,
        target,
        &DayFilter::employee("emp-7")
      );
    assert_eq!(
      titles(both),
      titles(employee_only)
    );

    let mine = bucketer.tasks_for_day(
      &tasks,
      target,
      &DayFilter::mine()
    );
    assert_eq!(titles(mine), vec!["mine"]);

    let everyone = bucketer.tasks_for_day(
      &tasks,
      target,
      &DayFilter::default()
    );
    assert_eq!(everyone.len(), 3);
  }

  #[test]
  fn bucket_month_groups_by_day() {
    let bucketer =
      DateBucketer::new(chrono_tz::UTC);
    let tasks = vec![
      task("a", Some("2024-02-03T10:00:00Z"), None),
      task("b", Some("2024-02-03T18:00:00Z"), None),
      task("c", Some("2024-02-29T08:00:00Z"), None),
      task("march", Some("2024-03-01T08:00:00Z"), None),
    ];

    let buckets = bucketer.bucket_month(
      &tasks,
      2024,
      1,
      &DayFilter::default()
    );
    assert_eq!(
      buckets.keys().copied().collect::<Vec<_>>(),
      vec![3, 29]
    );
    assert_eq!(buckets[&3].len(), 2);
  }

  #[test]
  fn month_grid_pads_to_whole_weeks() {
    // June 2024 starts on a Saturday.
    let monday_first =
      month_grid(2024, 5, Weekday::Mon);
    assert_eq!(monday_first.len() % 7, 0);
    assert_eq!(&monday_first[..5], &[None; 5]);
    assert_eq!(monday_first[5], Some(1));
    assert_eq!(monday_first.last(), Some(&Some(30)));

    let sunday_first =
      month_grid(2024, 5, Weekday::Sun);
    assert_eq!(&sunday_first[..6], &[None; 6]);
    assert_eq!(sunday_first[6], Some(1));
    assert_eq!(
      sunday_first
        .iter()
        .flatten()
        .count(),
      30
    );
  }

  #[test]
  fn week_view_starts_on_configured_day() {
    let view = CalendarView::new(
      CalendarViewMode::Week,
      day(2024, 5, 12),
      Weekday::Mon
    );
    let cells = view.cells();
    assert_eq!(cells.len(), 7);
    assert_eq!(cells[0], Some(day(2024, 5, 10)));
    assert_eq!(cells[6], Some(day(2024, 5, 16)));
  }

  #[test]
  fn month_shift_clamps_day() {
    let mut view = CalendarView::new(
      CalendarViewMode::Month,
      day(2024, 0, 31),
      Weekday::Mon
    );
    view.shift(1);
    assert_eq!(view.anchor, day(2024, 1, 29));
    view.shift(-2);
    assert_eq!(view.anchor, day(2023, 11, 29));
  }
}
