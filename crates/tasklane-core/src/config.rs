use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::Weekday;
use chrono_tz::Tz;
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::bucket::parse_week_start;
use crate::datetime::{
  parse_timezone,
  project_timezone
};
use crate::drag::{
  Actor,
  DragPolicy,
  UserRole
};

pub const RC_FILE_NAME: &str =
  ".tasklanerc";
pub const RC_ENV_VAR: &str =
  "TASKLANERC";
const DEFAULT_USER: &str = "local";

#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "data.location".to_string(),
      "~/.tasklane".to_string()
    );
    map.insert(
      "calendar.week_start".to_string(),
      "monday".to_string()
    );
    map.insert(
      "user.role".to_string(),
      "admin".to_string()
    );
    map.insert(
      "drag.member_todo_copy"
        .to_string(),
      "on".to_string()
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
    );
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(
      rc_override
    )?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading rc file");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no rc file found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn color(&self) -> bool {
    self
      .get_bool("color")
      .unwrap_or(true)
  }

  /// `timezone` from the rc file,
  /// else the project timezone.
  pub fn timezone(&self) -> Tz {
    self
      .map
      .get("timezone")
      .and_then(|raw| {
        parse_timezone(raw, "rc")
      })
      .unwrap_or(*project_timezone())
  }

  /// `sunday` or anything else, which
  /// means monday.
  pub fn week_start(&self) -> Weekday {
    self
      .map
      .get("calendar.week_start")
      .map_or(Weekday::Mon, |raw| {
        parse_week_start(raw)
      })
  }

  pub fn actor(&self) -> Actor {
    let id = self
      .get("user.id")
      .filter(|id| !id.trim().is_empty())
      .or_else(|| {
        std::env::var("USER").ok()
      })
      .unwrap_or_else(|| {
        DEFAULT_USER.to_string()
      });
    let role = self
      .map
      .get("user.role")
      .and_then(|raw| {
        let role = UserRole::parse(raw);
        if role.is_none() {
          warn!(
            value = %raw,
            "unknown user.role; using admin"
          );
        }
        role
      })
      .unwrap_or(UserRole::Admin);
    Actor::new(id.trim(), role)
  }

  pub fn drag_policy(
    &self
  ) -> DragPolicy {
    DragPolicy {
      member_todo_copy: self
        .get_bool(
          "drag.member_todo_copy"
        )
        .unwrap_or(true)
    }
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    if self.loaded_files.contains(&path)
    {
      warn!(file = %path.display(), "rc include cycle; skipping");
      return Ok(());
    }

    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line = raw_line
        .split_once('#')
        .map_or(raw_line, |(before, _)| {
          before
        })
        .trim();
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  ensure_dir(&dir)?;
  Ok(dir)
}

/// `uploads.location`, or `uploads`
/// under the data directory.
pub fn resolve_uploads_dir(
  cfg: &Config,
  data_dir: &Path
) -> PathBuf {
  cfg
    .get("uploads.location")
    .map(|raw| {
      expand_tilde(Path::new(&raw))
    })
    .unwrap_or_else(|| {
      data_dir.join("uploads")
    })
}

fn ensure_dir(
  dir: &Path
) -> anyhow::Result<()> {
  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }
  Ok(())
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    if path == Path::new("/dev/null")
    {
      return Ok(None);
    }
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    return Ok(None);
  };
  let candidate =
    home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".tasklane"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
