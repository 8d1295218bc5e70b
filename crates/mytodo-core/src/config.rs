use std::fmt;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::str::FromStr;

use anyhow::{
  Context,
  anyhow,
  bail
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::datastore::DEFAULT_STORAGE_KEY;
use crate::interchange::DEFAULT_EXPORT_FILE;

const RC_ENV_VAR: &str = "TODORC";
const RC_FILE_NAME: &str = ".todorc";
const DEFAULT_DATA_DIR: &str = "~/.mytodo";
const MAX_INCLUDE_DEPTH: usize = 8;

/// Every setting the rc file and `--rc` overrides may name.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord
)]
pub enum ConfigKey {
  Color,
  Confirm,
  DataLocation,
  ExportFile,
  StorageKey
}

impl ConfigKey {
  pub const ALL: [ConfigKey; 5] = [
    ConfigKey::Color,
    ConfigKey::Confirm,
    ConfigKey::DataLocation,
    ConfigKey::ExportFile,
    ConfigKey::StorageKey
  ];

  pub fn name(self) -> &'static str {
    match self {
      | ConfigKey::Color => "color",
      | ConfigKey::Confirm => "confirm",
      | ConfigKey::DataLocation => {
        "data.location"
      }
      | ConfigKey::ExportFile => {
        "export.file"
      }
      | ConfigKey::StorageKey => {
        "storage.key"
      }
    }
  }
}

impl fmt::Display for ConfigKey {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for ConfigKey {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let wanted = s.trim();
    ConfigKey::ALL
      .into_iter()
      .find(|key| key.name() == wanted)
      .ok_or_else(|| {
        let known: Vec<&str> =
          ConfigKey::ALL
            .iter()
            .map(|k| k.name())
            .collect();
        anyhow!(
          "unknown config key `{wanted}` \
           (known: {})",
          known.join(", ")
        )
      })
  }
}

/// Effective settings after defaults, rc files and overrides.
#[derive(Debug, Clone)]
pub struct Config {
  data_location: PathBuf,
  storage_key: String,
  export_file: PathBuf,
  confirm: bool,
  color: bool,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      data_location: expand_home(
        Path::new(DEFAULT_DATA_DIR)
      ),
      storage_key: DEFAULT_STORAGE_KEY
        .to_string(),
      export_file: PathBuf::from(
        DEFAULT_EXPORT_FILE
      ),
      confirm: true,
      color: true,
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

    match find_rc_file(rc_override) {
      | Some(path) => {
        info!(todorc = %path.display(), "loading todorc");
        cfg.load_file(&path, 0)?;
      }
      | None => {
        warn!(
          "no todorc found; using \
           defaults"
        );
      }
    }

    Ok(cfg)
  }

  /// Validate and store one setting. A leading `rc.` is ignored so
  /// positional overrides can be passed straight through.
  pub fn set(
    &mut self,
    key: &str,
    value: &str
  ) -> anyhow::Result<()> {
    let key: ConfigKey = key
      .strip_prefix("rc.")
      .unwrap_or(key)
      .parse()?;
    let value = value.trim();

    match key {
      | ConfigKey::Color => {
        self.color =
          parse_switch(key, value)?;
      }
      | ConfigKey::Confirm => {
        self.confirm =
          parse_switch(key, value)?;
      }
      | ConfigKey::StorageKey => {
        self.storage_key =
          parse_storage_key(value)?;
      }
      | ConfigKey::DataLocation => {
        self.data_location =
          parse_path(key, value)?;
      }
      | ConfigKey::ExportFile => {
        self.export_file =
          parse_path(key, value)?;
      }
    }

    trace!(key = %key, value, "config value set");
    Ok(())
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) -> anyhow::Result<()>
  where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      debug!(key = %key, value = %value, "applying override");
      self
        .set(&key, &value)
        .with_context(|| {
          format!(
            "invalid override \
             {key}={value}"
          )
        })?;
    }
    Ok(())
  }

  pub fn color(&self) -> bool {
    self.color
  }

  pub fn confirm(&self) -> bool {
    self.confirm
  }

  pub fn storage_key(&self) -> &str {
    &self.storage_key
  }

  pub fn export_file(&self) -> &Path {
    &self.export_file
  }

  pub fn data_location(&self) -> &Path {
    &self.data_location
  }

  /// `--data` wins over `data.location`.
  pub fn data_dir(
    &self,
    override_dir: Option<&Path>
  ) -> PathBuf {
    override_dir
      .map(expand_home)
      .unwrap_or_else(|| {
        self.data_location.clone()
      })
  }

  pub fn value(
    &self,
    key: ConfigKey
  ) -> String {
    let on_off = |flag: bool| {
      let label =
        if flag { "on" } else { "off" };
      label.to_string()
    };
    match key {
      | ConfigKey::Color => {
        on_off(self.color)
      }
      | ConfigKey::Confirm => {
        on_off(self.confirm)
      }
      | ConfigKey::DataLocation => {
        self
          .data_location
          .display()
          .to_string()
      }
      | ConfigKey::ExportFile => {
        self
          .export_file
          .display()
          .to_string()
      }
      | ConfigKey::StorageKey => {
        self.storage_key.clone()
      }
    }
  }

  /// Settings in key order.
  pub fn entries(
    &self
  ) -> impl Iterator<Item = (ConfigKey, String)>
  + '_ {
    ConfigKey::ALL
      .into_iter()
      .map(|key| (key, self.value(key)))
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path,
    depth: usize
  ) -> anyhow::Result<()> {
    if depth > MAX_INCLUDE_DEPTH {
      bail!(
        "includes nested deeper than \
         {MAX_INCLUDE_DEPTH} at {}",
        path.display()
      );
    }

    let path = expand_home(path);
    let text = fs::read_to_string(&path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?;
    self.loaded_files.push(path.clone());

    for (idx, raw) in
      text.lines().enumerate()
    {
      let at = || {
        format!(
          "{}:{}",
          path.display(),
          idx + 1
        )
      };

      match parse_line(raw)
        .with_context(at)?
      {
        | None => {}
        | Some(RcLine::Include(target)) => {
          let target =
            include_target(&path, target);
          if target.exists() {
            debug!(include = %target.display(), "following include");
            self.load_file(
              &target,
              depth + 1
            )?;
          } else {
            warn!(include = %target.display(), "include file does not exist; skipping");
          }
        }
        | Some(RcLine::Set(key, value)) => {
          self
            .set(key, value)
            .with_context(at)?;
        }
      }
    }

    Ok(())
  }
}

#[derive(Debug, PartialEq, Eq)]
enum RcLine<'a> {
  Include(&'a str),
  Set(&'a str, &'a str)
}

/// One rc line: blank and `#` comments yield `None`, trailing comments
/// are dropped.
fn parse_line(
  raw: &str
) -> anyhow::Result<Option<RcLine<'_>>> {
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();
  if line.is_empty() {
    return Ok(None);
  }

  if let Some(target) =
    line.strip_prefix("include ")
  {
    let target = target.trim();
    if target.is_empty() {
      bail!("include needs a path");
    }
    return Ok(Some(RcLine::Include(
      target
    )));
  }

  let (key, value) = line
    .split_once('=')
    .ok_or_else(|| {
      anyhow!(
        "expected `key = value`, got \
         `{line}`"
      )
    })?;
  Ok(Some(RcLine::Set(
    key.trim(),
    value.trim()
  )))
}

fn include_target(
  from: &Path,
  target: &str
) -> PathBuf {
  let target =
    expand_home(Path::new(target));
  if target.is_absolute() {
    return target;
  }
  from
    .parent()
    .unwrap_or_else(|| Path::new("."))
    .join(target)
}

fn find_rc_file(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    return (rc_env != "/dev/null")
      .then(|| PathBuf::from(rc_env));
  }

  let candidate =
    dirs::home_dir()?.join(RC_FILE_NAME);
  candidate.exists().then_some(candidate)
}

fn expand_home(path: &Path) -> PathBuf {
  let Ok(rest) = path.strip_prefix("~")
  else {
    return path.to_path_buf();
  };
  match dirs::home_dir() {
    | Some(home) => home.join(rest),
    | None => {
      debug!(
        path = %path.display(),
        "cannot determine home directory; \
         keeping path as given"
      );
      path.to_path_buf()
    }
  }
}

fn parse_switch(
  key: ConfigKey,
  value: &str
) -> anyhow::Result<bool> {
  match value
    .to_ascii_lowercase()
    .as_str()
  {
    | "on" | "yes" | "true" | "1" => {
      Ok(true)
    }
    | "off" | "no" | "false" | "0" => {
      Ok(false)
    }
    | other => {
      Err(anyhow!(
        "{key} must be on or off, got \
         `{other}`"
      ))
    }
  }
}

// The key names a file inside the data directory.
fn parse_storage_key(
  value: &str
) -> anyhow::Result<String> {
  if value.is_empty() {
    bail!("storage.key cannot be empty");
  }
  if value.contains(['/', '\\'])
    || value == "."
    || value == ".."
  {
    bail!(
      "storage.key `{value}` must be a \
       plain name"
    );
  }
  Ok(value.to_string())
}

fn parse_path(
  key: ConfigKey,
  value: &str
) -> anyhow::Result<PathBuf> {
  if value.is_empty() {
    bail!("{key} cannot be empty");
  }
  Ok(expand_home(Path::new(value)))
}
