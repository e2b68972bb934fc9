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
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::revive::Revival;

const CONFIG_ENV_VAR: &str =
  "TASKSPHERE_CONFIG";
const APP_DIR: &str = "tasksphere";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "storage.revive_dates".to_string(),
      "blind".to_string()
    );
    map.insert(
      "display.color".to_string(),
      "true".to_string()
    );
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    config_override
  ))]
  pub fn load(
    config_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let path = resolve_config_path(
      config_override
    )?;
    if let Some(path) = path {
      info!(config = %path.display(), "loading config");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no config file found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  /// Parses TOML text into dotted keys,
  /// e.g. `[storage] location = ".."`
  /// becomes `storage.location`.
  pub fn merge_toml(
    &mut self,
    text: &str
  ) -> anyhow::Result<()> {
    let table: toml::Table =
      toml::from_str(text)
        .context("invalid TOML")?;
    flatten_into(
      &mut self.map,
      "",
      &table
    );
    Ok(())
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
      debug!(key = %k, value = %v, "applying override");
      self.map.insert(k, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn revival(
    &self
  ) -> anyhow::Result<Revival> {
    self
      .get("storage.revive_dates")
      .map(|raw| raw.parse::<Revival>())
      .transpose()
      .map(Option::unwrap_or_default)
  }

  pub fn timezone(&self) -> Option<String> {
    self
      .get("display.timezone")
      .filter(|tz| !tz.trim().is_empty())
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self.merge_toml(&text).with_context(
      || {
        format!(
          "failed to parse {}",
          path.display()
        )
      }
    )?;

    self
      .loaded_files
      .push(path);
    Ok(())
  }
}

fn flatten_into(
  map: &mut HashMap<String, String>,
  prefix: &str,
  table: &toml::Table
) {
  for (key, value) in table {
    let full = if prefix.is_empty() {
      key.clone()
    } else {
      format!("{prefix}.{key}")
    };

    match value {
      | toml::Value::Table(inner) => {
        flatten_into(map, &full, inner);
      }
      | toml::Value::String(text) => {
        trace!(key = %full, value = %text, "loaded config key");
        map.insert(full, text.clone());
      }
      | toml::Value::Array(_) => {
        warn!(key = %full, "arrays are not supported in config; skipping");
      }
      | other => {
        let text = other.to_string();
        trace!(key = %full, value = %text, "loaded config key");
        map.insert(full, text);
      }
    }
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
    cfg.get("storage.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_config_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  let from_env =
    std::env::var(CONFIG_ENV_VAR).ok();
  let config_dir = dirs::config_dir();
  if override_path.is_none()
    && from_env.is_none()
    && config_dir.is_none()
  {
    warn!(
      "cannot determine config \
       directory; using defaults"
    );
  }
  Ok(pick_config_path(
    override_path,
    from_env.as_deref(),
    config_dir.as_deref()
  ))
}

/// `--config` wins, then the env var
/// (`/dev/null` means no file), then
/// `<config dir>/tasksphere/config.toml`
/// when it exists.
fn pick_config_path(
  override_path: Option<&Path>,
  from_env: Option<&str>,
  config_dir: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Some(config_env) = from_env {
    if config_env == "/dev/null" {
      return None;
    }
    return Some(PathBuf::from(
      config_env
    ));
  }

  let candidate = config_dir?
    .join(APP_DIR)
    .join("config.toml");
  candidate.exists().then_some(candidate)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let base = dirs::data_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine data \
         directory"
      )
    })?;
  Ok(base.join(APP_DIR))
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
