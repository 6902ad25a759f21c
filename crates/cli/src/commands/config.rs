//! `reframe config` subcommands

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use reframe_core::Config;
use tracing::info;

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
  Explicit(PathBuf),
  Project(PathBuf),
  User(PathBuf),
  Default,
}

impl std::fmt::Display for ConfigSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ConfigSource::Explicit(path) => write!(f, "config file {}", path.display()),
      ConfigSource::Project(path) => write!(f, "project config {}", path.display()),
      ConfigSource::User(path) => write!(f, "user config {}", path.display()),
      ConfigSource::Default => write!(f, "default configuration (no config file found)"),
    }
  }
}

/// Resolve the effective config: `--config` if given, else project, user, defaults.
///
/// The first config file that exists is the one used; if it cannot be read or
/// parsed that is an error rather than a silent fallback.
pub fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<(Config, ConfigSource)> {
  if let Some(path) = explicit {
    let config = Config::load_from(path).with_context(|| format!("failed to load config {}", path.display()))?;
    return Ok((config, ConfigSource::Explicit(path.to_path_buf())));
  }

  let project = Config::project_config_path(cwd);
  if project.exists() {
    let config = Config::load_from(&project).with_context(|| format!("failed to load config {}", project.display()))?;
    return Ok((config, ConfigSource::Project(project)));
  }

  if let Some(user) = Config::user_config_path()
    && user.exists()
  {
    let config = Config::load_from(&user).with_context(|| format!("failed to load config {}", user.display()))?;
    return Ok((config, ConfigSource::User(user)));
  }

  Ok((Config::default(), ConfigSource::Default))
}

/// Show the effective configuration as TOML
pub fn cmd_config_show(config: &Config, source: &ConfigSource) -> Result<()> {
  println!("# Using {}", source);
  println!();
  let toml_str = toml::to_string_pretty(config).context("failed to render config")?;
  println!("{}", toml_str);
  Ok(())
}

/// Write the commented default config to the project (or user) location
pub fn cmd_config_init(cwd: &Path, user: bool, force: bool) -> Result<PathBuf> {
  let path = if user {
    Config::user_config_path().context("could not determine the user config directory")?
  } else {
    Config::project_config_path(cwd)
  };

  if path.exists() && !force {
    bail!("config file already exists: {} (use --force to overwrite)", path.display());
  }
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
  }
  std::fs::write(&path, Config::generate_template()).with_context(|| format!("failed to write {}", path.display()))?;

  info!(path = %path.display(), "Wrote config template");
  println!("Created config: {}", path.display());
  Ok(path)
}
