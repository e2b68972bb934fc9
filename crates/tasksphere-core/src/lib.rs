pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod persist;
pub mod query;
pub mod render;
pub mod revive;
pub mod storage;
pub mod task;
pub mod task_store;
pub mod theme;

use std::ffi::OsString;
use std::io;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting tasksphere CLI"
  );

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  );
  debug!(files = ?cfg.loaded_files, "configuration ready");

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let storage =
    storage::FileStorage::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open storage at {}",
        data_dir.display()
      )
    })?;

  let revival = cfg
    .revival()
    .context("invalid storage.revive_dates")?;
  let persist =
    persist::PersistentStore::new(
      storage
    )
    .with_revival(revival);

  let zone = datetime::DisplayZone::resolve(
    cfg.timezone().as_deref()
  );

  let mut store =
    task_store::TaskStore::open(
      persist.clone(),
      zone
    );
  let mut theme =
    theme::ThemeState::open(persist);

  let mut renderer =
    render::Renderer::new(
      &cfg,
      theme.theme(),
      zone
    )?;

  let mut out = io::stdout().lock();
  commands::dispatch(
    &mut store,
    &mut theme,
    &mut renderer,
    &mut out,
    cli.command
  )?;

  info!("done");
  Ok(())
}
