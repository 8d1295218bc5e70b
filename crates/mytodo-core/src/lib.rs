pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod editor;
pub mod filter;
pub mod ids;
pub mod interchange;
pub mod list;
pub mod render;
pub mod route;
pub mod storage;
pub mod task;

use std::ffi::OsString;

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
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting todo CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.todorc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  )?;

  let data_dir =
    cfg.data_dir(cli.data.as_deref());

  let storage =
    storage::FileStorage::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open storage at \
         {}",
        data_dir.display()
      )
    })?;
  let store = datastore::TaskStore::new(
    storage,
    cfg.storage_key()
  );

  let mut renderer =
    render::Renderer::new(&cfg);
  let inv = commands::Invocation {
    command: cli.command.unwrap_or_else(
      || {
        cli::Command::List(
          cli::FilterArgs::default()
        )
      }
    ),
    json: cli.json,
    yes: cli.yes,
    now: chrono::Utc::now()
  };

  commands::dispatch(
    &store,
    &cfg,
    &mut renderer,
    inv
  )
}
