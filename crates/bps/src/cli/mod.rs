//! Command-line surface over the core library: thin file-path-driven
//! wrappers around `bps::{diff, apply, optimize, validate}`.
pub mod apply;
pub mod diff;
pub mod optimize;
pub mod validate;

#[derive(Clone, Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(subcommand)]
  pub command: CommandKind,
}

#[derive(Clone, Debug, clap::Subcommand)]
#[command(about)]
pub enum CommandKind {
  Diff(diff::Args),
  Apply(apply::Args),
  Optimize(optimize::Args),
  Validate(validate::Args),
}
