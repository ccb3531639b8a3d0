use miette::Diagnostic;
use std::process::ExitCode;
use thiserror::Error;

mod cli;
mod logging;

fn main() -> ExitCode {
  use cli::CommandKind::*;

  logging::init();
  let result: Result<(), Error> = (|| {
    let args: cli::Args = clap::Parser::try_parse().map_err(Error::from)?;
    match args.command {
      Diff(args) => args.call().map_err(Error::from)?,
      Apply(args) => args.call().map_err(Error::from)?,
      Optimize(args) => args.call().map_err(Error::from)?,
      Validate(args) => args.call().map_err(Error::from)?,
    }
    Ok(())
  })();

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(error) => {
      let code = error.exit_code();
      eprintln!("{:?}", miette::Report::new(error));
      code
    }
  }
}

#[non_exhaustive]
#[derive(Debug, Error, Diagnostic)]
enum Error {
  #[error(transparent)]
  Cli(#[from] clap::error::Error),
  #[error(transparent)]
  #[diagnostic(transparent)]
  Diff(#[from] cli::diff::Error),
  #[error(transparent)]
  #[diagnostic(transparent)]
  Apply(#[from] cli::apply::Error),
  #[error(transparent)]
  #[diagnostic(transparent)]
  Optimize(#[from] cli::optimize::Error),
  #[error(transparent)]
  #[diagnostic(transparent)]
  Validate(#[from] cli::validate::Error),
}

impl Error {
  /// A distinct exit code per failing subcommand, so scripts driving this
  /// binary can tell a usage error from a diff/apply/optimize/validate
  /// failure without parsing stderr.
  fn exit_code(&self) -> ExitCode {
    ExitCode::from(match self {
      Error::Cli(_) => 1,
      Error::Diff(_) => 2,
      Error::Apply(_) => 3,
      Error::Optimize(_) => 4,
      Error::Validate(_) => 5,
    })
  }
}
