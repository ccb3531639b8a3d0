use fs_err as fs;
use miette::Diagnostic;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use thiserror::Error;

/// Rewrites an existing patch into an equivalent, smaller one.
#[derive(Clone, Debug, clap::Args)]
pub struct Args {
  #[arg(short, long)]
  pub patch: PathBuf,
  #[arg(short, long)]
  pub out: PathBuf,
}

impl Args {
  pub fn call(self) -> Result<(), Error> {
    let patch_file = fs::File::open(&self.patch)?;
    let opcodes = bps::read_patch(BufReader::new(patch_file))?;
    let optimized = bps::optimize(opcodes)?;
    log::info!("optimized down to {} opcodes", optimized.len());

    let out = fs::File::create(&self.out)?;
    bps::write_patch(optimized.into_iter().map(Ok), BufWriter::new(out))?;
    log::info!("wrote optimized patch to {}", self.out.display());
    Ok(())
  }
}

#[non_exhaustive]
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
  #[error(transparent)]
  Io(#[from] std::io::Error),
  #[error(transparent)]
  Bps(#[from] bps::Error),
}
