use fs_err as fs;
use miette::Diagnostic;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::PathBuf;
use thiserror::Error;

/// Applies a BPS patch to `source`, writing the reconstructed target to `out`.
#[derive(Clone, Debug, clap::Args)]
pub struct Args {
  #[arg(short, long)]
  pub source: PathBuf,
  #[arg(short, long)]
  pub patch: PathBuf,
  #[arg(short, long)]
  pub out: PathBuf,
}

impl Args {
  pub fn call(self) -> Result<(), Error> {
    let mut source = Vec::new();
    BufReader::new(fs::File::open(&self.source)?).read_to_end(&mut source)?;

    let patch_file = fs::File::open(&self.patch)?;
    let opcodes = bps::read_patch(BufReader::new(patch_file))?;
    let opcodes = bps::validate(opcodes);

    let target = bps::apply(opcodes, &source)?;
    log::info!("applied patch, reconstructed {} bytes", target.len());

    fs::write(&self.out, &target)?;
    log::info!("wrote target to {}", self.out.display());
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
