use fs_err as fs;
use miette::Diagnostic;
use std::io::prelude::*;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use thiserror::Error;

/// Computes a BPS patch turning `source` into `target` and writes it to `out`.
#[derive(Clone, Debug, clap::Args)]
pub struct Args {
  #[arg(short, long)]
  pub source: PathBuf,
  #[arg(short, long)]
  pub target: PathBuf,
  #[arg(short, long)]
  pub out: PathBuf,
  /// Block size for the hash map; defaults to a size-derived heuristic when omitted.
  #[arg(short, long)]
  pub blocksize: Option<u64>,
  /// Run the optimizer over the freshly-computed opcode stream before writing it.
  #[arg(long)]
  pub optimize: bool,
}

impl Args {
  pub fn call(self) -> Result<(), Error> {
    let source = read_whole_file(&self.source)?;
    let target = read_whole_file(&self.target)?;

    let blocksize = self.blocksize.unwrap_or_else(|| bps::default_blocksize(source.len(), target.len()));
    log::info!("diffing {} -> {} with blocksize {blocksize}", self.source.display(), self.target.display());

    let opcodes = bps::diff(blocksize, &source, &target)?;
    log::trace!("diff produced {} opcodes", opcodes.len());

    let opcodes: Vec<bps::Opcode> = if self.optimize {
      let optimized = bps::optimize(opcodes.into_iter().map(Ok))?;
      log::info!("optimizer kept {} of the original opcodes", optimized.len());
      optimized
    } else {
      opcodes
    };

    let out = fs::File::create(&self.out)?;
    bps::write_patch(opcodes.into_iter().map(Ok), BufWriter::new(out))?;
    log::info!("wrote patch to {}", self.out.display());
    Ok(())
  }
}

fn read_whole_file(path: &PathBuf) -> Result<Vec<u8>, Error> {
  let mut buf = Vec::new();
  BufReader::new(fs::File::open(path)?).read_to_end(&mut buf)?;
  Ok(buf)
}

#[non_exhaustive]
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
  #[error(transparent)]
  Io(#[from] std::io::Error),
  #[error(transparent)]
  Bps(#[from] bps::Error),
}
