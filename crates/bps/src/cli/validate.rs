use fs_err as fs;
use miette::Diagnostic;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::PathBuf;
use thiserror::Error;

/// Checks a patch's structural invariants and trailing checksums, optionally
/// against the declared source/target bytes.
#[derive(Clone, Debug, clap::Args)]
pub struct Args {
  #[arg(short, long)]
  pub patch: PathBuf,
  #[arg(short, long)]
  pub source: Option<PathBuf>,
  #[arg(short, long)]
  pub target: Option<PathBuf>,
}

impl Args {
  pub fn call(self) -> Result<(), Error> {
    let patch_file = fs::File::open(&self.patch)?;
    let opcodes = bps::read_patch(BufReader::new(patch_file))?;

    let count = match (&self.source, &self.target) {
      (Some(source), Some(target)) => {
        let source = read_whole_file(source)?;
        let target = read_whole_file(target)?;
        drain_counting(bps::validate_against(opcodes, &source, &target))?
      }
      _ => drain_counting(bps::validate(opcodes))?,
    };

    log::info!("patch is valid: {count} opcodes");
    println!("valid ({count} opcodes)");
    Ok(())
  }
}

fn read_whole_file(path: &PathBuf) -> Result<Vec<u8>, Error> {
  let mut buf = Vec::new();
  BufReader::new(fs::File::open(path)?).read_to_end(&mut buf)?;
  Ok(buf)
}

fn drain_counting<I: Iterator<Item = Result<bps::Opcode, bps::Error>>>(iter: I) -> Result<usize, bps::Error> {
  let mut n = 0;
  for opcode in iter {
    opcode?;
    n += 1;
  }
  Ok(n)
}

#[non_exhaustive]
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
  #[error(transparent)]
  Io(#[from] std::io::Error),
  #[error(transparent)]
  Bps(#[from] bps::Error),
}
