//! Initializes the `log` backend for the CLI binary.
use std::io::Write;

/// Installs `pretty_env_logger` with a terse `{level}: {args}` format and a
/// default filter of `trace`, overridable via `RUST_LOG`, matching the
/// teacher's own `log::init()`.
pub fn init() {
  pretty_env_logger::formatted_builder()
    .format(|buf, record| writeln!(buf, "{}: {}", record.level(), record.args()))
    .filter_level(log::LevelFilter::Trace)
    .parse_default_env()
    .init();
}
