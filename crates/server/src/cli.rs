//! Command-line definition for the `testsync` binary.

use clap::{Arg, Command};

/// Default directory holding `testsync.toml`.
pub const DEFAULT_CONFIG_DIR: &str = "./config";

/// Build the CLI.
pub fn build_cli() -> Command {
    Command::new("testsync")
        .about("Shared test data and checkpoint synchronization for distributed test runners")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("config-dir")
                .long("config-dir")
                .short('c')
                .value_name("DIR")
                .default_value(DEFAULT_CONFIG_DIR)
                .help("Directory containing testsync.toml (created with defaults if missing)"),
        )
}
