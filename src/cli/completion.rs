//! Shell completion generation for ru-export

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io::{self, Write};

use crate::cli::CliArgs;

const BIN_NAME: &str = "ru-export";

/// Write the completion script for `shell` to stdout
pub fn generate_completion(shell: Shell) {
    write_completion(shell, &mut io::stdout());
}

/// Write the completion script for `shell` to `out`
pub fn write_completion(shell: Shell, out: &mut dyn Write) {
    let mut cmd = CliArgs::command();
    generate(shell, &mut cmd, BIN_NAME, out);
}
