//! `stresslab` CLI subcommands.

pub mod history;
pub mod run;

use std::io::IsTerminal;

/// Turns off color for `--no-color` or when stdout is piped.
pub(crate) fn configure_color(no_color: bool) {
    if no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }
}
