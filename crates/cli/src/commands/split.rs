use std::path::Path;

use anyhow::Context as _;
use dbshift_core::split_statements;

/// Print each statement followed by a blank line.
pub(crate) fn run(path: &Path) -> anyhow::Result<()> {
    let script = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    for statement in split_statements(&script) {
        println!("{statement}\n");
    }
    Ok(())
}
