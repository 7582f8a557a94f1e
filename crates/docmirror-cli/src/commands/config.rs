use docmirror_core::MirrorConfig;

use crate::error::CliError;

pub fn run_config(config: &MirrorConfig) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
