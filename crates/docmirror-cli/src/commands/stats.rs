use docmirror_core::{MirrorConfig, RecoveryEngine};

use crate::commands::common::{format_stats_lines, open_mirror, open_source};
use crate::error::CliError;

pub async fn run_stats(config: &MirrorConfig, limit: usize, as_json: bool) -> Result<(), CliError> {
    let source = open_source(config)?;
    let mirror = open_mirror(config).await?;

    let report = RecoveryEngine::new(&source, &mirror).stats(limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_stats_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}
