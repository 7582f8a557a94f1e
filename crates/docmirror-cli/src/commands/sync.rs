use docmirror_core::{MirrorConfig, SyncOrchestrator};

use crate::commands::common::{format_sync_lines, open_mirror, open_source, resolve_sync_collections};
use crate::error::CliError;

pub async fn run_sync(config: &MirrorConfig, requested: &[String]) -> Result<(), CliError> {
    let collections = resolve_sync_collections(requested, &config.collections)?;
    let source = open_source(config)?;
    let mirror = open_mirror(config).await?;
    tracing::debug!(
        "Mirroring {} into {}",
        config.source_dir.display(),
        config.mirror_db_path.display()
    );

    let summary = SyncOrchestrator::new(&source, &mirror, config.sync_options())
        .run(&collections)
        .await?;

    for line in format_sync_lines(&summary) {
        println!("{line}");
    }
    Ok(())
}
