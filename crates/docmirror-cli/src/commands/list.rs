use docmirror_core::{MirrorConfig, RecoveryEngine};

use crate::commands::common::{format_deleted_lines, normalize_collection, open_mirror, open_source};
use crate::error::CliError;

pub async fn run_list(
    config: &MirrorConfig,
    collection: Option<&str>,
    as_json: bool,
) -> Result<(), CliError> {
    let collection = collection.map(normalize_collection).transpose()?;
    let source = open_source(config)?;
    let mirror = open_mirror(config).await?;

    let deleted = RecoveryEngine::new(&source, &mirror)
        .list(collection.as_deref())
        .await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&deleted)?);
        return Ok(());
    }

    if deleted.is_empty() {
        println!("No deleted documents.");
        return Ok(());
    }

    for line in format_deleted_lines(&deleted) {
        println!("{line}");
    }
    Ok(())
}
