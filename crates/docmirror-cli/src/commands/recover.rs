use docmirror_core::{MirrorConfig, RecoveryEngine};

use crate::commands::common::{
    format_batch_lines, format_recovery_outcome, normalize_collection, normalize_document_id,
    open_mirror, open_source,
};
use crate::error::CliError;

pub async fn run_recover(config: &MirrorConfig, collection: &str, id: &str) -> Result<(), CliError> {
    let collection = normalize_collection(collection)?;
    let id = normalize_document_id(id)?;
    let source = open_source(config)?;
    let mirror = open_mirror(config).await?;

    let outcome = RecoveryEngine::new(&source, &mirror)
        .recover_one(&collection, &id)
        .await?;

    println!("{}", format_recovery_outcome(&collection, &id, outcome));
    Ok(())
}

pub async fn run_recover_all(
    config: &MirrorConfig,
    collection: &str,
    as_json: bool,
) -> Result<(), CliError> {
    let collection = normalize_collection(collection)?;
    let source = open_source(config)?;
    let mirror = open_mirror(config).await?;

    let summary = RecoveryEngine::new(&source, &mirror)
        .recover_all(&collection)
        .await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for line in format_batch_lines(&summary) {
            println!("{line}");
        }
    }
    Ok(())
}
