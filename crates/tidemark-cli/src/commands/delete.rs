use crate::commands::common::{
    normalize_note_identifier, open_note_service, resolve_note, CliContext,
};
use crate::error::CliError;

pub async fn run_delete(id: &str, context: &CliContext) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let service = open_note_service(context)?;
    let note = resolve_note(&normalized_id, &service, &context.owner).await?;

    service.delete(&note.id).await?;
    println!("{}", note.id);
    Ok(())
}
