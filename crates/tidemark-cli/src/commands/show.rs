use crate::commands::common::{
    format_sync_timestamp, normalize_note_identifier, note_to_list_item, open_note_service,
    render_tags, resolve_note, CliContext,
};
use crate::error::CliError;

pub async fn run_show(id: &str, as_json: bool, context: &CliContext) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let service = open_note_service(context)?;
    let note = resolve_note(&normalized_id, &service, &context.owner).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&note_to_list_item(&note))?);
        return Ok(());
    }

    println!("id:      {}", note.id);
    println!("updated: {}", format_sync_timestamp(note.updated_at));
    println!("state:   {}", note.sync_state.as_str());
    let tags = render_tags(&note);
    if !tags.is_empty() {
        println!("tags:    {tags}");
    }
    if let Some(error) = &note.last_error {
        println!("error:   {error} ({} rejections)", note.rejections);
    }
    println!();
    println!("{}", note.title);
    if !note.body.is_empty() {
        println!();
        println!("{}", note.body);
    }
    Ok(())
}
