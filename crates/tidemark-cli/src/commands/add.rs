use tidemark_core::services::NewNote;

use crate::commands::common::{
    normalize_content, open_note_service, resolve_note_content, split_title_body, CliContext,
};
use crate::error::CliError;

pub async fn run_add(
    content_parts: &[String],
    title: Option<&str>,
    tags: &[String],
    context: &CliContext,
) -> Result<(), CliError> {
    let new_note = match title.and_then(normalize_content) {
        Some(title) => {
            let body = normalize_content(&content_parts.join(" ")).unwrap_or_default();
            NewNote::new(title, body)
        }
        None => {
            let content = resolve_note_content(content_parts)?;
            let (title, body) = split_title_body(&content);
            NewNote::new(title, body)
        }
    }
    .with_tags(tags.iter().cloned());

    let service = open_note_service(context)?;
    let note = service.create(&context.owner, new_note).await?;

    println!("{}", note.id);
    Ok(())
}
