use tidemark_core::services::NoteChanges;

use crate::commands::common::{
    capture_editor_input_with_initial, normalize_note_identifier, note_editor_text,
    open_note_service, resolve_note, split_title_body, CliContext,
};
use crate::error::CliError;

/// Field edits from the command line; all empty means "open the editor"
#[derive(Debug, Default)]
pub struct EditArgs {
    pub title: Option<String>,
    pub body: Option<String>,
    pub tags: Vec<String>,
    pub clear_tags: bool,
}

impl EditArgs {
    fn into_changes(self) -> NoteChanges {
        let tags = if self.clear_tags {
            Some(Vec::new())
        } else if self.tags.is_empty() {
            None
        } else {
            Some(self.tags)
        };

        NoteChanges {
            title: self.title,
            body: self.body,
            tags,
        }
    }
}

pub async fn run_edit(id: &str, args: EditArgs, context: &CliContext) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let service = open_note_service(context)?;
    let note = resolve_note(&normalized_id, &service, &context.owner).await?;

    let changes = args.into_changes();
    let changes = if changes.is_empty() {
        let initial = note_editor_text(&note);
        let Some(edited_content) = capture_editor_input_with_initial(&initial)? else {
            return Err(CliError::EmptyEditedContent);
        };

        if edited_content == initial {
            println!("{}", note.id);
            return Ok(());
        }

        let (title, body) = split_title_body(&edited_content);
        NoteChanges {
            title: Some(title),
            body: Some(body),
            tags: None,
        }
    } else {
        changes
    };

    let updated = service.update(&note.id, changes).await?;
    println!("{}", updated.id);
    Ok(())
}
