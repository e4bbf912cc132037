use std::path::Path;

use tidemark_core::export::{
    render_notes_export, suggested_export_file_name, ExportFormat as CoreExportFormat,
};
use tidemark_core::util::now_millis;

use crate::cli::ExportFormat;
use crate::commands::common::{list_all_notes, CliContext};
use crate::error::CliError;

pub async fn run_export(
    format: ExportFormat,
    output_path: Option<&Path>,
    context: &CliContext,
) -> Result<(), CliError> {
    let notes = list_all_notes(context).await?;
    let format = match format {
        ExportFormat::Json => CoreExportFormat::Json,
        ExportFormat::Markdown => CoreExportFormat::Markdown,
    };
    let rendered = render_notes_export(&notes, format)?;

    if let Some(path) = output_path {
        // A directory gets a timestamped file name
        let path = if path.is_dir() {
            path.join(suggested_export_file_name(format, now_millis()))
        } else {
            path.to_path_buf()
        };
        std::fs::write(&path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}
