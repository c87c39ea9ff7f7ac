use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::activity_log::ActivityLog;
use crate::splits::SplitRow;

const EPISODE_LOG_PATTERN: &str = "File_Watcher_%Y%m%d_%H%M%S.log";
const COMPLETED_RUN_PATTERN: &str = "Completed_Run_%Y%m%d_%H%M%S.log";

pub fn episode_log_path(output_directory: &Path, started_at: DateTime<Local>) -> PathBuf {
    output_directory.join(started_at.format(EPISODE_LOG_PATTERN).to_string())
}

pub fn completed_run_path(output_directory: &Path, completed_at: DateTime<Local>) -> PathBuf {
    output_directory.join(completed_at.format(COMPLETED_RUN_PATTERN).to_string())
}

pub fn write_activity_log(log_path: &Path, activity_log: &ActivityLog) -> Result<PathBuf, String> {
    write_text_atomically(log_path, &activity_log.render())?;
    Ok(log_path.to_path_buf())
}

pub fn write_completed_run(
    output_directory: &Path,
    rows: &[SplitRow],
) -> Result<PathBuf, String> {
    let run_path = completed_run_path(output_directory, Local::now());
    let mut contents = String::new();
    for row in rows {
        contents.push_str(&row.export_line());
        contents.push('\n');
    }

    write_text_atomically(&run_path, &contents)?;
    Ok(run_path)
}

/// Writes `contents` beside `target_path` first and renames it into place.
pub fn write_text_atomically(target_path: &Path, contents: &str) -> Result<(), String> {
    if let Some(parent_directory) = target_path.parent() {
        if !parent_directory.as_os_str().is_empty() {
            std::fs::create_dir_all(parent_directory).map_err(|error| {
                format!(
                    "Failed to create directory '{}': {error}",
                    parent_directory.display()
                )
            })?;
        }
    }

    let temp_path = temporary_path(target_path);
    std::fs::write(&temp_path, contents).map_err(|error| {
        format!(
            "Failed to write temporary file '{}': {error}",
            temp_path.display()
        )
    })?;

    if let Err(error) = std::fs::rename(&temp_path, target_path) {
        let cleanup_error = std::fs::remove_file(&temp_path).err();
        if let Some(cleanup_error) = cleanup_error {
            return Err(format!(
                "Failed to finalize '{}': {error}; temporary cleanup failed '{}': {cleanup_error}",
                target_path.display(),
                temp_path.display()
            ));
        }

        return Err(format!(
            "Failed to finalize '{}': {error}",
            target_path.display()
        ));
    }

    Ok(())
}

fn temporary_path(target_path: &Path) -> PathBuf {
    let Some(file_name) = target_path.file_name().and_then(|value| value.to_str()) else {
        return target_path.with_extension("tmp");
    };

    target_path.with_file_name(format!("{file_name}.tmp"))
}
