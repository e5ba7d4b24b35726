/// Log export: timestamped entries, JSONL and chat-transcript renderings.
///
/// Both renderings come from the same ordered entries, so they always agree
/// on content and order.
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::core::clock::SimClock;
use crate::core::voice::VoiceRegistry;
use crate::schema::event::EventKind;
use crate::schema::message::Message;

pub const TRANSCRIPT_FOOTER: &str = "--- End of conversation ---";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One exported log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<FixedOffset>,
    pub week: u32,
    pub sender: String,
    pub kind: EventKind,
    pub text: String,
    pub initiated_by_member: bool,
}

impl LogEntry {
    /// `[1/6/25, 8:30 AM] Ruby (Concierge): text`
    pub fn transcript_line(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.timestamp.format("%-m/%-d/%y, %-I:%M %p"),
            self.sender,
            self.text
        )
    }
}

/// Stamp finalized messages. `messages` must already be in log order.
pub fn build_log(messages: &[Message], clock: &SimClock, voices: &VoiceRegistry) -> Vec<LogEntry> {
    let mut entries = Vec::with_capacity(messages.len());
    let mut start = 0;
    while start < messages.len() {
        let week = messages[start].week;
        let len = messages[start..]
            .iter()
            .take_while(|m| m.week == week)
            .count();
        let stamps = clock.timestamps(week, len);
        for (message, timestamp) in messages[start..start + len].iter().zip(stamps) {
            entries.push(LogEntry {
                timestamp,
                week,
                sender: voices.display_name(message.role),
                kind: message.kind,
                text: message.body.clone(),
                initiated_by_member: message.initiated_by_member(),
            });
        }
        start += len;
    }
    entries
}

/// One JSON object per line.
pub fn render_jsonl(entries: &[LogEntry]) -> Result<String, ExportError> {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&serde_json::to_string(entry)?);
        out.push('\n');
    }
    Ok(out)
}

/// Chat transcript with a closing footer.
pub fn render_transcript(entries: &[LogEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.transcript_line());
        out.push('\n');
    }
    out.push('\n');
    out.push_str(TRANSCRIPT_FOOTER);
    out.push('\n');
    out
}

/// Write `contents` to a temporary file beside `path` and rename it into
/// place, so readers never see a half-written file.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), ExportError> {
    write_all_atomic(&[(path, contents)])
}

/// Stage every file in its own temporary sibling, then rename them into
/// place. Nothing is renamed unless every file was staged; a failed stage
/// removes the temporaries already written.
pub fn write_all_atomic(files: &[(&Path, &str)]) -> Result<(), ExportError> {
    let mut staged = Vec::with_capacity(files.len());
    for (path, contents) in files {
        staged.push((*path, stage(path, contents)?));
    }
    for (path, temp) in staged {
        temp.persist(path).map_err(|e| io_error(path, e.error))?;
    }
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> ExportError {
    ExportError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn stage(path: &Path, contents: &str) -> Result<NamedTempFile, ExportError> {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|e| io_error(path, e))?;
            parent
        }
        None => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir).map_err(|e| io_error(path, e))?;
    temp.write_all(contents.as_bytes())
        .map_err(|e| io_error(path, e))?;
    temp.as_file().sync_all().map_err(|e| io_error(path, e))?;
    Ok(temp)
}
