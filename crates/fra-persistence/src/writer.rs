//! Append-only JSON Lines audit-log writer (spec §9 "the audit log
//! records every decryption with the issuing user and purpose").
//!
//! Uses JSON Lines format (.jsonl):
//! - Each line is a complete JSON object.
//! - Partial file corruption only affects individual lines.
//! - The file can be read even if a write was interrupted mid-flush.
//! - Rotates to a new file at UTC day boundaries.

use chrono::Utc;
use fra_core::repository::AuditEvent;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use tracing::{info, warn};

use crate::error::PersistenceResult;

/// On-disk representation of one `AuditEvent`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct AuditRecord {
    at: chrono::DateTime<Utc>,
    user_id: Option<String>,
    purpose: String,
    detail: String,
}

impl From<&AuditEvent> for AuditRecord {
    fn from(event: &AuditEvent) -> Self {
        Self {
            at: event.at,
            user_id: event.user_id.clone(),
            purpose: event.purpose.clone(),
            detail: event.detail.clone(),
        }
    }
}

struct ActiveWriter {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

/// Append-only, daily-rotating JSON Lines writer for the audit log.
///
/// Buffers records and flushes either when `max_buffer_size` is reached
/// or on an explicit `flush()` call; callers that need durability before
/// acknowledging a caller-visible action should `flush()` after `write`.
pub struct JsonLinesAuditWriter {
    base_dir: String,
    buffer: Vec<AuditRecord>,
    max_buffer_size: usize,
    active_writer: Option<ActiveWriter>,
}

impl JsonLinesAuditWriter {
    pub fn new(base_dir: &str, max_buffer_size: usize) -> Self {
        if let Err(e) = std::fs::create_dir_all(base_dir) {
            warn!(?e, dir = %base_dir, "failed to create audit-log directory");
        }
        Self {
            base_dir: base_dir.to_string(),
            buffer: Vec::with_capacity(max_buffer_size),
            max_buffer_size,
            active_writer: None,
        }
    }

    pub fn write(&mut self, event: &AuditEvent) -> PersistenceResult<()> {
        self.buffer.push(AuditRecord::from(event));
        if self.buffer.len() >= self.max_buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Flush the buffer to the file for today's (UTC) date, rotating to a
    /// new file if the date has advanced since the last flush.
    pub fn flush(&mut self) -> PersistenceResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let needs_new_writer = match &self.active_writer {
            Some(active) => active.date != today,
            None => true,
        };
        if needs_new_writer {
            self.rotate(&today)?;
        }

        let active = self
            .active_writer
            .as_mut()
            .expect("rotate() always leaves an active writer");
        for record in self.buffer.drain(..) {
            let line = serde_json::to_string(&record)?;
            writeln!(active.writer, "{line}")?;
            active.records_written += 1;
        }
        active.writer.flush()?;
        Ok(())
    }

    fn rotate(&mut self, date: &str) -> PersistenceResult<()> {
        if let Some(mut active) = self.active_writer.take() {
            let _ = active.writer.flush();
            info!(date = %active.date, records = active.records_written, "rotated audit-log writer");
        }

        let filename = format!("{}/audit_{}.jsonl", self.base_dir, date);
        let file = OpenOptions::new().create(true).append(true).open(&filename)?;
        self.active_writer = Some(ActiveWriter {
            writer: BufWriter::new(file),
            date: date.to_string(),
            records_written: 0,
        });
        Ok(())
    }
}

impl Drop for JsonLinesAuditWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(?e, "failed to flush audit-log writer on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};

    #[test]
    fn writes_and_reads_back_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = JsonLinesAuditWriter::new(dir.path().to_str().unwrap(), 10);

        let event = AuditEvent::new("credential_decrypt", "okx api key").for_user("u1");
        writer.write(&event).unwrap();
        writer.flush().unwrap();
        drop(writer);

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let path = dir.path().join(format!("audit_{today}.jsonl"));
        let file = File::open(path).unwrap();
        let lines: Vec<String> = BufReader::new(file).lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("credential_decrypt"));
    }

    #[test]
    fn buffer_auto_flushes_at_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = JsonLinesAuditWriter::new(dir.path().to_str().unwrap(), 2);
        writer.write(&AuditEvent::new("p1", "d1")).unwrap();
        assert!(writer.active_writer.is_none());
        writer.write(&AuditEvent::new("p2", "d2")).unwrap();
        assert!(writer.active_writer.is_some());
    }
}
