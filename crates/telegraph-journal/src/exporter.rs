//! Export journal data to various formats

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use telegraph_core::{DeliveryOutcome, Journal, JournalEntry, JournalStats};

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// RON format (Rust Object Notation)
    Ron,
    /// JSON format (requires serde_json feature)
    Json,
    /// Human-readable text format
    Text,
}

/// Exporter for journal data
pub struct Exporter<'a> {
    journal: &'a Journal,
    exported_at: DateTime<Utc>,
}

impl<'a> Exporter<'a> {
    /// Create a new exporter stamped with the current time
    pub fn new(journal: &'a Journal) -> Self {
        Self {
            journal,
            exported_at: Utc::now(),
        }
    }

    /// Override the export timestamp
    pub fn at(mut self, exported_at: DateTime<Utc>) -> Self {
        self.exported_at = exported_at;
        self
    }

    /// Export to a string in the specified format
    pub fn export(&self, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Ron => self.to_ron(),
            ExportFormat::Json => self.to_json(),
            ExportFormat::Text => Ok(self.to_text()),
        }
    }

    /// Export to a writer
    pub fn export_to<W: Write>(&self, writer: &mut W, format: ExportFormat) -> Result<()> {
        let content = self.export(format)?;
        writer.write_all(content.as_bytes())?;
        Ok(())
    }

    /// Export to RON format
    pub fn to_ron(&self) -> Result<String> {
        let export = self.data(self.journal.entries().iter().collect());
        ron::ser::to_string_pretty(&export, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Export to JSON format
    #[cfg(feature = "serde_json")]
    pub fn to_json(&self) -> Result<String> {
        let export = self.data(self.journal.entries().iter().collect());
        serde_json::to_string_pretty(&export).map_err(|e| Error::Serialization(e.to_string()))
    }

    #[cfg(not(feature = "serde_json"))]
    pub fn to_json(&self) -> Result<String> {
        Err(Error::ExportError(
            "JSON export requires the 'serde_json' feature".to_string(),
        ))
    }

    /// Export to human-readable text format
    pub fn to_text(&self) -> String {
        let mut output = String::new();
        let stats = self.journal.stats();

        output.push_str("=== Journal Export ===\n\n");
        output.push_str(&format!("Exported at: {}\n", self.exported_at.to_rfc3339()));
        output.push_str(&format!("Total entries: {}\n", stats.total_entries));
        output.push_str(&format!("Deliveries: {}\n", stats.delivery_count));
        output.push_str(&format!("Unknown engine: {}\n", stats.unknown_engine_count));
        output.push_str(&format!("State changes: {}\n", stats.state_change_count));
        output.push_str(&format!("Generated: {}\n", stats.generated_count));
        output.push_str("\n=== Entries ===\n\n");

        for entry in self.journal.entries() {
            output.push_str(&text_line(entry));
        }
        output
    }

    /// Export only deliveries to one engine (RON or JSON)
    pub fn export_engine(&self, engine: &str, format: ExportFormat) -> Result<String> {
        let export = self.data(self.journal.entries_for(engine).collect());

        match format {
            ExportFormat::Ron => {
                ron::ser::to_string_pretty(&export, ron::ser::PrettyConfig::default())
                    .map_err(|e| Error::Serialization(e.to_string()))
            }
            #[cfg(feature = "serde_json")]
            ExportFormat::Json => serde_json::to_string_pretty(&export)
                .map_err(|e| Error::Serialization(e.to_string())),
            #[cfg(not(feature = "serde_json"))]
            ExportFormat::Json => Err(Error::ExportError(
                "JSON export requires the 'serde_json' feature".to_string(),
            )),
            ExportFormat::Text => Err(Error::ExportError(
                "Engine export only supports RON and JSON".to_string(),
            )),
        }
    }

    fn data<'e>(&self, entries: Vec<&'e JournalEntry>) -> ExportData<'e> {
        ExportData {
            version: 1,
            exported_at: self.exported_at,
            stats: self.journal.stats(),
            entries,
        }
    }
}

fn text_line(entry: &JournalEntry) -> String {
    let message = &entry.message;
    let mut line = format!(
        "  #{} {} {} -> {} [{}]",
        entry.seq, message.id, message.from, message.to, message.kind
    );
    match entry.outcome {
        DeliveryOutcome::Applied => {}
        DeliveryOutcome::UnknownEngine => line.push_str(" (unknown engine)"),
        DeliveryOutcome::AlreadyDelivered => line.push_str(" (already delivered)"),
    }
    line.push('\n');
    if !message.payload.is_null() {
        line.push_str(&format!("      payload: {}\n", message.payload));
    }
    if entry.state_changed {
        if let Some(state) = &entry.state_after {
            line.push_str(&format!("      state: {}\n", state));
        }
    }
    if !entry.generated.is_empty() {
        let ids: Vec<_> = entry.generated.iter().map(|id| id.to_string()).collect();
        line.push_str(&format!("      generated: {}\n", ids.join(", ")));
    }
    line
}

/// Data structure for journal export
#[derive(Debug, Serialize)]
struct ExportData<'e> {
    version: u32,
    exported_at: DateTime<Utc>,
    stats: JournalStats,
    entries: Vec<&'e JournalEntry>,
}
