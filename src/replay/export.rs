//! Export and import of captured event sequences.
//!
//! Two flat formats carry the same records: a pretty JSON array and CSV with
//! the header `url,method,request,state,timestampOffset,response,subType`.
//! Import is the exact inverse of export and validates the sequence.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use super::ReplayEvent;
use crate::error::HyperlogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    /// `.csv` files are CSV, everything else JSON.
    pub fn detect(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("csv") => ExportFormat::Csv,
            _ => ExportFormat::Json,
        }
    }
}

/// Offsets must never go backwards and every event needs a url.
pub fn validate(events: &[ReplayEvent]) -> Result<(), HyperlogError> {
    let mut previous = 0u64;
    for (index, event) in events.iter().enumerate() {
        if event.url.trim().is_empty() {
            return Err(HyperlogError::InvalidEvent {
                index,
                reason: "empty url".to_string(),
            });
        }
        if event.timestamp_offset < previous {
            return Err(HyperlogError::InvalidEvent {
                index,
                reason: format!(
                    "timestampOffset {} is before the previous {}",
                    event.timestamp_offset, previous
                ),
            });
        }
        previous = event.timestamp_offset;
    }
    Ok(())
}

pub fn to_json(events: &[ReplayEvent]) -> Result<String> {
    serde_json::to_string_pretty(events).context("Failed to serialize events as JSON")
}

pub fn from_json(raw: &str) -> Result<Vec<ReplayEvent>> {
    let events: Vec<ReplayEvent> =
        serde_json::from_str(raw).context("Failed to parse events JSON")?;
    validate(&events)?;
    Ok(events)
}

pub fn to_csv(events: &[ReplayEvent]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for event in events {
        writer
            .serialize(event)
            .with_context(|| format!("Failed to write CSV record for {}", event.url))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e))?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

pub fn from_csv(raw: &str) -> Result<Vec<ReplayEvent>> {
    let mut reader = csv::Reader::from_reader(raw.as_bytes());
    let mut events = Vec::new();
    for (i, record) in reader.deserialize().enumerate() {
        let event: ReplayEvent =
            record.with_context(|| format!("Failed to read CSV record {}", i + 1))?;
        events.push(event);
    }
    validate(&events)?;
    Ok(events)
}

pub fn save(events: &[ReplayEvent], path: &Path) -> Result<()> {
    let raw = match ExportFormat::detect(path) {
        ExportFormat::Json => to_json(events)?,
        ExportFormat::Csv => to_csv(events)?,
    };
    fs::write(path, raw).with_context(|| format!("Failed to write file: {}", path.display()))
}

pub fn load(path: &Path) -> Result<Vec<ReplayEvent>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    match ExportFormat::detect(path) {
        ExportFormat::Json => from_json(&raw),
        ExportFormat::Csv => from_csv(&raw),
    }
    .with_context(|| format!("Invalid event file: {}", path.display()))
}
