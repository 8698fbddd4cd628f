//! Per-record outcomes of a migration run.
//!
//! Every decision a pass makes about a record lands here exactly once and is
//! mirrored as a `tracing` event. Expected per-record failures (unresolved
//! files, links, menu entries, write errors) are entries, not `Err`s.

use std::collections::BTreeMap;
use std::fs;
use std::panic::Location;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{MigrateError, Result};
use crate::model::{LegacyRecord, SourceTable, TargetRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Changed,
    Published,
    Deleted,
    NoChange,
    Notice,
    Error,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Changed => "changed",
            Self::Published => "published",
            Self::Deleted => "deleted",
            Self::NoChange => "no_change",
            Self::Notice => "notice",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of recoverable per-record problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    MissingAttachmentPath,
    UnresolvedAttachment,
    AmbiguousAttachment,
    UnresolvedLink,
    UnresolvedAsset,
    NoParentMatch,
    MenuItemSkipped,
    MenuItemDuplicate,
    MissingLegacyRecord,
    WriteFailed,
    PublishFailed,
    DeleteFailed,
    SecondaryImportFailed,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingAttachmentPath => "missing_attachment_path",
            Self::UnresolvedAttachment => "unresolved_attachment",
            Self::AmbiguousAttachment => "ambiguous_attachment",
            Self::UnresolvedLink => "unresolved_link",
            Self::UnresolvedAsset => "unresolved_asset",
            Self::NoParentMatch => "no_parent_match",
            Self::MenuItemSkipped => "menu_item_skipped",
            Self::MenuItemDuplicate => "menu_item_duplicate",
            Self::MissingLegacyRecord => "missing_legacy_record",
            Self::WriteFailed => "write_failed",
            Self::PublishFailed => "publish_failed",
            Self::DeleteFailed => "delete_failed",
            Self::SecondaryImportFailed => "secondary_import_failed",
        }
    }
}

/// Which record an entry is about. Any part may be unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Subject {
    pub table: Option<SourceTable>,
    pub legacy_id: u64,
    pub target_id: Option<u64>,
}

impl Subject {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn legacy(table: SourceTable, legacy_id: u64) -> Self {
        Self {
            table: Some(table),
            legacy_id,
            target_id: None,
        }
    }
}

impl From<&LegacyRecord> for Subject {
    fn from(record: &LegacyRecord) -> Self {
        Self::legacy(record.table, record.id)
    }
}

impl From<&TargetRecord> for Subject {
    fn from(record: &TargetRecord) -> Self {
        Self {
            table: record.stamp.source_table,
            legacy_id: record.stamp.legacy_id,
            target_id: record.exists().then_some(record.id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
    pub pass: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<DiagnosticKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<SourceTable>,
    pub legacy_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<u64>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassRecord {
    pub name: String,
    pub status: PassStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<&'static str>,
    pub passes: Vec<PassRecord>,
    pub entries: Vec<RecordOutcome>,
}

/// Machine-readable counts for verification.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub passes: Vec<PassRecord>,
    pub outcomes: BTreeMap<Outcome, usize>,
    pub diagnostics: BTreeMap<DiagnosticKind, usize>,
}

impl Default for BatchReport {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            build: crate::build_info::git_sha(),
            passes: Vec::new(),
            entries: Vec::new(),
        }
    }

    fn current_pass(&self) -> String {
        self.passes
            .iter()
            .rev()
            .find(|p| p.status == PassStatus::Running)
            .map(|p| p.name.clone())
            .unwrap_or_default()
    }

    pub fn pass_start(&mut self, name: &str) {
        tracing::info!(pass = name, "| Start \"{name}\" |");
        self.passes.push(PassRecord {
            name: name.to_string(),
            status: PassStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        });
    }

    /// Close the innermost running pass named `name`.
    pub fn pass_end(&mut self, name: &str, error: Option<&MigrateError>) {
        match error {
            None => tracing::info!(pass = name, "| End \"{name}\" |"),
            Some(err) => tracing::error!(
                pass = name,
                code = err.code(),
                "| End \"{name}\" (failed: {err}) |"
            ),
        }
        if let Some(pass) = self
            .passes
            .iter_mut()
            .rev()
            .find(|p| p.name == name && p.status == PassStatus::Running)
        {
            pass.finished_at = Some(Utc::now());
            pass.status = if error.is_some() {
                PassStatus::Failed
            } else {
                PassStatus::Completed
            };
            pass.error = error.map(ToString::to_string);
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    #[track_caller]
    pub fn record(&mut self, outcome: Outcome, subject: impl Into<Subject>, message: impl Into<String>) {
        self.push(outcome, None, subject.into(), message.into(), Location::caller());
    }

    #[track_caller]
    pub fn notice(
        &mut self,
        kind: DiagnosticKind,
        subject: impl Into<Subject>,
        message: impl Into<String>,
    ) {
        self.push(
            Outcome::Notice,
            Some(kind),
            subject.into(),
            message.into(),
            Location::caller(),
        );
    }

    #[track_caller]
    pub fn error(
        &mut self,
        kind: DiagnosticKind,
        subject: impl Into<Subject>,
        message: impl Into<String>,
    ) {
        self.push(
            Outcome::Error,
            Some(kind),
            subject.into(),
            message.into(),
            Location::caller(),
        );
    }

    fn push(
        &mut self,
        outcome: Outcome,
        diagnostic: Option<DiagnosticKind>,
        subject: Subject,
        message: String,
        caller: &'static Location<'static>,
    ) {
        let pass = self.current_pass();
        let table = subject.table.map(SourceTable::as_str);
        let kind = diagnostic.map(DiagnosticKind::as_str);
        match outcome {
            Outcome::Error => tracing::error!(
                pass = %pass,
                outcome = outcome.as_str(),
                diagnostic = kind,
                table,
                legacy_id = subject.legacy_id,
                target_id = subject.target_id,
                location = %caller,
                "{message}"
            ),
            Outcome::Notice => tracing::warn!(
                pass = %pass,
                outcome = outcome.as_str(),
                diagnostic = kind,
                table,
                legacy_id = subject.legacy_id,
                target_id = subject.target_id,
                "{message}"
            ),
            _ => tracing::info!(
                pass = %pass,
                outcome = outcome.as_str(),
                table,
                legacy_id = subject.legacy_id,
                target_id = subject.target_id,
                "{message}"
            ),
        }
        self.entries.push(RecordOutcome {
            pass,
            outcome,
            diagnostic,
            table: subject.table,
            legacy_id: subject.legacy_id,
            target_id: subject.target_id,
            message,
            location: (outcome == Outcome::Error).then(|| caller.to_string()),
        });
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.entries.iter().filter(|e| e.outcome == outcome).count()
    }

    pub fn diagnostic_count(&self, kind: DiagnosticKind) -> usize {
        self.entries
            .iter()
            .filter(|e| e.diagnostic == Some(kind))
            .count()
    }

    pub fn entries_for<'a>(&'a self, pass: &'a str) -> impl Iterator<Item = &'a RecordOutcome> + 'a {
        self.entries.iter().filter(move |e| e.pass == pass)
    }

    pub fn has_errors(&self) -> bool {
        self.count(Outcome::Error) > 0
            || self.passes.iter().any(|p| p.status == PassStatus::Failed)
    }

    pub fn summary(&self) -> ReportSummary {
        let mut outcomes = BTreeMap::new();
        let mut diagnostics = BTreeMap::new();
        for entry in &self.entries {
            *outcomes.entry(entry.outcome).or_insert(0) += 1;
            if let Some(kind) = entry.diagnostic {
                *diagnostics.entry(kind).or_insert(0) += 1;
            }
        }
        ReportSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: self.finished_at,
            passes: self.passes.clone(),
            outcomes,
            diagnostics,
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)? + "\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn entries_are_tagged_with_running_pass() {
        let mut report = BatchReport::new();
        report.pass_start("pages");
        report.record(Outcome::Created, Subject::legacy(SourceTable::Posts, 5), "About");
        report.pass_end("pages", None);
        report.record(Outcome::Notice, Subject::none(), "between passes");

        assert_eq!(report.entries[0].pass, "pages");
        assert_eq!(report.entries[1].pass, "");
        assert_eq!(report.passes[0].status, PassStatus::Completed);
        assert!(report.passes[0].finished_at.is_some());
    }

    #[test]
    fn errors_carry_source_location() {
        let mut report = BatchReport::new();
        report.pass_start("content_urls");
        report.error(DiagnosticKind::UnresolvedLink, Subject::none(), "no page for /gone");
        let location = report.entries[0].location.as_deref().unwrap();
        assert!(location.contains("report.rs"), "{location}");
        assert!(report.has_errors());
    }

    #[test]
    fn summary_counts_outcomes_and_diagnostics() {
        let mut report = BatchReport::new();
        report.pass_start("attachments");
        report.record(Outcome::Created, Subject::none(), "a");
        report.record(Outcome::Created, Subject::none(), "b");
        report.notice(DiagnosticKind::AmbiguousAttachment, Subject::none(), "c");
        report.error(DiagnosticKind::UnresolvedAttachment, Subject::none(), "d");
        report.error(DiagnosticKind::UnresolvedAttachment, Subject::none(), "e");

        let summary = report.summary();
        assert_eq!(summary.outcomes[&Outcome::Created], 2);
        assert_eq!(summary.outcomes[&Outcome::Error], 2);
        assert_eq!(summary.diagnostics[&DiagnosticKind::UnresolvedAttachment], 2);
        assert_eq!(report.diagnostic_count(DiagnosticKind::AmbiguousAttachment), 1);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["outcomes"]["created"], 2);
        assert_eq!(json["diagnostics"]["unresolved_attachment"], 2);
    }

    #[test]
    fn failed_pass_is_recorded() {
        let mut report = BatchReport::new();
        report.pass_start("menu");
        let err = MigrateError::UnknownMenu("main".into());
        report.pass_end("menu", Some(&err));
        assert_eq!(report.passes[0].status, PassStatus::Failed);
        assert!(report.passes[0].error.as_deref().unwrap().contains("main"));
        assert!(report.has_errors());
    }

    #[test]
    fn write_json_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reports").join("run.json");
        let mut report = BatchReport::new();
        report.finish();
        report.write_json(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["run_id"], report.run_id.to_string());
    }
}
