//! Document collaborators: produce the next artifact from earlier ones and
//! check an artifact for required sections.
//!
//! Both are traits so callers can plug in richer generators; the defaults
//! here write section skeletons and check headings.

use crate::change::ChangeManifest;
use crate::error::Result;
use crate::types::ArtifactKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

pub struct GenerationRequest<'a> {
    pub change: &'a ChangeManifest,
    pub artifact: ArtifactKind,
    /// Earlier artifacts the new one is derived from, keyed by kind.
    pub sources: &'a BTreeMap<ArtifactKind, String>,
}

pub trait DocumentGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String>;
}

pub trait DocumentValidator: Send + Sync {
    fn validate(&self, kind: ArtifactKind, content: &str) -> ValidationReport;
}

// ---------------------------------------------------------------------------
// ValidationReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Required sections
// ---------------------------------------------------------------------------

pub fn required_sections(kind: ArtifactKind) -> &'static [&'static str] {
    match kind {
        ArtifactKind::Proposal => &["## Why", "## What Changes", "## Impact"],
        ArtifactKind::Spec => &["## Requirements"],
        ArtifactKind::Tasks => &["## Tasks"],
        ArtifactKind::TestPlan => &["## Test Cases"],
        ArtifactKind::ImplementationNotes => &["## Changes"],
        ArtifactKind::ReviewSummary => &["## Findings"],
        ArtifactKind::DocChanges => &["## Documentation Updates"],
        ArtifactKind::CrossValidationReport => &["## Result"],
    }
}

const PLACEHOLDERS: &[&str] = &["TBD", "TODO", "FIXME"];
const SHORT_DOCUMENT: usize = 120;

/// Lines under `heading` up to the next heading of the same or higher level.
pub fn section_body<'a>(content: &'a str, heading: &str) -> Vec<&'a str> {
    let level = heading.chars().take_while(|c| *c == '#').count();
    let mut lines = content.lines();
    for line in lines.by_ref() {
        if line.trim_end() == heading {
            break;
        }
    }
    lines
        .take_while(|line| {
            let hashes = line.chars().take_while(|c| *c == '#').count();
            hashes == 0 || hashes > level
        })
        .collect()
}

fn bullets<'a>(lines: &[&'a str]) -> Vec<&'a str> {
    lines
        .iter()
        .filter_map(|l| {
            let t = l.trim_start();
            t.strip_prefix("- [ ] ")
                .or_else(|| t.strip_prefix("- [x] "))
                .or_else(|| t.strip_prefix("- "))
        })
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// SectionValidator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct SectionValidator;

impl DocumentValidator for SectionValidator {
    fn validate(&self, kind: ArtifactKind, content: &str) -> ValidationReport {
        let mut report = ValidationReport::default();

        if content.trim().is_empty() {
            report.errors.push(format!("{} is empty", kind.filename()));
            return report;
        }

        for heading in required_sections(kind) {
            if !content.lines().any(|l| l.trim_end() == *heading) {
                report
                    .errors
                    .push(format!("missing required section '{heading}'"));
            }
        }

        if kind == ArtifactKind::Tasks && bullets(&section_body(content, "## Tasks")).is_empty() {
            report
                .errors
                .push("section '## Tasks' lists no tasks".to_string());
        }

        for marker in PLACEHOLDERS {
            let count = content.matches(marker).count();
            if count > 0 {
                report
                    .warnings
                    .push(format!("{count} '{marker}' placeholder(s) left in document"));
            }
        }

        if content.trim().len() < SHORT_DOCUMENT {
            report
                .suggestions
                .push("document is very short; consider adding detail".to_string());
        }

        report
    }
}

// ---------------------------------------------------------------------------
// TemplateGenerator
// ---------------------------------------------------------------------------

/// Writes a section skeleton for each artifact, carrying over bullet points
/// from its sources where that makes sense.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

impl DocumentGenerator for TemplateGenerator {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let change = request.change;
        let source = |kind: ArtifactKind| request.sources.get(&kind).map(String::as_str);
        let derived_from = request
            .sources
            .keys()
            .map(|k| format!("`{}`", k.filename()))
            .collect::<Vec<_>>()
            .join(", ");

        let mut doc = match request.artifact {
            ArtifactKind::Proposal => {
                let why = change
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("{} (TBD: motivation)", change.title));
                let impact = if change.affected_files.is_empty() {
                    "- No files declared yet".to_string()
                } else {
                    change
                        .affected_files
                        .iter()
                        .map(|f| format!("- `{f}`"))
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                format!(
                    "# Proposal: {}\n\n## Why\n\n{why}\n\n## What Changes\n\n- {}\n\n## Impact\n\n{impact}\n",
                    change.title, change.title
                )
            }
            ArtifactKind::Spec => {
                let changes = source(ArtifactKind::Proposal)
                    .map(|p| bullets(&section_body(p, "## What Changes")))
                    .unwrap_or_default();
                let mut doc = format!("# Specification: {}\n\n## Requirements\n\n", change.title);
                if changes.is_empty() {
                    doc.push_str("- The system SHALL implement the proposed change\n");
                }
                for item in changes {
                    doc.push_str(&format!("- The system SHALL support: {item}\n"));
                }
                doc
            }
            ArtifactKind::Tasks => {
                let reqs = source(ArtifactKind::Spec)
                    .map(|s| bullets(&section_body(s, "## Requirements")))
                    .unwrap_or_default();
                let mut doc = format!("# Tasks: {}\n\n## Tasks\n\n", change.title);
                if reqs.is_empty() {
                    doc.push_str("- [ ] 1. Implement the specification\n");
                }
                for (i, req) in reqs.iter().enumerate() {
                    doc.push_str(&format!("- [ ] {}. {req}\n", i + 1));
                }
                doc
            }
            ArtifactKind::TestPlan => {
                let tasks = source(ArtifactKind::Tasks)
                    .map(|t| bullets(&section_body(t, "## Tasks")))
                    .unwrap_or_default();
                let mut doc = format!("# Test Plan: {}\n\n## Test Cases\n\n", change.title);
                if tasks.is_empty() {
                    doc.push_str("- Verify the specified behavior end to end\n");
                }
                for task in tasks {
                    doc.push_str(&format!("- Verify: {task}\n"));
                }
                doc
            }
            ArtifactKind::ImplementationNotes => format!(
                "# Implementation Notes: {}\n\n## Changes\n\n{}\n",
                change.title,
                source(ArtifactKind::Tasks)
                    .map(|t| bullets(&section_body(t, "## Tasks"))
                        .iter()
                        .map(|b| format!("- {b}"))
                        .collect::<Vec<_>>()
                        .join("\n"))
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "- Implementation recorded".to_string())
            ),
            ArtifactKind::ReviewSummary => format!(
                "# Review Summary: {}\n\n## Findings\n\n- No blocking findings recorded\n",
                change.title
            ),
            ArtifactKind::DocChanges => format!(
                "# Documentation Changes: {}\n\n## Documentation Updates\n\n{}\n",
                change.title,
                if change.affected_files.is_empty() {
                    "- None declared".to_string()
                } else {
                    change
                        .affected_files
                        .iter()
                        .map(|f| format!("- `{f}`"))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            ),
            ArtifactKind::CrossValidationReport => format!(
                "# Cross-Validation Report: {}\n\n## Result\n\nPENDING\n",
                change.title
            ),
        };

        if !derived_from.is_empty() {
            doc.push_str(&format!("\n_Derived from {derived_from}._\n"));
        }
        Ok(doc)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn manifest() -> ChangeManifest {
        ChangeManifest {
            id: "2026-10-19-sync-notes".to_string(),
            title: "Sync notes".to_string(),
            description: Some("Users lose edits when two devices sync".to_string()),
            affected_files: vec!["docs/sync.md".to_string()],
            created_at: Utc::now(),
        }
    }

    fn generate(kind: ArtifactKind, sources: &BTreeMap<ArtifactKind, String>) -> String {
        let change = manifest();
        TemplateGenerator
            .generate(&GenerationRequest {
                change: &change,
                artifact: kind,
                sources,
            })
            .unwrap()
    }

    #[test]
    fn generated_documents_pass_validation() {
        let mut sources = BTreeMap::new();
        for &kind in ArtifactKind::all() {
            let doc = generate(kind, &sources);
            let report = SectionValidator.validate(kind, &doc);
            assert!(report.is_valid(), "{kind}: {:?}", report.errors);
            sources.insert(kind, doc);
        }
    }

    #[test]
    fn spec_and_tasks_carry_over_bullets() {
        let mut sources = BTreeMap::new();
        sources.insert(ArtifactKind::Proposal, generate(ArtifactKind::Proposal, &sources));
        let spec = generate(ArtifactKind::Spec, &sources);
        assert!(spec.contains("SHALL support: Sync notes"));

        sources.insert(ArtifactKind::Spec, spec);
        let tasks = generate(ArtifactKind::Tasks, &sources);
        assert!(tasks.contains("- [ ] 1. The system SHALL support: Sync notes"));
        assert!(tasks.contains("_Derived from `proposal.md`, `spec.md`._"));
    }

    #[test]
    fn missing_sections_are_errors() {
        let report = SectionValidator.validate(ArtifactKind::Proposal, "# Proposal\n\n## Why\n");
        assert!(!report.is_valid());
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].contains("## What Changes"));
    }

    #[test]
    fn empty_task_list_is_an_error() {
        let report = SectionValidator.validate(ArtifactKind::Tasks, "# T\n\n## Tasks\n\n## Notes\n- x\n");
        assert!(report.errors.iter().any(|e| e.contains("lists no tasks")));
    }

    #[test]
    fn placeholders_are_warnings_only() {
        let report =
            SectionValidator.validate(ArtifactKind::Spec, "# S\n\n## Requirements\n\n- TBD\n");
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.suggestions.len(), 1);
    }

    #[test]
    fn section_body_stops_at_sibling_heading() {
        let doc = "## A\n- one\n### nested\n- two\n## B\n- three\n";
        assert_eq!(section_body(doc, "## A"), vec!["- one", "### nested", "- two"]);
    }
}
