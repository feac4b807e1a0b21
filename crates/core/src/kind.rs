// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The closed set of Job kinds and their kind-specific parameter bundles.
//!
//! spec.md treats `{notebook, diagram-text, diagram-xml}` as fixed, "extended
//! by schema change, not at runtime" — a plain exhaustive enum, not a
//! plugin registry. Workers branch on kind once at claim time; the renderers
//! that actually consume `params` are external collaborators (out of scope),
//! so the field shapes below are invented only at the level of detail needed
//! to exercise the orchestration core end to end.

use serde::{Deserialize, Serialize};

/// The category of conversion work. Determines which converter runs and
/// which Workers are eligible to claim the Job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Notebook,
    DiagramText,
    DiagramXml,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Notebook => "notebook",
            JobKind::DiagramText => "diagram-text",
            JobKind::DiagramXml => "diagram-xml",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "notebook" => Some(JobKind::Notebook),
            "diagram-text" => Some(JobKind::DiagramText),
            "diagram-xml" => Some(JobKind::DiagramXml),
            _ => None,
        }
    }

    /// All kinds, in a stable order. Used by the Pool Manager and CLI to
    /// enumerate "one config entry per kind" without hardcoding the list.
    pub fn all() -> [JobKind; 3] {
        [JobKind::Notebook, JobKind::DiagramText, JobKind::DiagramXml]
    }
}

crate::simple_display! {
    JobKind {
        Notebook => "notebook",
        DiagramText => "diagram-text",
        DiagramXml => "diagram-xml",
    }
}

/// Opaque kind-specific parameters for a notebook conversion (executable
/// notebook -> HTML slide deck / extracted code listing / notebook document).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookParams {
    /// Name of the slide/template theme to expand cells against.
    pub template: String,
    /// Whether to additionally extract a code listing alongside the deck.
    #[serde(default)]
    pub extract_code: bool,
}

/// Opaque kind-specific parameters for a textual diagram description
/// (annotated plain-text diagram source -> rasterized PNG/SVG).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramTextParams {
    /// Rasterization resolution in dots per inch.
    pub dpi: u32,
    /// Output image format, e.g. "png" or "svg".
    pub format: String,
}

/// Opaque kind-specific parameters for an XML diagram document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramXmlParams {
    /// Named slide/diagram theme to apply during rasterization.
    pub theme: String,
}

/// The kind-specific parameter bundle, tagged by [`JobKind`] so a single
/// `params` column can hold any of the three shapes: an opaque
/// kind-specific parameter bundle, serialized as a structured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum JobParams {
    Notebook(NotebookParams),
    DiagramText(DiagramTextParams),
    DiagramXml(DiagramXmlParams),
}

impl JobParams {
    pub fn kind(&self) -> JobKind {
        match self {
            JobParams::Notebook(_) => JobKind::Notebook,
            JobParams::DiagramText(_) => JobKind::DiagramText,
            JobParams::DiagramXml(_) => JobKind::DiagramXml,
        }
    }

    /// Salt mixed into the content fingerprint so that two requests with
    /// identical input bytes but different params never collide in the cache.
    pub fn salt(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}
