//! Panel inputs produced by the upstream generation system.
//!
//! These are consumed read-only: the validation engine never mutates an
//! [`Artifact`] or [`SceneMetadata`] after a [`PanelSequence`] is built.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Minimum number of panels a sequence must contain to be validated.
pub const MIN_SEQUENCE_LENGTH: usize = 2;

/// One generated image and its position in the story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub image_reference: PathBuf,
    pub scene_index: u32,
    pub chapter_index: u32,
}

/// Scene description and dialogue paired 1:1 with an [`Artifact`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneMetadata {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dialogue_text: String,
    #[serde(default)]
    pub intended_emotion: Option<String>,
    #[serde(default)]
    pub intended_pose: Option<String>,
    #[serde(default)]
    pub speaker: Option<String>,
}

impl SceneMetadata {
    /// Whether the panel carries any spoken line.
    pub fn has_dialogue(&self) -> bool {
        !self.dialogue_text.trim().is_empty()
    }
}

/// An artifact together with its scene metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelEntry {
    pub artifact: Artifact,
    pub metadata: SceneMetadata,
}

// ---------------------------------------------------------------------------
// Manifest records
// ---------------------------------------------------------------------------

/// Flat manifest record as written by the generation service.
#[derive(Debug, Clone, Deserialize)]
struct ManifestRecord {
    image_reference: PathBuf,
    #[serde(default)]
    scene_description: String,
    #[serde(default)]
    dialogue_text: String,
    #[serde(default)]
    intended_emotion: Option<String>,
    #[serde(default)]
    intended_pose: Option<String>,
    #[serde(default)]
    speaker: Option<String>,
    scene_index: u32,
    #[serde(default)]
    chapter_index: u32,
}

impl ManifestRecord {
    fn into_entry(self, base_dir: &Path) -> PanelEntry {
        let image_reference = if self.image_reference.is_relative() {
            base_dir.join(&self.image_reference)
        } else {
            self.image_reference
        };
        PanelEntry {
            artifact: Artifact {
                image_reference,
                scene_index: self.scene_index,
                chapter_index: self.chapter_index,
            },
            metadata: SceneMetadata {
                description: self.scene_description,
                dialogue_text: self.dialogue_text,
                intended_emotion: non_blank(self.intended_emotion),
                intended_pose: non_blank(self.intended_pose),
                speaker: non_blank(self.speaker),
            },
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// PanelSequence
// ---------------------------------------------------------------------------

/// An ordered, validated sequence of panels (at least two).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelSequence {
    entries: Vec<PanelEntry>,
}

impl PanelSequence {
    /// Build a sequence, rejecting empty or single-panel input.
    pub fn new(entries: Vec<PanelEntry>) -> Result<Self, CoreError> {
        if entries.is_empty() {
            return Err(CoreError::Configuration(
                "panel sequence is empty".to_string(),
            ));
        }
        if entries.len() < MIN_SEQUENCE_LENGTH {
            return Err(CoreError::Configuration(format!(
                "panel sequence needs at least {MIN_SEQUENCE_LENGTH} entries, got {}",
                entries.len()
            )));
        }
        Ok(Self { entries })
    }

    /// Load a sequence from a JSON manifest (an array of panel records).
    ///
    /// Relative image paths resolve against the manifest's directory.
    pub fn from_manifest(path: &Path) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Manifest(format!("cannot read {}: {e}", path.display()))
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_manifest_str(&raw, base_dir)
    }

    /// Parse manifest JSON, resolving relative image paths against `base_dir`.
    pub fn from_manifest_str(raw: &str, base_dir: &Path) -> Result<Self, CoreError> {
        let records: Vec<ManifestRecord> = serde_json::from_str(raw)
            .map_err(|e| CoreError::Manifest(format!("malformed manifest: {e}")))?;
        let entries = records
            .into_iter()
            .map(|r| r.into_entry(base_dir))
            .collect();
        Self::new(entries)
    }

    pub fn entries(&self) -> &[PanelEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: construction rejects empty sequences.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Scene metadata in panel order.
    pub fn metadata(&self) -> Vec<&SceneMetadata> {
        self.entries.iter().map(|e| &e.metadata).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn entry(index: u32) -> PanelEntry {
        PanelEntry {
            artifact: Artifact {
                image_reference: PathBuf::from(format!("panel_{index}.png")),
                scene_index: index,
                chapter_index: 0,
            },
            metadata: SceneMetadata::default(),
        }
    }

    #[test]
    fn empty_sequence_is_configuration_error() {
        assert_matches!(PanelSequence::new(vec![]), Err(CoreError::Configuration(_)));
    }

    #[test]
    fn single_panel_is_configuration_error() {
        assert_matches!(
            PanelSequence::new(vec![entry(0)]),
            Err(CoreError::Configuration(_))
        );
    }

    #[test]
    fn two_panels_are_accepted() {
        let seq = PanelSequence::new(vec![entry(0), entry(1)]).unwrap();
        assert_eq!(seq.len(), 2);
    }

    // -- manifest -------------------------------------------------------------

    #[test]
    fn manifest_resolves_relative_paths_and_blank_labels() {
        let raw = r#"[
            {"image_reference": "a.png", "scene_description": "A boy waves",
             "dialogue_text": "Hi!", "intended_emotion": "happy", "scene_index": 0},
            {"image_reference": "/abs/b.png", "intended_emotion": "  ",
             "scene_index": 1, "chapter_index": 2}
        ]"#;
        let seq = PanelSequence::from_manifest_str(raw, Path::new("/data/run")).unwrap();
        let entries = seq.entries();

        assert_eq!(entries[0].artifact.image_reference, PathBuf::from("/data/run/a.png"));
        assert_eq!(entries[0].metadata.intended_emotion.as_deref(), Some("happy"));
        assert_eq!(entries[1].artifact.image_reference, PathBuf::from("/abs/b.png"));
        assert_eq!(entries[1].artifact.chapter_index, 2);
        assert!(entries[1].metadata.intended_emotion.is_none());
    }

    #[test]
    fn malformed_manifest_is_manifest_error() {
        assert_matches!(
            PanelSequence::from_manifest_str("{not json", Path::new(".")),
            Err(CoreError::Manifest(_))
        );
    }

    #[test]
    fn missing_manifest_file_is_manifest_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert_matches!(PanelSequence::from_manifest(&missing), Err(CoreError::Manifest(_)));
    }
}
