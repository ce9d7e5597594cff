//! Narrative thread tracker.
//!
//! Speaker, character, and emotional-arc analyses over the whole sequence's
//! metadata. Each asks the text judge first and falls back to a local
//! heuristic when no judgment is available, so a report is always produced.

use std::collections::BTreeSet;
use std::sync::Arc;

use koma_core::fingerprint::emotion::is_valence_reversal;
use koma_core::fingerprint::{normalize_label, FingerprintMatcher};
use koma_core::scores::{clamp_unit, mean, AssessmentBand, NEUTRAL_SCORE};
use koma_core::thresholds::ValidationConfig;
use koma_core::types::SceneMetadata;
use koma_judge::backend::JudgeRequest;
use koma_judge::gateway::{JudgeGateway, JudgeOutcome};
use koma_judge::judgments::{CharacterJudgment, EmotionJudgment, SpeakerJudgment};
use koma_judge::prompts::{character_prompt, emotion_prompt, speaker_prompt};

use crate::verdict::{CharacterAnalysis, EmotionalAnalysis, SpeakerAnalysis, ThreadReport};

/// Most speakers the dialogue heuristic will guess.
const MAX_GUESSED_SPEAKERS: usize = 2;
/// Thread credit for a failed speaker or character check.
const FAILED_CHECK_CREDIT: f64 = 0.5;

/// Character-role words recognised in scene descriptions.
const ROLE_WORDS: &[&str] = &[
    "protagonist", "hero", "heroine", "villain", "antagonist", "rival", "mentor",
    "sidekick", "friend", "teacher", "student", "detective", "soldier", "captain",
    "king", "queen", "prince", "princess", "girl", "boy", "man", "woman", "child",
    "stranger", "monster",
];

// ---------------------------------------------------------------------------
// Heuristic fallbacks
// ---------------------------------------------------------------------------

/// Speaker estimate from dialogue alone: at most two speakers, assumed
/// consistent, threading unclear.
pub fn speaker_fallback(scenes: &[&SceneMetadata]) -> (usize, Vec<String>) {
    let lines = scenes.iter().filter(|s| s.has_dialogue()).count();
    let mut speakers: Vec<String> = Vec::new();
    for name in scenes.iter().filter_map(|s| s.speaker.as_deref()) {
        let name = name.trim();
        if !name.is_empty() && !speakers.iter().any(|s| s == name) {
            speakers.push(name.to_string());
        }
    }
    (lines.min(MAX_GUESSED_SPEAKERS), speakers)
}

fn roles_in(description: &str) -> BTreeSet<&'static str> {
    let lowered = description.to_lowercase();
    let words: BTreeSet<&str> = lowered
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| !w.is_empty())
        .collect();
    ROLE_WORDS
        .iter()
        .copied()
        .filter(|role| words.contains(role))
        .collect()
}

/// Role-word scan of scene descriptions.
///
/// Continuity breaks when two adjacent panels both name roles and share
/// none. An unexpected appearance is a role named in exactly one panel
/// after the first, with neither neighbour mentioning it.
pub fn character_fallback(scenes: &[&SceneMetadata]) -> (Vec<String>, bool, bool) {
    let per_panel: Vec<BTreeSet<&str>> = scenes.iter().map(|s| roles_in(&s.description)).collect();

    let continuity = !per_panel
        .windows(2)
        .any(|w| !w[0].is_empty() && !w[1].is_empty() && w[0].is_disjoint(&w[1]));

    let all: BTreeSet<&str> = per_panel.iter().flatten().copied().collect();
    let unexpected_appearance = all.iter().any(|role| {
        let panels: Vec<usize> = per_panel
            .iter()
            .enumerate()
            .filter(|(_, roles)| roles.contains(role))
            .map(|(i, _)| i)
            .collect();
        match panels.as_slice() {
            [only] if *only > 0 => {
                !per_panel[*only - 1].contains(role)
                    && per_panel.get(*only + 1).map_or(true, |next| !next.contains(role))
            }
            _ => false,
        }
    });

    (
        all.into_iter().map(String::from).collect(),
        continuity,
        unexpected_appearance,
    )
}

/// Emotional-arc heuristic over per-panel emotion labels.
///
/// Returns `(score, flow_quality, valence_reversals)`. More than half of
/// all transitions flipping between positive and negative valence makes the
/// flow jarring; otherwise the ratio of distinct labels to panels decides.
/// Synonyms count as distinct labels.
pub fn emotion_fallback(emotions: &[String]) -> (f64, &'static str, usize) {
    if emotions.is_empty() {
        return (NEUTRAL_SCORE, "monotone", 0);
    }
    let reversals = emotions
        .windows(2)
        .filter(|w| is_valence_reversal(&w[0], &w[1]))
        .count();
    let transitions = emotions.len() - 1;
    if transitions > 0 && reversals * 2 > transitions {
        return (0.4, "jarring", reversals);
    }

    let unique: BTreeSet<String> = emotions.iter().map(|e| normalize_label(e)).collect();
    let ratio = unique.len() as f64 / emotions.len() as f64;
    let (score, flow) = if ratio > 0.7 {
        (0.4, "jarring")
    } else if ratio < 0.3 {
        (0.6, "monotone")
    } else {
        (0.7, "natural")
    };
    (score, flow, reversals)
}

/// Mean of the three sub-analyses; failed boolean checks count half.
pub fn thread_score(speaker: &SpeakerAnalysis, character: &CharacterAnalysis, emotion: &EmotionalAnalysis) -> f64 {
    let credit = |ok: bool| if ok { 1.0 } else { FAILED_CHECK_CREDIT };
    mean(&[
        credit(speaker.consistent),
        credit(character.continuity),
        emotion.coherence_score,
    ])
    .map_or(NEUTRAL_SCORE, clamp_unit)
}

// ---------------------------------------------------------------------------
// NarrativeThreadTracker
// ---------------------------------------------------------------------------

pub struct NarrativeThreadTracker {
    gateway: Arc<JudgeGateway>,
    emotions: FingerprintMatcher,
    config: ValidationConfig,
}

impl NarrativeThreadTracker {
    pub fn new(gateway: Arc<JudgeGateway>, emotions: FingerprintMatcher, config: ValidationConfig) -> Self {
        Self {
            gateway,
            emotions,
            config,
        }
    }

    /// Run all three analyses over `scenes`, in panel order.
    pub async fn track(&self, scenes: &[&SceneMetadata]) -> ThreadReport {
        let speaker_analysis = self.speakers(scenes).await;
        let character_analysis = self.characters(scenes).await;
        let emotional_analysis = self.emotional_arc(scenes).await;

        let thread_score = thread_score(&speaker_analysis, &character_analysis, &emotional_analysis);
        let thread_quality = AssessmentBand::classify(thread_score, &self.config.bands);

        tracing::info!(
            thread_score,
            quality = thread_quality.as_str(),
            speakers_consistent = speaker_analysis.consistent,
            character_continuity = character_analysis.continuity,
            flow = %emotional_analysis.flow_quality,
            "Narrative threads tracked",
        );

        ThreadReport {
            speaker_analysis,
            character_analysis,
            emotional_analysis,
            thread_score,
            thread_quality,
        }
    }

    async fn speakers(&self, scenes: &[&SceneMetadata]) -> SpeakerAnalysis {
        let (guessed_count, named) = speaker_fallback(scenes);
        let outcome: JudgeOutcome<SpeakerJudgment> = if scenes.iter().any(|s| s.has_dialogue()) {
            self.gateway.judge(&JudgeRequest::text(speaker_prompt(scenes))).await
        } else {
            JudgeOutcome::skipped()
        };
        let source = outcome.provenance();

        match outcome.into_verdict() {
            Some(j) => SpeakerAnalysis {
                speaker_count: j.speaker_count.unwrap_or(guessed_count),
                speakers: if j.speakers.is_empty() { named } else { j.speakers },
                consistent: j.consistent,
                threading: j.threading,
                source,
            },
            None => {
                tracing::debug!("Speaker analysis using dialogue heuristic");
                SpeakerAnalysis {
                    speaker_count: guessed_count,
                    speakers: named,
                    consistent: true,
                    threading: "unclear".to_string(),
                    source,
                }
            }
        }
    }

    async fn characters(&self, scenes: &[&SceneMetadata]) -> CharacterAnalysis {
        let outcome: JudgeOutcome<CharacterJudgment> = if scenes
            .iter()
            .any(|s| !s.description.trim().is_empty())
        {
            self.gateway.judge(&JudgeRequest::text(character_prompt(scenes))).await
        } else {
            JudgeOutcome::skipped()
        };
        let source = outcome.provenance();

        match outcome.into_verdict() {
            Some(j) => CharacterAnalysis {
                characters: j.characters,
                continuity: j.continuity,
                unexpected_appearance: j.unexpected_appearance,
                source,
            },
            None => {
                tracing::debug!("Character analysis using role-word heuristic");
                let (characters, continuity, unexpected_appearance) = character_fallback(scenes);
                CharacterAnalysis {
                    characters,
                    continuity,
                    unexpected_appearance,
                    source,
                }
            }
        }
    }

    async fn emotional_arc(&self, scenes: &[&SceneMetadata]) -> EmotionalAnalysis {
        let emotions: Vec<String> = scenes
            .iter()
            .map(|s| self.emotions.extract_intended(s))
            .collect();
        let (fallback_score, fallback_flow, valence_reversals) = emotion_fallback(&emotions);

        let outcome: JudgeOutcome<EmotionJudgment> = self
            .gateway
            .judge(&JudgeRequest::text(emotion_prompt(&emotions, scenes)))
            .await;
        let source = outcome.provenance();

        let (coherence_score, flow_quality) = match outcome.into_verdict() {
            Some(j) => (j.coherence_score, j.flow_quality),
            None => {
                tracing::debug!(valence_reversals, "Emotional analysis using label heuristic");
                (fallback_score, fallback_flow.to_string())
            }
        };

        EmotionalAnalysis {
            emotions,
            coherence_score,
            flow_quality,
            valence_reversals,
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use koma_core::fingerprint::emotion::emotion_matcher;
    use koma_judge::gateway::UnavailableReason;

    use super::*;

    fn scene(description: &str, dialogue: &str, emotion: Option<&str>) -> SceneMetadata {
        SceneMetadata {
            description: description.into(),
            dialogue_text: dialogue.into(),
            intended_emotion: emotion.map(Into::into),
            ..Default::default()
        }
    }

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn offline_tracker() -> NarrativeThreadTracker {
        NarrativeThreadTracker::new(
            Arc::new(JudgeGateway::offline()),
            emotion_matcher(0.7),
            ValidationConfig::default(),
        )
    }

    // -- speaker --------------------------------------------------------------

    #[test]
    fn speaker_guess_caps_at_two() {
        let a = scene("", "Hi.", None);
        let b = scene("", "Hello.", None);
        let c = scene("", "Hey.", None);
        let silent = scene("", "", None);
        assert_eq!(speaker_fallback(&[&a, &b, &c]).0, 2);
        assert_eq!(speaker_fallback(&[&a, &silent]).0, 1);
        assert_eq!(speaker_fallback(&[&silent, &silent]).0, 0);
    }

    #[test]
    fn named_speakers_are_listed_once() {
        let mut a = scene("", "Hi.", None);
        a.speaker = Some("Aiko".into());
        let mut b = scene("", "Yo.", None);
        b.speaker = Some("Ren".into());
        let mut c = scene("", "Bye.", None);
        c.speaker = Some(" Aiko ".into());
        assert_eq!(speaker_fallback(&[&a, &b, &c]).1, vec!["Aiko", "Ren"]);
    }

    // -- character ------------------------------------------------------------

    #[test]
    fn shared_roles_keep_continuity() {
        let a = scene("The hero stands on a cliff", "", None);
        let b = scene("The hero and his rival face off", "", None);
        let c = scene("A wide shot of the valley", "", None);
        let (characters, continuity, unexpected) = character_fallback(&[&a, &b, &c]);
        assert_eq!(characters, vec!["hero", "rival"]);
        assert!(continuity);
        assert!(unexpected);
    }

    #[test]
    fn disjoint_adjacent_roles_break_continuity() {
        let a = scene("The detective examines the letter", "", None);
        let b = scene("A princess waves from the balcony", "", None);
        let (_, continuity, _) = character_fallback(&[&a, &b]);
        assert!(!continuity);
    }

    #[test]
    fn no_roles_assumes_continuity() {
        let a = scene("Rain on the window", "", None);
        let b = scene("", "", None);
        let (characters, continuity, unexpected) = character_fallback(&[&a, &b]);
        assert!(characters.is_empty());
        assert!(continuity);
        assert!(!unexpected);
    }

    // -- emotion --------------------------------------------------------------

    #[test]
    fn single_emotion_is_monotone() {
        let (score, flow, reversals) = emotion_fallback(&labels(&["happy"; 5]));
        assert_eq!((score, flow, reversals), (0.6, "monotone", 0));
    }

    #[test]
    fn moderate_variety_is_natural() {
        let (score, flow, _) = emotion_fallback(&labels(&["calm", "calm", "surprised", "surprised", "happy"]));
        assert_eq!((score, flow), (0.7, "natural"));
    }

    #[test]
    fn high_variety_is_jarring() {
        let (score, flow, _) =
            emotion_fallback(&labels(&["calm", "surprised", "determined", "fearful"]));
        assert_eq!((score, flow), (0.4, "jarring"));
    }

    #[test]
    fn alternating_valence_is_jarring() {
        let (score, flow, reversals) =
            emotion_fallback(&labels(&["happy", "devastated", "happy", "devastated"]));
        assert_eq!(reversals, 3);
        assert_eq!((score, flow), (0.4, "jarring"));
    }

    #[test]
    fn synonyms_count_as_distinct_emotions() {
        // 4 distinct labels over 5 panels, no valence flips.
        let (score, flow, reversals) =
            emotion_fallback(&labels(&["happy", "joyful", "glad", "Happy", "cheerful"]));
        assert_eq!(reversals, 0);
        assert_eq!((score, flow), (0.4, "jarring"));
    }

    // -- tracker --------------------------------------------------------------

    #[tokio::test]
    async fn offline_tracker_uses_heuristics() {
        let scenes: Vec<SceneMetadata> = (0..5)
            .map(|_| scene("The hero smiles", "What a day!", Some("happy")))
            .collect();
        let refs: Vec<&SceneMetadata> = scenes.iter().collect();

        let report = offline_tracker().track(&refs).await;

        assert_eq!(report.speaker_analysis.speaker_count, 2);
        assert!(report.speaker_analysis.consistent);
        assert_eq!(report.speaker_analysis.threading, "unclear");
        assert!(report.character_analysis.continuity);
        assert_eq!(report.emotional_analysis.flow_quality, "monotone");
        assert!((report.thread_score - (1.0 + 1.0 + 0.6) / 3.0).abs() < 1e-9);
        assert_eq!(report.thread_quality, AssessmentBand::Excellent);
        for source in report.sources() {
            assert_eq!(source.unavailable, Some(UnavailableReason::NotConfigured));
        }
    }

    #[tokio::test]
    async fn silent_sequence_skips_speaker_judge() {
        let scenes = [scene("Rooftop", "", Some("calm")), scene("Street", "", Some("calm"))];
        let refs: Vec<&SceneMetadata> = scenes.iter().collect();

        let report = offline_tracker().track(&refs).await;
        assert_eq!(report.speaker_analysis.source.unavailable, Some(UnavailableReason::Skipped));
        assert_eq!(report.speaker_analysis.speaker_count, 0);
    }
}
