//! Prompt builders for window and narrative-thread judgments.
//!
//! Every prompt ends with the exact JSON shape expected back so strict
//! decoding succeeds whenever the judge follows instructions.

use koma_core::types::SceneMetadata;

fn or_none(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "(none)"
    } else {
        trimmed
    }
}

/// Multimodal prompt for one window. `first_index` is the sequence index of
/// the window's first panel; images are attached in the same order.
pub fn window_prompt(first_index: usize, scenes: &[&SceneMetadata]) -> String {
    let mut prompt = format!(
        "You are reviewing {} consecutive manga panels, attached in reading order.\n\
         Assess visual consistency (art style, lighting, character design), \
         scene transitions, and character continuity.\n\nPanels:\n",
        scenes.len()
    );
    for (offset, scene) in scenes.iter().enumerate() {
        prompt.push_str(&format!(
            "- Panel {}: {} | Dialogue: {}\n",
            first_index + offset,
            or_none(&scene.description),
            or_none(&scene.dialogue_text),
        ));
    }
    prompt.push_str(
        "\nRespond with a single JSON object:\n\
         {\"visual_consistency\": {...}, \"scene_transitions\": {...}, \
         \"character_analysis\": {...}, \"overall_coherence\": {\"coherence_score\": <0.0-1.0>}, \
         \"issues_detected\": [\"...\"], \"recommend_human_review\": <bool>, \
         \"detailed_analysis\": \"...\"}\n",
    );
    prompt
}

/// Text prompt listing every dialogue line with its speaker, if known.
pub fn speaker_prompt(scenes: &[&SceneMetadata]) -> String {
    let mut prompt = String::from(
        "Below are the dialogue lines of a manga sequence in order. Identify the speakers \
         and judge whether each speaker's voice stays consistent.\n\nDialogue:\n",
    );
    for (i, scene) in scenes.iter().enumerate() {
        if !scene.has_dialogue() {
            continue;
        }
        let speaker = scene.speaker.as_deref().unwrap_or("unknown");
        prompt.push_str(&format!(
            "- Panel {i} [{speaker}]: {}\n",
            scene.dialogue_text.trim()
        ));
    }
    prompt.push_str(
        "\nRespond with a single JSON object:\n\
         {\"speaker_count\": <int>, \"speakers\": [\"...\"], \"consistent\": <bool>, \
         \"threading\": \"clear\" | \"unclear\"}\n",
    );
    prompt
}

/// Text prompt listing every scene description.
pub fn character_prompt(scenes: &[&SceneMetadata]) -> String {
    let mut prompt = String::from(
        "Below are the scene descriptions of a manga sequence in order. List the characters \
         that appear and judge whether their presence is continuous, flagging any character \
         who appears without narrative setup.\n\nScenes:\n",
    );
    for (i, scene) in scenes.iter().enumerate() {
        prompt.push_str(&format!("- Panel {i}: {}\n", or_none(&scene.description)));
    }
    prompt.push_str(
        "\nRespond with a single JSON object:\n\
         {\"characters\": [\"...\"], \"continuity\": <bool>, \"unexpected_appearance\": <bool>}\n",
    );
    prompt
}

/// Text prompt listing the per-panel emotion sequence with context.
pub fn emotion_prompt(emotions: &[String], scenes: &[&SceneMetadata]) -> String {
    let mut prompt = String::from(
        "Below is the emotional sequence of a manga, one entry per panel. Judge whether the \
         emotional arc flows naturally.\n\nSequence:\n",
    );
    for (i, (emotion, scene)) in emotions.iter().zip(scenes).enumerate() {
        prompt.push_str(&format!(
            "- Panel {i}: {emotion} | {}\n",
            or_none(&scene.description)
        ));
    }
    prompt.push_str(
        "\nRespond with a single JSON object:\n\
         {\"coherence_score\": <0.0-1.0>, \"flow_quality\": \"natural\" | \"monotone\" | \"jarring\"}\n",
    );
    prompt
}
