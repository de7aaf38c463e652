use crate::memory::store::MemoryDigest;

pub const PLANNER_SYSTEM_PROMPT: &str = "\
You are an AI agent playing a point-and-click adventure game. You see one screenshot per turn \
with a numbered grid overlay and decide which clicks to perform next.

Rules:
- Answer with a single JSON object and nothing else.
- Use exactly the keys \"description\", \"plan\" and \"clicks\".
- Every click is either {\"cell\": <number>} or {\"x\": <int>, \"y\": <int>}, optionally with a \"reason\".
- Give at least one click; use one click per action (verb, then object).
- Avoid repeating actions from the recent action list that had no effect.";

const RESPONSE_FORMAT: &str = r#"{
    "description": "Brief description of what you see in the scene",
    "plan": "Your plan for what to do next",
    "clicks": [
        {"cell": 42, "reason": "Select the Open verb"},
        {"cell": 156, "reason": "Click the door to open it"}
    ]
}"#;

/// Assemble the user turn that accompanies the annotated screenshot.
pub fn build_planner_prompt(grid_prompt: &str, instructions: &str, memory: &MemoryDigest) -> String {
    let recent = if memory.recent.is_empty() {
        "(none yet)".to_string()
    } else {
        memory
            .recent
            .iter()
            .map(|o| {
                if o.actions.is_empty() {
                    format!("- [{}] {}", o.iteration, o.description)
                } else {
                    format!("- [{}] {} → {}", o.iteration, o.description, o.actions)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut prompt = String::new();
    prompt.push_str("Analyze the screenshot and respond with JSON in this structure:\n");
    prompt.push_str(RESPONSE_FORMAT);
    prompt.push_str("\n\nCOORDINATE SYSTEM FOR CLICKING:\n");
    prompt.push_str(grid_prompt);
    prompt.push_str("\n\nGame Context:\n");
    prompt.push_str(memory.narrative.trim());
    if !instructions.trim().is_empty() {
        prompt.push_str("\n\nGame Instructions:\n");
        prompt.push_str(instructions.trim());
    }
    prompt.push_str("\n\nKnown Map:\n");
    prompt.push_str(&memory.map);
    prompt.push_str("\n\nActive Objectives:\n");
    prompt.push_str(&memory.objectives);
    prompt.push_str("\n\nRecent Observations and Actions (oldest first):\n");
    prompt.push_str(&recent);
    prompt
}

/// Rough token count: prompt words plus a quarter of the image's base64 length.
pub fn estimate_tokens(prompt: &str, image_base64_len: usize) -> usize {
    prompt.split_whitespace().count() + image_base64_len / 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::rolling::Observation;

    #[test]
    fn test_prompt_carries_every_memory_layer() {
        let digest = MemoryDigest {
            narrative: "We are in the lobby.".into(),
            map: "- Lobby [exits: stairs → Attic]".into(),
            objectives: "#1 [High] Find the key".into(),
            recent: vec![
                Observation::new(7, "a lobby", "walk | clicks: cell 3"),
                Observation::new(8, "(no observation: malformed)", ""),
            ],
        };
        let prompt = build_planner_prompt("GRID HELP", "Verbs are bottom-left.", &digest);
        for needle in [
            "GRID HELP",
            "We are in the lobby.",
            "Verbs are bottom-left.",
            "stairs → Attic",
            "Find the key",
            "- [7] a lobby → walk | clicks: cell 3",
            "- [8] (no observation: malformed)",
        ] {
            assert!(prompt.contains(needle), "missing {needle}");
        }
    }

    #[test]
    fn test_instructions_section_optional() {
        let prompt = build_planner_prompt("g", "  ", &MemoryDigest::default());
        assert!(!prompt.contains("Game Instructions"));
        assert!(prompt.contains("(none yet)"));
    }

    #[test]
    fn test_token_estimate() {
        assert_eq!(estimate_tokens("one two three", 400), 103);
    }
}
