use crate::memory::rolling::Observation;

pub const CONSOLIDATION_SYSTEM_PROMPT: &str = "\
You are an AI playing a point-and-click adventure game, reviewing recent progress to \
update your long-term memory. Answer with a single JSON object and nothing else.";

fn numbered(observations: &[Observation]) -> String {
    if observations.is_empty() {
        return "(none)".into();
    }
    observations
        .iter()
        .enumerate()
        .map(|(i, o)| format!("{}. {}", i + 1, o.description))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn map_prompt(observations: &[Observation], current_map: &str) -> String {
    format!(
        r#"Review the following sequence of observations and the current map to update the game's room connections.

Current Map:
{current_map}

Recent Observations (in chronological order):
{observations}

Report every room these observations show or confirm:
1. Group descriptions of the same location into a single room; do not create duplicates.
2. For each room list its exits and where they lead (e.g. exit "north door" to "Kitchen").
3. Record notable features as attributes (e.g. "chest": "locked").
4. Rooms and exits already on the map may be omitted; nothing you leave out is forgotten.

Output format:
{{
    "rooms": [
        {{
            "name": "Room Name",
            "connections": [{{"exit": "door on the left", "to": "Other Room"}}],
            "attributes": {{"feature": "state"}}
        }}
    ],
    "summary": "Brief summary of the current game world structure"
}}"#,
        observations = numbered(observations),
    )
}

pub fn objectives_prompt(observations: &[Observation], current_objectives: &str) -> String {
    format!(
        r#"Review the following sequence of observations and the current objectives to update the game's long-term goals.

Current Objectives (id: description (status)):
{current_objectives}

Recent Observations (in chronological order):
{observations}

1. List the ids of active objectives the observations show as achieved.
2. Add new objectives the observations suggest (puzzles to solve, items to find, places to reach).
3. Do not repeat objectives that are already listed.

Output format:
{{
    "completed": [1, 3],
    "added": [{{"description": "What to achieve", "priority": "high|medium|low"}}],
    "summary": "Brief summary of overall progress"
}}"#,
        observations = numbered(observations),
    )
}

pub fn narrative_prompt(observations: &[Observation], current_context: &str) -> String {
    let actions: Vec<String> = observations
        .iter()
        .filter(|o| !o.actions.is_empty())
        .map(|o| format!("- {}", o.actions))
        .collect();
    format!(
        r#"Review the following sequence of observations and the current game context to formulate a mid-term strategy.

Current Game Context:
{current_context}

Recent Observations (in chronological order):
{observations}

Recent Actions:
{actions}

Formulate a new game strategy that:
1. Summarizes what we've learned about the game state
2. Identifies any patterns or recurring elements, including actions that keep being repeated without effect
3. Suggests a focused approach for the next phase of gameplay
4. Updates our understanding of the game's mechanics and puzzles

Output format:
{{
    "summary": "Brief summary of what we've learned",
    "patterns": "Key patterns or recurring elements noticed",
    "strategy": "Specific strategy for the next phase",
    "mechanics": "Updated understanding of game mechanics"
}}"#,
        observations = numbered(observations),
        actions = if actions.is_empty() { "(none)".to_string() } else { actions.join("\n") },
    )
}
