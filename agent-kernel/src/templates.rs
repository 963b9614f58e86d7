//! Default prompt templates.

use agent_prompts::PromptTemplate;
use serde::{Deserialize, Serialize};

const MESSAGE_HANDLER: &str = r#"# People in the conversation
{{actors}}

# Background
{{lore}}

# Known facts
{{recentFacts}}
{{relevantFacts}}

# Summaries
{{recentSummaries}}
{{relevantSummaries}}

# About the participants
{{recentDescriptions}}
{{relevantDescriptions}}

# Goals
{{goals}}

# Context
{{providers}}

# Available actions
{{actions}}

# Conversation
{{recentMessages}}

Write the next message from {{agentName}} to {{senderName}}. Pick one of these
actions: {{actionNames}}. Answer with a single JSON block and nothing else:
```json
{ "user": "{{agentName}}", "content": "<message text>", "action": "<action name>" }
```"#;

const CONTINUE_MESSAGE: &str = r#"# People in the conversation
{{actors}}

# Goals
{{goals}}

# Context
{{providers}}

# Conversation
{{recentMessages}}

{{agentName}} has more to say. Write the follow-up message. Answer with a
single JSON block and nothing else:
```json
{ "user": "{{agentName}}", "content": "<message text>", "action": "<action name>" }
```"#;

const EVALUATOR_SELECTION: &str = r#"# Conversation
{{recentMessages}}

# Goals
{{goals}}

# Evaluators
{{evaluators}}

Which of these evaluators should run after the last message? Choose only from:
{{evaluatorNames}}. Answer with a JSON array of names, for example:
```json
["FACTS"]
```"#;

const FACT_EXTRACTION: &str = r#"# Known facts
{{recentFacts}}
{{relevantFacts}}

# Conversation
{{recentMessages}}

List new claims made in the conversation. Use "fact" for durable facts about
the world or the participants, "opinion" for opinions and "status" for
passing states. Set "already_known" when a known fact covers the claim.
```json
[{ "claim": "<claim>", "type": "fact", "in_bio": false, "already_known": false }]
```"#;

const GOAL_UPDATE: &str = r#"# Goals
{{goals}}

# Conversation
{{recentMessages}}

Report progress on the goals above. Mention only goals that changed. Use the
ids shown. Status is one of IN_PROGRESS, DONE or FAILED.
```json
[{ "id": "<goal id>", "status": "IN_PROGRESS", "objectives": [{ "id": "<objective id>", "completed": true }] }]
```"#;

/// Templates used by the built-in completion paths.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Templates {
    /// Main reply to an inbound message.
    pub message_handler: PromptTemplate,
    /// Follow-up produced by the `CONTINUE` action.
    pub continue_message: PromptTemplate,
    /// Asks which validated evaluators should run.
    pub evaluator_selection: PromptTemplate,
    /// Used by the fact evaluator.
    pub fact_extraction: PromptTemplate,
    /// Used by the goal evaluator.
    pub goal_update: PromptTemplate,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            message_handler: PromptTemplate::new(MESSAGE_HANDLER),
            continue_message: PromptTemplate::new(CONTINUE_MESSAGE),
            evaluator_selection: PromptTemplate::new(EVALUATOR_SELECTION),
            fact_extraction: PromptTemplate::new(FACT_EXTRACTION),
            goal_update: PromptTemplate::new(GOAL_UPDATE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_only_use_state_keys() {
        let known = [
            "agentName",
            "senderName",
            "actors",
            "goals",
            "recentMessages",
            "recentFacts",
            "relevantFacts",
            "recentSummaries",
            "relevantSummaries",
            "recentDescriptions",
            "relevantDescriptions",
            "lore",
            "providers",
            "actions",
            "actionNames",
            "evaluators",
            "evaluatorNames",
        ];
        let templates = Templates::default();
        for template in [
            &templates.message_handler,
            &templates.continue_message,
            &templates.evaluator_selection,
            &templates.fact_extraction,
            &templates.goal_update,
        ] {
            for name in template.placeholders() {
                assert!(known.contains(&name), "unknown placeholder {name}");
            }
        }
    }
}
