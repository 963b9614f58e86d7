//! Pure formatters that turn state fragments into prompt text.
//!
//! Every function here is side-effect free, so one state can be rendered into
//! as many templates as a turn needs.

use std::fmt::Write as _;
use std::sync::Arc;

use agent_memory::MemoryRecord;
use agent_primitives::{Actor, ActorId};

use crate::goals::Goal;
use crate::registry::Handler;

const UNKNOWN_SPEAKER: &str = "Unknown";

/// One paragraph per actor: name and tagline, then summary when present.
#[must_use]
pub fn format_actors(actors: &[Actor]) -> String {
    actors
        .iter()
        .map(|actor| {
            let details = actor.details();
            let mut block = actor.display_name().to_owned();
            if !details.tagline.is_empty() {
                let _ = write!(block, ": {}", details.tagline);
            }
            if !details.summary.is_empty() {
                let _ = write!(block, "\n{}", details.summary);
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Renders dialogue records, supplied newest first, as a transcript read top to bottom.
///
/// Each line reads `Name: text`, followed by ` (ACTION)` when the record
/// carried an action.
#[must_use]
pub fn format_messages(records: &[MemoryRecord], actors: &[Actor]) -> String {
    records
        .iter()
        .rev()
        .map(|record| {
            let speaker = record
                .author()
                .map_or(UNKNOWN_SPEAKER, |author| display_name(actors, author));
            let content = record.content();
            match content.action.as_deref() {
                Some(action) => format!("{speaker}: {} ({action})", content.text),
                None => format!("{speaker}: {}", content.text),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders derived memories as a bullet list in the order given.
#[must_use]
pub fn format_memories(records: &[MemoryRecord]) -> String {
    records
        .iter()
        .map(|record| format!("- {}", record.content().text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders goals with their ids so the model can refer back to them.
#[must_use]
pub fn format_goals(goals: &[Goal]) -> String {
    goals
        .iter()
        .map(|goal| {
            let mut block = format!(
                "Goal: {}\nid: {}\nstatus: {}\nobjectives:",
                goal.name(),
                goal.id(),
                goal.status()
            );
            for objective in goal.objectives() {
                let mark = if objective.completed { "x" } else { " " };
                let _ = write!(
                    block,
                    "\n- [{mark}] {} (id: {})",
                    objective.description, objective.id
                );
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Comma-separated handler names.
#[must_use]
pub fn format_handler_names<T: ?Sized + Handler>(handlers: &[Arc<T>]) -> String {
    handlers
        .iter()
        .map(|handler| handler.name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// One `NAME: description` line per handler, with its condition and examples when set.
#[must_use]
pub fn format_handlers<T: ?Sized + Handler>(handlers: &[Arc<T>]) -> String {
    handlers
        .iter()
        .map(|handler| {
            let metadata = handler.metadata();
            let mut line = format!("{}: {}", metadata.name(), metadata.description());
            if let Some(condition) = metadata.condition() {
                let _ = write!(line, "\n  when: {condition}");
            }
            for example in metadata.examples() {
                let _ = write!(line, "\n  example: {example}");
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn display_name(actors: &[Actor], id: ActorId) -> &str {
    actors
        .iter()
        .find(|actor| actor.id() == id)
        .map_or(UNKNOWN_SPEAKER, Actor::display_name)
}

#[cfg(test)]
mod tests {
    use agent_primitives::{ActorDetails, Content, RoomId};
    use chrono::{Duration, Utc};

    use super::*;
    use crate::goals::Objective;
    use crate::registry::HandlerMetadata;

    struct Named(HandlerMetadata);

    impl Handler for Named {
        fn metadata(&self) -> &HandlerMetadata {
            &self.0
        }
    }

    #[test]
    fn transcript_reads_oldest_first_with_actions() {
        let ada = Actor::new(ActorId::random(), "Ada").unwrap();
        let room = RoomId::random();
        let now = Utc::now();
        let older = MemoryRecord::builder(room, "hello")
            .author(ada.id())
            .created_at(now - Duration::seconds(5))
            .build()
            .unwrap();
        let newer = MemoryRecord::builder(room, Content::text("bye").with_action("IGNORE"))
            .author(ActorId::random())
            .created_at(now)
            .build()
            .unwrap();

        let text = format_messages(&[newer, older], &[ada]);
        assert_eq!(text, "Ada: hello\nUnknown: bye (IGNORE)");
    }

    #[test]
    fn actors_include_tagline_and_summary() {
        let details = ActorDetails {
            tagline: "mathematician".into(),
            summary: "Writes notes on engines.".into(),
            ..ActorDetails::default()
        };
        let ada = Actor::new(ActorId::random(), "Ada")
            .unwrap()
            .with_details(details);
        let bob = Actor::new(ActorId::random(), "Bob").unwrap();
        assert_eq!(
            format_actors(&[ada, bob]),
            "Ada: mathematician\nWrites notes on engines.\n\nBob"
        );
    }

    #[test]
    fn goals_list_objective_state() {
        let mut done = Objective::new("Reach the coast");
        done.completed = true;
        let goal = Goal::new([ActorId::random()], "Lighthouse", vec![done, Objective::new("Climb")])
            .unwrap();
        let text = format_goals(&[goal]);
        assert!(text.starts_with("Goal: Lighthouse\n"));
        assert!(text.contains("status: IN_PROGRESS"));
        assert!(text.contains("- [x] Reach the coast"));
        assert!(text.contains("- [ ] Climb"));
    }

    #[test]
    fn handlers_render_names_and_descriptions() {
        let handlers = vec![
            Arc::new(Named(
                HandlerMetadata::new("NONE", "Reply normally").unwrap(),
            )),
            Arc::new(Named(
                HandlerMetadata::new("IGNORE", "Stop replying")
                    .unwrap()
                    .with_condition("the user is rude"),
            )),
        ];
        assert_eq!(format_handler_names(&handlers), "NONE, IGNORE");
        assert_eq!(
            format_handlers(&handlers),
            "NONE: Reply normally\nIGNORE: Stop replying\n  when: the user is rude"
        );
    }
}
