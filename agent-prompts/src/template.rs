//! `{{key}}` prompt templates.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// A prompt template with `{{key}}` placeholders.
///
/// Rendering is a single left-to-right pass: substituted values are never
/// rescanned, so text that happens to contain `{{...}}` is emitted verbatim.
/// Unknown keys render as the empty string.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use agent_prompts::template::PromptTemplate;
///
/// let template = PromptTemplate::new("{{agentName}} says: {{missing}}done");
/// let values = HashMap::from([("agentName".to_owned(), "Ada".to_owned())]);
/// assert_eq!(template.render(&values), "Ada says: done");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Creates a template from raw text.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Returns the raw template string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Returns the distinct placeholder names in the template.
    #[must_use]
    pub fn placeholders(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        scan(&self.template, |segment| {
            if let Segment::Placeholder(name) = segment {
                names.insert(name);
            }
        });
        names
    }

    /// Renders the template against `values`.
    #[must_use]
    pub fn render(&self, values: &HashMap<String, String>) -> String {
        render(&self.template, values)
    }
}

impl From<&str> for PromptTemplate {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PromptTemplate {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// Renders `template` against `values`. Missing keys become empty strings.
#[must_use]
pub fn render(template: &str, values: &HashMap<String, String>) -> String {
    let mut output = String::with_capacity(template.len());
    scan(template, |segment| match segment {
        Segment::Literal(text) => output.push_str(text),
        Segment::Placeholder(name) => {
            if let Some(value) = values.get(name) {
                output.push_str(value);
            }
        }
    });
    output
}

enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn scan<'a>(template: &'a str, mut visit: impl FnMut(Segment<'a>)) {
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            break;
        };
        let name = after_open[..close].trim();
        // `{{ }}` and names spanning lines are not placeholders.
        if name.is_empty() || name.contains(['{', '\n']) {
            visit(Segment::Literal(&rest[..open + 2]));
            rest = after_open;
            continue;
        }
        visit(Segment::Literal(&rest[..open]));
        visit(Segment::Placeholder(name));
        rest = &after_open[close + 2..];
    }
    visit(Segment::Literal(rest));
}
