//! Prompt rendering and structured output parsing for persona agents.
//!
//! [`template`] renders `{{key}}` placeholders; [`parse`] pulls JSON objects
//! and arrays back out of whatever the model wrote around them.

#![warn(missing_docs, clippy::pedantic)]

pub mod parse;
pub mod template;

pub use parse::{
    ParseError, extract_json, extract_object, extract_object_array, extract_string_array,
};
pub use template::{PromptTemplate, render};
