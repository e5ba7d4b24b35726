/// Fact-placeholder templates: parsing and rendering.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::message::Facts;

#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("template parse error: {0}")]
    Parse(String),
    #[error("missing fact '{0}'")]
    MissingFact(String),
}

/// A segment of a parsed template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplateSegment {
    /// Literal text, emitted as-is.
    Literal(String),
    /// Fact interpolation: `{name}`.
    Fact(String),
}

/// A parsed template — a sequence of segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub segments: Vec<TemplateSegment>,
}

impl Template {
    /// Parse a template string into a sequence of segments.
    ///
    /// Syntax:
    /// - `{fact_name}` → `Fact` (lowercase ASCII, digits and `_`)
    /// - `{{` / `}}` → literal `{` / `}`
    /// - Everything else → `Literal`
    pub fn parse(input: &str) -> Result<Template, TemplateError> {
        let mut segments = Vec::new();
        let mut literal_buf = String::new();
        let chars: Vec<char> = input.chars().collect();
        let len = chars.len();
        let mut i = 0;

        while i < len {
            match chars[i] {
                '{' if i + 1 < len && chars[i + 1] == '{' => {
                    literal_buf.push('{');
                    i += 2;
                }
                '{' => {
                    let start = i + 1;
                    let end = chars[start..]
                        .iter()
                        .position(|c| *c == '}')
                        .map(|p| start + p)
                        .ok_or_else(|| TemplateError::Parse("unclosed brace".to_string()))?;

                    let name: String = chars[start..end].iter().collect();
                    if name.is_empty() {
                        return Err(TemplateError::Parse("empty braces".to_string()));
                    }
                    if name.contains('{') {
                        return Err(TemplateError::Parse(
                            "nested braces are not allowed".to_string(),
                        ));
                    }
                    if !name
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
                    {
                        return Err(TemplateError::Parse(format!(
                            "invalid fact name '{}'",
                            name
                        )));
                    }

                    if !literal_buf.is_empty() {
                        segments.push(TemplateSegment::Literal(std::mem::take(&mut literal_buf)));
                    }
                    segments.push(TemplateSegment::Fact(name));
                    i = end + 1;
                }
                '}' if i + 1 < len && chars[i + 1] == '}' => {
                    literal_buf.push('}');
                    i += 2;
                }
                '}' => {
                    return Err(TemplateError::Parse(
                        "unmatched closing brace".to_string(),
                    ));
                }
                c => {
                    literal_buf.push(c);
                    i += 1;
                }
            }
        }

        if !literal_buf.is_empty() {
            segments.push(TemplateSegment::Literal(literal_buf));
        }

        Ok(Template { segments })
    }

    /// Fill every placeholder from `facts`.
    pub fn render(&self, facts: &Facts) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                TemplateSegment::Literal(text) => out.push_str(text),
                TemplateSegment::Fact(name) => {
                    let value = facts
                        .get(name)
                        .ok_or_else(|| TemplateError::MissingFact(name.clone()))?;
                    out.push_str(&value.to_string());
                }
            }
        }
        Ok(out)
    }

    /// Names of the facts this template reads, in order of appearance.
    pub fn fact_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            TemplateSegment::Fact(name) => Some(name.as_str()),
            TemplateSegment::Literal(_) => None,
        })
    }
}
