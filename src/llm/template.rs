//! Prompt formatter: placeholder substitution for a chain of templates.
//!
//! Stage 0 receives the whole list of note values rendered as a list literal
//! (`['dog', 'cat']`); every later stage receives the previous stage's
//! response verbatim.  Substitution is plain text replacement of every
//! occurrence of the placeholder; there is no escape syntax.

/// An ordered chain of prompt templates sharing one placeholder token.
///
/// # Example
/// ```rust
/// use quick_ai::llm::PromptTemplate;
///
/// let template = PromptTemplate::new(
///     "#response#",
///     vec!["Story with #response#".into(), "Translate: #response#".into()],
/// );
/// let values = vec!["dog".to_string(), "cat".to_string()];
/// assert_eq!(template.first(&values).unwrap(), "Story with ['dog', 'cat']");
/// assert_eq!(template.next(1, "A dog met a cat.").unwrap(), "Translate: A dog met a cat.");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    placeholder: String,
    stages: Vec<String>,
}

impl PromptTemplate {
    pub fn new(placeholder: impl Into<String>, stages: Vec<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
            stages,
        }
    }

    /// Number of stages (and therefore prompts and responses) in the chain.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Concrete prompt for stage 0: the note values rendered as a list
    /// literal.  `None` for an empty chain.
    pub fn first(&self, values: &[String]) -> Option<String> {
        self.stages
            .first()
            .map(|stage| self.substitute(stage, &list_literal(values)))
    }

    /// Concrete prompt for stage `index` (> 0) fed with the previous
    /// response.  `None` when `index` is past the end of the chain.
    pub fn next(&self, index: usize, previous_response: &str) -> Option<String> {
        self.stages
            .get(index)
            .map(|stage| self.substitute(stage, previous_response))
    }

    fn substitute(&self, stage: &str, value: &str) -> String {
        if self.placeholder.is_empty() {
            return stage.to_string();
        }
        stage.replace(&self.placeholder, value)
    }
}

// ---------------------------------------------------------------------------
// List literal rendering
// ---------------------------------------------------------------------------

/// Render values as a bracketed list literal: `['a', "it's"]`.
///
/// Each item is single-quoted unless it contains a single quote and no double
/// quote; backslashes, the chosen quote and control characters are escaped.
pub fn list_literal(values: &[String]) -> String {
    let items: Vec<String> = values.iter().map(|v| quote_item(v)).collect();
    format!("[{}]", items.join(", "))
}

fn quote_item(value: &str) -> String {
    let quote = if value.contains('\'') && !value.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
