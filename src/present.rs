//! Presentation model for a finished run.
//!
//! [`render`] checks the chain's output and builds a [`Transcript`]: the
//! chosen note values followed by every prompt/response pair, in order.  The
//! window draws it directly; [`Transcript::to_html`] and
//! [`Transcript::to_plain`] give markup and clipboard text.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PresentError {
    #[error("prompt count {prompts} does not match response count {responses}")]
    LengthMismatch { prompts: usize, responses: usize },
}

/// One prompt and the response it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub prompt: String,
    pub response: String,
}

/// Everything shown in the result view.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub values: Vec<String>,
    pub exchanges: Vec<Exchange>,
}

/// Accent colour for headings.
pub const HEADING_COLOR: &str = "green";

/// Pair prompts with responses.  Nothing is rendered when the lengths differ.
pub fn render(
    values: &[String],
    prompts: &[String],
    responses: &[String],
) -> Result<Transcript, PresentError> {
    if prompts.len() != responses.len() {
        return Err(PresentError::LengthMismatch {
            prompts: prompts.len(),
            responses: responses.len(),
        });
    }

    let exchanges = prompts
        .iter()
        .zip(responses)
        .map(|(prompt, response)| Exchange {
            prompt: prompt.clone(),
            response: response.clone(),
        })
        .collect();

    Ok(Transcript {
        values: values.to_vec(),
        exchanges,
    })
}

impl Transcript {
    /// Rich-text markup for Copy HTML and `--print --html`: a coloured
    /// heading for the values and for each prompt, line breaks as `<br>`.
    pub fn to_html(&self) -> String {
        let values: Vec<String> = self.values.iter().map(|v| escape_html(v)).collect();
        let mut out = format!(
            "<font color='{HEADING_COLOR}'>Chosen values:</font><br>{}<br><br>",
            values.join("<br>")
        );
        for exchange in &self.exchanges {
            out.push_str(&format!(
                "<font color='{HEADING_COLOR}'>Prompt: {}:</font><br>Response: {}<br><br>",
                escape_html(&exchange.prompt),
                escape_html(&exchange.response)
            ));
        }
        out
    }

    /// Plain text for the clipboard and `--print`.
    pub fn to_plain(&self) -> String {
        let mut out = String::from("Chosen values:\n");
        for value in &self.values {
            out.push_str(value);
            out.push('\n');
        }
        for exchange in &self.exchanges {
            out.push_str(&format!(
                "\nPrompt: {}:\nResponse: {}\n",
                exchange.prompt, exchange.response
            ));
        }
        out
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\n' => out.push_str("<br>"),
            c => out.push(c),
        }
    }
    out
}
