//! Answer styles and prompt rendering.
//!
//! Every style is a structured instruction record rendered by one
//! formatter, so style behavior lives in data rather than in a pile of
//! near-duplicate prompt strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fixed set of answer styles the product exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStyle {
    Concise,
    Detailed,
    Exam,
    Eli5,
    Compare,
    Diagram,
}

/// Shape the model's output must take for a style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Prose,
    Bullets,
    MarkdownTable,
    Headings,
}

/// Instruction record for one style.
pub struct StyleSpec {
    pub rules: &'static [&'static str],
    pub output_format: OutputFormat,
}

impl AnswerStyle {
    pub fn name(&self) -> &'static str {
        match self {
            AnswerStyle::Concise => "Concise",
            AnswerStyle::Detailed => "Detailed",
            AnswerStyle::Exam => "Exam",
            AnswerStyle::Eli5 => "ELI5",
            AnswerStyle::Compare => "Compare",
            AnswerStyle::Diagram => "Diagram",
        }
    }

    pub fn spec(&self) -> StyleSpec {
        match self {
            AnswerStyle::Concise => StyleSpec {
                rules: &["Max 2 sentences", "Direct definition only"],
                output_format: OutputFormat::Prose,
            },
            AnswerStyle::Detailed => StyleSpec {
                rules: &[
                    "Start with a definition",
                    "Explain step-by-step",
                    "Teacher style",
                ],
                output_format: OutputFormat::Prose,
            },
            AnswerStyle::Exam => StyleSpec {
                rules: &[
                    "Bullet points only",
                    "2-5 mark answer",
                    "No explanations",
                ],
                output_format: OutputFormat::Bullets,
            },
            AnswerStyle::Eli5 => StyleSpec {
                rules: &["Very simple language", "Friendly tone", "No jargon"],
                output_format: OutputFormat::Prose,
            },
            AnswerStyle::Compare => StyleSpec {
                rules: &[
                    "Markdown table ONLY",
                    "First column: Aspect",
                    "Compare at least two concepts",
                    "No text outside the table",
                ],
                output_format: OutputFormat::MarkdownTable,
            },
            AnswerStyle::Diagram => StyleSpec {
                rules: &[
                    "Explain the diagram step-by-step",
                    "Use clear headings",
                    "Explain flow and relationships only as shown",
                    "Do NOT infer complexity or theory",
                ],
                output_format: OutputFormat::Headings,
            },
        }
    }
}

impl fmt::Display for AnswerStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AnswerStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "concise" => Ok(AnswerStyle::Concise),
            "detailed" => Ok(AnswerStyle::Detailed),
            "exam" => Ok(AnswerStyle::Exam),
            "eli5" => Ok(AnswerStyle::Eli5),
            "compare" => Ok(AnswerStyle::Compare),
            "diagram" => Ok(AnswerStyle::Diagram),
            other => Err(format!("unknown answer style: {}", other)),
        }
    }
}

/// One prior conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub text: String,
}

/// Render the single prompt sent to the generative model: prior turns,
/// the style directive, the assembled context, and the question.
pub fn render(history: &[Turn], style: AnswerStyle, context: &str, question: &str) -> String {
    let mut prompt = String::new();

    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for turn in history {
            prompt.push_str(&format!("{}: {}\n", turn.role, turn.text));
        }
        prompt.push('\n');
    }

    let spec = style.spec();
    prompt.push_str(&format!(
        "You must follow the rules for the \"{}\" answer style:\n",
        style
    ));
    for rule in spec.rules {
        prompt.push_str(&format!("- {}\n", rule));
    }
    prompt.push('\n');

    prompt.push_str("Answer using only the reference material below. ");
    prompt.push_str("If the reference does not cover the question, say so.\n\n");

    prompt.push_str("Reference:\n");
    prompt.push_str(context);
    prompt.push_str("\n\n");

    prompt.push_str("Question:\n");
    prompt.push_str(question);
    prompt.push_str("\n\nAnswer:\n");

    prompt
}
