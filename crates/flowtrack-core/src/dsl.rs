//! Flow definition DSL parser
//!
//! Parses the terse text format users write when registering a flow:
//!
//! ```text
//! Overall flow
//! AWS{Calculator_Runs->Cashflow_Generator} ->On-PREM{BPF}
//!
//! Sub-stages
//! AWS
//! {
//! Calculator_Runs { Stage_1_1 -> Stage1_2 -> Stage1_3 }
//! Cashflow_Generator { Stage_2 }
//! }
//! On-PREM
//! {
//! BPF { Stage5_1, Stage5_2 }
//! }
//! ```
//!
//! Parsing is total. Lines that do not fit the format are dropped and
//! reported, never turned into errors.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ir::{Category, ParsedFlowSpec};

/// `<name> { <content> }` on a single line
static STAGE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^{}]+)\{([^{}]*)\}$").expect("stage pattern is valid"));

/// Section of the document the parser is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Section {
    /// Before any section header
    #[default]
    None,
    /// After an `Overall flow` header
    Overall,
    /// After a `Sub-stages` header
    SubStages,
}

/// Parser state carried between lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParserState {
    /// Current section
    pub section: Section,
    /// Category selected by the most recent category token
    pub category: Option<Category>,
    /// Whether the overall line has been captured
    pub overall_captured: bool,
}

/// Classification of a trimmed, non-blank line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    /// `Overall flow` header (case-insensitive prefix)
    OverallHeader,
    /// `Sub-stages` header (case-insensitive prefix)
    SubStagesHeader,
    /// A line that is exactly a category token
    Category(Category),
    /// A lone `{`
    OpenBrace,
    /// A lone `}`
    CloseBrace,
    /// `<name> { <content> }`, both parts trimmed
    Stage {
        /// Stage name
        name: &'a str,
        /// Raw sub-stage expression
        content: &'a str,
    },
    /// Anything else
    Text,
}

/// What the parser does with a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action<'a> {
    /// Nothing to record (headers, structural braces)
    Skip,
    /// Capture the line as the overall ordering hint
    CaptureOverall(&'a str),
    /// Make the category current and ensure it has an entry
    EnterCategory(Category),
    /// Record a stage expression under a category
    RecordStage {
        /// Category the stage belongs to
        category: Category,
        /// Stage name
        name: &'a str,
        /// Raw sub-stage expression
        content: &'a str,
    },
    /// Drop the line
    Drop(DropReason),
}

/// Why a line was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Content before any section header
    OutsideSection,
    /// Overall section already captured its line
    OverallAlreadyCaptured,
    /// Stage line with no category selected yet
    StageBeforeCategory,
    /// Line in the sub-stage section that matches nothing
    Unrecognized,
}

/// A dropped line, 1-based line number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedLine {
    /// Line number in the input
    pub line: usize,
    /// Trimmed line text
    pub text: String,
    /// Why it was dropped
    pub reason: DropReason,
}

/// Diagnostics collected while parsing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseReport {
    /// Lines that contributed nothing
    pub dropped: Vec<DroppedLine>,
}

/// Classify a trimmed, non-blank line
pub fn classify(trimmed: &str) -> Line<'_> {
    let lower = trimmed.to_lowercase();
    if lower.starts_with("overall flow") {
        return Line::OverallHeader;
    }
    if lower.starts_with("sub-stages") {
        return Line::SubStagesHeader;
    }
    if let Some(category) = Category::from_token(trimmed) {
        return Line::Category(category);
    }
    match trimmed {
        "{" => return Line::OpenBrace,
        "}" => return Line::CloseBrace,
        _ => {}
    }
    if let Some(caps) = STAGE_LINE.captures(trimmed) {
        let name = caps.get(1).map_or("", |m| m.as_str()).trim();
        let content = caps.get(2).map_or("", |m| m.as_str()).trim();
        if !name.is_empty() {
            return Line::Stage { name, content };
        }
    }
    Line::Text
}

/// Transition table: next state and action for a classified line.
///
/// `text` is the trimmed line the classification came from.
pub fn step<'a>(state: ParserState, line: Line<'a>, text: &'a str) -> (ParserState, Action<'a>) {
    use Section as S;

    match (state.section, line) {
        (_, Line::OverallHeader) => (
            ParserState {
                section: S::Overall,
                ..state
            },
            Action::Skip,
        ),
        (_, Line::SubStagesHeader) => (
            ParserState {
                section: S::SubStages,
                ..state
            },
            Action::Skip,
        ),

        (S::None, _) => (state, Action::Drop(DropReason::OutsideSection)),

        (S::Overall, _) if state.overall_captured => {
            (state, Action::Drop(DropReason::OverallAlreadyCaptured))
        }
        (S::Overall, _) => (
            ParserState {
                overall_captured: true,
                ..state
            },
            Action::CaptureOverall(text),
        ),

        (S::SubStages, Line::Category(category)) => (
            ParserState {
                category: Some(category),
                ..state
            },
            Action::EnterCategory(category),
        ),
        (S::SubStages, Line::OpenBrace | Line::CloseBrace) => (state, Action::Skip),
        (S::SubStages, Line::Stage { name, content }) => match state.category {
            Some(category) => (
                state,
                Action::RecordStage {
                    category,
                    name,
                    content,
                },
            ),
            None => (state, Action::Drop(DropReason::StageBeforeCategory)),
        },
        (S::SubStages, Line::Text) => (state, Action::Drop(DropReason::Unrecognized)),
    }
}

/// Parse flow definition text into a [`ParsedFlowSpec`]
pub fn parse(text: &str) -> ParsedFlowSpec {
    parse_with_report(text).0
}

/// Parse flow definition text, also returning the dropped lines
pub fn parse_with_report(text: &str) -> (ParsedFlowSpec, ParseReport) {
    let mut spec = ParsedFlowSpec::default();
    let mut report = ParseReport::default();
    let mut state = ParserState::default();

    for (idx, raw) in text.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        let (next, action) = step(state, classify(trimmed), trimmed);
        state = next;

        match action {
            Action::Skip => {}
            Action::CaptureOverall(line) => spec.overall = line.to_string(),
            Action::EnterCategory(category) => {
                spec.sub_stages.entry(category).or_default();
            }
            Action::RecordStage {
                category,
                name,
                content,
            } => spec.insert_stage(category, name, content),
            Action::Drop(reason) => {
                tracing::debug!(line = idx + 1, ?reason, "dropping flow definition line");
                report.dropped.push(DroppedLine {
                    line: idx + 1,
                    text: trimmed.to_string(),
                    reason,
                });
            }
        }
    }

    (spec, report)
}
