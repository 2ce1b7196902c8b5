//! Structural completeness heuristics for generated text.
//!
//! Every rule is a pure function so callers can test or apply them one at a
//! time; [`validate`] applies the enabled rules in a fixed order and reports
//! the first one that fails.

use crate::config::ValidationConfig;

/// Opening marker of a LaTeX environment.
pub const LATEX_BEGIN: &str = "\\begin{";
/// Closing marker of a LaTeX environment.
pub const LATEX_END: &str = "\\end{";
/// Markdown code fence marker.
pub const CODE_FENCE: &str = "```";

/// Why a text was judged incomplete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncompleteReason {
    /// The trimmed text ends with this configured indicator.
    TruncationIndicator(String),
    /// `\begin{` and `\end{` counts differ.
    UnbalancedLatex {
        /// Opening markers seen.
        begins: usize,
        /// Closing markers seen.
        ends: usize,
    },
    /// An odd number of code fences leaves a block open.
    UnterminatedCodeFence {
        /// Fence markers seen.
        fences: usize,
    },
    /// Opening and closing bracket counts differ.
    UnbalancedBrackets {
        /// `[` and `{` seen.
        opening: usize,
        /// `]` and `}` seen.
        closing: usize,
    },
}

impl std::fmt::Display for IncompleteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TruncationIndicator(indicator) => {
                write!(f, "ends with truncation indicator {indicator:?}")
            }
            Self::UnbalancedLatex { begins, ends } => {
                write!(f, "unbalanced LaTeX environments ({begins} begin, {ends} end)")
            }
            Self::UnterminatedCodeFence { fences } => {
                write!(f, "unterminated code fence ({fences} fence markers)")
            }
            Self::UnbalancedBrackets { opening, closing } => {
                write!(f, "unbalanced brackets ({opening} opening, {closing} closing)")
            }
        }
    }
}

/// Outcome of running the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No enabled rule fired.
    Complete,
    /// The first rule that fired.
    Incomplete(IncompleteReason),
}

impl Verdict {
    /// Returns true for [`Verdict::Complete`].
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Returns the indicator the trimmed text ends with, if any.
///
/// Matching is exact and case-sensitive; blank indicators never match.
#[must_use]
pub fn ends_with_indicator<'a>(text: &str, indicators: &'a [String]) -> Option<&'a str> {
    let trimmed = text.trim_end();
    indicators
        .iter()
        .map(String::as_str)
        .filter(|indicator| !indicator.trim().is_empty())
        .find(|indicator| trimmed.ends_with(indicator.trim_end()))
}

/// Counts `(begins, ends)` LaTeX environment markers.
#[must_use]
pub fn latex_counts(text: &str) -> (usize, usize) {
    (text.matches(LATEX_BEGIN).count(), text.matches(LATEX_END).count())
}

/// Counts non-overlapping code fence markers.
#[must_use]
pub fn code_fence_count(text: &str) -> usize {
    text.matches(CODE_FENCE).count()
}

/// Counts `(opening, closing)` square and curly brackets.
#[must_use]
pub fn bracket_counts(text: &str) -> (usize, usize) {
    text.chars().fold((0, 0), |(open, close), c| match c {
        '[' | '{' => (open + 1, close),
        ']' | '}' => (open, close + 1),
        _ => (open, close),
    })
}

/// True when every LaTeX `\begin{` has a matching `\end{` count.
#[must_use]
pub fn latex_balanced(text: &str) -> bool {
    let (begins, ends) = latex_counts(text);
    begins == ends
}

/// True when code fences come in pairs.
#[must_use]
pub fn code_fences_balanced(text: &str) -> bool {
    code_fence_count(text) % 2 == 0
}

/// True when opening and closing bracket counts agree.
#[must_use]
pub fn brackets_balanced(text: &str) -> bool {
    let (opening, closing) = bracket_counts(text);
    opening == closing
}

/// Applies the enabled rules in order and reports the first failure.
///
/// ```
/// use rig_continue_core::validation::{validate, IncompleteReason, Verdict};
/// use rig_continue_core::ValidationConfig;
///
/// let config = ValidationConfig::default();
/// assert_eq!(validate("All done.", &config), Verdict::Complete);
/// assert_eq!(
///     validate("And then...", &config),
///     Verdict::Incomplete(IncompleteReason::TruncationIndicator("...".into()))
/// );
/// ```
#[must_use]
pub fn validate(text: &str, config: &ValidationConfig) -> Verdict {
    if let Some(indicator) = ends_with_indicator(text, &config.truncation_indicators) {
        return Verdict::Incomplete(IncompleteReason::TruncationIndicator(indicator.to_string()));
    }

    let checks = config.check_balance;

    if checks.latex {
        let (begins, ends) = latex_counts(text);
        if begins != ends {
            return Verdict::Incomplete(IncompleteReason::UnbalancedLatex { begins, ends });
        }
    }

    if checks.code_fence {
        let fences = code_fence_count(text);
        if fences % 2 != 0 {
            return Verdict::Incomplete(IncompleteReason::UnterminatedCodeFence { fences });
        }
    }

    if checks.bracket {
        let (opening, closing) = bracket_counts(text);
        if opening != closing {
            return Verdict::Incomplete(IncompleteReason::UnbalancedBrackets { opening, closing });
        }
    }

    Verdict::Complete
}

/// Boolean form of [`validate`].
#[must_use]
pub fn is_complete(text: &str, config: &ValidationConfig) -> bool {
    validate(text, config).is_complete()
}
