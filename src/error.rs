//! Error taxonomy for the compilation pipeline and the IR interpreter.

use colored::Colorize;
use thiserror::Error;

use crate::frontend::{SourceFile, lexer::Span};

/// A message anchored to a location in the program text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub span: Span,
    pub message: String,
}

impl Diagnostic {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }

    /// `message (origin:row:column)` followed by the offending line and a
    /// caret marker
    pub fn render(&self, source: &SourceFile) -> String {
        format!(
            "{} ({}:{}:{})\n{}",
            self.message.bold(),
            source.origin,
            source.row_for_position(self.span.start),
            source.column_for_position(self.span.start),
            source.highlight_span(self.span)
        )
    }
}

/// The token sequence does not match any production. No tree is produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error: {}", .diagnostic.message)]
pub struct SyntaxError {
    pub diagnostic: Diagnostic,
}

/// The program is well formed but refers to names incorrectly
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} semantic error(s)", .diagnostics.len())]
pub struct SemanticError {
    pub diagnostics: Vec<Diagnostic>,
}

/// A construct that cannot be lowered faithfully
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoweringError {
    #[error("exponent must be an integer literal")]
    NonLiteralExponent { span: Span },
    #[error("exponent {value} exceeds the unrolling limit of {limit}")]
    ExponentTooLarge { span: Span, value: u64, limit: u32 },
    #[error("`{name}` is used before it has a storage cell")]
    UnknownVariable { span: Span, name: String },
}

impl LoweringError {
    pub fn span(&self) -> Span {
        match self {
            Self::NonLiteralExponent { span }
            | Self::ExponentTooLarge { span, .. }
            | Self::UnknownVariable { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    #[error(transparent)]
    Lowering(#[from] LoweringError),
}

impl CompileError {
    /// One line summary printed before the diagnostics
    pub fn summary(&self) -> &'static str {
        match self {
            Self::Syntax(_) => "Syntax errors occurred",
            Self::Semantic(_) => "Semantic errors occurred",
            Self::Lowering(_) => "Code generation failed",
        }
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            Self::Syntax(error) => vec![error.diagnostic.clone()],
            Self::Semantic(error) => error.diagnostics.clone(),
            Self::Lowering(error) => vec![Diagnostic::new(error.span(), error.to_string())],
        }
    }
}

/// Runtime traps raised while executing generated IR
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpretError {
    #[error("integer division by zero")]
    DivisionByZero,
    #[error("signed integer overflow in `{operation}`")]
    Overflow { operation: &'static str },
    #[error("storage cell `{name}` read before allocation")]
    UnallocatedCell { name: String },
    #[error("register %{register} read before it was defined")]
    UndefinedRegister { register: usize },
    #[error("call to unknown function `{name}`")]
    UnknownFunction { name: String },
    #[error("block {block} ended without a terminator")]
    MissingTerminator { block: usize },
    #[error("execution exceeded {limit} steps")]
    StepLimitExceeded { limit: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_render_points_at_the_span() {
        let source = SourceFile::in_memory("int a;\nb = 1;");
        let diagnostic = Diagnostic::new(Span::new(7, 8), "Undeclared identifier `b`");

        let rendered = strip_ansi_escapes::strip_str(diagnostic.render(&source));

        assert_eq!(
            rendered,
            "Undeclared identifier `b` (<memory>:2:1)\n    b = 1;\n    ^"
        );
    }

    #[test]
    fn lowering_errors_become_single_diagnostics() {
        let error = CompileError::from(LoweringError::NonLiteralExponent {
            span: Span::new(3, 4),
        });

        assert_eq!(error.summary(), "Code generation failed");
        assert_eq!(
            error.diagnostics(),
            vec![Diagnostic::new(
                Span::new(3, 4),
                "exponent must be an integer literal"
            )]
        );
    }
}
