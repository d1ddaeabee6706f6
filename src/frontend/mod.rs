use colored::Colorize;

use self::lexer::Span;

pub mod ast;
pub mod lexer;
pub mod parser;

#[derive(Debug)]
pub struct SourceFile {
    pub contents: String,
    pub origin: SourceFileOrigin,
}

impl SourceFile {
    pub fn new(contents: impl Into<String>, origin: SourceFileOrigin) -> Self {
        Self {
            contents: contents.into(),
            origin,
        }
    }

    pub fn in_memory(contents: impl Into<String>) -> Self {
        Self::new(contents, SourceFileOrigin::Memory)
    }

    pub fn value_of_span(&self, span: Span) -> &str {
        &self.contents[span.start..span.end]
    }

    /// 1-based line number of a byte position
    pub fn row_for_position(&self, position: usize) -> usize {
        let position = position.min(self.contents.len());

        self.contents[..position].matches('\n').count() + 1
    }

    /// 1-based column of a byte position
    pub fn column_for_position(&self, position: usize) -> usize {
        let position = position.min(self.contents.len());
        let line_start = self.contents[..position]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);

        position - line_start + 1
    }

    /// Renders the line containing the span with a caret marker underneath
    pub fn highlight_span(&self, span: Span) -> String {
        let start = span.start.min(self.contents.len());
        let line_start = self.contents[..start]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let line_end = self.contents[start..]
            .find('\n')
            .map(|i| start + i)
            .unwrap_or(self.contents.len());

        let line = &self.contents[line_start..line_end];
        let width = span.end.min(line_end).saturating_sub(start).max(1);
        let marker = format!("{}{}", " ".repeat(start - line_start), "^".repeat(width));

        format!("    {line}\n    {}", marker.bright_red().bold())
    }
}

#[derive(Debug, Clone)]
pub enum SourceFileOrigin {
    Memory,
    CommandLine,
}

impl core::fmt::Display for SourceFileOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileOrigin::Memory => f.write_str("<memory>"),
            SourceFileOrigin::CommandLine => f.write_str("<command-line>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_and_columns_are_one_based() {
        let source = SourceFile::in_memory("int a;\nresult = a;");

        assert_eq!(source.row_for_position(0), 1);
        assert_eq!(source.column_for_position(0), 1);
        assert_eq!(source.row_for_position(7), 2);
        assert_eq!(source.column_for_position(16), 10);
    }

    #[test]
    fn highlight_marks_the_span() {
        let source = SourceFile::in_memory("int ;");

        let highlighted = strip_ansi_escapes::strip_str(source.highlight_span(Span::new(4, 5)));

        assert_eq!(highlighted, "    int ;\n        ^");
    }
}
