use std::{collections::BTreeMap, str::CharIndices};

use itertools::{PeekNth, peek_nth};
use once_cell::sync::Lazy;
use strum::{EnumString, IntoStaticStr};
use tracing::trace;

use super::SourceFile;

/// Lazy, finite, non-restartable stream of classified tokens over a source
/// file. Once the input is exhausted every call to `next` yields `Eoi`.
#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    chars: PeekNth<CharIndices<'source>>,
    peeked: Option<Token>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Words */
    Keyword(Keyword), // loopc
    Identifier,       // result

    /* Literals */
    IntegerLiteral, // 1

    /* Delimiters */
    OpenParen,  // (
    CloseParen, // )
    Semicolon,  // ;
    Comma,      // ,
    Colon,      // :

    /* Binary Ops */
    Plus,                 // +
    Minus,                // -
    Asterisk,             // *
    Divide,               // /
    Modulus,              // %
    Caret,                // ^
    DoubleEquals,         // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=

    /* Assignment */
    Equals,         // =
    PlusEquals,     // +=
    MinusEquals,    // -=
    MultiplyEquals, // *=
    DivideEquals,   // /=

    /// A character the language has no use for
    Unknown,
    /// End of input
    Eoi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Keyword {
    Int,
    And,
    Or,
    If,
    Elif,
    Else,
    Begin,
    End,
    Loopc,
}

/// Table of single char tokens (matched after longer sequences are checked for)
static SINGLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('(', TokenKind::OpenParen),
        (')', TokenKind::CloseParen),
        (';', TokenKind::Semicolon),
        (',', TokenKind::Comma),
        (':', TokenKind::Colon),
        ('+', TokenKind::Plus),
        ('-', TokenKind::Minus),
        ('*', TokenKind::Asterisk),
        ('/', TokenKind::Divide),
        ('%', TokenKind::Modulus),
        ('^', TokenKind::Caret),
        ('=', TokenKind::Equals),
        ('<', TokenKind::LessThan),
        ('>', TokenKind::GreaterThan),
    ])
});

/// Two char tokens, all of which end in `=`
static DOUBLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('=', TokenKind::DoubleEquals),
        ('!', TokenKind::NotEquals),
        ('<', TokenKind::LessThanOrEqualTo),
        ('>', TokenKind::GreaterThanOrEqualTo),
        ('+', TokenKind::PlusEquals),
        ('-', TokenKind::MinusEquals),
        ('*', TokenKind::MultiplyEquals),
        ('/', TokenKind::DivideEquals),
    ])
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            chars: peek_nth(source.contents.char_indices()),
            peeked: None,
        }
    }

    pub fn source(&self) -> &'source SourceFile {
        self.source
    }

    fn position(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(i, _)| *i)
            .unwrap_or(self.source.contents.len())
    }

    fn ignore_whitespace(&mut self) {
        while self.chars.peek().is_some_and(|(_, c)| c.is_whitespace()) {
            self.chars.next();
        }
    }

    // Keyword or identifier
    fn read_word(&mut self) -> Token {
        let start_position = self.position();

        while self
            .chars
            .peek()
            .is_some_and(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
        {
            self.chars.next();
        }

        let span = self.new_span(start_position);
        let value = self.source.value_of_span(span);

        let kind = match value.parse() {
            Ok(keyword) => TokenKind::Keyword(keyword),
            Err(_) => TokenKind::Identifier,
        };

        Token { kind, span }
    }

    fn read_number(&mut self) -> Token {
        let start_position = self.position();

        while self.chars.peek().is_some_and(|(_, c)| c.is_ascii_digit()) {
            self.chars.next();
        }

        Token {
            kind: TokenKind::IntegerLiteral,
            span: self.new_span(start_position),
        }
    }

    fn read_chars(&mut self, count: usize, kind: TokenKind) -> Token {
        let start_position = self.position();

        for _ in 0..count {
            self.chars.next();
        }

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn new_span(&mut self, start: usize) -> Span {
        Span {
            start,
            end: self.position(),
        }
    }

    pub fn peek(&mut self) -> Token {
        if let Some(token) = self.peeked {
            return token;
        }

        let token = self.scan();
        self.peeked = Some(token);
        token
    }

    pub fn next(&mut self) -> Token {
        if let Some(token) = self.peeked.take() {
            return token;
        }

        self.scan()
    }

    fn scan(&mut self) -> Token {
        self.ignore_whitespace();

        let Some((_, c)) = self.chars.peek().copied() else {
            let end = self.source.contents.len();

            return Token {
                kind: TokenKind::Eoi,
                span: Span::new(end, end),
            };
        };

        let token = match c {
            // Integer literals
            n if n.is_ascii_digit() => self.read_number(),

            // Identifiers and keywords
            a if a.is_ascii_alphabetic() || a == '_' => self.read_word(),

            // Operators ending with `=` (==, !=, <=, >=, +=, -=, *=, /=)
            d if DOUBLE_TOKENS.contains_key(&d)
                && self.chars.peek_nth(1).is_some_and(|(_, c)| *c == '=') =>
            {
                self.read_chars(2, DOUBLE_TOKENS[&d])
            }

            s if SINGLE_TOKENS.contains_key(&s) => self.read_chars(1, SINGLE_TOKENS[&s]),

            _ => self.read_chars(1, TokenKind::Unknown),
        };

        trace!(
            kind = ?token.kind,
            text = self.source.value_of_span(token.span),
            "scanned token"
        );

        token
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    /// Yields every token up to (not including) `Eoi`
    fn next(&mut self) -> Option<Token> {
        let token = Lexer::next(self);

        (token.kind != TokenKind::Eoi).then_some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        let source = SourceFile::in_memory(text);

        Lexer::new(&source).map(|t| t.kind).collect()
    }

    #[test]
    fn classifies_keywords_and_identifiers() {
        assert_eq!(
            kinds("int loopc begin end elif else if and or resultx"),
            vec![
                TokenKind::Keyword(Keyword::Int),
                TokenKind::Keyword(Keyword::Loopc),
                TokenKind::Keyword(Keyword::Begin),
                TokenKind::Keyword(Keyword::End),
                TokenKind::Keyword(Keyword::Elif),
                TokenKind::Keyword(Keyword::Else),
                TokenKind::Keyword(Keyword::If),
                TokenKind::Keyword(Keyword::And),
                TokenKind::Keyword(Keyword::Or),
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn prefers_two_char_operators() {
        assert_eq!(
            kinds("a += 1 == 2 <= 3 < 4 != 5 ^ 6"),
            vec![
                TokenKind::Identifier,
                TokenKind::PlusEquals,
                TokenKind::IntegerLiteral,
                TokenKind::DoubleEquals,
                TokenKind::IntegerLiteral,
                TokenKind::LessThanOrEqualTo,
                TokenKind::IntegerLiteral,
                TokenKind::LessThan,
                TokenKind::IntegerLiteral,
                TokenKind::NotEquals,
                TokenKind::IntegerLiteral,
                TokenKind::Caret,
                TokenKind::IntegerLiteral,
            ]
        );
    }

    #[test]
    fn unknown_characters_do_not_stop_the_stream() {
        assert_eq!(
            kinds("a $ !"),
            vec![TokenKind::Identifier, TokenKind::Unknown, TokenKind::Unknown]
        );
    }

    #[test]
    fn eoi_repeats_once_exhausted() {
        let source = SourceFile::in_memory("x");
        let mut lexer = Lexer::new(&source);

        assert_eq!(lexer.next().kind, TokenKind::Identifier);
        assert_eq!(lexer.next().kind, TokenKind::Eoi);
        assert_eq!(lexer.peek().kind, TokenKind::Eoi);
        assert_eq!(lexer.next().kind, TokenKind::Eoi);
    }

    #[test]
    fn spans_cover_token_text() {
        let source = SourceFile::in_memory("  count = 42;");
        let tokens: Vec<_> = Lexer::new(&source).collect();

        assert_eq!(source.value_of_span(tokens[0].span), "count");
        assert_eq!(source.value_of_span(tokens[2].span), "42");
    }
}
