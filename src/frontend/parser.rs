use tracing::{debug, warn};

use crate::{
    error::{Diagnostic, SyntaxError},
    frontend::{
        SourceFile,
        ast::{
            Assignment, BinaryOperator, BinaryOperatorKind, Body, CompoundAssignment,
            CompoundOperator, CompoundOperatorKind, Conditional, ConditionalBranch, Declaration,
            Expression, ExpressionKind, Identifier, Literal, Loop, NodeId, Program, Statement,
            StatementKind,
        },
        lexer::{Keyword, Lexer, Span, Token, TokenKind},
    },
};

pub type ParseResult<T> = Result<T, SyntaxError>;

/// Deepest expression tree the parser will build. Binary operators, `^` and
/// parentheses each add a level.
pub const MAX_EXPRESSION_DEPTH: usize = 128;

/// Recursive descent parser with a single token of lookahead
#[derive(Debug)]
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    next_node_id: u32,
    /// Nesting of the expression currently being built
    depth: usize,
}

impl<'source> Parser<'source> {
    /// Parses a whole program. On the first structural mismatch the rest of
    /// the token stream is discarded and no tree is returned.
    pub fn parse_program(source_file: &'source SourceFile) -> ParseResult<Program> {
        let mut parser = Self {
            lexer: Lexer::new(source_file),
            next_node_id: 0,
            depth: 0,
        };

        let mut program = Program::default();

        while parser.lexer.peek().kind != TokenKind::Eoi {
            match parser.parse_statement() {
                Ok(statement) => program.statements.push(statement),
                Err(error) => {
                    let discarded = parser.recover();
                    warn!(
                        discarded,
                        message = %error.diagnostic.message,
                        "syntax error, discarded remaining tokens"
                    );
                    return Err(error);
                }
            }
        }

        debug!(statements = program.statements.len(), "parsed program");

        Ok(program)
    }

    fn create_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    /// Discards tokens up to the end of input, returning how many were dropped
    fn recover(&mut self) -> usize {
        let mut discarded = 0;

        while self.lexer.next().kind != TokenKind::Eoi {
            discarded += 1;
        }

        discarded
    }

    fn describe(&self, token: Token) -> String {
        match token.kind {
            TokenKind::Eoi => "end of input".to_owned(),
            _ => format!("`{}`", self.lexer.source().value_of_span(token.span)),
        }
    }

    fn syntax_error<T>(&self, span: Span, message: String) -> ParseResult<T> {
        Err(SyntaxError {
            diagnostic: Diagnostic::new(span, message),
        })
    }

    fn unexpected<T>(&self, token: Token, expecting: &str) -> ParseResult<T> {
        self.syntax_error(
            token.span,
            format!("Expected {expecting} but found {}", self.describe(token)),
        )
    }

    /// Opens one more level of expression nesting at `span`
    fn nest(&mut self, span: Span) -> ParseResult<()> {
        self.depth += 1;

        if self.depth > MAX_EXPRESSION_DEPTH {
            return self.syntax_error(
                span,
                format!("Expression nested too deeply (more than {MAX_EXPRESSION_DEPTH} levels)"),
            );
        }

        Ok(())
    }

    fn expect_next_to_be(&mut self, kind: TokenKind, expecting: &str) -> ParseResult<Token> {
        let token = self.lexer.next();

        if token.kind != kind {
            return self.unexpected(token, expecting);
        }

        Ok(token)
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> ParseResult<Token> {
        let name: &'static str = keyword.into();

        self.expect_next_to_be(TokenKind::Keyword(keyword), &format!("`{name}`"))
    }

    fn next_is(&mut self, kind: TokenKind) -> bool {
        self.lexer.peek().kind == kind
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        let peeked = self.lexer.peek();

        match peeked.kind {
            TokenKind::Keyword(Keyword::Int) => self.parse_declaration(),
            TokenKind::Keyword(Keyword::If) => self.parse_conditional(),
            TokenKind::Keyword(Keyword::Loopc) => self.parse_loop(),
            TokenKind::Identifier => self.parse_assignment(),
            _ => self.unexpected(
                peeked,
                "a declaration, assignment, conditional, or loop",
            ),
        }
    }

    /// "int" IDENTIFIER ( "," IDENTIFIER )* ( "=" expression )? ";"
    fn parse_declaration(&mut self) -> ParseResult<Statement> {
        let int_keyword = self.expect_keyword(Keyword::Int)?;

        // There MUST be at least one name
        let mut names = vec![self.parse_identifier()?];

        while self.next_is(TokenKind::Comma) {
            self.lexer.next();
            names.push(self.parse_identifier()?);
        }

        let initializer = if self.next_is(TokenKind::Equals) {
            self.lexer.next();
            Some(self.parse_expression()?)
        } else {
            None
        };

        let semicolon = self.expect_next_to_be(
            TokenKind::Semicolon,
            "`,`, `=`, or `;` in declaration",
        )?;

        Ok(Statement {
            id: self.create_node_id(),
            span: int_keyword.span.to(semicolon.span),
            kind: StatementKind::Declaration(Box::new(Declaration { names, initializer })),
        })
    }

    /// IDENTIFIER ( "=" | "+=" | "-=" | "*=" | "/=" ) expression ";"
    fn parse_assignment(&mut self) -> ParseResult<Statement> {
        let target = self.parse_identifier()?;
        let operator = self.lexer.next();

        let compound_operator = match operator.kind {
            TokenKind::Equals => None,
            TokenKind::PlusEquals => Some(CompoundOperatorKind::Add),
            TokenKind::MinusEquals => Some(CompoundOperatorKind::Subtract),
            TokenKind::MultiplyEquals => Some(CompoundOperatorKind::Multiply),
            TokenKind::DivideEquals => Some(CompoundOperatorKind::Divide),
            _ => return self.unexpected(operator, "an assignment operator"),
        };

        let value = self.parse_expression()?;
        let semicolon = self.expect_next_to_be(TokenKind::Semicolon, "`;` after assignment")?;
        let span = target.span.to(semicolon.span);

        let kind = match compound_operator {
            Some(kind) => StatementKind::CompoundAssignment(Box::new(CompoundAssignment {
                target,
                operator: CompoundOperator {
                    id: self.create_node_id(),
                    span: operator.span,
                    kind,
                },
                value,
            })),
            None => StatementKind::Assignment(Box::new(Assignment { target, value })),
        };

        Ok(Statement {
            id: self.create_node_id(),
            span,
            kind,
        })
    }

    /// "if" expression ":" body ( "elif" expression ":" body )* ( "else" ":" body )?
    fn parse_conditional(&mut self) -> ParseResult<Statement> {
        let if_keyword = self.expect_keyword(Keyword::If)?;

        let mut branches = vec![self.parse_conditional_branch(if_keyword.span)?];

        while self.next_is(TokenKind::Keyword(Keyword::Elif)) {
            let elif_keyword = self.expect_keyword(Keyword::Elif)?;
            branches.push(self.parse_conditional_branch(elif_keyword.span)?);
        }

        let otherwise = if self.next_is(TokenKind::Keyword(Keyword::Else)) {
            self.expect_keyword(Keyword::Else)?;
            self.expect_next_to_be(TokenKind::Colon, "`:` after `else`")?;
            Some(self.parse_body()?)
        } else {
            None
        };

        let end = otherwise
            .as_ref()
            .map(|body| body.span)
            .or_else(|| branches.last().map(|branch| branch.span))
            .unwrap_or(if_keyword.span);

        Ok(Statement {
            id: self.create_node_id(),
            span: if_keyword.span.to(end),
            kind: StatementKind::Conditional(Box::new(Conditional {
                branches,
                otherwise,
            })),
        })
    }

    // expression ":" body (after the `if` or `elif` keyword)
    fn parse_conditional_branch(&mut self, keyword_span: Span) -> ParseResult<ConditionalBranch> {
        let guard = self.parse_expression()?;
        self.expect_next_to_be(TokenKind::Colon, "`:` after condition")?;
        let body = self.parse_body()?;

        Ok(ConditionalBranch {
            id: self.create_node_id(),
            span: keyword_span.to(body.span),
            guard,
            body,
        })
    }

    /// "loopc" expression ":" body
    fn parse_loop(&mut self) -> ParseResult<Statement> {
        let loop_keyword = self.expect_keyword(Keyword::Loopc)?;
        let guard = self.parse_expression()?;
        self.expect_next_to_be(TokenKind::Colon, "`:` after loop condition")?;
        let body = self.parse_body()?;

        Ok(Statement {
            id: self.create_node_id(),
            span: loop_keyword.span.to(body.span),
            kind: StatementKind::Loop(Box::new(Loop { guard, body })),
        })
    }

    /// "begin" ( assignment )* "end"
    fn parse_body(&mut self) -> ParseResult<Body> {
        let begin_keyword = self.expect_keyword(Keyword::Begin)?;
        let mut statements = Vec::new();

        loop {
            let peeked = self.lexer.peek();

            match peeked.kind {
                TokenKind::Keyword(Keyword::End) => break,
                TokenKind::Identifier => statements.push(self.parse_assignment()?),
                _ => return self.unexpected(peeked, "an assignment or `end`"),
            }
        }

        let end_keyword = self.expect_keyword(Keyword::End)?;

        Ok(Body {
            id: self.create_node_id(),
            span: begin_keyword.span.to(end_keyword.span),
            statements,
        })
    }

    fn parse_identifier(&mut self) -> ParseResult<Identifier> {
        let token = self.expect_next_to_be(TokenKind::Identifier, "an identifier")?;

        Ok(Identifier {
            id: self.create_node_id(),
            span: token.span,
            name: self.lexer.source().value_of_span(token.span).to_owned(),
        })
    }

    /// expression       -> logical_or
    /// logical_or       -> logical_and ( "or" logical_and )*
    /// logical_and      -> equality ( "and" equality )*
    /// equality         -> inclusive_order ( ( "==" | "!=" ) inclusive_order )*
    /// inclusive_order  -> strict_order ( ( ">=" | "<=" ) strict_order )*
    /// strict_order     -> term ( ( ">" | "<" ) term )*
    /// term             -> factor ( ( "+" | "-" ) factor )*
    /// factor           -> power ( ( "*" | "/" | "%" ) power )*
    /// power            -> atom ( "^" power )?
    /// atom             -> IDENTIFIER | NUMBER | "(" expression ")"
    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_logical_or_expression()
    }

    /// Folds `next ( operator next )*` into a left associative chain
    fn parse_binary_level(
        &mut self,
        next: fn(&mut Self) -> ParseResult<Expression>,
        operator_for: fn(TokenKind) -> Option<BinaryOperatorKind>,
    ) -> ParseResult<Expression> {
        let outer_depth = self.depth;
        let mut expression = next(self)?;

        while let Some(kind) = operator_for(self.lexer.peek().kind) {
            let operator = self.lexer.next();
            // Every fold puts the chain so far one level further down
            self.nest(operator.span)?;
            let rhs = next(self)?;

            expression = Expression {
                id: self.create_node_id(),
                span: expression.span.to(rhs.span),
                kind: ExpressionKind::Binary {
                    lhs: Box::new(expression),
                    operator: BinaryOperator {
                        id: self.create_node_id(),
                        span: operator.span,
                        kind,
                    },
                    rhs: Box::new(rhs),
                },
            };
        }

        self.depth = outer_depth;

        Ok(expression)
    }

    fn parse_logical_or_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_logical_and_expression, |kind| {
            (kind == TokenKind::Keyword(Keyword::Or)).then_some(BinaryOperatorKind::LogicalOr)
        })
    }

    fn parse_logical_and_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_equality_expression, |kind| {
            (kind == TokenKind::Keyword(Keyword::And)).then_some(BinaryOperatorKind::LogicalAnd)
        })
    }

    fn parse_equality_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_inclusive_order_expression, |kind| match kind {
            TokenKind::DoubleEquals => Some(BinaryOperatorKind::Equals),
            TokenKind::NotEquals => Some(BinaryOperatorKind::NotEquals),
            _ => None,
        })
    }

    fn parse_inclusive_order_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_strict_order_expression, |kind| match kind {
            TokenKind::GreaterThanOrEqualTo => Some(BinaryOperatorKind::GreaterThanOrEqualTo),
            TokenKind::LessThanOrEqualTo => Some(BinaryOperatorKind::LessThanOrEqualTo),
            _ => None,
        })
    }

    fn parse_strict_order_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_term_expression, |kind| match kind {
            TokenKind::GreaterThan => Some(BinaryOperatorKind::GreaterThan),
            TokenKind::LessThan => Some(BinaryOperatorKind::LessThan),
            _ => None,
        })
    }

    fn parse_term_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_factor_expression, |kind| match kind {
            TokenKind::Plus => Some(BinaryOperatorKind::Add),
            TokenKind::Minus => Some(BinaryOperatorKind::Subtract),
            _ => None,
        })
    }

    fn parse_factor_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_power_expression, |kind| match kind {
            TokenKind::Asterisk => Some(BinaryOperatorKind::Multiply),
            TokenKind::Divide => Some(BinaryOperatorKind::Divide),
            TokenKind::Modulus => Some(BinaryOperatorKind::Modulus),
            _ => None,
        })
    }

    /// Right associative: `2 ^ 3 ^ 2` is `2 ^ (3 ^ 2)`
    fn parse_power_expression(&mut self) -> ParseResult<Expression> {
        let base = self.parse_atomic_expression()?;

        if !self.next_is(TokenKind::Caret) {
            return Ok(base);
        }

        let operator = self.lexer.next();
        self.nest(operator.span)?;
        let exponent = self.parse_power_expression()?;
        self.depth -= 1;

        Ok(Expression {
            id: self.create_node_id(),
            span: base.span.to(exponent.span),
            kind: ExpressionKind::Binary {
                lhs: Box::new(base),
                operator: BinaryOperator {
                    id: self.create_node_id(),
                    span: operator.span,
                    kind: BinaryOperatorKind::Power,
                },
                rhs: Box::new(exponent),
            },
        })
    }

    fn parse_atomic_expression(&mut self) -> ParseResult<Expression> {
        let token = self.lexer.next();

        let literal = match token.kind {
            TokenKind::Identifier => Literal::Identifier(Identifier {
                id: self.create_node_id(),
                span: token.span,
                name: self.lexer.source().value_of_span(token.span).to_owned(),
            }),
            TokenKind::IntegerLiteral => {
                let text = self.lexer.source().value_of_span(token.span);

                match text.parse::<i32>() {
                    Ok(value) => Literal::Integer(value),
                    Err(_) => {
                        return self.syntax_error(
                            token.span,
                            format!("Integer literal `{text}` does not fit in 32 bits"),
                        );
                    }
                }
            }
            TokenKind::OpenParen => {
                self.nest(token.span)?;
                let mut expression = self.parse_expression()?;
                let close_paren =
                    self.expect_next_to_be(TokenKind::CloseParen, "`)` to close grouping")?;
                self.depth -= 1;

                // The grouping covers its parentheses but is otherwise the
                // inner expression
                expression.span = token.span.to(close_paren.span);
                return Ok(expression);
            }
            _ => return self.unexpected(token, "an identifier, integer, or `(`"),
        };

        Ok(Expression {
            id: self.create_node_id(),
            span: token.span,
            kind: ExpressionKind::Literal(literal),
        })
    }
}
