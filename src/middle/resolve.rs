use hashbrown::HashMap;
use tracing::debug;

use crate::{
    CompileOptions,
    error::{Diagnostic, SemanticError},
    frontend::{
        ast::{
            Body, Declaration, Expression, ExpressionKind, Identifier, Literal, Program,
            Statement, StatementKind,
        },
        lexer::Span,
    },
};

/// Checks that every identifier in the program refers to a declared variable
pub fn check(program: &Program, options: &CompileOptions) -> Result<(), SemanticError> {
    Resolver::resolve_names(program, &options.sentinel)
}

/// How a name came to be bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    /// The sentinel is usable before any declaration of it
    Implicit,
    Declared(Span),
}

/// Program name resolver
///
/// The language has a single flat scope: bodies may only assign, so every
/// binding comes from a top level declaration.
#[derive(Debug)]
struct Resolver {
    bindings: HashMap<String, Binding>,
    diagnostics: Vec<Diagnostic>,
}

impl Resolver {
    fn resolve_names(program: &Program, sentinel: &str) -> Result<(), SemanticError> {
        let mut resolver = Self {
            bindings: HashMap::new(),
            diagnostics: Vec::new(),
        };

        resolver
            .bindings
            .insert(sentinel.to_owned(), Binding::Implicit);

        for statement in &program.statements {
            resolver.resolve_statement(statement);
        }

        debug!(
            bindings = resolver.bindings.len(),
            errors = resolver.diagnostics.len(),
            "resolved names"
        );

        if resolver.diagnostics.is_empty() {
            Ok(())
        } else {
            Err(SemanticError {
                diagnostics: resolver.diagnostics,
            })
        }
    }

    fn report_duplicate_binding(&mut self, name: &Identifier) {
        self.diagnostics.push(Diagnostic::new(
            name.span,
            format!("Conflicting definition for identifier `{}`", name.name),
        ));
    }

    fn report_unresolved(&mut self, name: &Identifier) {
        self.diagnostics.push(Diagnostic::new(
            name.span,
            format!("Unresolved name for identifier `{}`", name.name),
        ));
    }

    fn resolve_statement(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::Declaration(declaration) => self.resolve_declaration(declaration),
            StatementKind::Assignment(assignment) => {
                self.resolve_expression(&assignment.value);
                self.resolve_identifier(&assignment.target);
            }
            StatementKind::CompoundAssignment(assignment) => {
                self.resolve_expression(&assignment.value);
                self.resolve_identifier(&assignment.target);
            }
            StatementKind::Conditional(conditional) => {
                for branch in &conditional.branches {
                    self.resolve_expression(&branch.guard);
                    self.resolve_body(&branch.body);
                }

                if let Some(otherwise) = &conditional.otherwise {
                    self.resolve_body(otherwise);
                }
            }
            StatementKind::Loop(l) => {
                self.resolve_expression(&l.guard);
                self.resolve_body(&l.body);
            }
        }
    }

    fn resolve_body(&mut self, body: &Body) {
        for statement in &body.statements {
            self.resolve_statement(statement);
        }
    }

    fn resolve_declaration(&mut self, declaration: &Declaration) {
        // Check the initializer first, the declared names are not visible
        // inside it
        if let Some(initializer) = &declaration.initializer {
            self.resolve_expression(initializer);
        }

        for name in &declaration.names {
            match self.bindings.get(&name.name).copied() {
                Some(Binding::Declared(_)) => self.report_duplicate_binding(name),
                Some(Binding::Implicit) | None => {
                    self.bindings
                        .insert(name.name.clone(), Binding::Declared(name.span));
                }
            }
        }
    }

    fn resolve_expression(&mut self, expression: &Expression) {
        match &expression.kind {
            ExpressionKind::Literal(Literal::Identifier(identifier)) => {
                self.resolve_identifier(identifier)
            }
            ExpressionKind::Literal(Literal::Integer(_)) => {}
            ExpressionKind::Binary { lhs, operator: _, rhs } => {
                self.resolve_expression(lhs);
                self.resolve_expression(rhs);
            }
        }
    }

    fn resolve_identifier(&mut self, identifier: &Identifier) {
        if !self.bindings.contains_key(&identifier.name) {
            self.report_unresolved(identifier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{SourceFile, parser::Parser};

    fn check_text(text: &str) -> Result<(), SemanticError> {
        let source = SourceFile::in_memory(text);
        let program = Parser::parse_program(&source).expect("program should parse");

        check(&program, &CompileOptions::default())
    }

    fn messages(error: SemanticError) -> Vec<String> {
        error.diagnostics.into_iter().map(|d| d.message).collect()
    }

    #[test]
    fn declared_names_resolve() {
        assert!(check_text("int a, b = 1; b = a + 2; result = a * b;").is_ok());
    }

    #[test]
    fn sentinel_is_implicitly_declared_and_may_be_declared_once() {
        assert!(check_text("result = 1;").is_ok());
        assert!(check_text("int result = 1; result += 1;").is_ok());

        let error = check_text("int result; int result;").expect_err("declared twice");
        assert_eq!(
            messages(error),
            ["Conflicting definition for identifier `result`"]
        );
    }

    #[test]
    fn undeclared_reads_and_targets_are_reported_together() {
        let error = check_text("a = 1; result = b + c;").expect_err("undeclared names");

        assert_eq!(
            messages(error),
            [
                "Unresolved name for identifier `a`",
                "Unresolved name for identifier `b`",
                "Unresolved name for identifier `c`",
            ]
        );
    }

    #[test]
    fn duplicate_names_within_one_declaration() {
        let error = check_text("int a, a = 3;").expect_err("duplicate name");

        assert_eq!(error.diagnostics.len(), 1);
        assert_eq!(error.diagnostics[0].span, Span::new(7, 8));
    }

    #[test]
    fn declaration_is_not_visible_in_its_own_initializer() {
        let error = check_text("int a = a;").expect_err("self reference");

        assert_eq!(messages(error), ["Unresolved name for identifier `a`"]);
    }

    #[test]
    fn names_inside_conditionals_and_loops_are_checked() {
        let error = check_text(
            "int a; if a > 0: begin b = 1; end else: begin a = c; end loopc d: begin a += 1; end",
        )
        .expect_err("undeclared names in bodies");

        assert_eq!(error.diagnostics.len(), 3);
    }

    #[test]
    fn custom_sentinel_is_the_implicit_name() {
        let source = SourceFile::in_memory("out = 1;");
        let program = Parser::parse_program(&source).expect("program should parse");
        let options = CompileOptions {
            sentinel: "out".to_owned(),
            ..CompileOptions::default()
        };

        assert!(check(&program, &options).is_ok());
        assert!(check(&program, &CompileOptions::default()).is_err());
    }
}
