//! Renders the tree back into source form. Nested binary expressions are
//! parenthesised so the output parses back into the same shape.

use core::fmt::{self, Display, Formatter};

use itertools::Itertools;

use super::{
    Body, Expression, ExpressionKind, Literal, Program, Statement, StatementKind,
};

const INDENT: &str = "    ";

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for statement in &self.statements {
            writeln!(f, "{statement}")?;
        }

        Ok(())
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StatementKind::Declaration(declaration) => {
                write!(
                    f,
                    "int {}",
                    declaration.names.iter().map(|name| &name.name).join(", ")
                )?;

                if let Some(initializer) = &declaration.initializer {
                    write!(f, " = {initializer}")?;
                }

                write!(f, ";")
            }
            StatementKind::Assignment(assignment) => {
                write!(f, "{} = {};", assignment.target.name, assignment.value)
            }
            StatementKind::CompoundAssignment(assignment) => write!(
                f,
                "{} {} {};",
                assignment.target.name, assignment.operator.kind, assignment.value
            ),
            StatementKind::Conditional(conditional) => {
                for (i, branch) in conditional.branches.iter().enumerate() {
                    let keyword = if i == 0 { "if" } else { " elif" };
                    write!(f, "{keyword} {}: {}", branch.guard, branch.body)?;
                }

                if let Some(otherwise) = &conditional.otherwise {
                    write!(f, " else: {otherwise}")?;
                }

                Ok(())
            }
            StatementKind::Loop(l) => write!(f, "loopc {}: {}", l.guard, l.body),
        }
    }
}

impl Display for Body {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "begin")?;

        for statement in &self.statements {
            writeln!(f, "{INDENT}{statement}")?;
        }

        write!(f, "end")
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExpressionKind::Literal(Literal::Identifier(identifier)) => {
                write!(f, "{}", identifier.name)
            }
            ExpressionKind::Literal(Literal::Integer(value)) => write!(f, "{value}"),
            ExpressionKind::Binary { lhs, operator, rhs } => {
                write_operand(f, lhs)?;
                write!(f, " {} ", operator.kind)?;
                write_operand(f, rhs)
            }
        }
    }
}

fn write_operand(f: &mut Formatter<'_>, operand: &Expression) -> fmt::Result {
    match operand.kind {
        ExpressionKind::Binary { .. } => write!(f, "({operand})"),
        ExpressionKind::Literal(_) => write!(f, "{operand}"),
    }
}
