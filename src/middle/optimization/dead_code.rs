use hashbrown::HashSet;
use tracing::{debug, trace};

use crate::frontend::ast::{
    Body, Expression, ExpressionKind, Literal, Program, Statement, StatementKind,
};

/// Removes top level statements whose value can never reach `sentinel`.
///
/// A single backward scan keeps a set of live names, seeded with the
/// sentinel. A definition of a live name is kept, kills that name, and makes
/// every name read by its right hand side live. Anything else that defines a
/// dead name is dropped without looking at what it reads. Conditionals and
/// loops are always kept and everything they mention becomes live.
///
/// Declarations are additionally kept while a kept statement after them still
/// mentions one of their names, so the result never refers to a variable
/// whose declaration was removed.
pub fn eliminate_dead_code(program: Program, sentinel: &str) -> Program {
    if program.statements.len() <= 1 {
        return program;
    }

    let before = program.statements.len();

    let mut live = HashSet::new();
    live.insert(sentinel.to_owned());

    let mut mentioned = HashSet::new();
    let mut retained = Vec::with_capacity(before);

    for statement in program.statements.into_iter().rev() {
        if is_retained(&statement, &mut live, &mut mentioned) {
            retained.push(statement);
        } else {
            trace!(statement = %statement, "dropped dead statement");
        }
    }

    retained.reverse();

    debug!(before, after = retained.len(), "eliminated dead statements");

    Program {
        statements: retained,
    }
}

/// Decides whether a statement survives and updates the sets for the
/// statements before it
fn is_retained(
    statement: &Statement,
    live: &mut HashSet<String>,
    mentioned: &mut HashSet<String>,
) -> bool {
    match &statement.kind {
        StatementKind::Declaration(declaration) => {
            let defines_live_name = declaration
                .names
                .iter()
                .any(|name| live.contains(&name.name));
            let still_mentioned = declaration
                .names
                .iter()
                .any(|name| mentioned.contains(&name.name));

            if !defines_live_name && !still_mentioned {
                return false;
            }

            for name in &declaration.names {
                live.remove(&name.name);
            }

            if let Some(initializer) = &declaration.initializer {
                // A declaration kept only for its name does not make its
                // initializer's operands live
                if defines_live_name {
                    add_references(initializer, live);
                }

                add_references(initializer, mentioned);
            }

            true
        }
        StatementKind::Assignment(assignment) => {
            if !live.remove(&assignment.target.name) {
                return false;
            }

            add_references(&assignment.value, live);

            mentioned.insert(assignment.target.name.clone());
            add_references(&assignment.value, mentioned);

            true
        }
        StatementKind::CompoundAssignment(assignment) => {
            // Reads its own target, so the target stays live
            if !live.contains(&assignment.target.name) {
                return false;
            }

            add_references(&assignment.value, live);

            mentioned.insert(assignment.target.name.clone());
            add_references(&assignment.value, mentioned);

            true
        }
        StatementKind::Conditional(conditional) => {
            for branch in &conditional.branches {
                add_references(&branch.guard, live);
                add_body_references(&branch.body, live);
            }

            if let Some(otherwise) = &conditional.otherwise {
                add_body_references(otherwise, live);
            }

            mentioned.extend(live.iter().cloned());

            true
        }
        StatementKind::Loop(l) => {
            add_references(&l.guard, live);
            add_body_references(&l.body, live);

            mentioned.extend(live.iter().cloned());

            true
        }
    }
}

/// Adds every name a body assigns or reads
fn add_body_references(body: &Body, names: &mut HashSet<String>) {
    for statement in &body.statements {
        match &statement.kind {
            StatementKind::Assignment(assignment) => {
                names.insert(assignment.target.name.clone());
                add_references(&assignment.value, names);
            }
            StatementKind::CompoundAssignment(assignment) => {
                names.insert(assignment.target.name.clone());
                add_references(&assignment.value, names);
            }
            // Bodies only hold assignments
            StatementKind::Declaration(_)
            | StatementKind::Conditional(_)
            | StatementKind::Loop(_) => {}
        }
    }
}

/// Adds every identifier read by an expression
fn add_references(expression: &Expression, names: &mut HashSet<String>) {
    match &expression.kind {
        ExpressionKind::Literal(Literal::Identifier(identifier)) => {
            names.insert(identifier.name.clone());
        }
        ExpressionKind::Literal(Literal::Integer(_)) => {}
        ExpressionKind::Binary { lhs, rhs, .. } => {
            add_references(lhs, names);
            add_references(rhs, names);
        }
    }
}
