//! Compiler for the GSM expression language.
//!
//! Program text is parsed into a syntax tree, statements that cannot reach the
//! sentinel output variable are removed, names are checked, and the tree is
//! lowered to a typed IR module with a single `main` procedure. The only
//! observable effect of a generated program is the `write(i32)` call made
//! after every store.

use tracing::info;

use crate::{
    error::CompileError,
    frontend::{SourceFile, ast::Program, parser::Parser},
    middle::{ir, optimization::dead_code::eliminate_dead_code, resolve},
};

pub mod error;
pub mod frontend;
pub mod index;
pub mod middle;

/// Knobs shared by every stage of one compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Run dead code elimination before checking names
    pub optimize: bool,
    /// Output variable whose liveness seeds dead code elimination. It is
    /// implicitly declared and zero initialized.
    pub sentinel: String,
    pub module_name: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            sentinel: "result".to_owned(),
            module_name: "calc.expr".to_owned(),
        }
    }
}

/// Parses, optimizes and checks a program, stopping before code generation
pub fn analyze(source: &SourceFile, options: &CompileOptions) -> Result<Program, CompileError> {
    let program = Parser::parse_program(source)?;
    info!(statements = program.statements.len(), "parsed");

    let program = if options.optimize {
        let program = eliminate_dead_code(program, &options.sentinel);
        info!(statements = program.statements.len(), "optimized");
        program
    } else {
        program
    };

    resolve::check(&program, options)?;
    info!("names resolved");

    Ok(program)
}

/// Runs the whole pipeline on one program
pub fn compile(source: &SourceFile, options: &CompileOptions) -> Result<ir::Module, CompileError> {
    let program = analyze(source, options)?;

    let module = ir::ast_lowering::lower(&program, options)?;
    info!(module = %module.name, blocks = module.entry.blocks.len(), "generated module");

    Ok(module)
}
