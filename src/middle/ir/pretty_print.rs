use core::fmt::{self, Display, Formatter};

use colored::Colorize;
use itertools::Itertools;

use crate::{
    index::Index,
    middle::ir::{self, FunctionDefinition, Instruction},
};

/// The module text without color escapes, for output that is not a terminal
pub fn to_plain_string(module: &ir::Module) -> String {
    strip_ansi_escapes::strip_str(module.to_string())
}

impl Display for ir::Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", format!("; module {}", self.name).dimmed())?;
        writeln!(f)?;

        for function in &self.external_functions {
            writeln!(
                f,
                "{} {} {}({})",
                "declare".magenta(),
                function
                    .return_type
                    .map_or_else(|| "void".to_owned(), |ty| ty.to_string())
                    .green(),
                format!("@{}", function.name).blue(),
                function.parameters.iter().map(|ty| ty.to_string().green()).join(", ")
            )?;
        }

        writeln!(f)?;

        write!(f, "{}", self.entry)
    }
}

impl Display for FunctionDefinition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} {}({}) {{",
            "define".magenta(),
            self.return_type.to_string().green(),
            format!("@{}", self.name).blue(),
            self.parameters
                .iter()
                .map(|parameter| format!(
                    "{} {parameter}",
                    self.registers[*parameter].ty.to_string().green()
                ))
                .join(", ")
        )?;

        for block in self.blocks.iter() {
            write!(f, "{}", format!("{}:", block.id).bright_red())?;

            if !block.predecessors.is_empty() {
                write!(
                    f,
                    "{}",
                    format!(
                        "  ; preds = {}",
                        block.predecessors.iter().map(|id| id.to_string()).join(", ")
                    )
                    .dimmed()
                )?;
            }

            writeln!(f)?;

            for instruction in &block.instructions {
                write!(f, "    ")?;
                self.fmt_instruction(f, instruction)?;
                writeln!(f)?;
            }
        }

        writeln!(f, "}}")
    }
}

impl FunctionDefinition {
    fn cell_name(&self, cell: ir::CellId) -> String {
        format!("${}", self.cells[cell].name).bright_green().to_string()
    }

    fn fmt_instruction(&self, f: &mut Formatter<'_>, instruction: &Instruction) -> fmt::Result {
        match instruction {
            Instruction::Allocate { cell } => write!(
                f,
                "{} {} {} {}",
                self.cell_name(*cell),
                "=".white(),
                "alloc".cyan(),
                ir::Type::I32.to_string().green()
            ),
            Instruction::Load { destination, cell } => write!(
                f,
                "{destination} {} {} {} {}",
                "=".white(),
                "load".cyan(),
                self.registers[*destination].ty.to_string().green(),
                self.cell_name(*cell)
            ),
            Instruction::Store { cell, value } => write!(
                f,
                "{} {} {} {value}",
                "store".cyan(),
                self.cell_name(*cell),
                "<-".white()
            ),
            Instruction::BinaryOperation {
                operator,
                destination,
                lhs,
                rhs,
            } => write!(
                f,
                "{destination} {} {} {} {lhs}, {rhs}",
                "=".white(),
                operator.to_string().cyan(),
                operator.operand_type().to_string().green()
            ),
            Instruction::Compare {
                predicate,
                destination,
                lhs,
                rhs,
            } => write!(
                f,
                "{destination} {} {} {} {} {lhs}, {rhs}",
                "=".white(),
                "icmp".cyan(),
                predicate.to_string().cyan(),
                self.operand_type(*lhs).to_string().green()
            ),
            Instruction::ZeroExtend {
                destination,
                operand,
            } => write!(
                f,
                "{destination} {} {} {} {operand} {} {}",
                "=".white(),
                "zext".cyan(),
                self.operand_type(*operand).to_string().green(),
                "to".cyan(),
                self.registers[*destination].ty.to_string().green()
            ),
            Instruction::Call {
                function,
                arguments,
            } => write!(
                f,
                "{} {}({})",
                "call".cyan(),
                format!("@{function}").blue(),
                arguments.iter().map(|operand| operand.to_string()).join(", ")
            ),
            Instruction::Branch {
                condition,
                positive,
                negative,
            } => write!(
                f,
                "{} {condition} {} {}",
                "br".cyan(),
                positive.to_string().blue(),
                negative.to_string().blue()
            ),
            Instruction::Jump { destination } => {
                write!(f, "{} {}", "jmp".cyan(), destination.to_string().blue())
            }
            Instruction::Return { value } => write!(f, "{} {value}", "ret".cyan()),
        }
    }
}

impl Display for ir::RegisterId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("%{}", self.index()).yellow())
    }
}

impl Display for ir::BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, ".label_{}", self.index())
    }
}

impl Display for ir::Immediate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ir::Immediate::I1(value) => write!(f, "{value}"),
            ir::Immediate::I32(value) => write!(f, "{value}"),
        }
    }
}

impl Display for ir::Operand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ir::Operand::Immediate(immediate) => write!(f, "{}", immediate.to_string().purple()),
            ir::Operand::Register(register) => write!(f, "{register}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{
        CompileOptions,
        frontend::{SourceFile, parser::Parser},
        middle::ir::ast_lowering::lower,
    };

    fn print(text: &str) -> String {
        let source = SourceFile::in_memory(text);
        let program = Parser::parse_program(&source).expect("program should parse");
        let module = lower(&program, &CompileOptions::default()).expect("lowering should succeed");

        to_plain_string(&module)
    }

    #[test]
    fn straight_line_program() {
        assert_eq!(
            print("int a = 7; result = a;"),
            indoc! {"
                ; module calc.expr

                declare void @write(i32)

                define i32 @main(i32 %0, ptr %1) {
                .label_0:
                    $result = alloc i32
                    store $result <- 0
                    $a = alloc i32
                    store $a <- 7
                    call @write(7)
                    %2 = load i32 $a
                    store $result <- %2
                    call @write(%2)
                    ret 0
                }
            "}
        );
    }

    #[test]
    fn loop_blocks_and_predecessors() {
        assert_eq!(
            print("loopc result < 3: begin result += 1; end"),
            indoc! {"
                ; module calc.expr

                declare void @write(i32)

                define i32 @main(i32 %0, ptr %1) {
                .label_0:
                    $result = alloc i32
                    store $result <- 0
                    jmp .label_1
                .label_1:  ; preds = .label_0, .label_2
                    %2 = load i32 $result
                    %3 = icmp slt i32 %2, 3
                    br %3 .label_2 .label_3
                .label_2:  ; preds = .label_1
                    %4 = load i32 $result
                    %5 = add nsw i32 %4, 1
                    store $result <- %5
                    call @write(%5)
                    jmp .label_1
                .label_3:  ; preds = .label_1
                    ret 0
                }
            "}
        );
    }

    #[test]
    fn booleans_are_widened_before_being_stored() {
        let printed = print("result = 1 and 0;");

        assert!(printed.contains("%2 = icmp ne i32 1, 0"));
        assert!(printed.contains("%3 = icmp ne i32 0, 0"));
        assert!(printed.contains("%4 = and i1 %2, %3"));
        assert!(printed.contains("%5 = zext i1 %4 to i32"));
        assert!(printed.contains("store $result <- %5"));
    }
}
