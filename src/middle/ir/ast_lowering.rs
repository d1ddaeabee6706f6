use std::collections::BTreeSet;

use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::{
    CompileOptions,
    error::LoweringError,
    frontend::ast::{
        self, BinaryOperatorClass, BinaryOperatorKind, Body, CompoundAssignment, Conditional,
        Declaration, Expression, ExpressionKind, Identifier, Literal, Loop, Program, Statement,
        StatementKind,
    },
    index::{Index, IndexVec},
    middle::ir::{
        self, BinaryOperator, Block, BlockId, Cell, CellId, ENTRY_FUNCTION, ExternalFunction,
        Immediate, Instruction, Operand, Predicate, Register, RegisterId, Type, WRITE_FUNCTION,
    },
};

/// Exponentiation is unrolled into this many multiplications at most
pub const MAX_EXPONENT: u32 = 64;

/// Lowers a checked program into a module with a single entry procedure
pub fn lower(program: &Program, options: &CompileOptions) -> Result<ir::Module, LoweringError> {
    let mut context = LoweringContext::new();

    let parameters = vec![
        context.create_register(Type::I32),
        context.create_register(Type::Pointer),
    ];

    // The sentinel is readable before any declaration of it
    let sentinel = context.declare_cell(&options.sentinel);
    context.store(sentinel, Operand::Immediate(Immediate::I32(0)));

    for statement in &program.statements {
        context.lower_statement(statement)?;
    }

    // Computation results never reach the exit code
    context.push_instruction(Instruction::Return {
        value: Operand::Immediate(Immediate::I32(0)),
    });

    debug!(
        blocks = context.blocks.len(),
        registers = context.registers.len(),
        cells = context.cells.len(),
        "lowered program"
    );

    Ok(ir::Module {
        name: options.module_name.clone(),
        external_functions: vec![ExternalFunction {
            name: WRITE_FUNCTION.to_owned(),
            parameters: vec![Type::I32],
            return_type: None,
        }],
        entry: ir::FunctionDefinition {
            name: ENTRY_FUNCTION.to_owned(),
            parameters,
            return_type: Type::I32,
            registers: context.registers,
            cells: context.cells,
            blocks: context.blocks,
        },
    })
}

/// Per compilation lowering state. The name to cell map lives exactly as long
/// as the lowering of one program.
struct LoweringContext {
    registers: IndexVec<RegisterId, Register>,
    cells: IndexVec<CellId, Cell>,
    cell_map: HashMap<String, CellId>,
    blocks: IndexVec<BlockId, Block>,
    /// Block instructions are currently appended to
    current_block: BlockId,
}

impl LoweringContext {
    fn new() -> Self {
        let mut context = Self {
            registers: IndexVec::new(),
            cells: IndexVec::new(),
            cell_map: HashMap::new(),
            blocks: IndexVec::new(),
            current_block: BlockId::ENTRY,
        };

        context.create_block();
        context
    }

    fn create_register(&mut self, ty: Type) -> RegisterId {
        let id = self.registers.next_index();
        self.registers.push(Register { id, ty })
    }

    fn create_block(&mut self) -> BlockId {
        let id = self.blocks.next_index();
        self.blocks.push(Block {
            id,
            instructions: Vec::new(),
            predecessors: BTreeSet::new(),
        })
    }

    /// Creates a block entered from `predecessor`
    fn create_block_after(&mut self, predecessor: BlockId) -> BlockId {
        let id = self.create_block();
        self.blocks[id].predecessors.insert(predecessor);
        id
    }

    fn push_instruction(&mut self, instruction: Instruction) {
        self.blocks[self.current_block]
            .instructions
            .push(instruction);
    }

    fn jump(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from]
            .instructions
            .push(Instruction::Jump { destination: to });
        self.blocks[to].predecessors.insert(from);
    }

    fn operand_type(&self, operand: Operand) -> Type {
        match operand {
            Operand::Immediate(immediate) => immediate.ty(),
            Operand::Register(register) => self.registers[register].ty,
        }
    }

    /// Allocates the cell for a variable on its first declaration. Declaring
    /// it again reuses the cell.
    fn declare_cell(&mut self, name: &str) -> CellId {
        if let Some(cell) = self.cell_map.get(name) {
            return *cell;
        }

        let id = self.cells.next_index();
        let cell = self.cells.push(Cell {
            id,
            name: name.to_owned(),
        });

        self.cell_map.insert(name.to_owned(), cell);
        self.push_instruction(Instruction::Allocate { cell });

        cell
    }

    fn cell_for(&self, identifier: &Identifier) -> Result<CellId, LoweringError> {
        self.cell_map
            .get(&identifier.name)
            .copied()
            .ok_or_else(|| LoweringError::UnknownVariable {
                span: identifier.span,
                name: identifier.name.clone(),
            })
    }

    fn store(&mut self, cell: CellId, value: Operand) {
        self.push_instruction(Instruction::Store { cell, value });
    }

    /// Stores a new value and reports it through the observation intrinsic
    fn store_and_observe(&mut self, cell: CellId, value: Operand) {
        self.store(cell, value);
        self.push_instruction(Instruction::Call {
            function: WRITE_FUNCTION.to_owned(),
            arguments: vec![value],
        });
    }

    fn lower_statement(&mut self, statement: &Statement) -> Result<(), LoweringError> {
        trace!(block = self.current_block.index(), statement = %statement, "lowering statement");

        match &statement.kind {
            StatementKind::Declaration(declaration) => self.lower_declaration(declaration),
            StatementKind::Assignment(assignment) => {
                let cell = self.cell_for(&assignment.target)?;
                let value = self.lower_value(&assignment.value)?;

                self.store_and_observe(cell, value);

                Ok(())
            }
            StatementKind::CompoundAssignment(assignment) => {
                self.lower_compound_assignment(assignment)
            }
            StatementKind::Conditional(conditional) => self.lower_conditional(conditional),
            StatementKind::Loop(l) => self.lower_loop(l),
        }
    }

    fn lower_declaration(&mut self, declaration: &Declaration) -> Result<(), LoweringError> {
        // The initializer runs once and every declared name receives its value
        let value = declaration
            .initializer
            .as_ref()
            .map(|initializer| self.lower_value(initializer))
            .transpose()?;

        for name in &declaration.names {
            let cell = self.declare_cell(&name.name);

            match value {
                Some(value) => self.store_and_observe(cell, value),
                None => self.store(cell, Operand::Immediate(Immediate::I32(0))),
            }
        }

        Ok(())
    }

    fn lower_compound_assignment(
        &mut self,
        assignment: &CompoundAssignment,
    ) -> Result<(), LoweringError> {
        // Read and write back through the target's own cell
        let cell = self.cell_for(&assignment.target)?;

        let current = self.create_register(Type::I32);
        self.push_instruction(Instruction::Load {
            destination: current,
            cell,
        });

        let operand = self.lower_value(&assignment.value)?;

        let destination = self.create_register(Type::I32);
        self.push_instruction(Instruction::BinaryOperation {
            operator: arithmetic_operator(assignment.operator.kind.arithmetic()),
            destination,
            lhs: Operand::Register(current),
            rhs: operand,
        });

        self.store_and_observe(cell, Operand::Register(destination));

        Ok(())
    }

    /// Every guard is tested in its own block. A true guard runs its body
    /// and jumps to the shared merge block, a false one falls to the next
    /// test, then to the `else` body if there is one.
    fn lower_conditional(&mut self, conditional: &Conditional) -> Result<(), LoweringError> {
        let mut exits = Vec::with_capacity(conditional.branches.len() + 1);

        for branch in &conditional.branches {
            let condition = self.lower_condition(&branch.guard)?;
            let test_block = self.current_block;

            let positive = self.create_block_after(test_block);
            let negative = self.create_block_after(test_block);

            self.push_instruction(Instruction::Branch {
                condition,
                positive,
                negative,
            });

            self.current_block = positive;
            self.lower_body(&branch.body)?;
            exits.push(self.current_block);

            self.current_block = negative;
        }

        let merge_block = match &conditional.otherwise {
            Some(otherwise) => {
                self.lower_body(otherwise)?;
                exits.push(self.current_block);

                self.create_block()
            }
            // Without an else the last negative edge lands on the merge point
            None => self.current_block,
        };

        for exit in exits {
            self.jump(exit, merge_block);
        }

        self.current_block = merge_block;

        Ok(())
    }

    /// Pre-test loop: test block, body jumping back to the test, exit block
    fn lower_loop(&mut self, l: &Loop) -> Result<(), LoweringError> {
        let entry_block = self.current_block;
        let test_block = self.create_block();
        self.jump(entry_block, test_block);

        self.current_block = test_block;
        let condition = self.lower_condition(&l.guard)?;

        let body_block = self.create_block_after(test_block);
        let exit_block = self.create_block_after(test_block);

        self.push_instruction(Instruction::Branch {
            condition,
            positive: body_block,
            negative: exit_block,
        });

        self.current_block = body_block;
        self.lower_body(&l.body)?;
        self.jump(self.current_block, test_block);

        self.current_block = exit_block;

        Ok(())
    }

    fn lower_body(&mut self, body: &Body) -> Result<(), LoweringError> {
        for statement in &body.statements {
            self.lower_statement(statement)?;
        }

        Ok(())
    }

    /// Lowers an expression whose value is stored or used arithmetically
    fn lower_value(&mut self, expression: &Expression) -> Result<Operand, LoweringError> {
        let operand = self.lower_expression(expression)?;

        Ok(self.as_i32(operand))
    }

    /// Lowers an expression used as a condition or logical operand
    fn lower_condition(&mut self, expression: &Expression) -> Result<Operand, LoweringError> {
        let operand = self.lower_expression(expression)?;

        Ok(self.as_i1(operand))
    }

    fn as_i32(&mut self, operand: Operand) -> Operand {
        if self.operand_type(operand) == Type::I32 {
            return operand;
        }

        let destination = self.create_register(Type::I32);
        self.push_instruction(Instruction::ZeroExtend {
            destination,
            operand,
        });

        Operand::Register(destination)
    }

    /// Any non zero integer is true
    fn as_i1(&mut self, operand: Operand) -> Operand {
        if self.operand_type(operand) == Type::I1 {
            return operand;
        }

        let destination = self.create_register(Type::I1);
        self.push_instruction(Instruction::Compare {
            predicate: Predicate::Ne,
            destination,
            lhs: operand,
            rhs: Operand::Immediate(Immediate::I32(0)),
        });

        Operand::Register(destination)
    }

    fn lower_expression(&mut self, expression: &Expression) -> Result<Operand, LoweringError> {
        match &expression.kind {
            ExpressionKind::Literal(Literal::Integer(value)) => {
                Ok(Operand::Immediate(Immediate::I32(*value)))
            }
            ExpressionKind::Literal(Literal::Identifier(identifier)) => {
                let cell = self.cell_for(identifier)?;
                let destination = self.create_register(Type::I32);

                self.push_instruction(Instruction::Load { destination, cell });

                Ok(Operand::Register(destination))
            }
            ExpressionKind::Binary { lhs, operator, rhs } => {
                self.lower_binary_expression(lhs, operator, rhs)
            }
        }
    }

    fn lower_binary_expression(
        &mut self,
        lhs: &Expression,
        operator: &ast::BinaryOperator,
        rhs: &Expression,
    ) -> Result<Operand, LoweringError> {
        if operator.kind == BinaryOperatorKind::Power {
            return self.lower_power(lhs, rhs);
        }

        match operator.kind.class() {
            BinaryOperatorClass::Arithmetic => {
                let lhs = self.lower_value(lhs)?;
                let rhs = self.lower_value(rhs)?;
                let destination = self.create_register(Type::I32);

                self.push_instruction(Instruction::BinaryOperation {
                    operator: arithmetic_operator(operator.kind),
                    destination,
                    lhs,
                    rhs,
                });

                Ok(Operand::Register(destination))
            }
            BinaryOperatorClass::Relational => {
                let lhs = self.lower_value(lhs)?;
                let rhs = self.lower_value(rhs)?;
                let destination = self.create_register(Type::I1);

                self.push_instruction(Instruction::Compare {
                    predicate: comparison_predicate(operator.kind),
                    destination,
                    lhs,
                    rhs,
                });

                Ok(Operand::Register(destination))
            }
            BinaryOperatorClass::Logical => {
                // Both sides are always evaluated
                let lhs = self.lower_condition(lhs)?;
                let rhs = self.lower_condition(rhs)?;
                let destination = self.create_register(Type::I1);

                let operator = match operator.kind {
                    BinaryOperatorKind::LogicalAnd => BinaryOperator::And,
                    _ => BinaryOperator::Or,
                };

                self.push_instruction(Instruction::BinaryOperation {
                    operator,
                    destination,
                    lhs,
                    rhs,
                });

                Ok(Operand::Register(destination))
            }
        }
    }

    /// Unrolls `base ^ n` into `n - 1` multiplications. `n` has to be built
    /// from integer literals and `^` alone and evaluate to at most
    /// `MAX_EXPONENT`.
    fn lower_power(
        &mut self,
        base: &Expression,
        exponent: &Expression,
    ) -> Result<Operand, LoweringError> {
        let Some(value) = constant_power(exponent) else {
            return Err(LoweringError::NonLiteralExponent {
                span: exponent.span,
            });
        };

        let count = u32::try_from(value)
            .ok()
            .filter(|count| *count <= MAX_EXPONENT)
            .ok_or(LoweringError::ExponentTooLarge {
                span: exponent.span,
                value,
                limit: MAX_EXPONENT,
            })?;

        let base = self.lower_value(base)?;

        if count == 0 {
            return Ok(Operand::Immediate(Immediate::I32(1)));
        }

        let mut product = base;

        for _ in 1..count {
            let destination = self.create_register(Type::I32);

            self.push_instruction(Instruction::BinaryOperation {
                operator: BinaryOperator::Multiply,
                destination,
                lhs: product,
                rhs: base,
            });

            product = Operand::Register(destination);
        }

        Ok(product)
    }
}

/// Value of an expression made only of integer literals and `^`. Literals
/// are never negative, so the result saturates instead of overflowing.
fn constant_power(expression: &Expression) -> Option<u64> {
    if let Some(value) = expression.as_integer_literal() {
        return u64::try_from(value).ok();
    }

    match &expression.kind {
        ExpressionKind::Binary { lhs, operator, rhs }
            if operator.kind == BinaryOperatorKind::Power =>
        {
            let base = constant_power(lhs)?;
            let exponent = u32::try_from(constant_power(rhs)?).unwrap_or(u32::MAX);

            Some(base.saturating_pow(exponent))
        }
        _ => None,
    }
}

fn arithmetic_operator(kind: BinaryOperatorKind) -> BinaryOperator {
    match kind {
        BinaryOperatorKind::Add => BinaryOperator::Add,
        BinaryOperatorKind::Subtract => BinaryOperator::Subtract,
        BinaryOperatorKind::Multiply => BinaryOperator::Multiply,
        BinaryOperatorKind::Divide => BinaryOperator::SignedDivide,
        BinaryOperatorKind::Modulus => BinaryOperator::SignedRemainder,
        _ => unreachable!("`{kind}` is not a plain arithmetic operator"),
    }
}

fn comparison_predicate(kind: BinaryOperatorKind) -> Predicate {
    match kind {
        BinaryOperatorKind::Equals => Predicate::Eq,
        BinaryOperatorKind::NotEquals => Predicate::Ne,
        BinaryOperatorKind::GreaterThan => Predicate::Sgt,
        BinaryOperatorKind::GreaterThanOrEqualTo => Predicate::Sge,
        BinaryOperatorKind::LessThan => Predicate::Slt,
        BinaryOperatorKind::LessThanOrEqualTo => Predicate::Sle,
        _ => unreachable!("`{kind}` is not a comparison"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{SourceFile, parser::Parser};

    fn lower_text(text: &str) -> Result<ir::Module, LoweringError> {
        let source = SourceFile::in_memory(text);
        let program = Parser::parse_program(&source).expect("program should parse");

        lower(&program, &CompileOptions::default())
    }

    fn entry_instructions(module: &ir::Module) -> &[Instruction] {
        &module.entry.blocks[BlockId::ENTRY].instructions
    }

    #[test]
    fn entry_signature_and_sentinel_cell() {
        let module = lower_text("").expect("lowering should succeed");

        assert_eq!(module.name, "calc.expr");
        assert_eq!(module.entry.name, "main");
        assert_eq!(module.entry.parameters.len(), 2);
        assert_eq!(module.entry.cells[CellId::new(0)].name, "result");
        assert_eq!(
            entry_instructions(&module),
            [
                Instruction::Allocate {
                    cell: CellId::new(0)
                },
                Instruction::Store {
                    cell: CellId::new(0),
                    value: Operand::Immediate(Immediate::I32(0)),
                },
                Instruction::Return {
                    value: Operand::Immediate(Immediate::I32(0)),
                },
            ]
        );
        assert!(module.external_function("write").is_some());
    }

    #[test]
    fn declaration_without_initializer_is_zeroed_and_not_observed() {
        let module = lower_text("int a, b;").expect("lowering should succeed");

        let calls = entry_instructions(&module)
            .iter()
            .filter(|i| matches!(i, Instruction::Call { .. }))
            .count();

        assert_eq!(calls, 0);
        assert_eq!(module.entry.cells.len(), 3);
    }

    #[test]
    fn compound_assignment_loads_and_stores_the_same_cell() {
        let module = lower_text("int a = 10; a += 3;").expect("lowering should succeed");
        let a = CellId::new(1);

        let tail = &entry_instructions(&module)[5..];

        let [
            Instruction::Load { destination: loaded, cell: load_cell },
            Instruction::BinaryOperation { operator: BinaryOperator::Add, destination: sum, lhs, rhs },
            Instruction::Store { cell: store_cell, value },
            Instruction::Call { arguments, .. },
            Instruction::Return { .. },
        ] = tail
        else {
            panic!("unexpected instruction sequence {tail:#?}");
        };

        assert_eq!(*load_cell, a);
        assert_eq!(*store_cell, a);
        assert_eq!(*lhs, Operand::Register(*loaded));
        assert_eq!(*rhs, Operand::Immediate(Immediate::I32(3)));
        assert_eq!(*value, Operand::Register(*sum));
        assert_eq!(arguments, &[Operand::Register(*sum)]);
    }

    #[test]
    fn conditional_blocks_share_one_merge_point() {
        let module = lower_text(
            "if 1 > 0: begin result = 1; end elif 0: begin result = 2; end else: begin result = 0; end",
        )
        .expect("lowering should succeed");

        // entry, first body, second test, second body, else, merge
        let blocks = &module.entry.blocks;
        assert_eq!(blocks.len(), 6);

        let merge = &blocks[BlockId::new(5)];
        assert_eq!(
            merge.predecessors,
            BTreeSet::from([BlockId::new(1), BlockId::new(3), BlockId::new(4)])
        );
        assert!(matches!(
            merge.terminator(),
            Some(Instruction::Return { .. })
        ));

        for body in [1, 3, 4] {
            assert_eq!(
                blocks[BlockId::new(body)]
                    .terminator()
                    .map(Instruction::successors),
                Some(vec![BlockId::new(5)])
            );
        }
    }

    #[test]
    fn conditional_without_else_falls_through_to_merge() {
        let module =
            lower_text("if 1: begin result = 1; end").expect("lowering should succeed");

        let blocks = &module.entry.blocks;
        assert_eq!(blocks.len(), 3);
        assert_eq!(
            blocks[BlockId::new(2)].predecessors,
            BTreeSet::from([BlockId::ENTRY, BlockId::new(1)])
        );
    }

    #[test]
    fn loop_test_block_is_entered_from_before_and_from_the_body() {
        let module = lower_text("int n = 3; loopc n: begin n -= 1; end")
            .expect("lowering should succeed");

        let blocks = &module.entry.blocks;
        let test = &blocks[BlockId::new(1)];

        assert_eq!(
            test.predecessors,
            BTreeSet::from([BlockId::ENTRY, BlockId::new(2)])
        );
        assert_eq!(
            test.terminator().map(Instruction::successors),
            Some(vec![BlockId::new(2), BlockId::new(3)])
        );
        // `n` is an i32 and has to be compared against zero to branch on it
        assert!(test.instructions.iter().any(|i| matches!(
            i,
            Instruction::Compare {
                predicate: Predicate::Ne,
                ..
            }
        )));
    }

    #[test]
    fn logical_operands_are_both_converted_to_booleans() {
        let module = lower_text("result = 1 and 0;").expect("lowering should succeed");

        let compares = entry_instructions(&module)
            .iter()
            .filter(|i| matches!(i, Instruction::Compare { .. }))
            .count();
        let zero_extends = entry_instructions(&module)
            .iter()
            .filter(|i| matches!(i, Instruction::ZeroExtend { .. }))
            .count();

        assert_eq!(compares, 2);
        assert_eq!(zero_extends, 1);
    }

    #[test]
    fn power_is_unrolled() {
        let module = lower_text("result = 3 ^ 4;").expect("lowering should succeed");

        let multiplies = entry_instructions(&module)
            .iter()
            .filter(|i| {
                matches!(
                    i,
                    Instruction::BinaryOperation {
                        operator: BinaryOperator::Multiply,
                        ..
                    }
                )
            })
            .count();

        assert_eq!(multiplies, 3);

        let module = lower_text("result = 3 ^ 0;").expect("lowering should succeed");
        assert!(entry_instructions(&module).contains(&Instruction::Store {
            cell: CellId::new(0),
            value: Operand::Immediate(Immediate::I32(1)),
        }));
    }

    #[test]
    fn exponent_must_be_a_small_literal() {
        assert!(matches!(
            lower_text("int a = 2; result = 2 ^ a;"),
            Err(LoweringError::NonLiteralExponent { .. })
        ));
        assert!(matches!(
            lower_text("result = 2 ^ 65;"),
            Err(LoweringError::ExponentTooLarge {
                value: 65,
                limit: 64,
                ..
            })
        ));
        assert!(matches!(
            lower_text("int a = 2; result = 2 ^ a ^ 2;"),
            Err(LoweringError::NonLiteralExponent { .. })
        ));
        assert!(matches!(
            lower_text("result = 2 ^ (1 + 1);"),
            Err(LoweringError::NonLiteralExponent { .. })
        ));
    }

    #[test]
    fn chained_exponents_are_folded_before_unrolling() {
        let module = lower_text("result = 2 ^ 3 ^ 2;").expect("lowering should succeed");

        let multiplies = entry_instructions(&module)
            .iter()
            .filter(|i| {
                matches!(
                    i,
                    Instruction::BinaryOperation {
                        operator: BinaryOperator::Multiply,
                        ..
                    }
                )
            })
            .count();

        // 2 ^ 9
        assert_eq!(multiplies, 8);

        // (2 ^ 3) ^ 2 is exactly the limit
        assert!(lower_text("result = 3 ^ (2 ^ 3) ^ 2;").is_ok());
        assert!(lower_text("result = 3 ^ (2 ^ 3) ^ 2 ^ 1 ^ 5;").is_ok());
        assert!(lower_text("result = 3 ^ 5 ^ 3;").is_err());
        assert!(matches!(
            lower_text("result = 2 ^ 9 ^ 9 ^ 9;"),
            Err(LoweringError::ExponentTooLarge { value: u64::MAX, .. })
        ));
        assert!(lower_text("result = 2 ^ 0 ^ 9 ^ 9;").is_ok());
    }

    #[test]
    fn unknown_variable_is_a_lowering_error() {
        assert!(matches!(
            lower_text("result = missing;"),
            Err(LoweringError::UnknownVariable { name, .. }) if name == "missing"
        ));
    }
}
