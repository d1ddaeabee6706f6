//! Executes the entry procedure of a module, collecting every value passed to
//! the observation intrinsic.

use tracing::{debug, trace};

use crate::{
    error::InterpretError,
    index::Index,
    middle::ir::{
        BinaryOperator, BlockId, FunctionDefinition, Immediate, Instruction, Module, Operand,
        Predicate, RegisterId, WRITE_FUNCTION,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpretOptions {
    /// Instructions executed before giving up on a program that never ends
    pub max_steps: usize,
}

impl Default for InterpretOptions {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
        }
    }
}

/// Observable outcome of running a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Arguments of every `write` call, in execution order
    pub writes: Vec<i32>,
    pub return_value: i32,
}

pub fn interpret(module: &Module, options: &InterpretOptions) -> Result<Execution, InterpretError> {
    Interpreter::new(module, options).run()
}

struct Interpreter<'module> {
    module: &'module Module,
    function: &'module FunctionDefinition,
    max_steps: usize,
    steps: usize,
    /// Booleans are held as 0 or 1
    registers: Vec<Option<i32>>,
    cells: Vec<Option<i32>>,
    writes: Vec<i32>,
}

impl<'module> Interpreter<'module> {
    fn new(module: &'module Module, options: &InterpretOptions) -> Self {
        Self {
            module,
            function: &module.entry,
            max_steps: options.max_steps,
            steps: 0,
            registers: vec![None; module.entry.registers.len()],
            cells: vec![None; module.entry.cells.len()],
            writes: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Execution, InterpretError> {
        // argc and argv: one argument, no usable pointer
        for (register, value) in self.function.parameters.iter().zip([1, 0]) {
            self.registers[register.index()] = Some(value);
        }

        let function = self.function;
        let mut block_id = BlockId::ENTRY;

        loop {
            let block = function
                .blocks
                .get(block_id)
                .ok_or(InterpretError::MissingTerminator {
                    block: block_id.index(),
                })?;

            let mut next_block = None;

            for instruction in &block.instructions {
                self.step()?;

                match instruction {
                    Instruction::Branch {
                        condition,
                        positive,
                        negative,
                    } => {
                        next_block = Some(if self.read(*condition)? != 0 {
                            *positive
                        } else {
                            *negative
                        });
                        break;
                    }
                    Instruction::Jump { destination } => {
                        next_block = Some(*destination);
                        break;
                    }
                    Instruction::Return { value } => {
                        let return_value = self.read(*value)?;

                        debug!(
                            steps = self.steps,
                            writes = self.writes.len(),
                            return_value,
                            "execution finished"
                        );

                        return Ok(Execution {
                            writes: self.writes,
                            return_value,
                        });
                    }
                    instruction => self.execute(instruction)?,
                }
            }

            block_id = next_block.ok_or(InterpretError::MissingTerminator {
                block: block_id.index(),
            })?;
        }
    }

    fn step(&mut self) -> Result<(), InterpretError> {
        self.steps += 1;

        if self.steps > self.max_steps {
            return Err(InterpretError::StepLimitExceeded {
                limit: self.max_steps,
            });
        }

        Ok(())
    }

    /// Runs a non terminating instruction
    fn execute(&mut self, instruction: &Instruction) -> Result<(), InterpretError> {
        match instruction {
            Instruction::Allocate { cell } => self.cells[cell.index()] = Some(0),
            Instruction::Load { destination, cell } => {
                let value = self.cells[cell.index()].ok_or_else(|| {
                    InterpretError::UnallocatedCell {
                        name: self.function.cells[*cell].name.clone(),
                    }
                })?;

                self.write_register(*destination, value);
            }
            Instruction::Store { cell, value } => {
                let value = self.read(*value)?;
                let slot = &mut self.cells[cell.index()];

                if slot.is_none() {
                    return Err(InterpretError::UnallocatedCell {
                        name: self.function.cells[*cell].name.clone(),
                    });
                }

                *slot = Some(value);
            }
            Instruction::BinaryOperation {
                operator,
                destination,
                lhs,
                rhs,
            } => {
                let lhs = self.read(*lhs)?;
                let rhs = self.read(*rhs)?;

                self.write_register(*destination, binary_operation(*operator, lhs, rhs)?);
            }
            Instruction::Compare {
                predicate,
                destination,
                lhs,
                rhs,
            } => {
                let lhs = self.read(*lhs)?;
                let rhs = self.read(*rhs)?;

                let result = match predicate {
                    Predicate::Eq => lhs == rhs,
                    Predicate::Ne => lhs != rhs,
                    Predicate::Sgt => lhs > rhs,
                    Predicate::Sge => lhs >= rhs,
                    Predicate::Slt => lhs < rhs,
                    Predicate::Sle => lhs <= rhs,
                };

                self.write_register(*destination, i32::from(result));
            }
            Instruction::ZeroExtend {
                destination,
                operand,
            } => {
                let value = self.read(*operand)?;
                self.write_register(*destination, value);
            }
            Instruction::Call {
                function,
                arguments,
            } => {
                if function != WRITE_FUNCTION || self.module.external_function(function).is_none()
                {
                    return Err(InterpretError::UnknownFunction {
                        name: function.clone(),
                    });
                }

                for argument in arguments {
                    let value = self.read(*argument)?;

                    trace!(value, "write");
                    self.writes.push(value);
                }
            }
            Instruction::Branch { .. } | Instruction::Jump { .. } | Instruction::Return { .. } => {
                unreachable!("terminators are handled by the block loop")
            }
        }

        Ok(())
    }

    fn read(&self, operand: Operand) -> Result<i32, InterpretError> {
        match operand {
            Operand::Immediate(Immediate::I1(value)) => Ok(i32::from(value)),
            Operand::Immediate(Immediate::I32(value)) => Ok(value),
            Operand::Register(register) => {
                self.registers[register.index()].ok_or(InterpretError::UndefinedRegister {
                    register: register.index(),
                })
            }
        }
    }

    fn write_register(&mut self, register: RegisterId, value: i32) {
        self.registers[register.index()] = Some(value);
    }
}

fn binary_operation(operator: BinaryOperator, lhs: i32, rhs: i32) -> Result<i32, InterpretError> {
    let overflow = |operation| InterpretError::Overflow { operation };

    match operator {
        BinaryOperator::Add => lhs.checked_add(rhs).ok_or(overflow("add")),
        BinaryOperator::Subtract => lhs.checked_sub(rhs).ok_or(overflow("sub")),
        BinaryOperator::Multiply => lhs.checked_mul(rhs).ok_or(overflow("mul")),
        BinaryOperator::SignedDivide if rhs == 0 => Err(InterpretError::DivisionByZero),
        BinaryOperator::SignedDivide => lhs.checked_div(rhs).ok_or(overflow("sdiv")),
        BinaryOperator::SignedRemainder if rhs == 0 => Err(InterpretError::DivisionByZero),
        BinaryOperator::SignedRemainder => lhs.checked_rem(rhs).ok_or(overflow("srem")),
        BinaryOperator::And => Ok(lhs & rhs),
        BinaryOperator::Or => Ok(lhs | rhs),
    }
}
