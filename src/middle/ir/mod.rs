//! Typed IR. Expression trees are flattened into instructions over virtual
//! registers, variables live in storage cells, and conditionals and loops
//! become basic blocks joined by branches and jumps.

use std::collections::BTreeSet;

use strum::Display;

use crate::index::{IndexVec, simple_index};

pub mod ast_lowering;
pub mod interpret;
pub mod pretty_print;

/// Name of the external observation intrinsic
pub const WRITE_FUNCTION: &str = "write";

/// Name of the generated entry procedure
pub const ENTRY_FUNCTION: &str = "main";

#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub external_functions: Vec<ExternalFunction>,
    pub entry: FunctionDefinition,
}

impl Module {
    pub fn external_function(&self, name: &str) -> Option<&ExternalFunction> {
        self.external_functions.iter().find(|f| f.name == name)
    }
}

/// A function provided by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalFunction {
    pub name: String,
    pub parameters: Vec<Type>,
    /// `None` for `void`
    pub return_type: Option<Type>,
}

#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub name: String,
    pub parameters: Vec<RegisterId>,
    pub return_type: Type,
    /// Allocated virtual registers used to store temporary data
    pub registers: IndexVec<RegisterId, Register>,
    /// One mutable storage cell per declared variable
    pub cells: IndexVec<CellId, Cell>,
    /// The first block is the entry block
    pub blocks: IndexVec<BlockId, Block>,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub instructions: Vec<Instruction>,
    pub predecessors: BTreeSet<BlockId>,
}

impl Block {
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }
}

simple_index! {
    /// Identifies an IR block
    pub struct BlockId;
}

impl BlockId {
    pub const ENTRY: Self = Self(0);
}

simple_index! {
    /// Identifies a virtual register which holds a temporary value
    pub struct RegisterId;
}

simple_index! {
    /// Identifies the storage cell of a variable
    pub struct CellId;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub id: RegisterId,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub id: CellId,
    /// Source name of the variable
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Type {
    /// One bit boolean produced by comparisons
    I1,
    I32,
    #[strum(serialize = "ptr")]
    Pointer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Reserves the storage cell of a variable
    Allocate {
        cell: CellId,
    },
    Load {
        destination: RegisterId,
        cell: CellId,
    },
    Store {
        cell: CellId,
        value: Operand,
    },
    BinaryOperation {
        operator: BinaryOperator,
        destination: RegisterId,
        lhs: Operand,
        rhs: Operand,
    },
    Compare {
        predicate: Predicate,
        destination: RegisterId,
        lhs: Operand,
        rhs: Operand,
    },
    /// Widens an `i1` to an `i32`
    ZeroExtend {
        destination: RegisterId,
        operand: Operand,
    },
    Call {
        function: String,
        arguments: Vec<Operand>,
    },
    Branch {
        condition: Operand,
        positive: BlockId,
        negative: BlockId,
    },
    Jump {
        destination: BlockId,
    },
    Return {
        value: Operand,
    },
}

impl Instruction {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Branch { .. } | Self::Jump { .. } | Self::Return { .. }
        )
    }

    /// Blocks control may move to after this instruction
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Self::Branch {
                positive, negative, ..
            } => vec![*positive, *negative],
            Self::Jump { destination } => vec![*destination],
            _ => Vec::new(),
        }
    }
}

/// Binary operations. Arithmetic on `i32` traps on signed overflow, `and` and
/// `or` combine two `i1` values without short circuiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BinaryOperator {
    #[strum(serialize = "add nsw")]
    Add,
    #[strum(serialize = "sub nsw")]
    Subtract,
    #[strum(serialize = "mul nsw")]
    Multiply,
    #[strum(serialize = "sdiv")]
    SignedDivide,
    #[strum(serialize = "srem")]
    SignedRemainder,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
}

impl BinaryOperator {
    /// Type of both operands and of the result
    pub fn operand_type(self) -> Type {
        match self {
            Self::And | Self::Or => Type::I1,
            _ => Type::I32,
        }
    }
}

/// Signed integer comparison predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Predicate {
    Eq,
    Ne,
    Sgt,
    Sge,
    Slt,
    Sle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Immediate {
    I1(bool),
    I32(i32),
}

impl Immediate {
    pub fn ty(self) -> Type {
        match self {
            Immediate::I1(_) => Type::I1,
            Immediate::I32(_) => Type::I32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Immediate(Immediate),
    Register(RegisterId),
}

impl FunctionDefinition {
    pub fn operand_type(&self, operand: Operand) -> Type {
        match operand {
            Operand::Immediate(immediate) => immediate.ty(),
            Operand::Register(register) => self.registers[register].ty,
        }
    }
}
