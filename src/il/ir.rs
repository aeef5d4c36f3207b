//! The three-address intermediate representation.
use std::fmt::{self, Display, Formatter};

use crate::parser::syntax_tree::{BinOp, Relop};

use super::list::InstrId;

/// Word size of the target, in bytes.
pub const WORD: u32 = 4;

/// A value reference inside an instruction.
///
/// `Temp`, `Variable` and `VAddress` ids are handed out monotonically and
/// never reused; two such operands are the same storage iff their kind and
/// id match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// No result wanted. Only legal as a caller-supplied destination,
    /// meaning "evaluate for side effects and discard the value".
    Null,
    /// A compiler-generated temporary.
    Temp(u32),
    /// A scalar variable.
    Variable(u32),
    /// The address of a non-scalar (array or struct) variable.
    VAddress(u32),
    /// A non-scalar variable's storage block.
    MemBlock { id: u32, size: u32 },
    /// An integer literal.
    Constant(i32),
}
impl Operand {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}
impl Display for Operand {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Null => f.write_str("_"),
            Self::Temp(id) => write!(f, "t{}", id),
            Self::Variable(id) => write!(f, "v{}", id),
            Self::VAddress(id) => write!(f, "&v{}", id),
            Self::MemBlock { id, .. } => write!(f, "v{}", id),
            Self::Constant(value) => write!(f, "#{}", value),
        }
    }
}

/// A jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(pub u32);
impl Display for Label {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "label{}", self.0)
    }
}

/// A single IR instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    /// A jump target.
    Label(Label),
    /// Start of a function; `frame_size` is patched by the storage
    /// allocator once the function's locals are known.
    Function { name: String, frame_size: u32 },
    Assign {
        dst: Operand,
        src: Operand,
    },
    Bin {
        op: BinOp,
        dst: Operand,
        lhs: Operand,
        rhs: Operand,
    },
    /// Read a word through an address.
    Load {
        dst: Operand,
        addr: Operand,
    },
    /// Write a word through an address.
    Store {
        addr: Operand,
        src: Operand,
    },
    Jump {
        target: Label,
    },
    JumpIf {
        lhs: Operand,
        op: Relop,
        rhs: Operand,
        target: Label,
    },
    /// Return from the current function. `function` is a back-reference to
    /// the enclosing `Function` instruction, filled in by the storage
    /// allocator so the emitter knows the frame size to pop.
    Return {
        value: Operand,
        function: Option<InstrId>,
    },
    /// Reserve `size` bytes of storage for a non-scalar variable.
    Dec {
        var: Operand,
        size: u32,
    },
    /// Pass one argument to the next `Call`.
    Arg {
        value: Operand,
    },
    Call {
        dst: Operand,
        function: String,
    },
    /// Receive one parameter in signature order.
    Param {
        var: Operand,
    },
    Read {
        dst: Operand,
    },
    Write {
        value: Operand,
    },
}
impl Display for Instr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Label(label) => write!(f, "LABEL {} :", label),
            Self::Function { name, .. } => write!(f, "FUNCTION {} :", name),
            Self::Assign { dst, src } => write!(f, "{} := {}", dst, src),
            Self::Bin { op, dst, lhs, rhs } => write!(f, "{} := {} {} {}", dst, lhs, op, rhs),
            Self::Load { dst, addr } => write!(f, "{} := *{}", dst, addr),
            Self::Store { addr, src } => write!(f, "*{} := {}", addr, src),
            Self::Jump { target } => write!(f, "GOTO {}", target),
            Self::JumpIf {
                lhs,
                op,
                rhs,
                target,
            } => write!(f, "IF {} {} {} GOTO {}", lhs, op, rhs, target),
            Self::Return { value, .. } => write!(f, "RETURN {}", value),
            Self::Dec { var, size } => write!(f, "DEC {} {}", var, size),
            Self::Arg { value } => write!(f, "ARG {}", value),
            Self::Call { dst, function } => write!(f, "{} := CALL {}", dst, function),
            Self::Param { var } => write!(f, "PARAM {}", var),
            Self::Read { dst } => write!(f, "READ {}", dst),
            Self::Write { value } => write!(f, "WRITE {}", value),
        }
    }
}
