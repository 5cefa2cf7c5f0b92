//! The runtime executes compiled chunks.

use crate::compiler::{bytecode::UnknownOpcode, CompileError};

pub mod interpreter;

/// Capacity of the VM's value stack. The compiler refuses programs that would
/// need more.
pub const STACK_MAX: usize = 256;

#[derive(thiserror::Error, Debug)]
pub enum RuntimeErrorKind {
    #[error("Operand must be a number.")]
    OperandNotNumber,
    #[error("Operands must be numbers.")]
    OperandsNotNumbers,
    #[error("Division by zero.")]
    DivisionByZero,
    // The rest only happen with chunks the compiler did not produce
    #[error("Stack overflow.")]
    StackOverflow,
    #[error("Stack underflow.")]
    StackUnderflow,
    #[error("Dangling object reference #{0}.")]
    DanglingObject(usize),
    #[error("Missing constant {0}.")]
    MissingConstant(u8),
    #[error("Unexpected end of bytecode.")]
    UnexpectedEnd,
    #[error(transparent)]
    UnknownOpcode(#[from] UnknownOpcode),
    #[error("Could not write output: {0}")]
    Io(#[from] std::io::Error),
}

/// An error that aborted a run, with the line of the failing instruction.
#[derive(thiserror::Error, Debug)]
#[error("{kind}\n[line {line}] in script")]
pub struct RuntimeError {
    pub line: usize,
    pub kind: RuntimeErrorKind,
}

/// Why [`Vm::interpret`](interpreter::Vm::interpret) did not succeed.
#[derive(thiserror::Error, Debug)]
pub enum InterpretError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl InterpretError {
    /// Process exit status for this kind of failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Compile(_) => 65,
            Self::Runtime(_) => 70,
        }
    }
}
