//! bao: a tiny Lisp compiled in a single pass to bytecode for a stack VM.
//!
//! ```
//! let mut vm = bao::Vm::with_output(Vec::new());
//! vm.interpret("(let x 20 (+ x 22))").unwrap();
//! assert_eq!(vm.output().as_slice(), b"42\n");
//! ```

pub mod compiler;
pub mod lexer;
pub mod num;
pub mod runtime;
pub mod value;

pub use compiler::{
    bytecode::{Chunk, OpCode},
    compile, CompileError, CompileErrorKind,
};
pub use runtime::{
    interpreter::Vm, InterpretError, RuntimeError, RuntimeErrorKind, STACK_MAX,
};
pub use value::Value;
