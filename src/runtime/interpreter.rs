use std::io::{self, Write};

use crate::{
    compiler::{
        self,
        bytecode::{Chunk, OpCode},
        CompileError,
    },
    num::Number,
    value::{Heap, Value},
};

use super::{InterpretError, RuntimeError, RuntimeErrorKind, STACK_MAX};

enum Flow {
    Continue,
    Return,
}

/// A stack machine that runs chunks.
///
/// The VM owns the heap its programs allocate into, and everything printed by
/// `print` (and by the implicit print of a program's result) goes to `out`.
#[derive(Debug)]
pub struct Vm<W = io::Stdout> {
    heap: Heap,
    stack: Vec<Value>,
    out: W,
}

impl Vm<io::Stdout> {
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }
}

impl Default for Vm<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Vm<W> {
    pub fn with_output(out: W) -> Self {
        Self {
            heap: Heap::new(),
            stack: Vec::with_capacity(STACK_MAX),
            out,
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Compiles `source` against this VM's heap without running it.
    pub fn compile(&mut self, source: &str) -> Result<Chunk, CompileError> {
        compiler::compile(source, &mut self.heap)
    }

    /// Compiles and runs one program.
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let chunk = self.compile(source)?;
        self.run(&chunk)?;
        Ok(())
    }

    /// Runs `chunk` from its first instruction until `RETURN`.
    pub fn run(&mut self, chunk: &Chunk) -> Result<(), RuntimeError> {
        self.stack.clear();
        let mut ip = 0;
        let mut executed = 0usize;
        loop {
            let offset = ip;
            executed += 1;
            if log::log_enabled!(log::Level::Trace) && offset < chunk.len() {
                self.trace(chunk, offset);
            }
            match self.step(chunk, &mut ip) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Return) => break,
                Err(kind) => {
                    log::debug!("runtime error after {executed} instructions");
                    self.stack.clear();
                    return Err(RuntimeError {
                        line: chunk.line(offset).unwrap_or_default(),
                        kind,
                    });
                }
            }
        }
        log::debug!("returned after {executed} instructions");
        self.out.flush().map_err(|err| RuntimeError {
            line: chunk.line(ip.saturating_sub(1)).unwrap_or_default(),
            kind: err.into(),
        })
    }

    fn trace(&self, chunk: &Chunk, offset: usize) {
        let stack = self
            .stack
            .iter()
            .map(|value| format!("[ {} ]", value.display(&self.heap)))
            .collect::<String>();
        log::trace!("          {stack}");
        let (instruction, _) = chunk.disassemble_instruction(offset, &self.heap);
        log::trace!("{instruction}");
    }

    fn read_byte(chunk: &Chunk, ip: &mut usize) -> Result<u8, RuntimeErrorKind> {
        let byte = chunk
            .code()
            .get(*ip)
            .copied()
            .ok_or(RuntimeErrorKind::UnexpectedEnd)?;
        *ip += 1;
        Ok(byte)
    }

    fn step(&mut self, chunk: &Chunk, ip: &mut usize) -> Result<Flow, RuntimeErrorKind> {
        let op = OpCode::try_from(Self::read_byte(chunk, ip)?)?;
        match op {
            OpCode::Constant => {
                let idx = Self::read_byte(chunk, ip)?;
                let value = chunk
                    .constant(idx)
                    .ok_or(RuntimeErrorKind::MissingConstant(idx))?;
                self.push(value)?;
            }
            OpCode::Nil => self.push(Value::Nil)?,
            OpCode::True => self.push(Value::Bool(true))?,
            OpCode::False => self.push(Value::Bool(false))?,
            OpCode::Pop => {
                self.pop()?;
            }
            OpCode::GetLocal => {
                let distance = usize::from(Self::read_byte(chunk, ip)?);
                let value = self.peek(distance)?;
                self.push(value)?;
            }
            OpCode::PopUnder => {
                let top = self.pop()?;
                self.pop()?;
                self.push(top)?;
            }
            OpCode::Equal => {
                let (a, b) = self.pop_pair()?;
                self.push(Value::Bool(a == b))?;
            }
            OpCode::NotEqual => {
                let (a, b) = self.pop_pair()?;
                self.push(Value::Bool(a != b))?;
            }
            OpCode::Less => self.compare(|a, b| a < b)?,
            OpCode::Greater => self.compare(|a, b| a > b)?,
            OpCode::LessEqual => self.compare(|a, b| a <= b)?,
            OpCode::GreaterEqual => self.compare(|a, b| a >= b)?,
            OpCode::Add => self.arithmetic(|a, b| Ok(a.wrapping_add(b)))?,
            OpCode::Subtract => self.arithmetic(|a, b| Ok(a.wrapping_sub(b)))?,
            OpCode::Multiply => self.arithmetic(|a, b| Ok(a.wrapping_mul(b)))?,
            OpCode::Divide => self.arithmetic(|a, b| {
                if b == 0 {
                    Err(RuntimeErrorKind::DivisionByZero)
                } else {
                    Ok(a.wrapping_div(b))
                }
            })?,
            OpCode::Not => {
                let value = self.pop()?;
                self.push(Value::Bool(value.is_falsy()))?;
            }
            OpCode::Negate => {
                let n = self
                    .peek(0)?
                    .as_number()
                    .ok_or(RuntimeErrorKind::OperandNotNumber)?;
                self.pop()?;
                self.push(Value::Number(n.wrapping_neg()))?;
            }
            OpCode::Print => {
                let value = self.pop()?;
                if let Value::Obj(handle) = value {
                    if self.heap.get(handle).is_none() {
                        return Err(RuntimeErrorKind::DanglingObject(handle.index()));
                    }
                }
                writeln!(self.out, "{}", value.display(&self.heap))?;
            }
            OpCode::Return => return Ok(Flow::Return),
        }
        Ok(Flow::Continue)
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeErrorKind> {
        if self.stack.len() >= STACK_MAX {
            return Err(RuntimeErrorKind::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeErrorKind> {
        self.stack.pop().ok_or(RuntimeErrorKind::StackUnderflow)
    }

    /// Pops the right operand, then the left one.
    fn pop_pair(&mut self) -> Result<(Value, Value), RuntimeErrorKind> {
        let b = self.pop()?;
        let a = self.pop()?;
        Ok((a, b))
    }

    fn peek(&self, distance: usize) -> Result<Value, RuntimeErrorKind> {
        self.stack
            .len()
            .checked_sub(distance + 1)
            .map(|idx| self.stack[idx])
            .ok_or(RuntimeErrorKind::StackUnderflow)
    }

    // operands stay on the stack when they are not both numbers
    fn numbers(&self) -> Result<(Number, Number), RuntimeErrorKind> {
        match (self.peek(1)?.as_number(), self.peek(0)?.as_number()) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(RuntimeErrorKind::OperandsNotNumbers),
        }
    }

    fn arithmetic(
        &mut self,
        op: impl FnOnce(Number, Number) -> Result<Number, RuntimeErrorKind>,
    ) -> Result<(), RuntimeErrorKind> {
        let (a, b) = self.numbers()?;
        let result = op(a, b)?;
        self.pop_pair()?;
        self.push(Value::Number(result))
    }

    fn compare(&mut self, op: impl FnOnce(Number, Number) -> bool) -> Result<(), RuntimeErrorKind> {
        let (a, b) = self.numbers()?;
        self.pop_pair()?;
        self.push(Value::Bool(op(a, b)))
    }
}
