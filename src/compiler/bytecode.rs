//! Chunks hold compiled programs: a stream of one-byte instructions (some with
//! a one-byte operand), the constants those instructions refer to, and the
//! source line each byte came from.

use core::fmt::{self, Write as _};

use crate::value::{Heap, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// push `constants[operand]`
    Constant,
    Nil,
    True,
    False,
    Pop,
    /// push a copy of the value `operand` slots below the top
    GetLocal,
    /// drop the value just below the top, keeping the top
    PopUnder,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,
    Print,
    Return,
}

impl OpCode {
    const ALL: [OpCode; 21] = [
        OpCode::Constant,
        OpCode::Nil,
        OpCode::True,
        OpCode::False,
        OpCode::Pop,
        OpCode::GetLocal,
        OpCode::PopUnder,
        OpCode::Equal,
        OpCode::NotEqual,
        OpCode::Less,
        OpCode::Greater,
        OpCode::LessEqual,
        OpCode::GreaterEqual,
        OpCode::Add,
        OpCode::Subtract,
        OpCode::Multiply,
        OpCode::Divide,
        OpCode::Not,
        OpCode::Negate,
        OpCode::Print,
        OpCode::Return,
    ];

    /// Number of operand bytes following the opcode.
    pub fn operand_len(self) -> usize {
        match self {
            OpCode::Constant | OpCode::GetLocal => 1,
            _ => 0,
        }
    }

    /// How many values the instruction leaves on the stack, relative to before.
    pub fn stack_effect(self) -> isize {
        match self {
            OpCode::Constant | OpCode::Nil | OpCode::True | OpCode::False | OpCode::GetLocal => 1,
            OpCode::Not | OpCode::Negate | OpCode::Return => 0,
            OpCode::Pop
            | OpCode::PopUnder
            | OpCode::Equal
            | OpCode::NotEqual
            | OpCode::Less
            | OpCode::Greater
            | OpCode::LessEqual
            | OpCode::GreaterEqual
            | OpCode::Add
            | OpCode::Subtract
            | OpCode::Multiply
            | OpCode::Divide
            | OpCode::Print => -1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OpCode::Constant => "CONSTANT",
            OpCode::Nil => "NIL",
            OpCode::True => "TRUE",
            OpCode::False => "FALSE",
            OpCode::Pop => "POP",
            OpCode::GetLocal => "GET_LOCAL",
            OpCode::PopUnder => "POP_UNDER",
            OpCode::Equal => "EQUAL",
            OpCode::NotEqual => "NOT_EQUAL",
            OpCode::Less => "LESS",
            OpCode::Greater => "GREATER",
            OpCode::LessEqual => "LESS_EQUAL",
            OpCode::GreaterEqual => "GREATER_EQUAL",
            OpCode::Add => "ADD",
            OpCode::Subtract => "SUBTRACT",
            OpCode::Multiply => "MULTIPLY",
            OpCode::Divide => "DIVIDE",
            OpCode::Not => "NOT",
            OpCode::Negate => "NEGATE",
            OpCode::Print => "PRINT",
            OpCode::Return => "RETURN",
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Unknown opcode {0}.")]
pub struct UnknownOpcode(pub u8);

impl TryFrom<u8> for OpCode {
    type Error = UnknownOpcode;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(usize::from(byte))
            .copied()
            .ok_or(UnknownOpcode(byte))
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        op as u8
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    code: Vec<u8>,
    // one entry per byte in `code`
    lines: Vec<usize>,
    constants: Vec<Value>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, byte: impl Into<u8>, line: usize) {
        self.code.push(byte.into());
        self.lines.push(line);
    }

    /// Adds a constant and returns its index. Constants are never shared, so
    /// the same literal twice takes two slots.
    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    pub fn constant(&self, idx: u8) -> Option<Value> {
        self.constants.get(usize::from(idx)).copied()
    }

    pub fn line(&self, offset: usize) -> Option<usize> {
        self.lines.get(offset).copied()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Renders the whole chunk, one instruction per line.
    pub fn disassemble(&self, name: &str, heap: &Heap) -> String {
        let mut out = format!("== {name} ==\n");
        let mut offset = 0;
        while offset < self.code.len() {
            let (text, next) = self.disassemble_instruction(offset, heap);
            out.push_str(&text);
            out.push('\n');
            offset = next;
        }
        out
    }

    /// Renders the instruction at `offset` and returns the offset of the next one.
    pub fn disassemble_instruction(&self, offset: usize, heap: &Heap) -> (String, usize) {
        let mut out = format!("{offset:04} ");
        let line = self.lines[offset];
        if offset > 0 && self.lines[offset - 1] == line {
            out.push_str("   | ");
        } else {
            _ = write!(out, "{line:4} ");
        }

        let op = match OpCode::try_from(self.code[offset]) {
            Ok(op) => op,
            Err(err) => {
                _ = write!(out, "{err}");
                return (out, offset + 1);
            }
        };

        match (op, self.code.get(offset + 1).copied()) {
            (OpCode::Constant, Some(idx)) => {
                let constant = self
                    .constant(idx)
                    .map(|value| value.display(heap).to_string())
                    .unwrap_or_else(|| "<missing>".to_string());
                _ = write!(out, "{:<16} {idx:4} '{constant}'", op.name());
            }
            (OpCode::GetLocal, Some(slot)) => {
                _ = write!(out, "{:<16} {slot:4}", op.name());
            }
            _ => out.push_str(op.name()),
        }
        (out, offset + 1 + op.operand_len())
    }
}

#[cfg(test)]
mod tests {
    use super::{Chunk, OpCode, UnknownOpcode};
    use crate::value::{Heap, Value};
    use assert2::{check, let_assert};

    #[test]
    fn opcodes_roundtrip_through_bytes() {
        for op in OpCode::ALL {
            check!(OpCode::try_from(u8::from(op)) == Ok(op));
        }
        check!(OpCode::try_from(200) == Err(UnknownOpcode(200)));
    }

    #[test]
    fn lines_follow_code() {
        let mut chunk = Chunk::new();
        chunk.write(OpCode::Nil, 1);
        chunk.write(OpCode::Print, 2);
        chunk.write(OpCode::Return, 2);
        check!(chunk.len() == 3);
        check!(chunk.line(0) == Some(1));
        check!(chunk.line(2) == Some(2));
        check!(chunk.line(3) == None);
    }

    #[test]
    fn constants_are_not_shared() {
        let mut chunk = Chunk::new();
        let i1 = chunk.add_constant(Value::Number(42));
        let i2 = chunk.add_constant(Value::Number(42));
        check!(i1 == 0);
        check!(i2 == 1);
        check!(chunk.constants() == [Value::Number(42), Value::Number(42)]);
    }

    #[test]
    fn disassemble_output() {
        let mut heap = Heap::new();
        let mut chunk = Chunk::new();
        let idx = chunk.add_constant(Value::Obj(heap.alloc_string("hi")));
        chunk.write(OpCode::Constant, 1);
        let_assert!(Ok(idx) = u8::try_from(idx));
        chunk.write(idx, 1);
        chunk.write(OpCode::GetLocal, 1);
        chunk.write(0u8, 1);
        chunk.write(OpCode::Print, 2);
        chunk.write(OpCode::Return, 2);

        let dis = chunk.disassemble("code", &heap);
        check!(dis.starts_with("== code ==\n"));
        check!(dis.contains("0000    1 CONSTANT            0 'hi'"));
        check!(dis.contains("0002    | GET_LOCAL           0"));
        check!(dis.contains("0004    2 PRINT"));
        check!(dis.contains("0005    | RETURN"));
    }
}
