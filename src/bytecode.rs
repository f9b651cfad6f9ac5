use std::fmt::{Display, Write};

use crate::{symbol::Symbol, vm::Value};

/// Most entries a constant pool or local-slot table can hold; indices are a
/// single byte.
pub const MAX_POOL_SIZE: usize = u8::MAX as usize + 1;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Constant,
    Add,
    Multiply,
    Subtract,
    Divide,
    LoadLocal,
    LoadGlobal,
    Pop,
    Call,
    Halt,
    ReturnVoid,
    ReturnValue,
    Sentinel,
}

impl From<OpCode> for u8 {
    fn from(value: OpCode) -> u8 {
        value as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Invalid byte {0} found when expecting OpCode value between 0 and {}",
    OpCode::Sentinel as u8
)]
pub struct OpCodeFromU8Error(u8);

impl TryFrom<u8> for OpCode {
    type Error = OpCodeFromU8Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value < OpCode::Sentinel as u8 {
            Ok(unsafe { std::mem::transmute::<u8, OpCode>(value) })
        } else {
            Err(OpCodeFromU8Error(value))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    OpCode(#[from] OpCodeFromU8Error),
    #[error("Instruction at offset {0} is missing its operand byte")]
    Truncated(usize),
    #[error("Offset {0} is past the end of the bytecode")]
    OutOfBounds(usize),
}

/// One decoded instruction together with its immediate operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Constant(u8),
    Add,
    Multiply,
    Subtract,
    Divide,
    LoadLocal(u8),
    LoadGlobal(u8),
    Pop,
    Call(u8),
    Halt,
    ReturnVoid,
    ReturnValue,
}

impl Instruction {
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::Constant(_) => "const",
            Instruction::Add => "add",
            Instruction::Multiply => "mul",
            Instruction::Subtract => "sub",
            Instruction::Divide => "div",
            Instruction::LoadLocal(_) => "load-local",
            Instruction::LoadGlobal(_) => "load-global-constant",
            Instruction::Pop => "pop",
            Instruction::Call(_) => "call",
            Instruction::Halt => "halt",
            Instruction::ReturnVoid => "return-void",
            Instruction::ReturnValue => "return-with-value",
        }
    }

    pub fn operand(&self) -> Option<u8> {
        match self {
            Instruction::Constant(operand)
            | Instruction::LoadLocal(operand)
            | Instruction::LoadGlobal(operand)
            | Instruction::Call(operand) => Some(*operand),
            _ => None,
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.operand() {
            Some(operand) => write!(f, "{} {}", self.name(), operand),
            None => write!(f, "{}", self.name()),
        }
    }
}

/// A compiled unit: one function body, or an anonymous top-level chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Bytecode {
    name: Option<Symbol>,
    arity: u8,
    code: Vec<u8>,
    constants: Vec<Value>,
}

impl Bytecode {
    pub fn new(name: Option<Symbol>, arity: u8) -> Self {
        Self {
            name,
            arity,
            code: Vec::new(),
            constants: Vec::new(),
        }
    }

    pub fn name(&self) -> Option<&Symbol> {
        self.name.as_ref()
    }

    pub fn arity(&self) -> u8 {
        self.arity
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    pub fn add_bytecode(&mut self, byte: impl Into<u8>) {
        self.code.push(byte.into());
    }

    /// Appends to the constant pool, returning `None` once the pool is full.
    pub fn add_constant(&mut self, value: Value) -> Option<u8> {
        if self.constants.len() >= MAX_POOL_SIZE {
            return None;
        }
        self.constants.push(value);
        Some((self.constants.len() - 1) as u8)
    }

    pub fn get_constant(&self, index: u8) -> Option<&Value> {
        self.constants.get(index as usize)
    }

    /// Decodes the instruction at `offset`, returning it with the offset of
    /// the instruction that follows.
    pub fn decode(&self, offset: usize) -> Result<(Instruction, usize), DecodeError> {
        let byte = *self
            .code
            .get(offset)
            .ok_or(DecodeError::OutOfBounds(offset))?;
        let operand = || {
            self.code
                .get(offset + 1)
                .copied()
                .ok_or(DecodeError::Truncated(offset))
        };

        let instruction = match OpCode::try_from(byte)? {
            OpCode::Constant => Instruction::Constant(operand()?),
            OpCode::Add => Instruction::Add,
            OpCode::Multiply => Instruction::Multiply,
            OpCode::Subtract => Instruction::Subtract,
            OpCode::Divide => Instruction::Divide,
            OpCode::LoadLocal => Instruction::LoadLocal(operand()?),
            OpCode::LoadGlobal => Instruction::LoadGlobal(operand()?),
            OpCode::Pop => Instruction::Pop,
            OpCode::Call => Instruction::Call(operand()?),
            OpCode::Halt => Instruction::Halt,
            OpCode::ReturnVoid => Instruction::ReturnVoid,
            OpCode::ReturnValue => Instruction::ReturnValue,
            OpCode::Sentinel => return Err(OpCodeFromU8Error(byte).into()),
        };

        let width = 1 + usize::from(instruction.operand().is_some());
        Ok((instruction, offset + width))
    }

    pub fn instructions(&self) -> Instructions<'_> {
        Instructions {
            bytecode: self,
            offset: 0,
        }
    }

    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        self.write_disassembly(&mut out).ok();
        out
    }

    pub fn write_disassembly(&self, out: &mut impl Write) -> std::fmt::Result {
        match &self.name {
            Some(name) => writeln!(out, "== {} ==", name)?,
            None => writeln!(out, "== <script> ==")?,
        }

        let mut offset = 0;
        while offset < self.code.len() {
            offset = self.disassemble_instruction(offset, out)?;
        }
        Ok(())
    }

    /// Renders one instruction as a line of text and returns the offset of
    /// the next instruction.
    pub fn disassemble_instruction(
        &self,
        offset: usize,
        out: &mut impl Write,
    ) -> Result<usize, std::fmt::Error> {
        write!(out, "{:04} ", offset)?;

        let (instruction, next) = match self.decode(offset) {
            Ok(decoded) => decoded,
            Err(e) => {
                writeln!(out, "<{}>", e)?;
                return Ok(offset + 1);
            }
        };

        match instruction {
            Instruction::Constant(index) | Instruction::LoadGlobal(index) => {
                let constant = self
                    .get_constant(index)
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "??".to_string());
                writeln!(
                    out,
                    "{:<20} {:4} '{}'",
                    instruction.name(),
                    index,
                    constant
                )?;
            }
            Instruction::LoadLocal(operand) | Instruction::Call(operand) => {
                writeln!(out, "{:<20} {:4}", instruction.name(), operand)?;
            }
            _ => writeln!(out, "{}", instruction.name())?,
        }
        Ok(next)
    }
}

pub struct Instructions<'a> {
    bytecode: &'a Bytecode,
    offset: usize,
}

impl Iterator for Instructions<'_> {
    type Item = Result<Instruction, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.bytecode.code.len() {
            return None;
        }
        match self.bytecode.decode(self.offset) {
            Ok((instruction, next)) => {
                self.offset = next;
                Some(Ok(instruction))
            }
            Err(e) => {
                self.offset = self.bytecode.code.len();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_chunk() -> Bytecode {
        let mut chunk = Bytecode::new(None, 0);
        let constant = chunk.add_constant(Value::Number(1.2)).unwrap();
        chunk.add_bytecode(OpCode::Constant);
        chunk.add_bytecode(constant);
        chunk.add_bytecode(OpCode::LoadLocal);
        chunk.add_bytecode(0);
        chunk.add_bytecode(OpCode::Add);
        chunk.add_bytecode(OpCode::Halt);
        chunk
    }

    #[test]
    fn test_opcode_round_trip() {
        assert_eq!(OpCode::try_from(u8::from(OpCode::Call)), Ok(OpCode::Call));
        assert!(OpCode::try_from(OpCode::Sentinel as u8).is_err());
        assert!(OpCode::try_from(200u8).is_err());
    }

    #[test]
    fn test_instructions() {
        let instructions: Vec<_> = test_chunk()
            .instructions()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            instructions,
            vec![
                Instruction::Constant(0),
                Instruction::LoadLocal(0),
                Instruction::Add,
                Instruction::Halt,
            ]
        );
    }

    #[test]
    fn test_truncated_instruction() {
        let mut chunk = Bytecode::new(None, 0);
        chunk.add_bytecode(OpCode::Call);
        assert_eq!(chunk.decode(0), Err(DecodeError::Truncated(0)));
        assert_eq!(chunk.decode(1), Err(DecodeError::OutOfBounds(1)));
    }

    #[test]
    fn test_constant_pool_capacity() {
        let mut chunk = Bytecode::new(None, 0);
        for i in 0..MAX_POOL_SIZE {
            assert_eq!(chunk.add_constant(Value::Number(i as f64)), Some(i as u8));
        }
        assert_eq!(chunk.add_constant(Value::Number(0.0)), None);
        assert_eq!(chunk.constants().len(), MAX_POOL_SIZE);
    }

    #[test]
    fn test_disassemble() {
        let expected = "\
== <script> ==
0000 const                   0 '1.2'
0002 load-local              0
0004 add
0005 halt
";
        assert_eq!(test_chunk().disassemble(), expected);
    }
}
