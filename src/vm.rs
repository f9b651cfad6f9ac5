mod stack;

use std::fmt::Display;

use crate::{
    bytecode::{Bytecode, DecodeError, Instruction},
    globals::{GlobalId, Globals},
    symbol::Symbol,
};

use self::stack::Stack;

pub use self::stack::MAX_STACK_SIZE;

/// Deepest the call-frame stack may grow, counting the outermost frame.
pub const MAX_FRAMES: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Function(FunctionRef),
}

/// A callable reference to a global. The unit behind it is looked up when
/// the call executes.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionRef {
    pub id: GlobalId,
    pub name: Symbol,
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Function(function) => write!(f, "<fn {}>", function.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("Failed to read instruction")]
    Decode(#[from] DecodeError),
    #[error("Invalid arithmetic values: {0} {1}")]
    InvalidArithmeticValues(Value, Value),
    #[error("Value {0} is not callable")]
    NotCallable(Value),
    #[error("Function {name} expects {expected} arguments but was given {found}")]
    ArityMismatch {
        name: String,
        expected: u8,
        found: usize,
    },
    #[error("Function {0} was declared but never defined")]
    UndefinedFunction(String),
    #[error("Function {0} returned no value to its caller")]
    VoidResult(String),
    #[error("Stack underflow")]
    StackUnderflow,
    #[error("Stack overflow (limit {} values)", MAX_STACK_SIZE)]
    StackOverflow,
    #[error("Call depth exceeded (limit {} frames)", MAX_FRAMES)]
    FrameOverflow,
    #[error("Constant index {0} is outside the constant pool")]
    InvalidConstant(u8),
    #[error("Local slot {0} is outside the current frame")]
    InvalidLocal(u8),
}

struct CallFrame<'a> {
    code: &'a Bytecode,
    ip: usize,
    base: usize,
}

enum Flow {
    Continue,
    Finished(Option<Value>),
}

pub struct Vm<'a> {
    globals: &'a Globals,
    stack: Stack,
    frames: Vec<CallFrame<'a>>,
}

impl<'a> Vm<'a> {
    pub fn new(globals: &'a Globals) -> Self {
        Self {
            globals,
            stack: Stack::new(),
            frames: Vec::new(),
        }
    }

    /// Runs `unit` with `args` as its first locals.
    ///
    /// Returns the value the outermost frame produced, or `None` when it
    /// returned without one.
    pub fn run(&mut self, unit: &'a Bytecode, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
        tracing::debug!(name = %unit_name(unit), args = args.len(), "starting run");

        self.stack.clear();
        self.frames.clear();
        check_arity(unit, args.len())?;

        for arg in args {
            self.stack.push(arg.clone())?;
        }
        self.frames.push(CallFrame {
            code: unit,
            ip: 0,
            base: 0,
        });

        self.execute()
    }

    /// Runs the global function named `name`.
    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
        let globals = self.globals;
        let unit = globals
            .find(name)
            .and_then(|id| globals.get(id))
            .ok_or_else(|| RuntimeError::UndefinedFunction(name.to_string()))?;
        self.run(unit, args)
    }

    /// The operand stack as the last run left it.
    pub fn stack(&self) -> &[Value] {
        self.stack.as_slice()
    }

    fn execute(&mut self) -> Result<Option<Value>, RuntimeError> {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(self.stack.top().cloned());
            };

            if frame.ip >= frame.code.code().len() {
                if self.frames.len() == 1 {
                    return Ok(self.stack.top().cloned());
                }
                match self.return_from(None)? {
                    Flow::Continue => continue,
                    Flow::Finished(result) => return Ok(result),
                }
            }

            #[cfg(feature = "trace")]
            {
                let mut line = String::new();
                frame.code.disassemble_instruction(frame.ip, &mut line).ok();
                tracing::trace!("{}\n{}", self.stack, line.trim_end());
            }

            let (instruction, next) = frame.code.decode(frame.ip)?;
            frame.ip = next;
            let code = frame.code;
            let base = frame.base;

            let flow = match instruction {
                Instruction::Constant(index) | Instruction::LoadGlobal(index) => {
                    let value = code
                        .get_constant(index)
                        .ok_or(RuntimeError::InvalidConstant(index))?
                        .clone();
                    self.stack.push(value)?;
                    Flow::Continue
                }
                Instruction::Add => {
                    binary_op(&mut self.stack, |a, b| a + b)?;
                    Flow::Continue
                }
                Instruction::Subtract => {
                    binary_op(&mut self.stack, |a, b| a - b)?;
                    Flow::Continue
                }
                Instruction::Multiply => {
                    binary_op(&mut self.stack, |a, b| a * b)?;
                    Flow::Continue
                }
                Instruction::Divide => {
                    binary_op(&mut self.stack, |a, b| a / b)?;
                    Flow::Continue
                }
                Instruction::LoadLocal(slot) => {
                    let value = self
                        .stack
                        .get(base + slot as usize)
                        .ok_or(RuntimeError::InvalidLocal(slot))?
                        .clone();
                    self.stack.push(value)?;
                    Flow::Continue
                }
                Instruction::Pop => {
                    self.stack.pop()?;
                    Flow::Continue
                }
                Instruction::Call(argc) => {
                    self.call_value(argc as usize)?;
                    Flow::Continue
                }
                Instruction::Halt => Flow::Finished(self.stack.top().cloned()),
                Instruction::ReturnVoid => self.return_from(None)?,
                Instruction::ReturnValue => {
                    let result = self.stack.pop()?;
                    self.return_from(Some(result))?
                }
            };

            if let Flow::Finished(result) = flow {
                return Ok(result);
            }
        }
    }

    fn call_value(&mut self, argc: usize) -> Result<(), RuntimeError> {
        let function = match self.stack.pop()? {
            Value::Function(function) => function,
            other => return Err(RuntimeError::NotCallable(other)),
        };

        let globals = self.globals;
        let code = globals
            .get(function.id)
            .ok_or_else(|| RuntimeError::UndefinedFunction(function.name.to_string()))?;
        check_arity(code, argc)?;

        let base = self
            .stack
            .len()
            .checked_sub(argc)
            .ok_or(RuntimeError::StackUnderflow)?;
        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::FrameOverflow);
        }

        self.frames.push(CallFrame { code, ip: 0, base });
        Ok(())
    }

    fn return_from(&mut self, result: Option<Value>) -> Result<Flow, RuntimeError> {
        let Some(frame) = self.frames.pop() else {
            return Ok(Flow::Finished(result));
        };
        self.stack.truncate(frame.base);

        match result {
            Some(value) => {
                self.stack.push(value.clone())?;
                if self.frames.is_empty() {
                    Ok(Flow::Finished(Some(value)))
                } else {
                    Ok(Flow::Continue)
                }
            }
            None if self.frames.is_empty() => Ok(Flow::Finished(None)),
            None => Err(RuntimeError::VoidResult(unit_name(frame.code))),
        }
    }
}

fn check_arity(code: &Bytecode, found: usize) -> Result<(), RuntimeError> {
    if code.arity() as usize == found {
        Ok(())
    } else {
        Err(RuntimeError::ArityMismatch {
            name: unit_name(code),
            expected: code.arity(),
            found,
        })
    }
}

fn unit_name(code: &Bytecode) -> String {
    match code.name() {
        Some(name) => name.to_string(),
        None => "<script>".to_string(),
    }
}

fn binary_op(stack: &mut Stack, op: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
    let b = stack.pop()?;
    let a = stack.pop()?;
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => stack.push(Value::Number(op(a, b))),
        (a, b) => Err(RuntimeError::InvalidArithmeticValues(a, b)),
    }
}
