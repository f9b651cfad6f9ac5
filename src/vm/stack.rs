use std::fmt::Display;

use super::{RuntimeError, Value};

pub const MAX_STACK_SIZE: usize = u16::MAX as usize;

#[derive(Debug, Default)]
pub struct Stack {
    storage: Vec<Value>,
}

impl Stack {
    pub fn new() -> Self {
        Stack {
            storage: Vec::with_capacity(256),
        }
    }

    pub fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.storage.len() >= MAX_STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.storage.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.storage.pop().ok_or(RuntimeError::StackUnderflow)
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.storage.get(index)
    }

    pub fn top(&self) -> Option<&Value> {
        self.storage.last()
    }

    /// Drops every value at or above `len`.
    pub fn truncate(&mut self, len: usize) {
        self.storage.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn clear(&mut self) {
        self.storage.clear();
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.storage
    }
}

impl Display for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "          ")?;
        for value in self.storage.iter() {
            write!(f, "[ {:>8} ]", value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop() {
        let mut stack = Stack::new();
        stack.push(Value::Number(1.0)).unwrap();
        stack.push(Value::Number(2.0)).unwrap();
        assert_eq!(stack.top(), Some(&Value::Number(2.0)));
        assert_eq!(stack.pop(), Ok(Value::Number(2.0)));
        assert_eq!(stack.pop(), Ok(Value::Number(1.0)));
        assert_eq!(stack.pop(), Err(RuntimeError::StackUnderflow));
    }

    #[test]
    fn test_overflow() {
        let mut stack = Stack::new();
        for _ in 0..MAX_STACK_SIZE {
            stack.push(Value::Number(0.0)).unwrap();
        }
        assert_eq!(
            stack.push(Value::Number(0.0)),
            Err(RuntimeError::StackOverflow)
        );
        stack.truncate(1);
        assert_eq!(stack.len(), 1);
    }
}
