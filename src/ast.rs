use std::fmt::Display;

use crate::symbol::Symbol;

#[derive(Debug, Clone, PartialEq)]
pub struct Module(pub Vec<FunctionDef>);

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Symbol,
    pub params: Vec<Symbol>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Let(Symbol, Expression),
    Return(Option<Expression>),
    Expression(Expression),
    Block(Vec<Statement>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Number(f64),
    String(String),
    Identifier(Symbol),
    Binary(Box<Expression>, InfixOperator, Box<Expression>),
    Call(Box<Expression>, Vec<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    FieldAccess,
}

impl Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for function in &self.0 {
            writeln!(f, "{}", function)?;
        }
        Ok(())
    }
}

/// Spaces per nesting level in the printed tree.
const INDENT_WIDTH: usize = 2;

impl Display for FunctionDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "defun {}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        writeln!(f, ") =")?;
        for statement in &self.body {
            statement.write_indented(f, 1)?;
            writeln!(f)?;
        }
        write!(f, "end")
    }
}

impl Statement {
    fn write_indented(&self, f: &mut std::fmt::Formatter<'_>, depth: usize) -> std::fmt::Result {
        let indent = depth * INDENT_WIDTH;
        match self {
            Statement::Let(name, expr) => write!(f, "{:indent$}let {} = {};", "", name, expr),
            Statement::Return(Some(expr)) => write!(f, "{:indent$}return {};", "", expr),
            Statement::Return(None) => write!(f, "{:indent$}return;", ""),
            Statement::Expression(expr) => write!(f, "{:indent$}{};", "", expr),
            Statement::Block(statements) => {
                writeln!(f, "{:indent$}do", "")?;
                for statement in statements {
                    statement.write_indented(f, depth + 1)?;
                    writeln!(f)?;
                }
                write!(f, "{:indent$}end", "")
            }
        }
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.write_indented(f, 0)
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Number(n) => write!(f, "{}", n),
            Expression::String(s) => write!(f, "{:?}", s),
            Expression::Identifier(name) => write!(f, "{}", name),
            Expression::Binary(left, op, right) => write!(f, "({} {} {})", op, left, right),
            Expression::Call(callee, args) => {
                write!(f, "{}(", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    write!(f, "{}", arg)?;
                    if i != args.len() - 1 {
                        write!(f, ", ")?;
                    }
                }
                write!(f, ")")
            }
        }
    }
}

impl Display for InfixOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InfixOperator::Add => write!(f, "+"),
            InfixOperator::Subtract => write!(f, "-"),
            InfixOperator::Multiply => write!(f, "*"),
            InfixOperator::Divide => write!(f, "/"),
            InfixOperator::FieldAccess => write!(f, "."),
        }
    }
}
