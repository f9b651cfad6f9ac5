use crate::{
    ast::{Expression, FunctionDef, InfixOperator, Statement},
    bytecode::{Bytecode, OpCode, MAX_POOL_SIZE},
    globals::{GlobalId, Globals},
    parser::{ParseError, Parser},
    symbol::{Interner, Symbol},
    tokenizer::Tokenizer,
    vm::{FunctionRef, Value},
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("Unresolved identifier \"{0}\"")]
    UnresolvedIdentifier(Symbol),
    #[error("Too many constants in one function (limit {})", MAX_POOL_SIZE)]
    TooManyConstants,
    #[error("Too many local variables in one function (limit {})", MAX_POOL_SIZE)]
    TooManyLocals,
    #[error("Too many arguments in one call (limit {})", u8::MAX)]
    TooManyArguments,
    #[error("Operator \"{0}\" has no instruction")]
    UnsupportedOperator(InfixOperator),
    #[error("String literals cannot be compiled")]
    UnsupportedLiteral,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// The first error of a compile run, along with every definition that was
/// compiled before it.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct CompileFailure {
    #[source]
    pub error: Error,
    pub compiled: Definitions,
}

/// Functions produced by one compile run, in source order.
#[derive(Debug, Clone, Default)]
pub struct Definitions(Vec<(Symbol, GlobalId)>);

impl Definitions {
    pub fn get(&self, name: &str) -> Option<GlobalId> {
        self.0
            .iter()
            .find(|(symbol, _)| symbol.name() == name)
            .map(|(_, id)| *id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Symbol, GlobalId)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Compiles every definition in `source` into `globals`.
///
/// All names parsed from `source` are declared before any body is compiled,
/// so definitions may call each other regardless of order. Parsing stops at
/// the first parse error; definitions read before it are still compiled.
/// On failure, names from `source` that never got a body are retracted so
/// later runs report them as unresolved.
pub fn compile<S>(
    source: S,
    interner: &mut Interner,
    globals: &mut Globals,
) -> Result<Definitions, CompileFailure>
where
    S: IntoIterator<Item = char>,
{
    let (functions, parse_error) = parse_definitions(source, interner);

    for function in &functions {
        globals.declare(&function.name);
    }

    let mut compiled = Definitions::default();
    let mut failure = parse_error.map(Error::from);
    for function in &functions {
        let unit = match compile_function(function, globals) {
            Ok(unit) => unit,
            Err(e) => {
                failure = Some(e.into());
                break;
            }
        };

        tracing::debug!(
            name = %function.name,
            bytes = unit.code().len(),
            constants = unit.constants().len(),
            "compiled definition"
        );
        #[cfg(feature = "disassemble")]
        tracing::debug!("\n{}", unit.disassemble());

        let id = globals.define(&function.name, unit);
        compiled.0.push((function.name.clone(), id));
    }

    match failure {
        Some(error) => {
            for function in &functions {
                if globals.retract(&function.name) {
                    tracing::debug!(name = %function.name, "retracted undefined global");
                }
            }
            Err(CompileFailure { error, compiled })
        }
        None => Ok(compiled),
    }
}

fn parse_definitions(
    source: impl IntoIterator<Item = char>,
    interner: &mut Interner,
) -> (Vec<FunctionDef>, Option<ParseError>) {
    let mut parser = Parser::new(Tokenizer::new(source, interner));
    let mut functions = Vec::new();
    loop {
        match parser.definition() {
            Ok(Some(function)) => functions.push(function),
            Ok(None) => return (functions, None),
            Err(e) => return (functions, Some(e)),
        }
    }
}

pub fn compile_function(function: &FunctionDef, globals: &Globals) -> Result<Bytecode, CompileError> {
    let arity = u8::try_from(function.params.len()).map_err(|_| CompileError::TooManyLocals)?;
    let mut compiler = Compiler::new(globals, Some(function.name.clone()), arity);

    compiler.begin_scope();
    for param in &function.params {
        compiler.add_local(param.clone())?;
    }
    for statement in &function.body {
        compiler.statement(statement)?;
    }
    compiler.end_scope();
    compiler.emit(OpCode::ReturnVoid);

    Ok(compiler.bytecode)
}

/// Compiles a lone expression into an anonymous unit that leaves its value
/// on the stack.
pub fn compile_expression(expr: &Expression, globals: &Globals) -> Result<Bytecode, CompileError> {
    let mut compiler = Compiler::new(globals, None, 0);
    compiler.expression(expr)?;
    Ok(compiler.bytecode)
}

/// Compiles a lone statement into an anonymous unit.
pub fn compile_statement(statement: &Statement, globals: &Globals) -> Result<Bytecode, CompileError> {
    let mut compiler = Compiler::new(globals, None, 0);
    compiler.statement(statement)?;
    Ok(compiler.bytecode)
}

#[derive(Debug)]
struct Local {
    name: Symbol,
    depth: usize,
}

struct Compiler<'g> {
    globals: &'g Globals,
    bytecode: Bytecode,
    locals: Vec<Local>,
    scope_depth: usize,
}

impl<'g> Compiler<'g> {
    fn new(globals: &'g Globals, name: Option<Symbol>, arity: u8) -> Self {
        Self {
            globals,
            bytecode: Bytecode::new(name, arity),
            locals: Vec::new(),
            scope_depth: 0,
        }
    }

    fn statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match statement {
            Statement::Let(name, initializer) => {
                self.expression(initializer)?;
                self.add_local(name.clone())
            }
            Statement::Return(Some(expr)) => {
                self.expression(expr)?;
                self.emit(OpCode::ReturnValue);
                Ok(())
            }
            Statement::Return(None) => {
                self.emit(OpCode::ReturnVoid);
                Ok(())
            }
            Statement::Expression(expr) => {
                self.expression(expr)?;
                self.emit(OpCode::Pop);
                Ok(())
            }
            Statement::Block(statements) => {
                self.begin_scope();
                for statement in statements {
                    self.statement(statement)?;
                }
                self.end_scope();
                Ok(())
            }
        }
    }

    fn expression(&mut self, expr: &Expression) -> Result<(), CompileError> {
        match expr {
            Expression::Number(n) => self.emit_constant(OpCode::Constant, Value::Number(*n)),
            Expression::String(_) => Err(CompileError::UnsupportedLiteral),
            Expression::Identifier(name) => self.identifier(name),
            Expression::Binary(left, operator, right) => {
                let opcode = match operator {
                    InfixOperator::Add => OpCode::Add,
                    InfixOperator::Subtract => OpCode::Subtract,
                    InfixOperator::Multiply => OpCode::Multiply,
                    InfixOperator::Divide => OpCode::Divide,
                    InfixOperator::FieldAccess => {
                        return Err(CompileError::UnsupportedOperator(*operator))
                    }
                };
                self.expression(left)?;
                self.expression(right)?;
                self.emit(opcode);
                Ok(())
            }
            Expression::Call(callee, args) => {
                let argc = u8::try_from(args.len()).map_err(|_| CompileError::TooManyArguments)?;
                for arg in args {
                    self.expression(arg)?;
                }
                self.expression(callee)?;
                self.emit(OpCode::Call);
                self.emit(argc);
                Ok(())
            }
        }
    }

    fn identifier(&mut self, name: &Symbol) -> Result<(), CompileError> {
        if let Some(slot) = self.resolve_local(name) {
            self.emit(OpCode::LoadLocal);
            self.emit(slot);
            return Ok(());
        }

        match self.globals.resolve(name) {
            Some(id) => self.emit_constant(
                OpCode::LoadGlobal,
                Value::Function(FunctionRef {
                    id,
                    name: name.clone(),
                }),
            ),
            None => Err(CompileError::UnresolvedIdentifier(name.clone())),
        }
    }

    fn resolve_local(&self, name: &Symbol) -> Option<u8> {
        self.locals
            .iter()
            .rposition(|local| &local.name == name)
            .map(|slot| slot as u8)
    }

    fn add_local(&mut self, name: Symbol) -> Result<(), CompileError> {
        if self.locals.len() >= MAX_POOL_SIZE {
            return Err(CompileError::TooManyLocals);
        }
        self.locals.push(Local {
            name,
            depth: self.scope_depth,
        });
        Ok(())
    }

    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.scope_depth -= 1;
        while self
            .locals
            .last()
            .is_some_and(|local| local.depth > self.scope_depth)
        {
            self.locals.pop();
            self.emit(OpCode::Pop);
        }
    }

    fn emit(&mut self, byte: impl Into<u8>) {
        self.bytecode.add_bytecode(byte);
    }

    fn emit_constant(&mut self, opcode: OpCode, value: Value) -> Result<(), CompileError> {
        let index = self
            .bytecode
            .add_constant(value)
            .ok_or(CompileError::TooManyConstants)?;
        self.emit(opcode);
        self.emit(index);
        Ok(())
    }
}
