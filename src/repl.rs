use crate::{
    ast::Statement,
    compiler::{self, compile, compile_expression, compile_statement, CompileError, CompileFailure},
    globals::Globals,
    parser::{ParseError, Parser},
    symbol::{Interner, Symbol},
    tokenizer::{Keyword, Token, TokenType, Tokenizer},
    vm::{RuntimeError, Vm},
};

#[derive(Debug, thiserror::Error)]
pub enum ReplError {
    #[error("Input is incomplete")]
    Incomplete,
    #[error("Top-level `let {0}` is not kept between inputs; bind it inside a definition or a do block")]
    TopLevelLet(Symbol),
    #[error(transparent)]
    Compile(#[from] compiler::Error),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl From<ParseError> for ReplError {
    fn from(e: ParseError) -> Self {
        if e.is_incomplete() {
            ReplError::Incomplete
        } else {
            ReplError::Compile(e.into())
        }
    }
}

impl From<CompileError> for ReplError {
    fn from(e: CompileError) -> Self {
        ReplError::Compile(e.into())
    }
}

/// Interactive state: definitions persist across inputs, nothing else does.
#[derive(Debug, Default)]
pub struct Session {
    interner: Interner,
    globals: Globals,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    /// Compiles `defun` input into the session, or runs a single statement.
    ///
    /// Returns the text to echo, if any. [`ReplError::Incomplete`] means the
    /// caller should read more lines and retry with the longer input.
    pub fn evaluate(&mut self, input: &str) -> Result<Option<String>, ReplError> {
        let defines = matches!(
            Tokenizer::new(input.chars(), &mut self.interner).peek(),
            Ok(Some(Token {
                token_type: TokenType::Keyword(Keyword::Defun),
                ..
            }))
        );
        if defines {
            return self.define(input);
        }

        let mut parser = Parser::new(Tokenizer::new(input.chars(), &mut self.interner));
        let statement = parser.statement()?;
        parser.finish()?;

        let unit = match &statement {
            None => return Ok(None),
            Some(Statement::Let(name, _)) => return Err(ReplError::TopLevelLet(name.clone())),
            Some(Statement::Expression(expr)) => compile_expression(expr, &self.globals)?,
            Some(statement) => compile_statement(statement, &self.globals)?,
        };

        let result = Vm::new(&self.globals).run(&unit, &[])?;
        Ok(result.map(|value| value.to_string()))
    }

    fn define(&mut self, input: &str) -> Result<Option<String>, ReplError> {
        match compile(input.chars(), &mut self.interner, &mut self.globals) {
            Ok(definitions) => Ok(Some(
                definitions
                    .iter()
                    .map(|(name, _)| format!("defined {name}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )),
            Err(CompileFailure {
                error: compiler::Error::Parse(e),
                compiled,
            }) if compiled.is_empty() => Err(e.into()),
            Err(failure) => Err(failure.error.into()),
        }
    }
}
