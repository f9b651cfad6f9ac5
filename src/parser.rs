use std::fmt::Display;

use crate::{
    ast::{Expression, FunctionDef, InfixOperator, Module, Statement},
    symbol::Symbol,
    tokenizer::{Delimiter, Keyword, LexError, Operator, Precedence, Token, TokenType, Tokenizer},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    Token(TokenType),
    Identifier,
    Expression,
    Statement,
    Definition,
    ArgumentSeparator,
    EndOfInput,
}

impl Display for Expected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expected::Token(token_type) => write!(f, "\"{}\"", token_type),
            Expected::Identifier => write!(f, "an identifier"),
            Expected::Expression => write!(f, "an expression"),
            Expected::Statement => write!(f, "a statement"),
            Expected::Definition => write!(f, "a definition"),
            Expected::ArgumentSeparator => write!(f, "\",\" or \")\""),
            Expected::EndOfInput => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("Expected {expected} at {} but found \"{}\"", found.span, found.token_type)]
    Expected { expected: Expected, found: Token },
    #[error("Expected {expected} but reached end of input")]
    UnexpectedEof { expected: Expected },
}

impl ParseError {
    /// True when more input could have completed the construct.
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self,
            ParseError::UnexpectedEof { .. } | ParseError::Lex(LexError::UnterminatedString { .. })
        )
    }
}

impl From<Operator> for InfixOperator {
    fn from(operator: Operator) -> Self {
        match operator {
            Operator::Plus => InfixOperator::Add,
            Operator::Minus => InfixOperator::Subtract,
            Operator::Star => InfixOperator::Multiply,
            Operator::Slash => InfixOperator::Divide,
            Operator::Dot => InfixOperator::FieldAccess,
        }
    }
}

pub struct Parser<'i, I: Iterator<Item = char>> {
    tokenizer: Tokenizer<'i, I>,
}

impl<'i, I: Iterator<Item = char>> Parser<'i, I> {
    pub fn new(tokenizer: Tokenizer<'i, I>) -> Self {
        Self { tokenizer }
    }

    /// Reads every definition up to the end of input.
    pub fn module(&mut self) -> Result<Module, ParseError> {
        let mut definitions = Vec::new();
        while let Some(definition) = self.definition()? {
            definitions.push(definition);
        }
        Ok(Module(definitions))
    }

    /// Reads the next `defun`, or `None` once the input is exhausted.
    pub fn definition(&mut self) -> Result<Option<FunctionDef>, ParseError> {
        loop {
            match self.peek()? {
                None => return Ok(None),
                Some(token) if is_terminator(&token) => {
                    self.advance(Expected::Definition)?;
                }
                Some(_) => break,
            }
        }

        let token = self.advance(Expected::Definition)?;
        if token.token_type != TokenType::Keyword(Keyword::Defun) {
            return Err(ParseError::Expected {
                expected: Expected::Definition,
                found: token,
            });
        }

        let name = self.match_identifier()?;
        self.consume(TokenType::Delimiter(Delimiter::OpenParen))?;
        let params = self.parameters()?;
        self.consume(TokenType::Delimiter(Delimiter::Equals))?;
        let body = self.statements_until_end()?;

        Ok(Some(FunctionDef { name, params, body }))
    }

    fn parameters(&mut self) -> Result<Vec<Symbol>, ParseError> {
        let mut params = Vec::new();
        if self.next_is(&TokenType::Delimiter(Delimiter::CloseParen))? {
            self.advance(Expected::Identifier)?;
            return Ok(params);
        }

        loop {
            params.push(self.match_identifier()?);
            let token = self.advance(Expected::ArgumentSeparator)?;
            match token.token_type {
                TokenType::Delimiter(Delimiter::Comma) => {}
                TokenType::Delimiter(Delimiter::CloseParen) => return Ok(params),
                _ => {
                    return Err(ParseError::Expected {
                        expected: Expected::ArgumentSeparator,
                        found: token,
                    })
                }
            }
        }
    }

    /// Parses one statement. A bare terminator parses as `None` and should be
    /// dropped by the caller.
    pub fn statement(&mut self) -> Result<Option<Statement>, ParseError> {
        let Some(token) = self.peek()? else {
            return Err(ParseError::UnexpectedEof {
                expected: Expected::Statement,
            });
        };

        match token.token_type {
            TokenType::Keyword(Keyword::Let) => self.let_statement().map(Some),
            TokenType::Keyword(Keyword::Return) => self.return_statement().map(Some),
            TokenType::Keyword(Keyword::Do) => self.block().map(Some),
            TokenType::Delimiter(Delimiter::Terminator) => {
                self.advance(Expected::Statement)?;
                Ok(None)
            }
            TokenType::Keyword(_) => Err(ParseError::Expected {
                expected: Expected::Statement,
                found: token,
            }),
            _ => Ok(Some(Statement::Expression(self.expression()?))),
        }
    }

    /// Succeeds only if nothing but terminators remains.
    pub fn finish(&mut self) -> Result<(), ParseError> {
        while let Some(token) = self.tokenizer.next_token()? {
            if !is_terminator(&token) {
                return Err(ParseError::Expected {
                    expected: Expected::EndOfInput,
                    found: token,
                });
            }
        }
        Ok(())
    }

    pub fn block(&mut self) -> Result<Statement, ParseError> {
        self.consume(TokenType::Keyword(Keyword::Do))?;
        Ok(Statement::Block(self.statements_until_end()?))
    }

    fn statements_until_end(&mut self) -> Result<Vec<Statement>, ParseError> {
        let end = TokenType::Keyword(Keyword::End);
        let mut statements = Vec::new();
        loop {
            match self.peek()? {
                Some(token) if token.token_type == end => {
                    self.advance(Expected::Token(end))?;
                    return Ok(statements);
                }
                Some(_) => {
                    if let Some(statement) = self.statement()? {
                        statements.push(statement);
                    }
                }
                None => return Err(ParseError::UnexpectedEof {
                    expected: Expected::Token(end),
                }),
            }
        }
    }

    fn let_statement(&mut self) -> Result<Statement, ParseError> {
        self.consume(TokenType::Keyword(Keyword::Let))?;
        let name = self.match_identifier()?;
        self.consume(TokenType::Delimiter(Delimiter::Equals))?;
        let initializer = self.expression()?;
        Ok(Statement::Let(name, initializer))
    }

    fn return_statement(&mut self) -> Result<Statement, ParseError> {
        self.consume(TokenType::Keyword(Keyword::Return))?;
        match self.peek()? {
            None => Ok(Statement::Return(None)),
            Some(token) if is_terminator(&token) => {
                self.advance(Expected::Statement)?;
                Ok(Statement::Return(None))
            }
            Some(token) if token.token_type == TokenType::Keyword(Keyword::End) => {
                Ok(Statement::Return(None))
            }
            Some(_) => Ok(Statement::Return(Some(self.expression()?))),
        }
    }

    pub fn expression(&mut self) -> Result<Expression, ParseError> {
        self.precedence(Precedence::None)
    }

    fn precedence(&mut self, min: Precedence) -> Result<Expression, ParseError> {
        let token = self.advance(Expected::Expression)?;
        let mut expr = self.prefix(token)?;

        while let Some(token) = self.peek()? {
            if token.token_type.precedence() <= min {
                break;
            }
            let token = self.advance(Expected::Expression)?;
            expr = self.infix(expr, token)?;
        }

        Ok(expr)
    }

    fn prefix(&mut self, token: Token) -> Result<Expression, ParseError> {
        match token.token_type {
            TokenType::Number(n) => Ok(Expression::Number(n)),
            TokenType::String(s) => Ok(Expression::String(s)),
            TokenType::Identifier(name) => Ok(Expression::Identifier(name)),
            TokenType::Delimiter(Delimiter::OpenParen) => {
                let expr = self.precedence(Precedence::None)?;
                self.consume(TokenType::Delimiter(Delimiter::CloseParen))?;
                Ok(expr)
            }
            _ => Err(ParseError::Expected {
                expected: Expected::Expression,
                found: token,
            }),
        }
    }

    fn infix(&mut self, left: Expression, token: Token) -> Result<Expression, ParseError> {
        match token.token_type {
            TokenType::Operator(operator) => {
                let right = self.precedence(token.token_type.precedence())?;
                Ok(Expression::Binary(
                    Box::new(left),
                    operator.into(),
                    Box::new(right),
                ))
            }
            TokenType::Delimiter(Delimiter::OpenParen) => self.call(left),
            _ => Err(ParseError::Expected {
                expected: Expected::Expression,
                found: token,
            }),
        }
    }

    fn call(&mut self, callee: Expression) -> Result<Expression, ParseError> {
        let mut args = Vec::new();
        if self.next_is(&TokenType::Delimiter(Delimiter::CloseParen))? {
            self.advance(Expected::ArgumentSeparator)?;
            return Ok(Expression::Call(Box::new(callee), args));
        }

        loop {
            args.push(self.expression()?);
            let token = self.advance(Expected::ArgumentSeparator)?;
            match token.token_type {
                TokenType::Delimiter(Delimiter::Comma) => {}
                TokenType::Delimiter(Delimiter::CloseParen) => break,
                _ => {
                    return Err(ParseError::Expected {
                        expected: Expected::ArgumentSeparator,
                        found: token,
                    })
                }
            }
        }

        Ok(Expression::Call(Box::new(callee), args))
    }

    fn peek(&mut self) -> Result<Option<Token>, ParseError> {
        Ok(self.tokenizer.peek()?.cloned())
    }

    fn next_is(&mut self, token_type: &TokenType) -> Result<bool, ParseError> {
        Ok(self
            .tokenizer
            .peek()?
            .is_some_and(|token| &token.token_type == token_type))
    }

    fn advance(&mut self, expected: Expected) -> Result<Token, ParseError> {
        self.tokenizer
            .next_token()?
            .ok_or(ParseError::UnexpectedEof { expected })
    }

    fn consume(&mut self, token_type: TokenType) -> Result<Token, ParseError> {
        let token = self.advance(Expected::Token(token_type.clone()))?;
        if token.token_type == token_type {
            Ok(token)
        } else {
            Err(ParseError::Expected {
                expected: Expected::Token(token_type),
                found: token,
            })
        }
    }

    fn match_identifier(&mut self) -> Result<Symbol, ParseError> {
        let token = self.advance(Expected::Identifier)?;
        match token.token_type {
            TokenType::Identifier(name) => Ok(name),
            _ => Err(ParseError::Expected {
                expected: Expected::Identifier,
                found: token,
            }),
        }
    }
}

fn is_terminator(token: &Token) -> bool {
    token.token_type == TokenType::Delimiter(Delimiter::Terminator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Interner;

    fn parse_expression(source: &str, interner: &mut Interner) -> Result<Expression, ParseError> {
        Parser::new(Tokenizer::new(source.chars(), interner)).expression()
    }

    fn number(n: f64) -> Box<Expression> {
        Box::new(Expression::Number(n))
    }

    #[test]
    fn test_literal() {
        let mut interner = Interner::new();
        assert_eq!(
            parse_expression("500", &mut interner).unwrap(),
            Expression::Number(500.0)
        );
    }

    #[test]
    fn test_binary_precedence() {
        let mut interner = Interner::new();
        let expr = parse_expression("1 * 2 + 3 / 4 - 5", &mut interner).unwrap();
        let expected = Expression::Binary(
            Box::new(Expression::Binary(
                Box::new(Expression::Binary(number(1.0), InfixOperator::Multiply, number(2.0))),
                InfixOperator::Add,
                Box::new(Expression::Binary(number(3.0), InfixOperator::Divide, number(4.0))),
            )),
            InfixOperator::Subtract,
            number(5.0),
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_left_associative() {
        let mut interner = Interner::new();
        let expr = parse_expression("8 - 4 - 2", &mut interner).unwrap();
        let expected = Expression::Binary(
            Box::new(Expression::Binary(number(8.0), InfixOperator::Subtract, number(4.0))),
            InfixOperator::Subtract,
            number(2.0),
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_parens() {
        let mut interner = Interner::new();
        let expr = parse_expression("1 * (2 + 3)", &mut interner).unwrap();
        let expected = Expression::Binary(
            number(1.0),
            InfixOperator::Multiply,
            Box::new(Expression::Binary(number(2.0), InfixOperator::Add, number(3.0))),
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_function_calls() {
        let mut interner = Interner::new();
        let mut parser = Parser::new(Tokenizer::new(
            "halt() free(address) list(2, 3, 4, 5)".chars(),
            &mut interner,
        ));
        let first = parser.expression().unwrap();
        let second = parser.expression().unwrap();
        let third = parser.expression().unwrap();
        drop(parser);

        let halt = interner.intern("halt");
        let free = interner.intern("free");
        let address = interner.intern("address");
        let list = interner.intern("list");

        assert_eq!(
            first,
            Expression::Call(Box::new(Expression::Identifier(halt)), vec![])
        );
        assert_eq!(
            second,
            Expression::Call(
                Box::new(Expression::Identifier(free)),
                vec![Expression::Identifier(address)]
            )
        );
        assert_eq!(
            third,
            Expression::Call(
                Box::new(Expression::Identifier(list)),
                vec![
                    Expression::Number(2.0),
                    Expression::Number(3.0),
                    Expression::Number(4.0),
                    Expression::Number(5.0),
                ]
            )
        );
    }

    #[test]
    fn test_call_binds_tighter_than_operators() {
        let mut interner = Interner::new();
        let expr = parse_expression("1 + f(2) * 3", &mut interner).unwrap();
        let f = interner.intern("f");
        let call = Expression::Call(Box::new(Expression::Identifier(f)), vec![Expression::Number(2.0)]);
        let expected = Expression::Binary(
            number(1.0),
            InfixOperator::Add,
            Box::new(Expression::Binary(Box::new(call), InfixOperator::Multiply, number(3.0))),
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_unclosed_paren() {
        let mut interner = Interner::new();
        let err = parse_expression("(1 + 2", &mut interner).unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn test_mismatched_paren() {
        let mut interner = Interner::new();
        let err = parse_expression("(1 + 2]", &mut interner).unwrap_err();
        match err {
            ParseError::Expected { expected, found } => {
                assert_eq!(
                    expected,
                    Expected::Token(TokenType::Delimiter(Delimiter::CloseParen))
                );
                assert_eq!(
                    found.token_type,
                    TokenType::Delimiter(Delimiter::CloseBracket)
                );
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_operator_in_prefix_position() {
        let mut interner = Interner::new();
        let err = parse_expression("* 2", &mut interner).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Expected {
                expected: Expected::Expression,
                ..
            }
        ));
    }

    #[test]
    fn test_keyword_in_prefix_position() {
        let mut interner = Interner::new();
        assert!(parse_expression("if", &mut interner).is_err());
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let mut interner = Interner::new();
        let err = parse_expression("754furb", &mut interner).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Lex(LexError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_block_newlines_match_terminators() {
        let mut interner = Interner::new();
        let with_newlines = Parser::new(Tokenizer::new(
            "do\n  let x = 5\n  let y = 10\n  x + y\nend".chars(),
            &mut interner,
        ))
        .block()
        .unwrap();
        let with_terminators = Parser::new(Tokenizer::new(
            "do let x = 5; let y = 10; x + y; end".chars(),
            &mut interner,
        ))
        .block()
        .unwrap();
        assert_eq!(with_newlines, with_terminators);

        let Statement::Block(statements) = with_newlines else {
            panic!("expected a block");
        };
        assert_eq!(statements.len(), 3);
    }

    #[test]
    fn test_finish_rejects_trailing_tokens() {
        let mut interner = Interner::new();
        let mut parser = Parser::new(Tokenizer::new("1 + 2 3".chars(), &mut interner));
        parser.expression().unwrap();
        assert!(matches!(
            parser.finish(),
            Err(ParseError::Expected {
                expected: Expected::EndOfInput,
                found: Token {
                    token_type: TokenType::Number(n),
                    ..
                },
            }) if n == 3.0
        ));

        let mut parser = Parser::new(Tokenizer::new("1 + 2;\n;".chars(), &mut interner));
        parser.expression().unwrap();
        assert_eq!(parser.finish(), Ok(()));
    }

    #[test]
    fn test_return_without_value() {
        let mut interner = Interner::new();
        let mut parser = Parser::new(Tokenizer::new("return\nreturn; return 1".chars(), &mut interner));
        assert_eq!(parser.statement().unwrap(), Some(Statement::Return(None)));
        assert_eq!(parser.statement().unwrap(), Some(Statement::Return(None)));
        assert_eq!(
            parser.statement().unwrap(),
            Some(Statement::Return(Some(Expression::Number(1.0))))
        );
    }

    #[test]
    fn test_definition() {
        let mut interner = Interner::new();
        let module = Parser::new(Tokenizer::new(
            "defun add(x, y) = return x + y end\n\ndefun zero() =\n  return 0\nend\n".chars(),
            &mut interner,
        ))
        .module()
        .unwrap();
        let add = interner.intern("add");
        let x = interner.intern("x");
        let y = interner.intern("y");

        assert_eq!(module.0.len(), 2);
        assert_eq!(
            module.0[0],
            FunctionDef {
                name: add,
                params: vec![x.clone(), y.clone()],
                body: vec![Statement::Return(Some(Expression::Binary(
                    Box::new(Expression::Identifier(x)),
                    InfixOperator::Add,
                    Box::new(Expression::Identifier(y)),
                )))],
            }
        );
        assert!(module.0[1].params.is_empty());
        assert_eq!(module.0[1].body.len(), 1);
    }

    #[test]
    fn test_nested_block_in_definition() {
        let mut interner = Interner::new();
        let module = Parser::new(Tokenizer::new(
            "defun f() =\n  do\n    let x = 1\n  end\n  return 2\nend".chars(),
            &mut interner,
        ))
        .module()
        .unwrap();
        assert!(matches!(module.0[0].body[0], Statement::Block(_)));
    }

    #[test]
    fn test_parameter_must_be_identifier() {
        let mut interner = Interner::new();
        let err = Parser::new(Tokenizer::new("defun f(1) = end".chars(), &mut interner))
            .definition()
            .unwrap_err();
        assert!(matches!(
            err,
            ParseError::Expected {
                expected: Expected::Identifier,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_end() {
        let mut interner = Interner::new();
        let err = Parser::new(Tokenizer::new("defun f() = return 1".chars(), &mut interner))
            .definition()
            .unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn test_top_level_must_be_definition() {
        let mut interner = Interner::new();
        let err = Parser::new(Tokenizer::new("let x = 1".chars(), &mut interner))
            .module()
            .unwrap_err();
        assert!(matches!(
            err,
            ParseError::Expected {
                expected: Expected::Definition,
                ..
            }
        ));
    }

    #[test]
    fn test_pretty_print() {
        let mut interner = Interner::new();
        let expr = parse_expression("f(1, 2 * x)", &mut interner).unwrap();
        assert_eq!(expr.to_string(), "f(1, (* 2 x))");
    }

    #[test]
    fn test_pretty_print_indents_blocks() {
        let mut interner = Interner::new();
        let module = Parser::new(Tokenizer::new(
            "defun f(a) =\nlet b = a\ndo\nlet c = b\ndo\nreturn c\nend\nend\nreturn\nend".chars(),
            &mut interner,
        ))
        .module()
        .unwrap();

        let expected = "\
defun f(a) =
  let b = a;
  do
    let c = b;
    do
      return c;
    end
  end
  return;
end
";
        assert_eq!(module.to_string(), expected);
    }
}
