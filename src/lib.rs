pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod globals;
pub mod parser;
pub mod repl;
pub mod span;
pub mod symbol;
pub mod tokenizer;
pub mod vm;
