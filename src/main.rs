use std::{
    io::Write,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Args, Parser, Subcommand};
use defunct::{
    compiler::{compile, CompileFailure},
    globals::Globals,
    parser::ParseError,
    repl::{ReplError, Session},
    symbol::Interner,
    tokenizer::{LexError, Tokenizer},
    vm::{RuntimeError, Value, Vm},
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Compiler and bytecode VM for the defunct language")]
struct Cli {
    /// Raise the default log level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn command(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Repl)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile a file and call one of its functions
    Run(RunArgs),
    /// Read definitions and expressions interactively
    Repl,
    /// Print the token stream of a file
    Tokens(FileArgs),
    /// Print the parsed definitions of a file
    Parse(FileArgs),
    /// Print the bytecode of every definition in a file
    Disassemble(FileArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    file: PathBuf,

    /// Function to call
    #[arg(short, long, default_value = "main")]
    function: String,

    /// Numeric arguments passed to the function
    #[arg(allow_negative_numbers = true)]
    args: Vec<f64>,
}

#[derive(Debug, Args)]
struct FileArgs {
    file: PathBuf,
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileFailure),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command() {
        Command::Run(args) => run_command(args),
        Command::Repl => repl_command(),
        Command::Tokens(args) => tokens_command(args),
        Command::Parse(args) => parse_command(args),
        Command::Disassemble(args) => disassemble_command(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .without_time()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

fn read_source(path: &Path) -> Result<String, AppError> {
    std::fs::read_to_string(path).map_err(|source| AppError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn run_command(args: &RunArgs) -> Result<(), AppError> {
    let source = read_source(&args.file)?;
    let mut interner = Interner::new();
    let mut globals = Globals::new();
    compile(source.chars(), &mut interner, &mut globals)?;

    let values: Vec<Value> = args.args.iter().copied().map(Value::Number).collect();
    match Vm::new(&globals).call(&args.function, &values)? {
        Some(value) => println!("{value}"),
        None => tracing::info!(function = %args.function, "returned no value"),
    }
    Ok(())
}

fn tokens_command(args: &FileArgs) -> Result<(), AppError> {
    let source = read_source(&args.file)?;
    let mut interner = Interner::new();
    let mut line = 0;
    for token in Tokenizer::new(source.chars(), &mut interner) {
        let token = token?;
        if token.span.start_line != line {
            print!("{:4} ", token.span.start_line);
            line = token.span.start_line;
        } else {
            print!("   | ");
        }
        println!("{:<4} {}", token.span.start_column, token.token_type);
    }
    Ok(())
}

fn parse_command(args: &FileArgs) -> Result<(), AppError> {
    let source = read_source(&args.file)?;
    let mut interner = Interner::new();
    let module = defunct::parser::Parser::new(Tokenizer::new(source.chars(), &mut interner)).module()?;
    print!("{module}");
    Ok(())
}

fn disassemble_command(args: &FileArgs) -> Result<(), AppError> {
    let source = read_source(&args.file)?;
    let mut interner = Interner::new();
    let mut globals = Globals::new();
    let definitions = compile(source.chars(), &mut interner, &mut globals)?;
    for (_, id) in definitions.iter() {
        if let Some(unit) = globals.get(*id) {
            println!("{}", unit.disassemble());
        }
    }
    Ok(())
}

fn repl_command() -> Result<(), AppError> {
    println!("Welcome to the defunct REPL!");
    println!("EOF to exit. (Ctrl+D on *nix, Ctrl+Z on Windows)");

    let mut session = Session::new();
    let mut buffer = String::new();

    loop {
        print!("{}", if buffer.is_empty() { "> " } else { ". " });
        std::io::stdout().flush()?;

        let read = std::io::stdin().read_line(&mut buffer)?;
        if read == 0 {
            break;
        }
        if buffer.trim().is_empty() {
            buffer.clear();
            continue;
        }

        match session.evaluate(&buffer) {
            Ok(Some(output)) => println!("{output}"),
            Ok(None) => {}
            Err(ReplError::Incomplete) => continue,
            Err(e) => eprintln!("{e}"),
        }
        buffer.clear();
    }

    Ok(())
}
