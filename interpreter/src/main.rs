use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::thread;

use basic_interpreter::{Error, FsLoader, Interpreter, Parser, Program, INTERPRETER_STACK_SIZE};
use clap::Parser as ClapParser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

const LOG_VARIABLE: &str = "BASIC_LOG";

#[derive(Debug, ClapParser)]
#[command(name = "basic", version, about = "Line-oriented BASIC interpreter")]
struct Args {
    /// Source file or saved syntax tree to run. Starts an interactive session when omitted.
    program: Option<PathBuf>,

    /// Print the syntax tree instead of running the program
    #[arg(short, long)]
    ast: bool,

    /// Save the syntax tree to PATH instead of running the program
    #[arg(short, long, value_name = "PATH")]
    save: Option<PathBuf>,
}

fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_env(LOG_VARIABLE).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    // deep recursion in BASIC programs means deep recursion in the evaluator
    let spawned = thread::Builder::new()
        .name(String::from("interpreter"))
        .stack_size(INTERPRETER_STACK_SIZE)
        .spawn(move || match &args.program {
            Some(path) => run_file(path, &args),
            None => repl(),
        });

    let result = match spawned {
        Ok(handle) => handle.join(),
        Err(err) => {
            eprintln!("ERROR: {}", err);
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(err)) => {
            eprintln!("ERROR: {}", err);
            ExitCode::FAILURE
        }
        Err(_) => ExitCode::FAILURE,
    }
}

fn run_file(path: &Path, args: &Args) -> Result<(), Error> {
    let data = fs::read(path)?;
    let program = if Program::is_saved(&data) {
        Program::load(data.as_slice())?
    } else {
        let src = String::from_utf8(data).map_err(|err| Error::Io {
            msg: format!("{}: {}", path.display(), err),
        })?;
        let mut parser = Parser::with_loader(Box::new(FsLoader::from_env(path.parent())));
        parser.parse(&src)?;
        parser.finish()?
    };

    if args.ast {
        println!("{}", program);
    }
    if let Some(target) = &args.save {
        let mut writer = BufWriter::new(File::create(target)?);
        program.save(&mut writer)?;
        writer.flush()?;
    }
    if args.ast || args.save.is_some() {
        return Ok(());
    }

    let mut interpreter = Interpreter::new(Rc::new(RefCell::new(io::stdout())));
    interpreter.run(&program)
}

fn repl() -> Result<(), Error> {
    let mut editor = DefaultEditor::new().map_err(readline_error)?;
    let mut interpreter = Interpreter::new(Rc::new(RefCell::new(io::stdout())));
    let mut parser = Parser::with_loader(Box::new(FsLoader::from_env(None)));
    let mut count = 1;

    loop {
        let prompt = if parser.is_open() {
            String::from("> ")
        } else {
            format!("In [{}]: ", count)
        };

        let line = match editor.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                parser.abandon();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(readline_error(err)),
        };
        if line.trim().is_empty() {
            continue;
        }
        editor
            .add_history_entry(line.as_str())
            .map_err(readline_error)?;

        let statements = match parser.parse(&line) {
            Ok(statements) => statements,
            Err(err) => {
                eprintln!("ERROR: {}", err);
                parser.abandon();
                continue;
            }
        };

        for statement in &statements {
            match interpreter.execute(statement) {
                Ok(value) if !value.is_nothing() => println!("Out [{}]: {}", count, value),
                Ok(_) => {}
                Err(err) => eprintln!("ERROR: {}", err),
            }
        }
        if !statements.is_empty() {
            count += 1;
        }
    }

    Ok(())
}

fn readline_error(err: ReadlineError) -> Error {
    Error::Io {
        msg: err.to_string(),
    }
}
