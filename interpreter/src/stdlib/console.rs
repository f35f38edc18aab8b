use std::io::{BufRead, Write};

use crate::ast::NodeRef;
use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::value::Value;

pub(super) fn install(interpreter: &mut Interpreter) {
    interpreter.register(
        "PRINT",
        Box::new(|interpreter: &mut Interpreter, args: &[NodeRef]| {
            print(interpreter, args, true)
        }),
    );
    interpreter.register(
        "WRITE",
        Box::new(|interpreter: &mut Interpreter, args: &[NodeRef]| {
            print(interpreter, args, false)
        }),
    );
    interpreter.register("INPUT", Box::new(input));
}

// Each argument is written as soon as it is evaluated, so output produced while evaluating a
// later argument comes after it.
fn print(interpreter: &mut Interpreter, args: &[NodeRef], newline: bool) -> Result<Value, Error> {
    let stdout = interpreter.stdout();
    if args.is_empty() && newline {
        writeln!(stdout.borrow_mut())?;
    }

    for arg in args {
        let value = interpreter.evaluate(arg)?;
        let mut out = stdout.borrow_mut();
        if newline {
            writeln!(out, "{}", value)?;
        } else {
            write!(out, "{}", value)?;
        }
    }

    stdout.borrow_mut().flush()?;
    Ok(Value::Nothing)
}

/// Reads one line, without its terminator. An optional argument is written out first as a
/// prompt. Yields `Nothing` at end of input.
fn input(interpreter: &mut Interpreter, args: &[NodeRef]) -> Result<Value, Error> {
    if args.len() > 1 {
        return Err(Error::ArgumentCount {
            name: String::from("INPUT"),
            expected: 1,
            got: args.len(),
        });
    }
    if let Some(prompt) = args.first() {
        let prompt = interpreter.evaluate(prompt)?;
        let stdout = interpreter.stdout();
        let mut out = stdout.borrow_mut();
        write!(out, "{}", prompt)?;
        out.flush()?;
    }

    let stdin = interpreter.stdin();
    let mut line = String::new();
    if stdin.borrow_mut().read_line(&mut line)? == 0 {
        return Ok(Value::Nothing);
    }
    Ok(Value::from(trim_line_end(&line)))
}

pub(super) fn trim_line_end(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .unwrap_or(line)
}
