//! Built-in bindings available to every program, plus the libraries a `USE` statement can pull
//! in by name.

use tracing::debug;

use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::value::Value;

mod console;
mod containers;
mod files;
mod math;
mod strings;
mod system;

pub(crate) fn install(interpreter: &mut Interpreter) {
    console::install(interpreter);
    files::install(interpreter);
    math::install(interpreter);
    strings::install(interpreter);
    system::install(interpreter);
}

const LIBRARIES: [(&str, fn(&mut Interpreter)); 2] = [
    ("BQUEUE", containers::install_queues),
    ("DEQUE", containers::install_deque),
];

pub(crate) fn is_library(name: &str) -> bool {
    LIBRARIES
        .iter()
        .any(|(library, _)| library.eq_ignore_ascii_case(name))
}

/// Binds the functions of library `name` into the global scope. Installing twice is harmless.
pub(crate) fn install_library(interpreter: &mut Interpreter, name: &str) -> Result<(), Error> {
    match LIBRARIES
        .iter()
        .find(|(library, _)| library.eq_ignore_ascii_case(name))
    {
        Some((library, install)) => {
            debug!(library, "installing library");
            install(interpreter);
            Ok(())
        }
        None => Err(Error::ModuleNotFound {
            name: name.to_ascii_uppercase(),
        }),
    }
}

// Argument helpers shared by the bindings

pub(crate) fn expect_args(name: &str, args: &[Value], expected: usize) -> Result<(), Error> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(Error::ArgumentCount {
            name: String::from(name),
            expected,
            got: args.len(),
        })
    }
}

pub(crate) fn expect_str<'a>(name: &str, value: &'a Value) -> Result<&'a str, Error> {
    match value {
        Value::Str(val) => Ok(val),
        other => Err(wrong_type(name, "a string", other)),
    }
}

pub(crate) fn expect_int(name: &str, value: &Value) -> Result<i64, Error> {
    match value {
        Value::Int(val) => Ok(*val),
        Value::Float(val) if val.fract() == 0.0 => Ok(*val as i64),
        other => Err(wrong_type(name, "an integer", other)),
    }
}

pub(crate) fn expect_f64(name: &str, value: &Value) -> Result<f64, Error> {
    value
        .as_f64()
        .ok_or_else(|| wrong_type(name, "a number", value))
}

pub(crate) fn wrong_type(name: &str, expected: &str, found: &Value) -> Error {
    Error::runtime(format_args!(
        "{} expects {}, found {}",
        name,
        expected,
        found.type_name()
    ))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::rc::Rc;
    use std::str;

    use crate::error::Error;
    use crate::interpreter::Interpreter;
    use crate::parser::Parser;

    /// Runs `src` with `input` on stdin and returns what it printed.
    pub(crate) fn run_with_input(src: &str, input: &str) -> Result<String, Error> {
        let output: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let input = Rc::new(RefCell::new(Cursor::new(input.as_bytes().to_vec())));
        let mut interpreter = Interpreter::new(output.clone()).with_input(input);

        let mut parser = Parser::new();
        parser.parse(src)?;
        let program = parser.finish()?;
        interpreter.run(&program)?;

        let printed = String::from(str::from_utf8(&output.borrow()).unwrap());
        Ok(printed)
    }

    pub(crate) fn run(src: &str) -> Result<String, Error> {
        run_with_input(src, "")
    }
}
