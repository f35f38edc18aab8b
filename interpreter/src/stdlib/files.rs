use std::any::Any;
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::rc::Rc;

use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::stdlib::console::trim_line_end;
use crate::stdlib::{expect_args, expect_str, wrong_type};
use crate::value::{Object, Value};

enum Handle {
    Reader(BufReader<File>),
    Writer(BufWriter<File>),
    Closed,
}

/// A file opened by OPEN, either for reading or for writing.
pub(crate) struct FileHandle {
    path: String,
    handle: RefCell<Handle>,
}

impl Debug for FileHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "FileHandle({})", self.path)
    }
}

impl Object for FileHandle {
    fn type_name(&self) -> &'static str {
        "FILE"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl FileHandle {
    fn open(path: &str, mode: &str) -> Result<Self, Error> {
        let handle = match mode {
            "r" => Handle::Reader(BufReader::new(File::open(path)?)),
            "w" => Handle::Writer(BufWriter::new(File::create(path)?)),
            "a" => Handle::Writer(BufWriter::new(
                OpenOptions::new().append(true).create(true).open(path)?,
            )),
            other => {
                return Err(Error::runtime(format_args!(
                    "unknown file mode \"{}\", expected \"r\", \"w\" or \"a\"",
                    other
                )))
            }
        };
        Ok(FileHandle {
            path: String::from(path),
            handle: RefCell::new(handle),
        })
    }

    fn write(&self, text: &str) -> Result<(), Error> {
        match &mut *self.handle.borrow_mut() {
            Handle::Writer(writer) => {
                writer.write_all(text.as_bytes())?;
                Ok(())
            }
            _ => Err(Error::runtime(format_args!(
                "{} is not open for writing",
                self.path
            ))),
        }
    }

    fn read_line(&self) -> Result<Value, Error> {
        match &mut *self.handle.borrow_mut() {
            Handle::Reader(reader) => {
                let mut line = String::new();
                if reader.read_line(&mut line)? == 0 {
                    Ok(Value::Nothing)
                } else {
                    Ok(Value::from(trim_line_end(&line)))
                }
            }
            _ => Err(Error::runtime(format_args!(
                "{} is not open for reading",
                self.path
            ))),
        }
    }

    fn close(&self) -> Result<(), Error> {
        let handle = self.handle.replace(Handle::Closed);
        if let Handle::Writer(mut writer) = handle {
            writer.flush()?;
        }
        Ok(())
    }
}

fn file_arg<'a>(name: &str, value: &'a Value) -> Result<&'a FileHandle, Error> {
    match value {
        Value::Object(object) => object
            .as_any()
            .downcast_ref::<FileHandle>()
            .ok_or_else(|| wrong_type(name, "a file", value)),
        other => Err(wrong_type(name, "a file", other)),
    }
}

pub(super) fn install(interpreter: &mut Interpreter) {
    interpreter.reflect(
        "OPEN",
        Box::new(|args: &[Value]| {
            let (path, mode) = match args {
                [path] => (expect_str("OPEN", path)?, "r"),
                [path, mode] => (expect_str("OPEN", path)?, expect_str("OPEN", mode)?),
                _ => return Err(arity("OPEN", 2, args.len())),
            };
            let handle = FileHandle::open(path, &mode.to_ascii_lowercase())?;
            Ok(Value::Object(Rc::new(handle)))
        }),
    );
    interpreter.reflect(
        "CLOSE",
        Box::new(|args: &[Value]| {
            expect_args("CLOSE", args, 1)?;
            file_arg("CLOSE", &args[0])?.close()?;
            Ok(Value::Nothing)
        }),
    );
    interpreter.reflect(
        "FPRINT",
        Box::new(|args: &[Value]| write_values("FPRINT", args, true)),
    );
    interpreter.reflect(
        "FWRITE",
        Box::new(|args: &[Value]| write_values("FWRITE", args, false)),
    );
    interpreter.reflect(
        "FINPUT",
        Box::new(|args: &[Value]| {
            expect_args("FINPUT", args, 1)?;
            file_arg("FINPUT", &args[0])?.read_line()
        }),
    );
}

fn write_values(name: &str, args: &[Value], newline: bool) -> Result<Value, Error> {
    let (file, values) = match args.split_first() {
        Some((file, values)) => (file_arg(name, file)?, values),
        None => return Err(arity(name, 1, 0)),
    };
    for value in values {
        if newline {
            file.write(&format!("{}\n", value))?;
        } else {
            file.write(&value.to_string())?;
        }
    }
    Ok(Value::Nothing)
}

fn arity(name: &str, expected: usize, got: usize) -> Error {
    Error::ArgumentCount {
        name: String::from(name),
        expected,
        got,
    }
}
