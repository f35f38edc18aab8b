use std::io::Write;
use std::thread;
use std::time::Duration;

use crate::ast::NodeRef;
use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::scope::Scope;
use crate::stdlib::{expect_args, expect_f64};
use crate::value::Value;

pub(super) fn install(interpreter: &mut Interpreter) {
    interpreter.register(
        "CLS",
        Box::new(|interpreter: &mut Interpreter, _: &[NodeRef]| {
            let stdout = interpreter.stdout();
            let mut out = stdout.borrow_mut();
            // clear the screen and home the cursor
            write!(out, "\x1b[2J\x1b[H")?;
            out.flush()?;
            Ok(Value::Nothing)
        }),
    );
    // SLEEP(SECONDS)
    interpreter.reflect(
        "SLEEP",
        Box::new(|args: &[Value]| {
            expect_args("SLEEP", args, 1)?;
            let seconds = expect_f64("SLEEP", &args[0])?;
            let duration = Duration::try_from_secs_f64(seconds).map_err(|_| {
                Error::runtime(format_args!("SLEEP: invalid duration {}", seconds))
            })?;
            thread::sleep(duration);
            Ok(Value::Nothing)
        }),
    );
    interpreter.register("SWAP", Box::new(swap));
}

// SWAP A, B exchanges two variables in the scopes that own them
fn swap(interpreter: &mut Interpreter, args: &[NodeRef]) -> Result<Value, Error> {
    if args.len() != 2 {
        return Err(Error::ArgumentCount {
            name: String::from("SWAP"),
            expected: 2,
            got: args.len(),
        });
    }

    let mut names = Vec::with_capacity(2);
    for arg in args {
        match arg.borrow().as_identifier() {
            Some(name) => names.push(String::from(name)),
            None => {
                return Err(Error::runtime(format_args!(
                    "SWAP expects two variable names"
                )))
            }
        }
    }

    let first = interpreter.evaluate(&args[0])?;
    let second = interpreter.evaluate(&args[1])?;
    let scope = interpreter.scope();
    Scope::assign_shared(&scope, &names[0], second);
    Scope::assign_shared(&scope, &names[1], first);
    Ok(Value::Nothing)
}

#[cfg(test)]
mod tests {
    use crate::stdlib::testing::run;

    #[test]
    fn test_swap() {
        let src = "
            A = 1
            B = \"two\"
            SWAP A, B
            PRINT A, B
            SUB INNER
                SWAP A, B
            END SUB
            INNER
            PRINT A, B
        ";
        assert_eq!(run(src).unwrap(), "two\n1\n1\ntwo\n");
        assert_eq!(
            run("SWAP 1, 2").unwrap_err().to_string(),
            "SWAP expects two variable names"
        );
    }

    #[test]
    fn test_cls_and_sleep() {
        assert_eq!(run("CLS\nSLEEP 0.001").unwrap(), "\x1b[2J\x1b[H");
        assert!(run("SLEEP -1").is_err());
    }
}
