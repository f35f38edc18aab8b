use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::stdlib::{expect_args, expect_f64, wrong_type};
use crate::value::Value;

const UNARY: [(&str, fn(f64) -> f64); 5] = [
    ("SIN", f64::sin),
    ("COS", f64::cos),
    ("TAN", f64::tan),
    ("EXP", f64::exp),
    ("ATN", f64::atan),
];

pub(super) fn install(interpreter: &mut Interpreter) {
    for (name, func) in UNARY {
        interpreter.reflect(
            name,
            Box::new(move |args: &[Value]| {
                expect_args(name, args, 1)?;
                Ok(Value::Float(func(expect_f64(name, &args[0])?)))
            }),
        );
    }

    interpreter.reflect(
        "ABS",
        Box::new(|args: &[Value]| {
            expect_args("ABS", args, 1)?;
            match &args[0] {
                Value::Int(val) => val
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| Error::runtime(format_args!("integer overflow"))),
                Value::Float(val) => Ok(Value::Float(val.abs())),
                other => Err(wrong_type("ABS", "a number", other)),
            }
        }),
    );
    interpreter.reflect(
        "SQR",
        Box::new(|args: &[Value]| {
            expect_args("SQR", args, 1)?;
            let val = expect_f64("SQR", &args[0])?;
            if val < 0.0 {
                return Err(domain_error("SQR"));
            }
            Ok(Value::Float(val.sqrt()))
        }),
    );
    // natural logarithm, or in the base given as second argument
    interpreter.reflect(
        "LOG",
        Box::new(|args: &[Value]| {
            let (val, base) = match args {
                [val] => (expect_f64("LOG", val)?, None),
                [val, base] => (expect_f64("LOG", val)?, Some(expect_f64("LOG", base)?)),
                _ => {
                    return Err(Error::ArgumentCount {
                        name: String::from("LOG"),
                        expected: 2,
                        got: args.len(),
                    })
                }
            };
            match base {
                _ if val <= 0.0 => Err(domain_error("LOG")),
                None => Ok(Value::Float(val.ln())),
                Some(base) if base > 0.0 && base != 1.0 => Ok(Value::Float(val.log(base))),
                Some(_) => Err(domain_error("LOG")),
            }
        }),
    );
    interpreter.reflect(
        "INT",
        Box::new(|args: &[Value]| {
            expect_args("INT", args, 1)?;
            match &args[0] {
                Value::Int(val) => Ok(Value::Int(*val)),
                Value::Float(val) if val.is_finite() => Ok(Value::Int(val.floor() as i64)),
                other => Err(wrong_type("INT", "a finite number", other)),
            }
        }),
    );
    interpreter.reflect(
        "RND",
        Box::new(|args: &[Value]| {
            expect_args("RND", args, 0)?;
            Ok(Value::Float(rand::random::<f64>()))
        }),
    );
}

fn domain_error(name: &str) -> Error {
    Error::runtime(format_args!("{}: math domain error", name))
}
