use crate::callable::BoxedFunction;
use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::limits::MAX_ALLOCATION;
use crate::stdlib::{expect_args, expect_int, expect_str, wrong_type};
use crate::value::Value;

// String positions and lengths count characters, not bytes. Out of range positions are clamped
// rather than reported.

fn substring(text: &str, skip: i64, take: i64) -> String {
    let skip = skip.max(0) as usize;
    let take = take.max(0) as usize;
    text.chars().skip(skip).take(take).collect()
}

fn length(name: &str, value: &Value) -> Result<Value, Error> {
    match value {
        Value::Str(val) => Ok(Value::from(val.chars().count())),
        Value::Array(items) => Ok(Value::from(items.borrow().len())),
        other => Err(wrong_type(name, "a string or an array", other)),
    }
}

fn mapped(name: &'static str, func: fn(&str) -> String) -> BoxedFunction {
    Box::new(move |args: &[Value]| {
        expect_args(name, args, 1)?;
        Ok(Value::from(func(expect_str(name, &args[0])?)))
    })
}

pub(super) fn install(interpreter: &mut Interpreter) {
    interpreter.reflect(
        "ASC",
        Box::new(|args: &[Value]| {
            expect_args("ASC", args, 1)?;
            let text = expect_str("ASC", &args[0])?;
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => Ok(Value::from(ch as u32)),
                _ => Err(Error::runtime(format_args!(
                    "ASC expects a single character, found a string of length {}",
                    text.chars().count()
                ))),
            }
        }),
    );
    interpreter.reflect(
        "CHR$",
        Box::new(|args: &[Value]| {
            expect_args("CHR$", args, 1)?;
            let code = expect_int("CHR$", &args[0])?;
            u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .map(|ch| Value::from(ch.to_string()))
                .ok_or_else(|| Error::runtime(format_args!("CHR$: {} is not a character", code)))
        }),
    );
    for name in ["LEN$", "LEN"] {
        interpreter.reflect(
            name,
            Box::new(move |args: &[Value]| {
                expect_args(name, args, 1)?;
                length(name, &args[0])
            }),
        );
    }
    interpreter.reflect(
        "SPACE$",
        Box::new(|args: &[Value]| {
            expect_args("SPACE$", args, 1)?;
            let count = expect_int("SPACE$", &args[0])?.max(0);
            match usize::try_from(count) {
                Ok(count) if count <= MAX_ALLOCATION => Ok(Value::from(" ".repeat(count))),
                _ => Err(Error::runtime(format_args!(
                    "SPACE$: {} is too large (maximum {})",
                    count, MAX_ALLOCATION
                ))),
            }
        }),
    );
    // MID$(S, N, M): M characters starting at the 1-based position N
    interpreter.reflect(
        "MID$",
        Box::new(|args: &[Value]| {
            expect_args("MID$", args, 3)?;
            let text = expect_str("MID$", &args[0])?;
            let start = expect_int("MID$", &args[1])?;
            let count = expect_int("MID$", &args[2])?;
            // positions before the first character eat into the count
            let (skip, take) = if start < 1 {
                (0, count.saturating_add(start).saturating_sub(1))
            } else {
                (start - 1, count)
            };
            Ok(Value::from(substring(text, skip, take)))
        }),
    );
    interpreter.reflect(
        "LEFT$",
        Box::new(|args: &[Value]| {
            expect_args("LEFT$", args, 2)?;
            let text = expect_str("LEFT$", &args[0])?;
            let count = expect_int("LEFT$", &args[1])?;
            Ok(Value::from(substring(text, 0, count)))
        }),
    );
    interpreter.reflect(
        "RIGHT$",
        Box::new(|args: &[Value]| {
            expect_args("RIGHT$", args, 2)?;
            let text = expect_str("RIGHT$", &args[0])?;
            let count = expect_int("RIGHT$", &args[1])?.max(0);
            let len = text.chars().count() as i64;
            Ok(Value::from(substring(text, len - count, count)))
        }),
    );
    interpreter.reflect("LCASE$", mapped("LCASE$", str::to_lowercase));
    interpreter.reflect("UCASE$", mapped("UCASE$", str::to_uppercase));
    interpreter.reflect("TRIM$", mapped("TRIM$", |text| String::from(text.trim())));
}

#[cfg(test)]
mod tests {
    use crate::stdlib::strings::substring;
    use crate::stdlib::testing::run;

    #[test]
    fn test_string_functions() {
        let src = "
            S = \"Hello, World\"
            PRINT LEN(S), LEN$({1, 2}), ASC(\"A\"), CHR$(66)
            PRINT MID$(S, 8, 5), LEFT$(S, 5), RIGHT$(S, 5)
            PRINT UCASE$(S), LCASE$(S)
            PRINT \"[\" + TRIM$(\"  x  \") + \"]\", \"[\" + SPACE$(3) + \"]\"
        ";
        assert_eq!(
            run(src).unwrap(),
            "12\n2\n65\nB\nWorld\nHello\nWorld\nHELLO, WORLD\nhello, world\n[x]\n[   ]\n"
        );
    }

    #[test]
    fn test_substring_clamps() {
        assert_eq!(substring("abc", 1, 10), "bc");
        assert_eq!(substring("abc", 5, 1), "");
        assert_eq!(substring("abc", -1, 2), "ab");
    }

    #[test]
    fn test_extreme_arguments() {
        assert_eq!(
            run("PRINT \"[\" + MID$(\"abc\", -9223372036854775807, -2) + \"]\"").unwrap(),
            "[]\n"
        );
        assert_eq!(
            run("PRINT MID$(\"abc\", 0, 2)").unwrap(),
            "a\n"
        );
        assert_eq!(
            run("PRINT SPACE$(1000000000000000000)").unwrap_err().to_string(),
            "SPACE$: 1000000000000000000 is too large (maximum 16777216)"
        );
    }

    #[test]
    fn test_wrong_argument_types() {
        assert_eq!(
            run("PRINT LEFT$(1, 2)").unwrap_err().to_string(),
            "LEFT$ expects a string, found INTEGER"
        );
        assert_eq!(
            run("PRINT ASC(\"AB\")").unwrap_err().to_string(),
            "ASC expects a single character, found a string of length 2"
        );
    }
}
