use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::value::Value;

#[derive(Debug, Copy, Clone, PartialEq)]
enum Type {
    Integer,
    Decimal,
    Str,
    Boolean,
}

// names accepted after AS, in DIM and in conversions
const TYPES: [(&str, Type); 8] = [
    ("INTEGER", Type::Integer),
    ("LONG", Type::Integer),
    ("SINGLE", Type::Decimal),
    ("DOUBLE", Type::Decimal),
    ("DECIMAL", Type::Decimal),
    ("STRING", Type::Str),
    ("BOOLEAN", Type::Boolean),
    ("BOOL", Type::Boolean),
];

impl Type {
    fn default_value(self) -> Value {
        match self {
            Type::Integer => Value::Int(0),
            Type::Decimal => Value::Float(0.0),
            Type::Str => Value::from(""),
            Type::Boolean => Value::Bool(false),
        }
    }

    fn convert(self, name: &str, value: &Value) -> Result<Value, Error> {
        let converted = match (self, value) {
            (Type::Str, value) => Some(Value::from(value.to_string())),
            (Type::Boolean, value) => Some(Value::Bool(value.is_truthy())),
            (Type::Integer, Value::Int(val)) => Some(Value::Int(*val)),
            (Type::Integer, Value::Float(val)) => {
                let truncated = val.trunc();
                if truncated.is_finite() && truncated.abs() < i64::MAX as f64 {
                    Some(Value::Int(truncated as i64))
                } else {
                    None
                }
            }
            (Type::Integer, Value::Bool(val)) => Some(Value::Int(*val as i64)),
            (Type::Integer, Value::Str(val)) => val.trim().parse::<i64>().ok().map(Value::Int),
            (Type::Decimal, Value::Int(val)) => Some(Value::Float(*val as f64)),
            (Type::Decimal, Value::Float(val)) => Some(Value::Float(*val)),
            (Type::Decimal, Value::Bool(val)) => Some(Value::Float(*val as i64 as f64)),
            (Type::Decimal, Value::Str(val)) => val.trim().parse::<f64>().ok().map(Value::Float),
            _ => None,
        };

        converted.ok_or_else(|| {
            Error::runtime(format_args!(
                "cannot convert {} \"{}\" to {}",
                value.type_name(),
                value,
                name
            ))
        })
    }
}

pub(crate) fn install(interpreter: &mut Interpreter) {
    for (name, ty) in TYPES {
        interpreter.reflect(
            name,
            Box::new(move |args: &[Value]| match args {
                [] => Ok(ty.default_value()),
                [value] => ty.convert(name, value),
                _ => Err(Error::ArgumentCount {
                    name: String::from(name),
                    expected: 1,
                    got: args.len(),
                }),
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::types::Type;
    use crate::value::Value;

    #[test]
    fn test_conversions() {
        let tests = [
            (Type::Integer, Value::from(3.9), Value::Int(3)),
            (Type::Integer, Value::from(" 42 "), Value::Int(42)),
            (Type::Integer, Value::from(true), Value::Int(1)),
            (Type::Decimal, Value::from(2), Value::Float(2.0)),
            (Type::Decimal, Value::from("2.5"), Value::Float(2.5)),
            (Type::Str, Value::from(2.0), Value::from("2.0")),
            (Type::Boolean, Value::from(""), Value::Bool(false)),
        ];

        for (ty, value, expected) in tests {
            assert_eq!(ty.convert("T", &value).unwrap(), expected);
        }
    }

    #[test]
    fn test_failed_conversion() {
        assert_eq!(
            Type::Integer
                .convert("INTEGER", &Value::from("abc"))
                .unwrap_err()
                .to_string(),
            "cannot convert STRING \"abc\" to INTEGER"
        );
    }
}
