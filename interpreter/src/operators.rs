use std::cmp::Ordering;
use std::rc::Rc;

use crate::ast::NodeRef;
use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::limits::MAX_ALLOCATION;
use crate::scope::Scope;
use crate::value::Value;

/// Built-in operations the parser emits as calls. Their names are bracketed so no identifier
/// can ever shadow them.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Operator {
    Plus,
    Minus,
    Times,
    Divide,
    ExactDiv,
    Mod,
    Exp,
    Negate,
    Not,
    And,
    Or,
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    As,
    Assign,
    AssignElement,
    Dim,
    Choose,
}

impl Operator {
    const ALL: [Operator; 22] = [
        Operator::Plus,
        Operator::Minus,
        Operator::Times,
        Operator::Divide,
        Operator::ExactDiv,
        Operator::Mod,
        Operator::Exp,
        Operator::Negate,
        Operator::Not,
        Operator::And,
        Operator::Or,
        Operator::Equal,
        Operator::NotEqual,
        Operator::Greater,
        Operator::Less,
        Operator::GreaterEqual,
        Operator::LessEqual,
        Operator::As,
        Operator::Assign,
        Operator::AssignElement,
        Operator::Dim,
        Operator::Choose,
    ];

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Operator::Plus => "<PLUS>",
            Operator::Minus => "<MINUS>",
            Operator::Times => "<TIMES>",
            Operator::Divide => "<DIVIDE>",
            Operator::ExactDiv => "<EXACTDIV>",
            Operator::Mod => "<MOD>",
            Operator::Exp => "<EXP>",
            Operator::Negate => "<UMINUS>",
            Operator::Not => "<NOT>",
            Operator::And => "<AND>",
            Operator::Or => "<OR>",
            Operator::Equal => "<EQUAL>",
            Operator::NotEqual => "<NOT_EQUAL>",
            Operator::Greater => "<GREATER_THAN>",
            Operator::Less => "<LESS_THAN>",
            Operator::GreaterEqual => "<EQUAL_GREATER_THAN>",
            Operator::LessEqual => "<EQUAL_LESS_THAN>",
            Operator::As => "<AS>",
            Operator::Assign => "<ASSIGN>",
            Operator::AssignElement => "<ASSIGN_ARRAY>",
            Operator::Dim => "<DIM_ARRAY>",
            Operator::Choose => "<CHOOSE>",
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Operator::Plus => "+",
            Operator::Minus | Operator::Negate => "-",
            Operator::Times => "*",
            Operator::Divide => "/",
            Operator::ExactDiv => "\\",
            Operator::Mod => "MOD",
            Operator::Exp => "^",
            Operator::Not => "NOT",
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Equal => "=",
            Operator::NotEqual => "<>",
            Operator::Greater => ">",
            Operator::Less => "<",
            Operator::GreaterEqual => ">=",
            Operator::LessEqual => "<=",
            Operator::As => "AS",
            Operator::Assign | Operator::AssignElement => "=",
            Operator::Dim => "DIM",
            Operator::Choose => "IF",
        }
    }

    fn arity(&self) -> usize {
        match self {
            Operator::Negate | Operator::Not => 1,
            Operator::AssignElement | Operator::Choose => 3,
            _ => 2,
        }
    }

    fn invoke(self, interpreter: &mut Interpreter, args: &[NodeRef]) -> Result<Value, Error> {
        match (self, args.len()) {
            // DIM takes an optional size
            (Operator::Dim, 2 | 3) => {}
            (_, got) if got != self.arity() => {
                return Err(Error::ArgumentCount {
                    name: String::from(self.name()),
                    expected: self.arity(),
                    got,
                })
            }
            _ => {}
        }

        match self {
            Operator::Assign => assign(interpreter, args),
            Operator::AssignElement => assign_element(interpreter, args),
            Operator::Dim => dim(interpreter, args),
            Operator::Choose => {
                if interpreter.evaluate(&args[0])?.is_truthy() {
                    interpreter.evaluate(&args[1])
                } else {
                    interpreter.evaluate(&args[2])
                }
            }
            // AND and OR only evaluate their right side when it decides the result
            Operator::And => {
                if !interpreter.evaluate(&args[0])?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(interpreter.evaluate(&args[1])?.is_truthy()))
            }
            Operator::Or => {
                if interpreter.evaluate(&args[0])?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(interpreter.evaluate(&args[1])?.is_truthy()))
            }
            Operator::Not => Ok(Value::Bool(!interpreter.evaluate(&args[0])?.is_truthy())),
            Operator::Negate => negate(interpreter.evaluate(&args[0])?),
            Operator::As => coerce(interpreter, args),
            _ => {
                let lhs = interpreter.evaluate(&args[0])?;
                let rhs = interpreter.evaluate(&args[1])?;
                self.binary(lhs, rhs)
            }
        }
    }

    pub(crate) fn binary(self, lhs: Value, rhs: Value) -> Result<Value, Error> {
        match self {
            Operator::Plus => match (&lhs, &rhs) {
                (Value::Str(_), _) | (_, Value::Str(_)) => {
                    Ok(Value::from(format!("{}{}", lhs, rhs)))
                }
                _ => self.numeric(lhs, rhs, i64::checked_add, |a, b| a + b),
            },
            Operator::Minus => self.numeric(lhs, rhs, i64::checked_sub, |a, b| a - b),
            Operator::Times => self.numeric(lhs, rhs, i64::checked_mul, |a, b| a * b),
            Operator::Divide => match (lhs.as_f64(), rhs.as_f64()) {
                (Some(_), Some(b)) if b == 0.0 => Err(division_by_zero()),
                (Some(a), Some(b)) => Ok(Value::Float(a / b)),
                _ => Err(self.unsupported(&lhs, &rhs)),
            },
            Operator::ExactDiv => {
                check_divisor(&rhs)?;
                self.numeric(lhs, rhs, floor_div, |a, b| (a / b).floor())
            }
            Operator::Mod => {
                check_divisor(&rhs)?;
                self.numeric(lhs, rhs, floor_mod, |a, b| {
                    let r = a % b;
                    if r != 0.0 && (r < 0.0) != (b < 0.0) {
                        r + b
                    } else {
                        r
                    }
                })
            }
            Operator::Exp => match (&lhs, &rhs) {
                (Value::Int(base), Value::Int(exp)) if *exp >= 0 => u32::try_from(*exp)
                    .ok()
                    .and_then(|exp| base.checked_pow(exp))
                    .map(Value::Int)
                    .ok_or_else(overflow),
                _ => match (lhs.as_f64(), rhs.as_f64()) {
                    (Some(a), Some(b)) => Ok(Value::Float(a.powf(b))),
                    _ => Err(self.unsupported(&lhs, &rhs)),
                },
            },
            Operator::Equal => Ok(Value::Bool(lhs == rhs)),
            Operator::NotEqual => Ok(Value::Bool(lhs != rhs)),
            Operator::Greater => Ok(Value::Bool(self.compare(&lhs, &rhs)?.is_gt())),
            Operator::Less => Ok(Value::Bool(self.compare(&lhs, &rhs)?.is_lt())),
            Operator::GreaterEqual => Ok(Value::Bool(self.compare(&lhs, &rhs)?.is_ge())),
            Operator::LessEqual => Ok(Value::Bool(self.compare(&lhs, &rhs)?.is_le())),
            _ => Err(Error::runtime(format_args!(
                "{} is not a binary operator",
                self.symbol()
            ))),
        }
    }

    fn numeric(
        self,
        lhs: Value,
        rhs: Value,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Value, Error> {
        match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => int_op(*a, *b).map(Value::Int).ok_or_else(overflow),
            _ => match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => Ok(Value::Float(float_op(a, b))),
                _ => Err(self.unsupported(&lhs, &rhs)),
            },
        }
    }

    fn compare(self, lhs: &Value, rhs: &Value) -> Result<Ordering, Error> {
        let ordering = match (lhs, rhs) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            _ => match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        };
        ordering.ok_or_else(|| self.unsupported(lhs, rhs))
    }

    fn unsupported(self, lhs: &Value, rhs: &Value) -> Error {
        Error::runtime(format_args!(
            "unsupported operand types for {}: {} and {}",
            self.symbol(),
            lhs.type_name(),
            rhs.type_name()
        ))
    }
}

pub(crate) fn install(interpreter: &mut Interpreter) {
    for operator in Operator::ALL {
        interpreter.register(
            operator.name(),
            Box::new(move |interpreter: &mut Interpreter, args: &[NodeRef]| {
                operator.invoke(interpreter, args)
            }),
        );
    }
}

/// Converts a 1-based index coming from the language into a slot of a container of `len`
/// elements.
pub(crate) fn element_slot(index: &Value, len: usize) -> Result<usize, Error> {
    let index = match index {
        Value::Int(val) => *val,
        Value::Float(val) if val.fract() == 0.0 => *val as i64,
        other => {
            return Err(Error::runtime(format_args!(
                "array index must be an integer, found {}",
                other.type_name()
            )))
        }
    };

    if index < 1 || index as u64 > len as u64 {
        Err(Error::IndexOutOfRange { index, max: len })
    } else {
        Ok(index as usize - 1)
    }
}

fn negate(value: Value) -> Result<Value, Error> {
    match value {
        Value::Int(val) => val.checked_neg().map(Value::Int).ok_or_else(overflow),
        Value::Float(val) => Ok(Value::Float(-val)),
        other => Err(Error::runtime(format_args!(
            "bad operand type for unary -: {}",
            other.type_name()
        ))),
    }
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && (a < 0) != (b < 0) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && (r < 0) != (b < 0) {
        Some(r + b)
    } else {
        Some(r)
    }
}

fn check_divisor(value: &Value) -> Result<(), Error> {
    match value.as_f64() {
        Some(val) if val == 0.0 => Err(division_by_zero()),
        _ => Ok(()),
    }
}

fn division_by_zero() -> Error {
    Error::runtime(format_args!("division by zero"))
}

fn overflow() -> Error {
    Error::runtime(format_args!("integer overflow"))
}

fn target_name(node: &NodeRef, what: &str) -> Result<String, Error> {
    node.borrow()
        .as_identifier()
        .map(String::from)
        .ok_or_else(|| Error::runtime(format_args!("{} must be a name", what)))
}

fn assign(interpreter: &mut Interpreter, args: &[NodeRef]) -> Result<Value, Error> {
    let name = target_name(&args[0], "assignment target")?;
    let value = interpreter.evaluate(&args[1])?;
    Scope::assign(&interpreter.scope(), &name, value);
    Ok(Value::Nothing)
}

fn assign_element(interpreter: &mut Interpreter, args: &[NodeRef]) -> Result<Value, Error> {
    let name = target_name(&args[0], "assignment target")?;
    let index = interpreter.evaluate(&args[1])?;
    let value = interpreter.evaluate(&args[2])?;

    let target = interpreter.scope().borrow().lookup(&name)?;
    match target {
        Value::Array(items) => {
            let mut items = items.borrow_mut();
            let slot = element_slot(&index, items.len())?;
            items[slot] = value;
            Ok(Value::Nothing)
        }
        other => Err(Error::runtime(format_args!(
            "{} is not an array, found {}",
            name,
            other.type_name()
        ))),
    }
}

fn dim(interpreter: &mut Interpreter, args: &[NodeRef]) -> Result<Value, Error> {
    let name = target_name(&args[0], "DIM target")?;
    let type_name = target_name(&args[1], "DIM type")?;
    let constructor = match interpreter.root().borrow().lookup(&type_name)? {
        Value::Callable(constructor) => constructor,
        other => {
            return Err(Error::runtime(format_args!(
                "{} is not a type, found {}",
                type_name,
                other.type_name()
            )))
        }
    };

    let value = match args.get(2) {
        None => Rc::clone(&constructor).apply(interpreter, Vec::new())?,
        Some(size) => {
            let size = match interpreter.evaluate(size)? {
                Value::Int(size) if size >= 0 => size,
                other => {
                    return Err(Error::runtime(format_args!(
                        "array size must be a non-negative integer, found {}",
                        other
                    )))
                }
            };
            let size = usize::try_from(size)
                .ok()
                .filter(|size| *size <= MAX_ALLOCATION)
                .ok_or_else(|| {
                    Error::runtime(format_args!(
                        "array size {} is too large (maximum {})",
                        size, MAX_ALLOCATION
                    ))
                })?;
            let mut items = Vec::with_capacity(size);
            for _ in 0..size {
                items.push(Rc::clone(&constructor).apply(interpreter, Vec::new())?);
            }
            Value::array(items)
        }
    };

    interpreter.scope().borrow_mut().define(&name, value);
    Ok(Value::Nothing)
}

fn coerce(interpreter: &mut Interpreter, args: &[NodeRef]) -> Result<Value, Error> {
    let value = interpreter.evaluate(&args[0])?;

    // a bare type name is looked up among the globals, so locals cannot hide the constructors
    let type_name = args[1].borrow().as_identifier().map(String::from);
    let target = match type_name {
        Some(name) => interpreter.root().borrow().lookup(&name)?,
        None => interpreter.evaluate(&args[1])?,
    };

    match target {
        Value::Callable(constructor) => constructor.apply(interpreter, vec![value]),
        other => Err(Error::runtime(format_args!(
            "AS expects a type, found {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::operators::{element_slot, Operator};
    use crate::value::Value;

    fn binary(operator: Operator, lhs: Value, rhs: Value) -> Value {
        operator.binary(lhs, rhs).unwrap()
    }

    #[test]
    fn test_plus_concatenates_when_either_side_is_a_string() {
        assert_eq!(
            binary(Operator::Plus, Value::from(1), Value::from(2)),
            Value::Int(3)
        );
        assert_eq!(
            binary(Operator::Plus, Value::from("a"), Value::from(1)),
            Value::from("a1")
        );
        assert_eq!(
            binary(Operator::Plus, Value::from(1.5), Value::from("b")),
            Value::from("1.5b")
        );
    }

    #[test]
    fn test_division_kinds() {
        assert_eq!(
            binary(Operator::Divide, Value::from(7), Value::from(2)),
            Value::Float(3.5)
        );
        assert_eq!(
            binary(Operator::ExactDiv, Value::from(-7), Value::from(2)),
            Value::Int(-4)
        );
        assert_eq!(
            binary(Operator::ExactDiv, Value::from(7.5), Value::from(2)),
            Value::Float(3.0)
        );
        assert_eq!(
            binary(Operator::Mod, Value::from(-7), Value::from(3)),
            Value::Int(2)
        );
        assert_eq!(
            binary(Operator::Mod, Value::from(7), Value::from(-3)),
            Value::Int(-2)
        );
        assert_eq!(
            Operator::Divide
                .binary(Value::from(1), Value::from(0))
                .unwrap_err()
                .to_string(),
            "division by zero"
        );
    }

    #[test]
    fn test_exponent() {
        assert_eq!(
            binary(Operator::Exp, Value::from(2), Value::from(10)),
            Value::Int(1024)
        );
        assert_eq!(
            binary(Operator::Exp, Value::from(2), Value::from(-1)),
            Value::Float(0.5)
        );
    }

    #[test]
    fn test_overflow_is_an_error() {
        assert!(Operator::Times
            .binary(Value::from(i64::MAX), Value::from(2))
            .is_err());
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(
            binary(Operator::Less, Value::from(1), Value::from(1.5)),
            Value::Bool(true)
        );
        assert_eq!(
            binary(Operator::GreaterEqual, Value::from("b"), Value::from("a")),
            Value::Bool(true)
        );
        assert_eq!(
            Operator::Less
                .binary(Value::from("a"), Value::from(1))
                .unwrap_err()
                .to_string(),
            "unsupported operand types for <: STRING and INTEGER"
        );
    }

    #[test]
    fn test_element_slot_bounds() {
        assert_eq!(element_slot(&Value::from(1), 3), Ok(0));
        assert_eq!(element_slot(&Value::from(3), 3), Ok(2));
        assert_eq!(
            element_slot(&Value::from(5), 3),
            Err(Error::IndexOutOfRange { index: 5, max: 3 })
        );
        assert_eq!(
            element_slot(&Value::from(0), 3),
            Err(Error::IndexOutOfRange { index: 0, max: 3 })
        );
    }
}
