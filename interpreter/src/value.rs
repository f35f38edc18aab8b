use std::any::Any;
use std::cell::RefCell;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

use basic_core::Literal;

use crate::callable::Callable;

/// Opaque value handed out by library bindings (queues, open files, ...). The interpreter only
/// passes these around; the bindings that created them downcast through `as_any`.
pub trait Object: Debug {
    fn type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
}

pub type Array = Rc<RefCell<Vec<Value>>>;

#[derive(Debug, Clone)]
pub enum Value {
    Callable(Rc<dyn Callable>),
    Object(Rc<dyn Object>),
    Array(Array),
    Str(Rc<str>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nothing,
}

impl Value {
    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(values)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Callable(_) => "FUNCTION",
            Value::Object(object) => object.type_name(),
            Value::Array(_) => "ARRAY",
            Value::Str(_) => "STRING",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "DECIMAL",
            Value::Bool(_) => "BOOLEAN",
            Value::Nothing => "NOTHING",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nothing => false,
            Value::Bool(val) => *val,
            Value::Int(val) => *val != 0,
            Value::Float(val) => *val != 0.0,
            Value::Str(val) => !val.is_empty(),
            Value::Array(val) => !val.borrow().is_empty(),
            Value::Callable(_) | Value::Object(_) => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(val) => Some(*val as f64),
            Value::Float(val) => Some(*val),
            _ => None,
        }
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, Value::Nothing)
    }
}

impl From<Literal> for Value {
    fn from(value: Literal) -> Self {
        match value {
            Literal::Str(val) => Value::from(val),
            Literal::Int(val) => Value::Int(val),
            Literal::Float(val) => Value::Float(val),
            Literal::Bool(val) => Value::Bool(val),
            Literal::Nothing => Value::Nothing,
        }
    }
}

impl From<&Literal> for Value {
    fn from(value: &Literal) -> Self {
        match value {
            Literal::Str(val) => Value::from(val.as_str()),
            Literal::Int(val) => Value::Int(*val),
            Literal::Float(val) => Value::Float(*val),
            Literal::Bool(val) => Value::Bool(*val),
            Literal::Nothing => Value::Nothing,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Callable(lhs), Value::Callable(rhs)) => Rc::ptr_eq(lhs, rhs),
            (Value::Object(lhs), Value::Object(rhs)) => Rc::ptr_eq(lhs, rhs),
            (Value::Array(lhs), Value::Array(rhs)) => arrays_equal(lhs, rhs, &mut Vec::new()),
            (Value::Str(lhs), Value::Str(rhs)) => lhs == rhs,
            (Value::Int(lhs), Value::Int(rhs)) => lhs == rhs,
            (Value::Int(lhs), Value::Float(rhs)) => (*lhs as f64) == *rhs,
            (Value::Float(lhs), Value::Int(rhs)) => *lhs == (*rhs as f64),
            (Value::Float(lhs), Value::Float(rhs)) => lhs == rhs,
            (Value::Bool(lhs), Value::Bool(rhs)) => lhs == rhs,
            (Value::Nothing, Value::Nothing) => true,
            _ => false,
        }
    }
}

// Arrays can contain themselves. A pair of arrays already being compared further up is taken
// as equal, and an array already being rendered prints as `{...}`.
type ArrayPtr = *const RefCell<Vec<Value>>;

fn arrays_equal(lhs: &Array, rhs: &Array, open: &mut Vec<(ArrayPtr, ArrayPtr)>) -> bool {
    if Rc::ptr_eq(lhs, rhs) {
        return true;
    }
    let pair = (Rc::as_ptr(lhs), Rc::as_ptr(rhs));
    if open.contains(&pair) {
        return true;
    }

    let (lhs, rhs) = (lhs.borrow(), rhs.borrow());
    if lhs.len() != rhs.len() {
        return false;
    }
    open.push(pair);
    let equal = lhs.iter().zip(rhs.iter()).all(|pair| match pair {
        (Value::Array(lhs), Value::Array(rhs)) => arrays_equal(lhs, rhs, open),
        (lhs, rhs) => lhs == rhs,
    });
    open.pop();
    equal
}

fn fmt_array(items: &Array, f: &mut Formatter<'_>, open: &mut Vec<ArrayPtr>) -> std::fmt::Result {
    let ptr = Rc::as_ptr(items);
    if open.contains(&ptr) {
        return write!(f, "{{...}}");
    }

    open.push(ptr);
    write!(f, "{{")?;
    for (idx, item) in items.borrow().iter().enumerate() {
        if idx > 0 {
            write!(f, ", ")?;
        }
        match item {
            Value::Array(inner) => fmt_array(inner, f, open)?,
            other => write!(f, "{}", other)?,
        }
    }
    open.pop();
    write!(f, "}}")
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Rc::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Rc::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

macro_rules! impl_from_int_for_value {
    ( $( $t:ident )* ) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Value {
                    Value::Int(n as i64)
                }
            }
        )*
    }
}

impl_from_int_for_value!(u8 i8 u16 i16 u32 i32 i64 usize);

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Callable(val) => write!(f, "{:?}", val),
            Value::Object(val) => write!(f, "<{}>", val.type_name()),
            Value::Array(val) => fmt_array(val, f, &mut Vec::new()),
            Value::Str(val) => write!(f, "{}", val),
            Value::Int(val) => write!(f, "{}", val),
            Value::Float(val) => {
                if val.is_finite() && val.fract() == 0.0 && val.abs() < 1e16 {
                    write!(f, "{:.1}", val)
                } else {
                    write!(f, "{}", val)
                }
            }
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Nothing => write!(f, "Nothing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::value::Value;

    #[test]
    fn test_display() {
        let tests = [
            (Value::from(3), "3"),
            (Value::from(2.0), "2.0"),
            (Value::from(2.5), "2.5"),
            (Value::from(true), "True"),
            (Value::Nothing, "Nothing"),
            (Value::from("text"), "text"),
            (
                Value::array(vec![Value::from(1), Value::from("a")]),
                "{1, a}",
            ),
        ];

        for (value, expected) in tests {
            assert_eq!(value.to_string(), expected);
        }
    }

    #[test]
    fn test_numeric_equality_crosses_int_and_float() {
        assert_eq!(Value::from(2), Value::from(2.0));
        assert_ne!(Value::from(2), Value::from("2"));
    }

    #[test]
    fn test_arrays_containing_themselves() {
        let outer = Value::array(vec![Value::from(1)]);
        if let Value::Array(items) = &outer {
            items.borrow_mut().push(outer.clone());
        }
        assert_eq!(outer.to_string(), "{1, {...}}");

        let other = Value::array(vec![Value::from(1)]);
        if let Value::Array(items) = &other {
            items.borrow_mut().push(other.clone());
        }
        assert_eq!(outer, other);
        assert_ne!(outer, Value::array(vec![Value::from(1), Value::from(1)]));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nothing.is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from(0.5).is_truthy());
        assert!(Value::array(vec![Value::Nothing]).is_truthy());
    }
}
