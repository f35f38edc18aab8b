use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::stdlib::{expect_args, wrong_type};
use crate::value::{Array, Object, Value};

#[derive(Debug, Copy, Clone, PartialEq)]
enum Order {
    Fifo,
    Lifo,
}

/// QUEUE() and STACK() values. Both push at the back; they differ in which end POP takes from.
#[derive(Debug)]
struct Container {
    order: Order,
    items: RefCell<VecDeque<Value>>,
}

impl Container {
    fn new(order: Order) -> Self {
        Container {
            order,
            items: RefCell::new(VecDeque::new()),
        }
    }
}

impl Object for Container {
    fn type_name(&self) -> &'static str {
        match self.order {
            Order::Fifo => "QUEUE",
            Order::Lifo => "STACK",
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

enum Target<'a> {
    Container(&'a Container),
    Array(&'a Array),
}

fn target<'a>(name: &str, value: &'a Value) -> Result<Target<'a>, Error> {
    match value {
        Value::Array(items) => Ok(Target::Array(items)),
        Value::Object(object) => object
            .as_any()
            .downcast_ref::<Container>()
            .map(Target::Container)
            .ok_or_else(|| wrong_type(name, "a queue, a stack or an array", value)),
        other => Err(wrong_type(name, "a queue, a stack or an array", other)),
    }
}

fn array<'a>(name: &str, value: &'a Value) -> Result<&'a Array, Error> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(wrong_type(name, "an array", other)),
    }
}

fn empty(name: &str, value: &Value) -> Error {
    Error::runtime(format_args!("{}: {} is empty", name, value.type_name()))
}

// PUSH(C, X) appends X and returns it
fn push(args: &[Value]) -> Result<Value, Error> {
    expect_args("PUSH", args, 2)?;
    let value = args[1].clone();
    match target("PUSH", &args[0])? {
        Target::Container(container) => container.items.borrow_mut().push_back(value.clone()),
        Target::Array(items) => items.borrow_mut().push(value.clone()),
    }
    Ok(value)
}

// POP(C) removes the next element: the oldest for a queue, the newest otherwise
fn pop(args: &[Value]) -> Result<Value, Error> {
    expect_args("POP", args, 1)?;
    let popped = match target("POP", &args[0])? {
        Target::Container(container) => {
            let mut items = container.items.borrow_mut();
            match container.order {
                Order::Fifo => items.pop_front(),
                Order::Lifo => items.pop_back(),
            }
        }
        Target::Array(items) => items.borrow_mut().pop(),
    };
    popped.ok_or_else(|| empty("POP", &args[0]))
}

fn install_push_pop(interpreter: &mut Interpreter) {
    interpreter.reflect("PUSH", Box::new(push));
    interpreter.reflect("POP", Box::new(pop));
}

pub(super) fn install_queues(interpreter: &mut Interpreter) {
    interpreter.reflect(
        "QUEUE",
        Box::new(|args: &[Value]| {
            expect_args("QUEUE", args, 0)?;
            Ok(Value::Object(Rc::new(Container::new(Order::Fifo))))
        }),
    );
    interpreter.reflect(
        "STACK",
        Box::new(|args: &[Value]| {
            expect_args("STACK", args, 0)?;
            Ok(Value::Object(Rc::new(Container::new(Order::Lifo))))
        }),
    );
    install_push_pop(interpreter);
}

/// Double-ended operations over plain arrays.
pub(super) fn install_deque(interpreter: &mut Interpreter) {
    interpreter.reflect(
        "FRONT",
        Box::new(|args: &[Value]| {
            expect_args("FRONT", args, 1)?;
            let items = array("FRONT", &args[0])?.borrow();
            items.first().cloned().ok_or_else(|| empty("FRONT", &args[0]))
        }),
    );
    interpreter.reflect(
        "BACK",
        Box::new(|args: &[Value]| {
            expect_args("BACK", args, 1)?;
            let items = array("BACK", &args[0])?.borrow();
            items.last().cloned().ok_or_else(|| empty("BACK", &args[0]))
        }),
    );
    interpreter.reflect(
        "PUSHFRONT",
        Box::new(|args: &[Value]| {
            expect_args("PUSHFRONT", args, 2)?;
            array("PUSHFRONT", &args[0])?
                .borrow_mut()
                .insert(0, args[1].clone());
            Ok(args[1].clone())
        }),
    );
    interpreter.reflect(
        "POPFRONT",
        Box::new(|args: &[Value]| {
            expect_args("POPFRONT", args, 1)?;
            let mut items = array("POPFRONT", &args[0])?.borrow_mut();
            if items.is_empty() {
                return Err(empty("POPFRONT", &args[0]));
            }
            Ok(items.remove(0))
        }),
    );
    install_push_pop(interpreter);
}

#[cfg(test)]
mod tests {
    use crate::stdlib::testing::run;

    #[test]
    fn test_queue_and_stack() {
        let src = "
            USE BQUEUE
            Q = QUEUE()
            S = STACK()
            FOR I = 1 TO 3
                PUSH Q, I
                PUSH S, I
            NEXT
            PRINT POP(Q), POP(Q), POP(S), POP(S)
        ";
        assert_eq!(run(src).unwrap(), "1\n2\n3\n2\n");
    }

    #[test]
    fn test_deque_over_arrays() {
        let src = "
            USE DEQUE
            D = {2, 3}
            PUSHFRONT D, 1
            PUSH D, 4
            PRINT D, FRONT(D), BACK(D)
            PRINT POPFRONT(D), POP(D), D
        ";
        assert_eq!(run(src).unwrap(), "{1, 2, 3, 4}\n1\n4\n1\n4\n{2, 3}\n");
    }

    #[test]
    fn test_empty_containers() {
        assert_eq!(
            run("USE BQUEUE\nPRINT POP(QUEUE())").unwrap_err().to_string(),
            "POP: QUEUE is empty"
        );
        assert_eq!(
            run("USE DEQUE\nPRINT FRONT({})").unwrap_err().to_string(),
            "FRONT: ARRAY is empty"
        );
    }

    #[test]
    fn test_library_must_be_used_first() {
        assert_eq!(
            run("Q = QUEUE()").unwrap_err().to_string(),
            "undefined variable \"QUEUE\""
        );
    }
}
