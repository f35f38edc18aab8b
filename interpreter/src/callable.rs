use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

use crate::ast::NodeRef;
use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::scope::{Scope, ScopeRef};
use crate::value::Value;

#[derive(Debug, PartialEq)]
pub enum CallableType {
    Builtin,
    Function,
}

/// Anything that can be the target of call syntax.
///
/// `invoke` receives the argument nodes unevaluated, so a binding decides how often and in which
/// scope its arguments run. `apply` is the value-level entry point used when a callable is
/// reached through an operator such as `AS`.
pub trait Callable {
    fn ty(&self) -> CallableType {
        CallableType::Builtin
    }

    fn name(&self) -> &str;

    fn invoke(
        self: Rc<Self>,
        interpreter: &mut Interpreter,
        args: &[NodeRef],
    ) -> Result<Value, Error>;

    fn apply(
        self: Rc<Self>,
        _interpreter: &mut Interpreter,
        _args: Vec<Value>,
    ) -> Result<Value, Error> {
        Err(Error::runtime(format_args!(
            "{} cannot be applied to evaluated arguments",
            self.name()
        )))
    }
}

impl Debug for dyn Callable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{:?} {}>", self.ty(), self.name())
    }
}

pub type RawFunction = Box<dyn Fn(&mut Interpreter, &[NodeRef]) -> Result<Value, Error>>;
pub type BoxedFunction = Box<dyn Fn(&[Value]) -> Result<Value, Error>>;

// `Native` bridges rust code that needs the raw argument nodes: assignment, SWAP, short-circuit
// operators, console output.
pub struct Native {
    func: RawFunction,
    name: String,
}

impl Native {
    pub fn new(func: RawFunction, name: &str) -> Self {
        Native {
            func,
            name: String::from(name),
        }
    }
}

impl Callable for Native {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(
        self: Rc<Self>,
        interpreter: &mut Interpreter,
        args: &[NodeRef],
    ) -> Result<Value, Error> {
        (self.func)(interpreter, args)
    }
}

// `Reflected` wraps a plain value-in/value-out function; every argument is evaluated, in order,
// before the function runs.
pub struct Reflected {
    func: BoxedFunction,
    name: String,
}

impl Reflected {
    pub fn new(func: BoxedFunction, name: &str) -> Self {
        Reflected {
            func,
            name: String::from(name),
        }
    }
}

impl Callable for Reflected {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(
        self: Rc<Self>,
        interpreter: &mut Interpreter,
        args: &[NodeRef],
    ) -> Result<Value, Error> {
        let values = interpreter.evaluate_all(args)?;
        (self.func)(&values)
    }

    fn apply(self: Rc<Self>, _: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
        (self.func)(&args)
    }
}

/// A SUB or FUNCTION. The scope captured here is the one that was active when the definition
/// statement ran, not the caller's.
#[derive(Debug)]
pub struct Closure {
    scope: ScopeRef,
    name: String,
    params: Vec<String>,
    body: NodeRef,
}

impl Closure {
    pub(crate) fn new(scope: ScopeRef, name: &str, params: &[String], body: NodeRef) -> Self {
        Closure {
            scope,
            name: String::from(name),
            params: Vec::from(params),
            body,
        }
    }

    fn check_arity(&self, got: usize) -> Result<(), Error> {
        if got == self.params.len() {
            Ok(())
        } else {
            Err(Error::ArgumentCount {
                name: self.name.clone(),
                expected: self.params.len(),
                got,
            })
        }
    }
}

impl Callable for Closure {
    fn ty(&self) -> CallableType {
        CallableType::Function
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(
        self: Rc<Self>,
        interpreter: &mut Interpreter,
        args: &[NodeRef],
    ) -> Result<Value, Error> {
        self.check_arity(args.len())?;
        // arguments run in the caller's scope, before the callee's frame exists
        let values = interpreter.evaluate_all(args)?;
        self.apply(interpreter, values)
    }

    fn apply(
        self: Rc<Self>,
        interpreter: &mut Interpreter,
        args: Vec<Value>,
    ) -> Result<Value, Error> {
        self.check_arity(args.len())?;

        let mut scope = Scope::with(Rc::clone(&self.scope));
        for (param, arg) in self.params.iter().zip(args) {
            scope.define(param, arg);
        }

        interpreter.call_in_scope(&self.body, Rc::new(RefCell::new(scope)))
    }
}
