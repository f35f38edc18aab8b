use std::cell::RefCell;
use std::io::{self, BufRead, BufReader, Write};
use std::process::Command;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::ast::{Control, Kind, Node, NodeRef, Unit};
use crate::callable::{BoxedFunction, Closure, Native, RawFunction, Reflected};
use crate::error::Error;
use crate::limits::{DEFAULT_MAX_CALL_DEPTH, STACK_RED_ZONE, STACK_SEGMENT};
use crate::operators::{self, element_slot, Operator};
use crate::parser::{Program, Statement};
use crate::scope::{Scope, ScopeRef};
use crate::stdlib;
use crate::types;
use crate::value::Value;

/// Non-local exits travelling up the tree until a loop or a call consumes them.
#[derive(Debug)]
pub(crate) enum Signal {
    Break,
    Continue,
    Return(Value),
}

#[derive(Debug)]
pub(crate) enum Flow {
    Normal(Value),
    Signal(Signal),
}

// outcome of one branch of an IF/ELSEIF/ELSE chain
enum Branch {
    Skipped,
    Taken,
    Signal(Signal),
}

pub struct Interpreter {
    root: ScopeRef,
    // call stack; the last frame is the scope statements currently run in
    frames: Vec<ScopeRef>,
    max_depth: usize,
    stdout: Rc<RefCell<dyn Write>>,
    stdin: Rc<RefCell<dyn BufRead>>,
}

impl Interpreter {
    pub fn new(stdout: Rc<RefCell<dyn Write>>) -> Self {
        let root = Rc::new(RefCell::new(Scope::new()));
        let mut interpreter = Interpreter {
            frames: vec![Rc::clone(&root)],
            root,
            max_depth: DEFAULT_MAX_CALL_DEPTH,
            stdout,
            stdin: Rc::new(RefCell::new(BufReader::new(io::stdin()))),
        };

        interpreter.define_global("NOTHING", Value::Nothing);
        interpreter.define_global("TRUE", Value::Bool(true));
        interpreter.define_global("FALSE", Value::Bool(false));
        interpreter.define_global("PI", Value::Float(std::f64::consts::PI));
        operators::install(&mut interpreter);
        types::install(&mut interpreter);
        stdlib::install(&mut interpreter);

        interpreter
    }

    /// Replaces the reader INPUT and friends consume.
    pub fn with_input(mut self, stdin: Rc<RefCell<dyn BufRead>>) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn with_max_call_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Binds a built-in that receives its argument nodes unevaluated.
    pub fn register(&mut self, name: &str, func: RawFunction) {
        let native = Native::new(func, name);
        self.define_global(name, Value::Callable(Rc::new(native)));
    }

    /// Binds a built-in over already evaluated arguments.
    pub fn reflect(&mut self, name: &str, func: BoxedFunction) {
        let reflected = Reflected::new(func, name);
        self.define_global(name, Value::Callable(Rc::new(reflected)));
    }

    pub fn define_global(&mut self, name: &str, value: Value) {
        self.root.borrow_mut().define(name, value);
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.root.borrow().get(name)
    }

    pub fn run(&mut self, program: &Program) -> Result<(), Error> {
        self.eval(&program.root)?;
        Ok(())
    }

    /// Runs one completed top-level statement and returns the value it produced, which is
    /// `Nothing` for everything but expressions and calls.
    pub fn execute(&mut self, statement: &Statement) -> Result<Value, Error> {
        match self.eval(&statement.0)? {
            Flow::Normal(value) => Ok(value),
            Flow::Signal(_) => Ok(Value::Nothing),
        }
    }

    pub(crate) fn scope(&self) -> ScopeRef {
        match self.frames.last() {
            Some(scope) => Rc::clone(scope),
            None => Rc::clone(&self.root),
        }
    }

    pub(crate) fn root(&self) -> ScopeRef {
        Rc::clone(&self.root)
    }

    pub(crate) fn stdout(&self) -> Rc<RefCell<dyn Write>> {
        Rc::clone(&self.stdout)
    }

    pub(crate) fn stdin(&self) -> Rc<RefCell<dyn BufRead>> {
        Rc::clone(&self.stdin)
    }

    pub(crate) fn evaluate(&mut self, node: &NodeRef) -> Result<Value, Error> {
        match self.eval(node)? {
            Flow::Normal(value) => Ok(value),
            Flow::Signal(_) => Ok(Value::Nothing),
        }
    }

    pub(crate) fn evaluate_all(&mut self, nodes: &[NodeRef]) -> Result<Vec<Value>, Error> {
        let mut values = Vec::with_capacity(nodes.len());
        for node in nodes {
            values.push(self.evaluate(node)?);
        }
        Ok(values)
    }

    /// Runs a closure body in `scope`, turning a `RETURN` into the call's result.
    pub(crate) fn call_in_scope(&mut self, body: &NodeRef, scope: ScopeRef) -> Result<Value, Error> {
        if self.frames.len() > self.max_depth {
            return Err(Error::RecursionLimit {
                limit: self.max_depth,
            });
        }

        self.frames.push(scope);
        let result = self.eval(body);
        self.frames.pop();

        match result? {
            Flow::Signal(Signal::Return(value)) => Ok(value),
            _ => Ok(Value::Nothing),
        }
    }

    // Nested calls and deeply nested expressions recurse here, so the stack is grown on demand
    // and only the call depth limit ends a runaway recursion.
    fn eval(&mut self, node: &NodeRef) -> Result<Flow, Error> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || self.eval_node(node))
    }

    fn eval_node(&mut self, node: &NodeRef) -> Result<Flow, Error> {
        let node = node.borrow();

        #[cfg(feature = "debug-trace-execution")]
        tracing::trace!(kind = ?node.kind, "eval");

        let flow = match &node.kind {
            Kind::Literal(literal) => Flow::Normal(Value::from(literal)),
            Kind::Identifier(name) => Flow::Normal(self.scope().borrow().lookup(name)?),
            Kind::Array => Flow::Normal(Value::array(self.evaluate_all(&node.children)?)),
            Kind::Call(target) => Flow::Normal(self.eval_call(target, &node.children)?),
            Kind::Control(control) => self.eval_control(&node, control)?,
        };
        Ok(flow)
    }

    fn eval_call(&mut self, target: &str, args: &[NodeRef]) -> Result<Value, Error> {
        let callee = self.scope().borrow().lookup(target)?;
        match callee {
            Value::Callable(callable) => callable.invoke(self, args),
            Value::Array(_) => self.index(callee, args),
            other if args.is_empty() => Ok(other),
            other => Err(Error::runtime(format_args!(
                "{} is not callable, found {}",
                target.to_ascii_uppercase(),
                other.type_name()
            ))),
        }
    }

    // every argument indexes one level deeper into nested arrays
    fn index(&mut self, array: Value, args: &[NodeRef]) -> Result<Value, Error> {
        let mut current = array;
        for arg in args {
            let index = self.evaluate(arg)?;
            let next = match &current {
                Value::Array(items) => {
                    let items = items.borrow();
                    let slot = element_slot(&index, items.len())?;
                    items[slot].clone()
                }
                other => {
                    return Err(Error::runtime(format_args!(
                        "cannot index into {}",
                        other.type_name()
                    )))
                }
            };
            current = next;
        }
        Ok(current)
    }

    fn eval_control(&mut self, node: &Node, control: &Control) -> Result<Flow, Error> {
        match control {
            Control::Program => {
                for child in &node.children {
                    self.eval(child)?;
                }
                Ok(Flow::Normal(Value::Nothing))
            }
            Control::Block => self.eval_block(node),
            Control::Seq => {
                for child in &node.children {
                    match self.eval_branch(&child.borrow())? {
                        Branch::Skipped => continue,
                        Branch::Taken => break,
                        Branch::Signal(signal) => return Ok(Flow::Signal(signal)),
                    }
                }
                Ok(Flow::Normal(Value::Nothing))
            }
            Control::If { .. } => match self.eval_branch(node)? {
                Branch::Signal(signal) => Ok(Flow::Signal(signal)),
                _ => Ok(Flow::Normal(Value::Nothing)),
            },
            Control::While => self.eval_while(node),
            Control::Do => self.eval_do(node),
            Control::For { var } => self.eval_for(node, var),
            Control::Sub { name, params } | Control::Function { name, params } => {
                let body = body_of(node, control)?;
                debug!(name = name.as_str(), params = params.len(), "defining closure");
                let closure = Closure::new(self.scope(), name, params, body);
                self.scope()
                    .borrow_mut()
                    .define(name, Value::Callable(Rc::new(closure)));
                Ok(Flow::Normal(Value::Nothing))
            }
            Control::Break => Ok(Flow::Signal(Signal::Break)),
            Control::Continue => Ok(Flow::Signal(Signal::Continue)),
            Control::Return => {
                let value = match node.children.first() {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nothing,
                };
                Ok(Flow::Signal(Signal::Return(value)))
            }
            Control::Use(unit) => {
                self.use_unit(unit)?;
                Ok(Flow::Normal(Value::Nothing))
            }
        }
    }

    fn eval_block(&mut self, node: &Node) -> Result<Flow, Error> {
        for child in &node.children {
            if let Flow::Signal(signal) = self.eval(child)? {
                return Ok(Flow::Signal(signal));
            }
        }
        Ok(Flow::Normal(Value::Nothing))
    }

    fn eval_branch(&mut self, node: &Node) -> Result<Branch, Error> {
        let guard = child_of(node, 0, "IF")?;
        if !self.evaluate(&guard)?.is_truthy() {
            return Ok(Branch::Skipped);
        }

        let body = body_of(node, &Control::If { fallback: false })?;
        match self.eval(&body)? {
            Flow::Signal(signal) => Ok(Branch::Signal(signal)),
            Flow::Normal(_) => Ok(Branch::Taken),
        }
    }

    fn eval_while(&mut self, node: &Node) -> Result<Flow, Error> {
        let guard = child_of(node, 0, "WHILE")?;
        let body = body_of(node, &Control::While)?;

        while self.evaluate(&guard)?.is_truthy() {
            match self.eval(&body)? {
                Flow::Signal(Signal::Break) => break,
                Flow::Signal(signal @ Signal::Return(_)) => return Ok(Flow::Signal(signal)),
                _ => {}
            }
        }
        Ok(Flow::Normal(Value::Nothing))
    }

    // the body always runs once before the guard is checked
    fn eval_do(&mut self, node: &Node) -> Result<Flow, Error> {
        let guard = child_of(node, 0, "DO")?;
        let body = body_of(node, &Control::Do)?;

        loop {
            match self.eval(&body)? {
                Flow::Signal(Signal::Break) => break,
                Flow::Signal(signal @ Signal::Return(_)) => return Ok(Flow::Signal(signal)),
                _ => {}
            }
            if !self.evaluate(&guard)?.is_truthy() {
                break;
            }
        }
        Ok(Flow::Normal(Value::Nothing))
    }

    fn eval_for(&mut self, node: &Node, var: &str) -> Result<Flow, Error> {
        let start = child_of(node, 0, "FOR")?;
        let end = child_of(node, 1, "FOR")?;
        let step = child_of(node, 2, "FOR")?;
        let body = body_of(node, &Control::For {
            var: String::from(var),
        })?;

        let initial = self.evaluate(&start)?;
        Scope::assign_shared(&self.scope(), var, initial);

        loop {
            // bounds and step are re-evaluated on every iteration
            let current = self.scope().borrow().lookup(var)?;
            let limit = self.evaluate(&end)?;
            let increment = self.evaluate(&step)?;
            if passed(&current, &limit, &increment)? {
                break;
            }

            match self.eval(&body)? {
                Flow::Signal(Signal::Break) => break,
                Flow::Signal(signal @ Signal::Return(_)) => return Ok(Flow::Signal(signal)),
                _ => {}
            }

            let current = self.scope().borrow().lookup(var)?;
            let next = Operator::Plus.binary(current, increment)?;
            Scope::assign_shared(&self.scope(), var, next);
        }
        Ok(Flow::Normal(Value::Nothing))
    }

    fn use_unit(&mut self, unit: &Unit) -> Result<(), Error> {
        match unit {
            Unit::Library(name) => stdlib::install_library(self, name),
            Unit::Script(path) => {
                if !path.is_file() {
                    warn!(path = %path.display(), "script no longer exists, skipping");
                    return Ok(());
                }
                debug!(path = %path.display(), "running script");
                let status = Command::new("sh").arg(path).status()?;
                if !status.success() {
                    warn!(path = %path.display(), %status, "script failed");
                }
                Ok(())
            }
        }
    }
}

fn child_of(node: &Node, idx: usize, tag: &str) -> Result<NodeRef, Error> {
    node.children
        .get(idx)
        .cloned()
        .ok_or_else(|| Error::runtime(format_args!("malformed <{}> node", tag)))
}

fn body_of(node: &Node, control: &Control) -> Result<NodeRef, Error> {
    node.body()
        .ok_or_else(|| Error::runtime(format_args!("<{}> node has no body", control.tag())))
}

// whether a FOR counter has moved beyond its limit in the direction of the step
fn passed(current: &Value, limit: &Value, step: &Value) -> Result<bool, Error> {
    match (current, limit, step) {
        (Value::Int(current), Value::Int(limit), Value::Int(step)) => Ok(if *step >= 0 {
            current > limit
        } else {
            current < limit
        }),
        _ => match (current.as_f64(), limit.as_f64(), step.as_f64()) {
            (Some(current), Some(limit), Some(step)) => Ok(if step >= 0.0 {
                current > limit
            } else {
                current < limit
            }),
            _ => Err(Error::runtime(format_args!(
                "FOR bounds must be numbers, found {}, {} and {}",
                current.type_name(),
                limit.type_name(),
                step.type_name()
            ))),
        },
    }
}
