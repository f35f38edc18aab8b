pub mod error;
pub mod interpreter;
pub mod module;
pub mod parser;
pub mod value;

pub(crate) mod ast;
mod callable;
mod limits;
mod operators;
mod persist;
pub(crate) mod scope;
mod stdlib;
mod types;

pub use ast::{Node, NodeRef};
pub use callable::{BoxedFunction, Callable, CallableType, RawFunction};
pub use error::{BasicResult, Error};
pub use interpreter::Interpreter;
pub use limits::INTERPRETER_STACK_SIZE;
pub use module::{FsLoader, Module, ModuleLoader, PATH_VARIABLE};
pub use parser::{Parser, Program, Statement};
pub use value::{Object, Value};
