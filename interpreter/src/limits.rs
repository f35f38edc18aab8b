pub(crate) const DEFAULT_MAX_CALL_DEPTH: usize = 256;
pub(crate) const ARG_LIMIT: usize = 255;
pub(crate) const NESTING_LIMIT: usize = 256;

// Largest array DIM creates and longest string SPACE$ builds
pub(crate) const MAX_ALLOCATION: usize = 1 << 24;

// The evaluator moves onto a fresh stack segment when less than the red zone is left
pub(crate) const STACK_RED_ZONE: usize = 128 * 1024;
pub(crate) const STACK_SEGMENT: usize = 4 * 1024 * 1024;

// Recursion in the language recurses in the evaluator too, so the binary runs the interpreter
// on a thread with a larger stack than the default main thread.
pub const INTERPRETER_STACK_SIZE: usize = 64 * 1024 * 1024;
