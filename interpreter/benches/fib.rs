use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use basic_interpreter::{Interpreter, Parser};
use criterion::{criterion_group, criterion_main, Criterion};

fn benchmark(c: &mut Criterion) {
    let src = include_str!("../../tests/programs/fib.bas");
    let mut parser = Parser::new();
    parser.parse(src).unwrap();
    let program = parser.finish().unwrap();

    c.bench_function("fib 20", |b| {
        b.iter(|| {
            let mut interpreter = Interpreter::new(Rc::new(RefCell::new(io::sink())));
            interpreter.run(&program).unwrap();
        })
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
