use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use basic_interpreter::{Error, FsLoader, Interpreter, Parser};
use walkdir::WalkDir;

// Parses and runs `path`, returning everything it printed followed by the error, if any.
fn run_program(path: &Path) -> String {
    let src = fs::read_to_string(path).unwrap();
    let output: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    let mut interpreter = Interpreter::new(output.clone());

    let loader = FsLoader::new(path.parent().into_iter().map(Path::to_path_buf).collect());
    let mut parser = Parser::with_loader(Box::new(loader));
    let result: Result<(), Error> = parser
        .parse(&src)
        .and_then(|_| parser.finish())
        .and_then(|program| interpreter.run(&program));

    let mut printed = String::from(std::str::from_utf8(&output.borrow()).unwrap());
    if let Err(err) = result {
        printed.push_str(&format!("ERROR: {}\n", err));
    }
    printed
}

#[test]
fn test_programs() {
    let source_files = WalkDir::new("../tests/programs")
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| matches!(entry.path().extension(), Some(extension) if extension == "bas"))
        .filter_map(|entry| {
            let mut exp_filename = entry.file_name().to_os_string();
            exp_filename.push(".out");

            let parent = entry.path().parent().unwrap();
            let exp_filepath = parent.join(exp_filename);

            if exp_filepath.exists() {
                Some((entry, exp_filepath))
            } else {
                None
            }
        });

    let mut total = 0;

    for (src_path, exp_path) in source_files {
        println!("🕑 Running test: {}", src_path.path().display());

        let expected = fs::read_to_string(exp_path).unwrap();
        assert_eq!(run_program(src_path.path()), expected);

        println!("✅ Test complete: {}", src_path.path().display());
        total += 1;
    }

    assert!(total > 0, "no programs found");
    println!("✅ Ran {} tests", total)
}

#[test]
fn test_saved_program_matches_source() {
    let path = Path::new("../tests/programs/closures.bas");
    let src = fs::read_to_string(path).unwrap();

    let mut parser = Parser::new();
    parser.parse(&src).unwrap();
    let program = parser.finish().unwrap();

    let mut saved = Vec::new();
    program.save(&mut saved).unwrap();
    let loaded = basic_interpreter::Program::load(saved.as_slice()).unwrap();
    assert_eq!(loaded.to_string(), program.to_string());

    let output: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    Interpreter::new(output.clone()).run(&loaded).unwrap();
    assert_eq!(
        std::str::from_utf8(&output.borrow()).unwrap(),
        fs::read_to_string("../tests/programs/closures.bas.out").unwrap()
    );
}
