use std::io::{Read, Write};

use crate::ast::{Node, NodeRef};
use crate::error::Error;
use crate::parser::Program;

const MAGIC: [u8; 4] = *b"BAST";
const VERSION: u16 = 1;

impl Program {
    /// Writes the syntax tree in a compact binary form that `Program::load` reads back.
    pub fn save<W: Write>(&self, mut writer: W) -> Result<(), Error> {
        bincode::serialize_into(&mut writer, &(MAGIC, VERSION))?;
        bincode::serialize_into(writer, &self.root)?;
        Ok(())
    }

    /// Whether `data` starts like the output of `Program::save`.
    pub fn is_saved(data: &[u8]) -> bool {
        data.starts_with(&MAGIC)
    }

    pub fn load<R: Read>(mut reader: R) -> Result<Program, Error> {
        let (magic, version): ([u8; 4], u16) = bincode::deserialize_from(&mut reader)?;
        if magic != MAGIC {
            return Err(Error::Persist {
                msg: String::from("not a saved program"),
            });
        }
        if version != VERSION {
            return Err(Error::Persist {
                msg: format!("unsupported format version {}", version),
            });
        }

        let root: NodeRef = bincode::deserialize_from(reader)?;
        Node::relink(&root);
        Ok(Program { root })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::str;

    use crate::ast::{Control, Node};
    use crate::error::Error;
    use crate::interpreter::Interpreter;
    use crate::parser::{Parser, Program};

    #[test]
    fn test_saved_program_runs_the_same() {
        let src = "
            FUNCTION SUM_TO(N)
                TOTAL = 0
                FOR I = 1 TO N
                    TOTAL = TOTAL + I
                NEXT I
                RETURN TOTAL
            END FUNCTION
            DIM A(2) AS STRING
            A(1) = \"sum\"
            PRINT A(1), SUM_TO(10), 2.5
        ";
        let mut parser = Parser::new();
        parser.parse(src).unwrap();
        let program = parser.finish().unwrap();

        let mut saved = Vec::new();
        program.save(&mut saved).unwrap();
        assert!(Program::is_saved(&saved));
        assert!(!Program::is_saved(src.as_bytes()));
        let loaded = Program::load(saved.as_slice()).unwrap();
        assert_eq!(*loaded.root.borrow(), *program.root.borrow());

        // back-links are rebuilt for every block
        let function = loaded.root.borrow().children[0].clone();
        let body = function.borrow().body().unwrap();
        assert!(matches!(
            Node::parent_control(&body),
            Some(Control::Function { .. })
        ));

        let output: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let mut interpreter = Interpreter::new(output.clone());
        interpreter.run(&loaded).unwrap();
        assert_eq!(str::from_utf8(&output.borrow()).unwrap(), "sum\n55\n2.5\n");
    }

    #[test]
    fn test_rejects_foreign_data() {
        let result = Program::load(&b"definitely not a syntax tree"[..]);
        assert_eq!(
            result.unwrap_err(),
            Error::Persist {
                msg: String::from("not a saved program")
            }
        );
    }
}
