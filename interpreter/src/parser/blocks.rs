use std::rc::Rc;

use crate::ast::{Control, Node, NodeRef};

/// Stack of blocks that are still receiving statements. The program root sits at the bottom
/// and is never popped, so the stack is never empty.
pub(crate) struct OpenBlocks {
    // each block with the line of the statement that opened it
    stack: Vec<(NodeRef, usize)>,
}

impl OpenBlocks {
    pub(crate) fn new(root: NodeRef) -> Self {
        OpenBlocks {
            stack: vec![(root, 0)],
        }
    }

    /// Block new statements are appended to.
    pub(crate) fn target(&self) -> NodeRef {
        Rc::clone(&self.stack[self.stack.len() - 1].0)
    }

    /// Construct owning the innermost open block, `None` at the top level.
    pub(crate) fn construct(&self) -> Option<NodeRef> {
        Node::parent(&self.target())
    }

    pub(crate) fn control(&self) -> Option<Control> {
        Node::parent_control(&self.target())
    }

    pub(crate) fn push(&mut self, block: NodeRef, line: usize) {
        self.stack.push((block, line));
    }

    pub(crate) fn pop(&mut self) -> Option<NodeRef> {
        if self.stack.len() > 1 {
            self.stack.pop().map(|(block, _)| block)
        } else {
            None
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.stack.len() > 1
    }

    /// The innermost unterminated construct and the line it started on.
    pub(crate) fn innermost(&self) -> Option<(Control, usize)> {
        if !self.is_open() {
            return None;
        }
        let (block, line) = &self.stack[self.stack.len() - 1];
        Node::parent_control(block).map(|control| (control, *line))
    }

    pub(crate) fn reset(&mut self) {
        self.stack.truncate(1);
    }

    /// Nearest enclosing SUB or FUNCTION.
    pub(crate) fn closure(&self) -> Option<Control> {
        self.stack
            .iter()
            .rev()
            .filter_map(|(block, _)| Node::parent_control(block))
            .find(Control::is_closure)
    }

    /// Nearest enclosing loop, without looking past the closure being defined.
    pub(crate) fn enclosing_loop(&self) -> Option<Control> {
        for (block, _) in self.stack.iter().rev() {
            match Node::parent_control(block) {
                Some(control) if control.is_loop() => return Some(control),
                Some(control) if control.is_closure() => return None,
                _ => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::ast::{Control, Node};
    use crate::parser::blocks::OpenBlocks;

    #[test]
    fn test_root_is_never_popped() {
        let root = Node::control(Control::Program);
        let mut blocks = OpenBlocks::new(Rc::clone(&root));

        assert!(!blocks.is_open());
        assert!(blocks.pop().is_none());
        assert!(Rc::ptr_eq(&blocks.target(), &root));
        assert_eq!(blocks.control(), None);
    }

    #[test]
    fn test_loop_search_stops_at_closures() {
        let root = Node::control(Control::Program);
        let mut blocks = OpenBlocks::new(Rc::clone(&root));

        let looping = Node::control(Control::While);
        Node::add(&root, Rc::clone(&looping));
        blocks.push(Node::add_block(&looping), 1);
        assert_eq!(blocks.enclosing_loop(), Some(Control::While));

        let function = Node::control(Control::Function {
            name: String::from("F"),
            params: vec![],
        });
        Node::add(&blocks.target(), Rc::clone(&function));
        blocks.push(Node::add_block(&function), 2);

        assert_eq!(blocks.enclosing_loop(), None);
        assert!(blocks.closure().is_some());
        assert_eq!(blocks.innermost().map(|(_, line)| line), Some(2));

        blocks.reset();
        assert!(!blocks.is_open());
    }
}
