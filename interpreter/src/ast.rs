use std::cell::RefCell;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use basic_core::Literal;
use serde::{Deserialize, Serialize};

use crate::operators::Operator;

// The tree is built through shared handles because the parser keeps appending to blocks that
// are already attached to their parents. Nothing mutates a node once parsing is over.
pub type NodeRef = Rc<RefCell<Node>>;

/// Control constructs. Each one used to be a `<TAG>` string; the evaluator matches on them
/// exhaustively instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Control {
    Program,
    Block,
    // if/elseif/else chain, each child is an `If` branch
    Seq,
    If {
        // synthesized by ELSE, its guard is always true
        fallback: bool,
    },
    While,
    Do,
    For {
        var: String,
    },
    Sub {
        name: String,
        params: Vec<String>,
    },
    Function {
        name: String,
        params: Vec<String>,
    },
    Break,
    Continue,
    Return,
    Use(Unit),
}

/// What a `USE` statement resolved to, when it is not inlined source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Unit {
    Library(String),
    Script(PathBuf),
}

impl Control {
    pub(crate) fn tag(&self) -> &'static str {
        match self {
            Control::Program => "PROGRAM",
            Control::Block => "BLOCK",
            Control::Seq => "SEQ",
            Control::If { .. } => "IF",
            Control::While => "WHILE",
            Control::Do => "DO",
            Control::For { .. } => "FOR",
            Control::Sub { .. } => "SUB",
            Control::Function { .. } => "FUNCTION",
            Control::Break => "BREAK",
            Control::Continue => "CONTINUE",
            Control::Return => "RETURN",
            Control::Use(_) => "USE",
        }
    }

    pub(crate) fn is_loop(&self) -> bool {
        matches!(self, Control::While | Control::Do | Control::For { .. })
    }

    pub(crate) fn is_closure(&self) -> bool {
        matches!(self, Control::Sub { .. } | Control::Function { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Kind {
    Control(Control),
    Call(String),
    Identifier(String),
    Literal(Literal),
    // elements are the children
    Array,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Node {
    pub(crate) kind: Kind,
    pub(crate) children: Vec<NodeRef>,

    // Back-link used by the parser to check which construct a block belongs to. It is never
    // followed during evaluation, and it is not persisted (see `Node::relink`).
    #[serde(skip)]
    pub(crate) parent: Weak<RefCell<Node>>,

    // index into `children` of the body executed by a control construct
    pub(crate) block: Option<usize>,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.block == other.block && self.children == other.children
    }
}

impl Node {
    pub(crate) fn new(kind: Kind) -> NodeRef {
        Rc::new(RefCell::new(Node {
            kind,
            children: Vec::new(),
            parent: Weak::new(),
            block: None,
        }))
    }

    pub(crate) fn control(control: Control) -> NodeRef {
        Node::new(Kind::Control(control))
    }

    pub(crate) fn block_node() -> NodeRef {
        Node::control(Control::Block)
    }

    pub(crate) fn literal<T>(value: T) -> NodeRef
    where
        Literal: From<T>,
    {
        Node::new(Kind::Literal(Literal::from(value)))
    }

    pub(crate) fn true_node() -> NodeRef {
        Node::literal(true)
    }

    pub(crate) fn nothing_node() -> NodeRef {
        Node::new(Kind::Literal(Literal::Nothing))
    }

    pub(crate) fn identifier(name: &str) -> NodeRef {
        Node::new(Kind::Identifier(String::from(name)))
    }

    pub(crate) fn call(target: &str, args: Vec<NodeRef>) -> NodeRef {
        let node = Node::new(Kind::Call(String::from(target)));
        Node::add_group(&node, args);
        node
    }

    pub(crate) fn operator(operator: Operator, args: Vec<NodeRef>) -> NodeRef {
        Node::call(operator.name(), args)
    }

    pub(crate) fn array(elements: Vec<NodeRef>) -> NodeRef {
        let node = Node::new(Kind::Array);
        Node::add_group(&node, elements);
        node
    }

    /// Wraps `node` in a logical negation, used for `LOOP UNTIL`.
    pub(crate) fn negative(node: NodeRef) -> NodeRef {
        Node::operator(Operator::Not, vec![node])
    }

    pub(crate) fn add(parent: &NodeRef, child: NodeRef) {
        child.borrow_mut().parent = Rc::downgrade(parent);
        parent.borrow_mut().children.push(child);
    }

    pub(crate) fn add_group(parent: &NodeRef, children: Vec<NodeRef>) {
        for child in children {
            Node::add(parent, child);
        }
    }

    /// Attaches a fresh `<BLOCK>` to `parent`, marks it as the executable body and returns it.
    pub(crate) fn add_block(parent: &NodeRef) -> NodeRef {
        let block = Node::block_node();
        Node::add(parent, Rc::clone(&block));
        let mut node = parent.borrow_mut();
        node.block = Some(node.children.len() - 1);
        block
    }

    pub(crate) fn replace_child(parent: &NodeRef, idx: usize, child: NodeRef) {
        child.borrow_mut().parent = Rc::downgrade(parent);
        parent.borrow_mut().children[idx] = child;
    }

    pub(crate) fn parent(node: &NodeRef) -> Option<NodeRef> {
        node.borrow().parent.upgrade()
    }

    /// Control construct of `node`'s parent, if the parent is a control node.
    pub(crate) fn parent_control(node: &NodeRef) -> Option<Control> {
        let parent = Node::parent(node)?;
        let control = parent.borrow().as_control().cloned();
        control
    }

    pub(crate) fn last_child(node: &NodeRef) -> Option<NodeRef> {
        node.borrow().children.last().cloned()
    }

    pub(crate) fn as_control(&self) -> Option<&Control> {
        match &self.kind {
            Kind::Control(control) => Some(control),
            _ => None,
        }
    }

    pub(crate) fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            Kind::Identifier(name) => Some(name),
            _ => None,
        }
    }

    pub(crate) fn body(&self) -> Option<NodeRef> {
        self.block.map(|idx| Rc::clone(&self.children[idx]))
    }

    /// Rebuilds the parent back-links of a tree that was restored from its persisted form.
    pub(crate) fn relink(node: &NodeRef) {
        let children = node.borrow().children.clone();
        for child in children {
            child.borrow_mut().parent = Rc::downgrade(node);
            Node::relink(&child);
        }
    }

    fn render(&self, f: &mut Formatter<'_>, depth: usize) -> std::fmt::Result {
        let indent = "|   ".repeat(depth);
        match &self.kind {
            Kind::Control(control) => writeln!(f, "{}<{}>", indent, control.tag())?,
            Kind::Call(target) => writeln!(f, "{}call {}", indent, target)?,
            Kind::Identifier(name) => writeln!(f, "{}id {}", indent, name)?,
            Kind::Literal(value) => writeln!(f, "{}{}", indent, value)?,
            Kind::Array => writeln!(f, "{}array", indent)?,
        }
        for child in &self.children {
            child.borrow().render(f, depth + 1)?;
        }
        Ok(())
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.render(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::ast::{Control, Kind, Node};

    #[test]
    fn test_add_sets_parent() {
        let root = Node::control(Control::Program);
        let child = Node::identifier("X");
        Node::add(&root, Rc::clone(&child));

        assert!(Rc::ptr_eq(&Node::parent(&child).unwrap(), &root));
        assert_eq!(Node::parent_control(&child), Some(Control::Program));
    }

    #[test]
    fn test_add_block_marks_body() {
        let node = Node::control(Control::While);
        Node::add(&node, Node::true_node());
        let block = Node::add_block(&node);

        assert_eq!(node.borrow().block, Some(1));
        assert!(Rc::ptr_eq(&node.borrow().body().unwrap(), &block));
        assert_eq!(Node::parent_control(&block), Some(Control::While));
    }

    #[test]
    fn test_negative_wraps_in_not() {
        let node = Node::negative(Node::true_node());
        assert_eq!(node.borrow().kind, Kind::Call(String::from("<NOT>")));
        assert_eq!(node.borrow().children.len(), 1);
    }

    #[test]
    fn test_relink_restores_parents() {
        let root = Node::control(Control::Program);
        let block = Node::add_block(&root);
        Node::add(&block, Node::identifier("X"));

        let child = Rc::clone(&block.borrow().children[0]);
        child.borrow_mut().parent = Default::default();
        block.borrow_mut().parent = Default::default();
        Node::relink(&root);

        assert_eq!(Node::parent_control(&child), Some(Control::Block));
        assert_eq!(Node::parent_control(&block), Some(Control::Program));
    }
}
