use std::fmt::{Display, Formatter};
use std::mem;
use std::rc::Rc;

use basic_core::{Scanner, Token, Type};
use tracing::debug;

use crate::ast::{Control, Node, NodeRef, Unit};
use crate::error::Error;
use crate::limits::{ARG_LIMIT, NESTING_LIMIT, STACK_RED_ZONE, STACK_SEGMENT};
use crate::module::{FsLoader, Module, ModuleLoader};
use crate::operators::Operator;
use crate::stdlib;

mod blocks;

use blocks::OpenBlocks;

/// A whole parsed program, ready to run or to be saved.
#[derive(Debug)]
pub struct Program {
    pub(crate) root: NodeRef,
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.root.borrow())
    }
}

/// A top-level statement whose blocks are all closed.
#[derive(Debug)]
pub struct Statement(pub(crate) NodeRef);

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.borrow())
    }
}

// Helper aliases for shorter return types
type StmtResult = Result<Parsed, Error>;
type ExprResult = Result<NodeRef, Error>;

// What a statement left behind on the block stack
#[derive(Debug, PartialEq)]
enum Parsed {
    Complete,
    Open,
}

/// Incremental parser. Source can arrive in any number of pieces; statements are appended to
/// the innermost open block and a construct is only handed out once its closing statement has
/// been seen.
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    // line the next piece of source starts on
    line: usize,
    root: NodeRef,
    blocks: OpenBlocks,
    loader: Box<dyn ModuleLoader>,
    // modules currently being inlined, to reject cycles
    including: Vec<String>,
    completed: Vec<Statement>,
    // depth of the expression being parsed
    nesting: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Parser::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Parser::with_loader(Box::new(FsLoader::default()))
    }

    pub fn with_loader(loader: Box<dyn ModuleLoader>) -> Self {
        let root = Node::control(Control::Program);
        Parser {
            tokens: Vec::new(),
            current: 0,
            line: 1,
            blocks: OpenBlocks::new(Rc::clone(&root)),
            root,
            loader,
            including: Vec::new(),
            completed: Vec::new(),
            nesting: 0,
        }
    }

    /// Parses the next piece of source and returns the top-level statements it completed.
    pub fn parse(&mut self, src: &str) -> Result<Vec<Statement>, Error> {
        self.completed.clear();
        self.parse_source(src)?;
        Ok(mem::take(&mut self.completed))
    }

    /// Whether a block construct is still waiting for its closing statement.
    pub fn is_open(&self) -> bool {
        self.blocks.is_open()
    }

    /// Drops the top-level construct that is still being built, after a parse error in
    /// interactive use.
    pub fn abandon(&mut self) {
        if self.blocks.is_open() {
            self.blocks.reset();
            self.root.borrow_mut().children.pop();
        }
        self.completed.clear();
    }

    /// Ends the program. Fails if a construct was never closed.
    pub fn finish(&mut self) -> Result<Program, Error> {
        if let Some((control, line)) = self.blocks.innermost() {
            return Err(Error::Syntax {
                line,
                msg: format!("{} without {}", control.tag(), closing_statement(&control)),
            });
        }
        Ok(Program {
            root: Rc::clone(&self.root),
        })
    }

    fn parse_source(&mut self, src: &str) -> Result<(), Error> {
        let first_line = self.line;
        self.line += src.lines().count().max(1);

        let mut scanner = Scanner::new();
        let mut stream = scanner.scan_tokens_from(src, first_line);
        let tokens: Vec<Token> = stream.by_ref().collect();
        if let Some(err) = stream.error() {
            return Err(Error::from(err.clone()));
        }

        let tokens = mem::replace(&mut self.tokens, tokens);
        let current = mem::replace(&mut self.current, 0);
        let result = self.statements();
        self.tokens = tokens;
        self.current = current;
        result
    }

    fn statements(&mut self) -> Result<(), Error> {
        while !self.is_at_end() {
            if self.match_one(Type::Newline) {
                continue;
            }

            if self.statement()? == Parsed::Complete && !self.blocks.is_open() {
                if let Some(node) = Node::last_child(&self.root) {
                    self.completed.push(Statement(node));
                }
            }
        }
        Ok(())
    }

    fn statement(&mut self) -> StmtResult {
        let token = self.advance().clone();
        match token.ty {
            Type::Let => {
                let name = self
                    .consume(Type::Identifier, "Expect variable name after LET.")?
                    .lexeme
                    .clone();
                self.consume(Type::Equal, "Expect '=' after variable name.")?;
                self.assignment(&name)
            }
            Type::Dim => self.dim_statement(),
            Type::If => self.if_statement(&token),
            Type::ElseIf => {
                let guard = self.expression()?;
                self.consume(Type::Then, "Expect THEN after ELSEIF condition.")?;
                self.end_of_statement()?;
                self.branch(&token, guard, false)
            }
            Type::Else => {
                self.end_of_statement()?;
                self.branch(&token, Node::true_node(), true)
            }
            Type::End => self.end_statement(&token),
            Type::While => {
                let guard = self.expression()?;
                self.end_of_statement()?;
                let construct = Node::control(Control::While);
                Node::add(&construct, guard);
                self.open(construct, &token)
            }
            Type::Wend => {
                self.end_of_statement()?;
                self.close(&token, "WEND without WHILE", |c| matches!(c, Control::While))?;
                Ok(Parsed::Complete)
            }
            Type::Do => {
                self.end_of_statement()?;
                let construct = Node::control(Control::Do);
                // replaced by the guard once LOOP is reached
                Node::add(&construct, Node::nothing_node());
                self.open(construct, &token)
            }
            Type::Loop => self.loop_statement(&token),
            Type::For => self.for_statement(&token),
            Type::Next => self.next_statement(&token),
            Type::Sub | Type::Function => self.closure_statement(&token),
            Type::Defun => self.defun_statement(),
            Type::Return => self.return_statement(&token),
            Type::Exit | Type::Continue => self.loop_control_statement(&token),
            Type::Use => self.use_statement(),
            Type::Identifier => self.identifier_statement(&token),
            _ => {
                self.current -= 1;
                self.expression_statement()
            }
        }
    }

    fn expression_statement(&mut self) -> StmtResult {
        let expr = self.expression()?;
        self.end_of_statement()?;
        self.attach(expr);
        Ok(Parsed::Complete)
    }

    // Statements starting with a name: assignment, element assignment, or a call with or
    // without parentheses.
    fn identifier_statement(&mut self, name: &Token) -> StmtResult {
        if self.match_one(Type::Equal) {
            return self.assignment(&name.lexeme);
        }

        if self.check(Type::LeftParen) {
            let after = self.matching_paren().map(|idx| self.tokens[idx + 1].ty);
            match after {
                Some(Type::Equal) => return self.element_assignment(&name.lexeme),
                Some(Type::Newline | Type::Eof) => {
                    self.advance();
                    let args = self.arguments(Type::RightParen, "Expect ')' after arguments.")?;
                    self.end_of_statement()?;
                    self.attach(Node::call(&name.lexeme, args));
                    return Ok(Parsed::Complete);
                }
                _ => {}
            }
        }

        if self.at_statement_end() {
            self.end_of_statement()?;
            self.attach(Node::call(&name.lexeme, Vec::new()));
            return Ok(Parsed::Complete);
        }

        if starts_expression(self.peek().ty) {
            let mut args = Vec::new();
            loop {
                if args.len() >= ARG_LIMIT {
                    return Err(Error::syntax(
                        self.peek(),
                        "Can't have more than 255 arguments.",
                    ));
                }
                args.push(self.expression()?);
                if !self.match_one(Type::Comma) {
                    break;
                }
            }
            self.end_of_statement()?;
            self.attach(Node::call(&name.lexeme, args));
            return Ok(Parsed::Complete);
        }

        // something like `X + 1`, evaluated for its value
        self.current -= 1;
        self.expression_statement()
    }

    fn assignment(&mut self, name: &str) -> StmtResult {
        let value = self.expression()?;
        self.end_of_statement()?;
        self.attach(Node::operator(
            Operator::Assign,
            vec![Node::identifier(name), value],
        ));
        Ok(Parsed::Complete)
    }

    fn element_assignment(&mut self, name: &str) -> StmtResult {
        self.consume(Type::LeftParen, "Expect '(' after array name.")?;
        let index = self.expression()?;
        self.consume(Type::RightParen, "Expect ')' after index.")?;
        self.consume(Type::Equal, "Expect '=' after array element.")?;
        let value = self.expression()?;
        self.end_of_statement()?;
        self.attach(Node::operator(
            Operator::AssignElement,
            vec![Node::identifier(name), index, value],
        ));
        Ok(Parsed::Complete)
    }

    fn dim_statement(&mut self) -> StmtResult {
        let name = self
            .consume(Type::Identifier, "Expect variable name after DIM.")?
            .lexeme
            .clone();
        let size = if self.match_one(Type::LeftParen) {
            let size = self.expression()?;
            self.consume(Type::RightParen, "Expect ')' after array size.")?;
            Some(size)
        } else {
            None
        };
        self.consume(Type::As, "Expect AS after DIM declaration.")?;
        let ty = self
            .consume(Type::Identifier, "Expect type name after AS.")?
            .lexeme
            .clone();
        self.end_of_statement()?;

        let mut args = vec![Node::identifier(&name), Node::identifier(&ty)];
        args.extend(size);
        self.attach(Node::operator(Operator::Dim, args));
        Ok(Parsed::Complete)
    }

    fn if_statement(&mut self, token: &Token) -> StmtResult {
        let guard = self.expression()?;
        self.consume(Type::Then, "Expect THEN after IF condition.")?;
        self.end_of_statement()?;

        let seq = Node::control(Control::Seq);
        let branch = Node::control(Control::If { fallback: false });
        Node::add(&branch, guard);
        let block = Node::add_block(&branch);
        Node::add(&seq, branch);
        self.attach(seq);
        self.blocks.push(block, token.line);
        Ok(Parsed::Open)
    }

    // ELSEIF and ELSE close the current branch and open a sibling in the same chain
    fn branch(&mut self, token: &Token, guard: NodeRef, fallback: bool) -> StmtResult {
        match self.blocks.control() {
            Some(Control::If { fallback: false }) => {}
            Some(Control::If { fallback: true }) => {
                return Err(Error::syntax(
                    token,
                    &format!("{} after ELSE", token.lexeme),
                ))
            }
            _ => {
                return Err(Error::syntax(
                    token,
                    &format!("{} without IF", token.lexeme),
                ))
            }
        }

        let seq = self
            .blocks
            .construct()
            .and_then(|branch| Node::parent(&branch))
            .ok_or_else(|| Error::syntax(token, &format!("{} without IF", token.lexeme)))?;
        self.blocks.pop();

        let branch = Node::control(Control::If { fallback });
        Node::add(&branch, guard);
        let block = Node::add_block(&branch);
        Node::add(&seq, branch);
        self.blocks.push(block, token.line);
        Ok(Parsed::Open)
    }

    fn end_statement(&mut self, token: &Token) -> StmtResult {
        let closing = self.next_token();
        let (msg, matches): (&str, fn(&Control) -> bool) = match closing.ty {
            Type::If => ("END IF without IF", |c| matches!(c, Control::If { .. })),
            Type::While => ("END WHILE without WHILE", |c| matches!(c, Control::While)),
            Type::For => ("END FOR without FOR", |c| matches!(c, Control::For { .. })),
            Type::Sub => ("END SUB without SUB", |c| matches!(c, Control::Sub { .. })),
            Type::Function => ("END FUNCTION without FUNCTION", |c| {
                matches!(c, Control::Function { .. })
            }),
            _ => {
                return Err(Error::syntax(
                    &closing,
                    "Expect IF, WHILE, FOR, SUB or FUNCTION after END.",
                ))
            }
        };
        self.end_of_statement()?;
        self.close(token, msg, matches)?;
        Ok(Parsed::Complete)
    }

    fn loop_statement(&mut self, token: &Token) -> StmtResult {
        let guard = if self.match_one(Type::While) {
            self.expression()?
        } else if self.match_one(Type::Until) {
            Node::negative(self.expression()?)
        } else {
            Node::true_node()
        };
        self.end_of_statement()?;

        let construct = self.close(token, "LOOP without DO", |c| matches!(c, Control::Do))?;
        Node::replace_child(&construct, 0, guard);
        Ok(Parsed::Complete)
    }

    fn for_statement(&mut self, token: &Token) -> StmtResult {
        let var = self
            .consume(Type::Identifier, "Expect loop variable after FOR.")?
            .lexeme
            .clone();
        self.consume(Type::Equal, "Expect '=' after loop variable.")?;
        let start = self.expression()?;
        self.consume(Type::To, "Expect TO after FOR start value.")?;
        let end = self.expression()?;
        let step = if self.match_one(Type::Step) {
            self.expression()?
        } else {
            Node::literal(1i64)
        };
        self.end_of_statement()?;

        let construct = Node::control(Control::For { var });
        Node::add_group(&construct, vec![start, end, step]);
        self.open(construct, token)
    }

    fn next_statement(&mut self, token: &Token) -> StmtResult {
        let named = if self.check(Type::Identifier) {
            Some(self.advance().lexeme.clone())
        } else {
            None
        };
        self.end_of_statement()?;

        match (self.blocks.control(), named) {
            (Some(Control::For { var }), Some(named)) if var != named => Err(Error::syntax(
                token,
                &format!("NEXT {} does not match FOR {}", named, var),
            )),
            (Some(Control::For { .. }), _) => {
                self.blocks.pop();
                Ok(Parsed::Complete)
            }
            _ => Err(Error::syntax(token, "NEXT without FOR")),
        }
    }

    fn closure_statement(&mut self, token: &Token) -> StmtResult {
        let name = self
            .consume(Type::Identifier, &format!("Expect {} name.", token.lexeme))?
            .lexeme
            .clone();
        let params = if self.match_one(Type::LeftParen) {
            self.parameters()?
        } else {
            Vec::new()
        };
        self.end_of_statement()?;

        let control = if token.ty == Type::Sub {
            Control::Sub { name, params }
        } else {
            Control::Function { name, params }
        };
        self.open(Node::control(control), token)
    }

    // DEFUN NAME(PARAMS) = EXPR, a one-line FUNCTION returning EXPR
    fn defun_statement(&mut self) -> StmtResult {
        let name = self
            .consume(Type::Identifier, "Expect DEFUN name.")?
            .lexeme
            .clone();
        self.consume(Type::LeftParen, "Expect '(' after DEFUN name.")?;
        let params = self.parameters()?;
        self.consume(Type::Equal, "Expect '=' after DEFUN parameters.")?;
        let value = self.expression()?;
        self.end_of_statement()?;

        let function = Node::control(Control::Function { name, params });
        let block = Node::add_block(&function);
        let ret = Node::control(Control::Return);
        Node::add(&ret, value);
        Node::add(&block, ret);
        self.attach(function);
        Ok(Parsed::Complete)
    }

    fn return_statement(&mut self, token: &Token) -> StmtResult {
        let value = if self.at_statement_end() {
            None
        } else {
            Some(self.expression()?)
        };
        self.end_of_statement()?;

        match self.blocks.closure() {
            None => return Err(Error::syntax(token, "RETURN without FUNCTION or SUB")),
            Some(Control::Sub { .. }) if value.is_some() => {
                return Err(Error::syntax(token, "RETURN value without FUNCTION"))
            }
            _ => {}
        }

        let ret = Node::control(Control::Return);
        if let Some(value) = value {
            Node::add(&ret, value);
        }
        self.attach(ret);
        Ok(Parsed::Complete)
    }

    // EXIT and CONTINUE name the loop they apply to, which must be the innermost one
    fn loop_control_statement(&mut self, token: &Token) -> StmtResult {
        let kind = self.next_token();
        let matches: fn(&Control) -> bool = match kind.ty {
            Type::While => |c| matches!(c, Control::While),
            Type::Do => |c| matches!(c, Control::Do),
            Type::For => |c| matches!(c, Control::For { .. }),
            _ => {
                return Err(Error::syntax(
                    &kind,
                    &format!("Expect WHILE, DO or FOR after {}.", token.lexeme),
                ))
            }
        };
        self.end_of_statement()?;

        match self.blocks.enclosing_loop() {
            Some(control) if matches(&control) => {}
            _ => {
                return Err(Error::syntax(
                    token,
                    &format!("{} {} without {}", token.lexeme, kind.lexeme, kind.lexeme),
                ))
            }
        }

        let control = if token.ty == Type::Exit {
            Control::Break
        } else {
            Control::Continue
        };
        self.attach(Node::control(control));
        Ok(Parsed::Complete)
    }

    // USE NAME looks for NAME.bas, then a bundled library, then NAME.sh
    fn use_statement(&mut self) -> StmtResult {
        let token = self
            .consume(Type::Identifier, "Expect module name after USE.")?
            .clone();
        self.end_of_statement()?;
        let name = token.lexeme;

        if self.including.contains(&name) {
            return Err(Error::Syntax {
                line: token.line,
                msg: format!("circular USE of {}", name),
            });
        }

        let module = self.loader.resolve(&name)?;
        match module {
            Some(Module::Source { path, text }) => {
                debug!(module = name.as_str(), path = %path.display(), "inlining module");
                self.including.push(name);
                let line = mem::replace(&mut self.line, 1);
                let result = self.parse_source(&text);
                self.line = line;
                self.including.pop();
                result?;
                // the inlined statements were reported as they completed
                Ok(Parsed::Open)
            }
            _ if stdlib::is_library(&name) => {
                self.attach(Node::control(Control::Use(Unit::Library(name))));
                Ok(Parsed::Complete)
            }
            Some(Module::Script(path)) => {
                self.attach(Node::control(Control::Use(Unit::Script(path))));
                Ok(Parsed::Complete)
            }
            None => Err(Error::ModuleNotFound { name }),
        }
    }

    fn expression(&mut self) -> ExprResult {
        self.nested(Parser::logical)
    }

    fn nested(&mut self, parse: fn(&mut Parser) -> ExprResult) -> ExprResult {
        if self.nesting >= NESTING_LIMIT {
            return Err(Error::syntax(self.peek(), "Too much nesting in expression."));
        }
        self.nesting += 1;
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || parse(self));
        self.nesting -= 1;
        result
    }

    fn logical(&mut self) -> ExprResult {
        let mut expr = self.negation()?;
        while self.match_either(&[Type::And, Type::Or]) {
            let operator = if self.previous().ty == Type::And {
                Operator::And
            } else {
                Operator::Or
            };
            let right = self.negation()?;
            expr = Node::operator(operator, vec![expr, right]);
        }
        Ok(expr)
    }

    fn negation(&mut self) -> ExprResult {
        if self.match_one(Type::Not) {
            let operand = self.nested(Parser::negation)?;
            return Ok(Node::negative(operand));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ExprResult {
        let mut expr = self.coercion()?;
        while self.match_either(&[
            Type::Equal,
            Type::NotEqual,
            Type::Greater,
            Type::GreaterEqual,
            Type::Less,
            Type::LessEqual,
        ]) {
            let operator = match self.previous().ty {
                Type::Equal => Operator::Equal,
                Type::NotEqual => Operator::NotEqual,
                Type::Greater => Operator::Greater,
                Type::GreaterEqual => Operator::GreaterEqual,
                Type::Less => Operator::Less,
                _ => Operator::LessEqual,
            };
            let right = self.coercion()?;
            expr = Node::operator(operator, vec![expr, right]);
        }
        Ok(expr)
    }

    fn coercion(&mut self) -> ExprResult {
        let mut expr = self.term()?;
        while self.match_one(Type::As) {
            let ty = self.term()?;
            expr = Node::operator(Operator::As, vec![expr, ty]);
        }
        Ok(expr)
    }

    fn term(&mut self) -> ExprResult {
        let mut expr = self.factor()?;
        while self.match_either(&[Type::Plus, Type::Minus]) {
            let operator = if self.previous().ty == Type::Plus {
                Operator::Plus
            } else {
                Operator::Minus
            };
            let right = self.factor()?;
            expr = Node::operator(operator, vec![expr, right]);
        }
        Ok(expr)
    }

    fn factor(&mut self) -> ExprResult {
        let mut expr = self.power()?;
        while self.match_either(&[Type::Star, Type::Slash, Type::Backslash, Type::Mod]) {
            let operator = match self.previous().ty {
                Type::Star => Operator::Times,
                Type::Slash => Operator::Divide,
                Type::Backslash => Operator::ExactDiv,
                _ => Operator::Mod,
            };
            let right = self.power()?;
            expr = Node::operator(operator, vec![expr, right]);
        }
        Ok(expr)
    }

    // left-associative, and looser than unary minus: -2 ^ 2 is 4
    fn power(&mut self) -> ExprResult {
        let mut expr = self.unary()?;
        while self.match_one(Type::Caret) {
            let right = self.unary()?;
            expr = Node::operator(Operator::Exp, vec![expr, right]);
        }
        Ok(expr)
    }

    fn unary(&mut self) -> ExprResult {
        if self.match_one(Type::Minus) {
            let operand = self.nested(Parser::unary)?;
            return Ok(Node::operator(Operator::Negate, vec![operand]));
        }
        self.primary()
    }

    fn primary(&mut self) -> ExprResult {
        let token = self.next_token();
        match token.ty {
            Type::Integer | Type::Decimal | Type::String => {
                Ok(Node::literal(token.value.clone()))
            }
            Type::Identifier => {
                if self.match_one(Type::LeftParen) {
                    let args = self.arguments(Type::RightParen, "Expect ')' after arguments.")?;
                    Ok(Node::call(&token.lexeme, args))
                } else {
                    Ok(Node::identifier(&token.lexeme))
                }
            }
            Type::LeftParen => {
                let expr = self.expression()?;
                self.consume(Type::RightParen, "Expect ')' after expression.")?;
                Ok(expr)
            }
            Type::LeftBrace => {
                let elements = self.arguments(Type::RightBrace, "Expect '}' after elements.")?;
                Ok(Node::array(elements))
            }
            // IF cond THEN a ELSE b, evaluating only the chosen side
            Type::If => {
                let guard = self.expression()?;
                self.consume(Type::Then, "Expect THEN in conditional expression.")?;
                let taken = self.expression()?;
                self.consume(Type::Else, "Expect ELSE in conditional expression.")?;
                let other = self.expression()?;
                Ok(Node::operator(Operator::Choose, vec![guard, taken, other]))
            }
            _ => Err(Error::syntax(
                &token,
                &format!("Expect expression, found {}.", token.describe()),
            )),
        }
    }

    // comma separated expressions up to `closing`, which is consumed
    fn arguments(&mut self, closing: Type, msg: &str) -> Result<Vec<NodeRef>, Error> {
        let mut args = Vec::new();
        if !self.check(closing) {
            loop {
                if args.len() >= ARG_LIMIT {
                    return Err(Error::syntax(
                        self.peek(),
                        "Can't have more than 255 arguments.",
                    ));
                }
                args.push(self.expression()?);
                if !self.match_one(Type::Comma) {
                    break;
                }
            }
        }
        self.consume(closing, msg)?;
        Ok(args)
    }

    // parameter names after an opening paren, up to and including the closing one
    fn parameters(&mut self) -> Result<Vec<String>, Error> {
        let mut params: Vec<String> = Vec::new();
        if !self.check(Type::RightParen) {
            loop {
                if params.len() >= ARG_LIMIT {
                    return Err(Error::syntax(
                        self.peek(),
                        "Can't have more than 255 parameters.",
                    ));
                }
                let param = self.consume(Type::Identifier, "Expect parameter name.")?.clone();
                if params.contains(&param.lexeme) {
                    return Err(Error::syntax(
                        &param,
                        &format!("Duplicate parameter {}.", param.lexeme),
                    ));
                }
                params.push(param.lexeme);
                if !self.match_one(Type::Comma) {
                    break;
                }
            }
        }
        self.consume(Type::RightParen, "Expect ')' after parameters.")?;
        Ok(params)
    }

    fn attach(&mut self, node: NodeRef) {
        Node::add(&self.blocks.target(), node);
    }

    fn open(&mut self, construct: NodeRef, token: &Token) -> StmtResult {
        let block = Node::add_block(&construct);
        self.attach(construct);
        self.blocks.push(block, token.line);
        Ok(Parsed::Open)
    }

    fn close(
        &mut self,
        token: &Token,
        msg: &str,
        matches: fn(&Control) -> bool,
    ) -> Result<NodeRef, Error> {
        match self.blocks.control() {
            Some(control) if matches(&control) => {}
            _ => return Err(Error::syntax(token, msg)),
        }
        let construct = self
            .blocks
            .construct()
            .ok_or_else(|| Error::syntax(token, msg))?;
        self.blocks.pop();
        Ok(construct)
    }

    // index of the `)` matching the `(` under the cursor, if it is on this line
    fn matching_paren(&self) -> Option<usize> {
        let mut depth = 0usize;
        for (idx, token) in self.tokens.iter().enumerate().skip(self.current) {
            match token.ty {
                Type::LeftParen => depth += 1,
                Type::RightParen => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(idx);
                    }
                }
                Type::Newline | Type::Eof => return None,
                _ => {}
            }
        }
        None
    }

    fn at_statement_end(&self) -> bool {
        self.is_at_end() || self.check(Type::Newline)
    }

    fn end_of_statement(&mut self) -> Result<(), Error> {
        if self.is_at_end() || self.match_one(Type::Newline) {
            Ok(())
        } else {
            Err(Error::syntax(
                self.peek(),
                &format!("Unexpected {} after statement.", self.peek().describe()),
            ))
        }
    }

    fn is_at_end(&self) -> bool {
        self.peek().ty == Type::Eof
    }

    fn check(&self, ty: Type) -> bool {
        if self.is_at_end() {
            false
        } else {
            self.peek().ty == ty
        }
    }

    fn consume(&mut self, ty: Type, msg: &str) -> Result<&Token, Error> {
        if self.check(ty) {
            Ok(self.advance())
        } else {
            Err(Error::syntax(self.peek(), msg))
        }
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }

        self.previous()
    }

    // like `advance`, but yields the end-of-input token instead of re-reading the last one
    fn next_token(&mut self) -> Token {
        let token = self.peek().clone();
        self.advance();
        token
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn match_either(&mut self, types: &[Type]) -> bool {
        types.iter().any(|ty| self.match_one(*ty))
    }

    fn match_one(&mut self, ty: Type) -> bool {
        if self.check(ty) {
            self.advance();
            true
        } else {
            false
        }
    }
}

fn starts_expression(ty: Type) -> bool {
    matches!(
        ty,
        Type::Identifier
            | Type::Integer
            | Type::Decimal
            | Type::String
            | Type::LeftParen
            | Type::LeftBrace
            | Type::Minus
            | Type::Not
            | Type::If
    )
}

fn closing_statement(control: &Control) -> &'static str {
    match control {
        Control::If { .. } => "END IF",
        Control::While => "WEND",
        Control::Do => "LOOP",
        Control::For { .. } => "NEXT",
        Control::Sub { .. } => "END SUB",
        Control::Function { .. } => "END FUNCTION",
        _ => "END",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::ast::{Control, Kind, Node, NodeRef, Unit};
    use crate::error::Error;
    use crate::module::{Module, ModuleLoader};
    use crate::parser::Parser;

    fn parse_program(src: &str) -> NodeRef {
        let mut parser = Parser::new();
        parser.parse(src).unwrap();
        parser.finish().unwrap().root
    }

    fn parse_error(src: &str) -> String {
        let mut parser = Parser::new();
        match parser.parse(src).and_then(|_| parser.finish()) {
            Ok(program) => panic!("Expecting an error, parsed:\n{}", program),
            Err(err) => err.to_string(),
        }
    }

    fn kind(node: &NodeRef) -> Kind {
        node.borrow().kind.clone()
    }

    fn child(node: &NodeRef, idx: usize) -> NodeRef {
        node.borrow().children[idx].clone()
    }

    fn call(name: &str) -> Kind {
        Kind::Call(String::from(name))
    }

    #[test]
    fn test_expression_precedence() {
        let root = parse_program("X = 1 + 2 * 3");
        let assign = child(&root, 0);
        assert_eq!(kind(&assign), call("<ASSIGN>"));
        assert_eq!(kind(&child(&assign, 0)), Kind::Identifier(String::from("X")));

        let sum = child(&assign, 1);
        assert_eq!(kind(&sum), call("<PLUS>"));
        assert_eq!(kind(&child(&sum, 1)), call("<TIMES>"));

        // unary minus binds tighter than ^
        let root = parse_program("-2 ^ 2");
        let power = child(&root, 0);
        assert_eq!(kind(&power), call("<EXP>"));
        assert_eq!(kind(&child(&power, 0)), call("<UMINUS>"));

        // NOT applies to the whole comparison
        let root = parse_program("NOT A = B");
        let not = child(&root, 0);
        assert_eq!(kind(&not), call("<NOT>"));
        assert_eq!(kind(&child(&not, 0)), call("<EQUAL>"));
    }

    #[test]
    fn test_statement_forms() {
        let root = parse_program("PRINT\nPRINT 1, 2\nF(1)\nA(2) = 3\nDIM B(4) AS INTEGER\n");
        let print = child(&root, 0);
        assert_eq!(kind(&print), call("PRINT"));
        assert!(print.borrow().children.is_empty());

        assert_eq!(child(&root, 1).borrow().children.len(), 2);
        assert_eq!(kind(&child(&root, 2)), call("F"));

        let element = child(&root, 3);
        assert_eq!(kind(&element), call("<ASSIGN_ARRAY>"));
        assert_eq!(element.borrow().children.len(), 3);

        let dim = child(&root, 4);
        assert_eq!(kind(&dim), call("<DIM_ARRAY>"));
        assert_eq!(kind(&child(&dim, 1)), Kind::Identifier(String::from("INTEGER")));
    }

    #[test]
    fn test_block_structure() {
        let root = parse_program(
            "IF A THEN\nX = 1\nELSEIF B THEN\nX = 2\nELSE\nX = 3\nEND IF\n",
        );
        let seq = child(&root, 0);
        assert_eq!(kind(&seq), Kind::Control(Control::Seq));
        assert_eq!(seq.borrow().children.len(), 3);

        let fallback = child(&seq, 2);
        assert_eq!(
            kind(&fallback),
            Kind::Control(Control::If { fallback: true })
        );
        let body = fallback.borrow().body().unwrap();
        assert_eq!(body.borrow().children.len(), 1);
        assert_eq!(Node::parent_control(&body), Some(Control::If { fallback: true }));
    }

    #[test]
    fn test_loop_guards_are_patched_in() {
        let root = parse_program("DO\nX = X + 1\nLOOP UNTIL X > 3\nDO\nLOOP\n");
        let until = child(&root, 0);
        assert_eq!(kind(&child(&until, 0)), call("<NOT>"));
        assert_eq!(until.borrow().block, Some(1));

        let forever = child(&root, 1);
        assert_eq!(
            kind(&child(&forever, 0)),
            Kind::Literal(basic_core::Literal::Bool(true))
        );
    }

    #[test]
    fn test_for_has_default_step() {
        let root = parse_program("FOR I = 1 TO 10\nNEXT I");
        let for_node = child(&root, 0);
        assert_eq!(
            kind(&for_node),
            Kind::Control(Control::For {
                var: String::from("I")
            })
        );
        assert_eq!(
            kind(&child(&for_node, 2)),
            Kind::Literal(basic_core::Literal::Int(1))
        );
        assert_eq!(for_node.borrow().block, Some(3));
    }

    #[test]
    fn test_defun_wraps_a_return() {
        let root = parse_program("DEFUN SQUARE(X) = X * X");
        let function = child(&root, 0);
        assert_eq!(
            kind(&function),
            Kind::Control(Control::Function {
                name: String::from("SQUARE"),
                params: vec![String::from("X")],
            })
        );
        let body = function.borrow().body().unwrap();
        assert_eq!(kind(&child(&body, 0)), Kind::Control(Control::Return));
    }

    #[test]
    fn test_mismatched_blocks() {
        let tests = [
            ("END IF", "[line 1] END IF without IF"),
            ("WEND", "[line 1] WEND without WHILE"),
            ("NEXT", "[line 1] NEXT without FOR"),
            ("LOOP", "[line 1] LOOP without DO"),
            ("END SUB", "[line 1] END SUB without SUB"),
            ("ELSE", "[line 1] ELSE without IF"),
            ("ELSEIF X THEN", "[line 1] ELSEIF without IF"),
            ("WHILE X\nEND IF", "[line 2] END IF without IF"),
            ("FOR I = 1 TO 2\nNEXT J", "[line 2] NEXT J does not match FOR I"),
            ("IF X THEN\nELSE\nELSE\nEND IF", "[line 3] ELSE after ELSE"),
            ("RETURN 1", "[line 1] RETURN without FUNCTION or SUB"),
            ("SUB S\nRETURN 1\nEND SUB", "[line 2] RETURN value without FUNCTION"),
            ("EXIT FOR", "[line 1] EXIT FOR without FOR"),
            ("WHILE X\nEXIT FOR\nWEND", "[line 2] EXIT FOR without FOR"),
            (
                "FOR I = 1 TO 2\nSUB S\nCONTINUE FOR\nEND SUB\nNEXT",
                "[line 3] CONTINUE FOR without FOR",
            ),
            ("WHILE X\nX = 1\n", "[line 1] WHILE without WEND"),
            ("IF X THEN\n", "[line 1] IF without END IF"),
        ];

        for (src, expected) in tests {
            assert_eq!(parse_error(src), expected, "source: {:?}", src);
        }
    }

    #[test]
    fn test_syntax_errors() {
        let tests = [
            ("X = ", "[line 1] Expect expression, found end of input."),
            ("X = 1 2", "[line 1] Unexpected '2' after statement."),
            ("DIM A(3)", "[line 1] Expect AS after DIM declaration."),
            ("FOR I = 1\nNEXT", "[line 1] Expect TO after FOR start value."),
            ("SUB S(A, A)\nEND SUB", "[line 1] Duplicate parameter A."),
            ("X = \"open", "[line 1] unterminated string"),
            ("USE NOWHERE", "No such module: NOWHERE"),
        ];

        for (src, expected) in tests {
            assert_eq!(parse_error(src), expected, "source: {:?}", src);
        }
    }

    #[test]
    fn test_too_many_arguments() {
        let args = vec!["1"; 256].join(", ");
        assert_eq!(
            parse_error(&format!("F({})", args)),
            "[line 1] Can't have more than 255 arguments."
        );
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |open: &str, depth: usize, close: &str| {
            format!("X = {}1{}", open.repeat(depth), close.repeat(depth))
        };

        let mut parser = Parser::new();
        parser.parse(&nested("(", 100, ")")).unwrap();
        parser.parse(&nested("{", 100, "}")).unwrap();
        parser.parse(&nested("-", 100, "")).unwrap();

        let tests = [
            nested("(", 300, ")"),
            nested("{", 300, "}"),
            nested("F(", 300, ")"),
            nested("-", 300, ""),
            nested("NOT ", 300, ""),
        ];
        for src in tests {
            assert_eq!(parse_error(&src), "[line 1] Too much nesting in expression.");
        }

        // the parser is usable again after the error
        let mut parser = Parser::new();
        assert!(parser.parse(&nested("(", 300, ")")).is_err());
        parser.parse(&nested("(", 200, ")")).unwrap();
    }

    #[test]
    fn test_incremental_parsing() {
        let mut parser = Parser::new();
        assert!(parser.parse("FUNCTION F(X)").unwrap().is_empty());
        assert!(parser.is_open());
        assert!(parser.parse("IF X THEN").unwrap().is_empty());
        assert!(parser.parse("RETURN 1").unwrap().is_empty());
        assert!(parser.parse("END IF").unwrap().is_empty());
        assert!(parser.parse("RETURN 2").unwrap().is_empty());

        let completed = parser.parse("END FUNCTION").unwrap();
        assert_eq!(completed.len(), 1);
        assert!(!parser.is_open());

        let completed = parser.parse("X = 1\nY = 2\nWHILE Y\nWEND").unwrap();
        assert_eq!(completed.len(), 3);
    }

    #[test]
    fn test_abandon_discards_open_construct() {
        let mut parser = Parser::new();
        parser.parse("X = 1").unwrap();
        parser.parse("WHILE X").unwrap();
        assert!(parser.parse("NEXT").is_err());

        parser.abandon();
        assert!(!parser.is_open());

        let program = parser.finish().unwrap();
        assert_eq!(program.root.borrow().children.len(), 1);
    }

    #[test]
    fn test_line_numbers_continue_across_pieces() {
        let mut parser = Parser::new();
        parser.parse("X = 1\nY = 2\n").unwrap();
        assert_eq!(
            parser.parse("WEND").unwrap_err(),
            Error::Syntax {
                line: 3,
                msg: String::from("WEND without WHILE")
            }
        );
    }

    struct Modules(HashMap<&'static str, &'static str>);

    impl ModuleLoader for Modules {
        fn resolve(&self, name: &str) -> Result<Option<Module>, Error> {
            Ok(self.0.get(name).map(|text| Module::Source {
                path: format!("{}.bas", name).into(),
                text: String::from(*text),
            }))
        }
    }

    #[test]
    fn test_use_inlines_source_modules() {
        let loader = Modules(HashMap::from([
            ("HELPERS", "DEFUN TWICE(X) = X * 2\nLIMIT = 10\n"),
            ("LOOPY", "USE LOOPY\n"),
        ]));
        let mut parser = Parser::with_loader(Box::new(loader));

        let completed = parser.parse("USE HELPERS\nPRINT TWICE(LIMIT)").unwrap();
        assert_eq!(completed.len(), 3);
        assert_eq!(
            parser.parse("USE LOOPY").unwrap_err().to_string(),
            "[line 1] circular USE of LOOPY"
        );
    }

    #[test]
    fn test_use_library() {
        let root = parse_program("USE BQUEUE");
        assert_eq!(
            kind(&child(&root, 0)),
            Kind::Control(Control::Use(Unit::Library(String::from("BQUEUE"))))
        );
    }
}
