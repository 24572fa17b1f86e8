//! Small Basic parser - produces a flat statement list with jump targets
//!
//! Lines are tokenized and parsed one at a time. Block constructs are matched
//! with an explicit stack of open statements, and every jump target is stored
//! as an index into the statement list. Labels, subroutines and event bindings
//! are resolved by a scan over the finished list, so forward references work.

use std::collections::HashMap;

use crate::basic::error::{SyntaxError, SyntaxErrorKind, SyntaxErrors};
use crate::basic::lexer::{tokenize, Keyword, Token, TokenKind};
use crate::basic::registry::{MemberKind, REGISTRY};

/// Placeholder for a jump target that has not been linked yet
const UNRESOLVED: usize = usize::MAX;

/// Arithmetic operators
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Comparison and logical operators; all produce "True" or "False"
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Expression types
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Number or string literal, kept as text
    Literal(String),
    /// Variable reference: name[i][j]...
    Variable { name: String, indices: Vec<Expr> },
    /// Library object field read: Object.Field
    Field {
        object: &'static str,
        field: &'static str,
    },
    /// Arithmetic operation
    Operation(ArithOp, Box<Expr>, Box<Expr>),
    /// Comparison
    Comparison(CompareOp, Box<Expr>, Box<Expr>),
    /// Library method call used as a value
    Call {
        object: &'static str,
        method: &'static str,
        args: Vec<Expr>,
    },
}

/// Left-hand side of an assignment
#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    Variable { name: String, indices: Vec<Expr> },
    Field {
        object: &'static str,
        field: &'static str,
    },
}

/// Statement types
///
/// Block statements hold indices of the statements they jump to.
#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    Assign {
        target: Target,
        value: Expr,
    },
    /// Object.Event = SubName
    BindEvent {
        object: &'static str,
        event: &'static str,
        sub: String,
        target: usize,
    },
    /// Object.Method(args) as a statement
    LibraryCall {
        object: &'static str,
        method: &'static str,
        args: Vec<Expr>,
    },
    Label(String),
    Goto {
        label: String,
        target: usize,
    },
    /// name() - target is the first statement of the subroutine body
    CallSub {
        name: String,
        target: usize,
    },
    /// `next` is the following ElseIf, Else or EndIf
    If {
        condition: Expr,
        next: usize,
    },
    ElseIf {
        condition: Expr,
        next: usize,
    },
    Else {
        next: usize,
    },
    EndIf,
    While {
        condition: Expr,
        end: usize,
    },
    EndWhile {
        start: usize,
    },
    For {
        var: String,
        lower: Expr,
        upper: Expr,
        end: usize,
    },
    EndFor {
        start: usize,
    },
    Sub {
        name: String,
        end: usize,
    },
    EndSub,
}

impl StmtKind {
    /// Keyword that opens or closes this statement, for diagnostics
    fn keyword(&self) -> &'static str {
        match self {
            StmtKind::If { .. } => "If",
            StmtKind::ElseIf { .. } => "ElseIf",
            StmtKind::Else { .. } => "Else",
            StmtKind::EndIf => "EndIf",
            StmtKind::While { .. } => "While",
            StmtKind::EndWhile { .. } => "EndWhile",
            StmtKind::For { .. } => "For",
            StmtKind::EndFor { .. } => "EndFor",
            StmtKind::Sub { .. } => "Sub",
            StmtKind::EndSub => "EndSub",
            _ => "statement",
        }
    }

    /// Closer expected for an open block statement
    fn closer(&self) -> &'static str {
        match self {
            StmtKind::If { .. } | StmtKind::ElseIf { .. } | StmtKind::Else { .. } => "EndIf",
            StmtKind::While { .. } => "EndWhile",
            StmtKind::For { .. } => "EndFor",
            StmtKind::Sub { .. } => "EndSub",
            _ => "end",
        }
    }

    fn is_branch(&self) -> bool {
        matches!(
            self,
            StmtKind::If { .. } | StmtKind::ElseIf { .. } | StmtKind::Else { .. }
        )
    }
}

/// A statement with its 0-based source line
#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

/// A parsed program: statements plus label and subroutine tables
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
    labels: HashMap<String, usize>,
    subs: HashMap<String, usize>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Stmt> {
        self.statements.get(index)
    }

    /// Index of the label statement
    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(&name.to_ascii_lowercase()).copied()
    }

    /// Index of the first body statement of a subroutine
    pub fn sub_start(&self, name: &str) -> Option<usize> {
        self.subs.get(&name.to_ascii_lowercase()).copied()
    }
}

/// Tokens that may end an expression
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Closer {
    EndOfLine,
    RightParen,
    RightBracket,
    Comma,
    Then,
    To,
}

impl Closer {
    fn matches(&self, kind: &TokenKind) -> bool {
        match self {
            Closer::EndOfLine => false,
            Closer::RightParen => *kind == TokenKind::RightParen,
            Closer::RightBracket => *kind == TokenKind::RightBracket,
            Closer::Comma => *kind == TokenKind::Comma,
            Closer::Then => *kind == TokenKind::Keyword(Keyword::Then),
            Closer::To => *kind == TokenKind::Keyword(Keyword::To),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Closer::EndOfLine => "end of line",
            Closer::RightParen => ")",
            Closer::RightBracket => "]",
            Closer::Comma => ",",
            Closer::Then => "Then",
            Closer::To => "To",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operator {
    Arith(ArithOp),
    Compare(CompareOp),
}

impl Operator {
    fn from_token(kind: &TokenKind) -> Option<Operator> {
        Some(match kind {
            TokenKind::Plus => Operator::Arith(ArithOp::Add),
            TokenKind::Minus => Operator::Arith(ArithOp::Sub),
            TokenKind::Star => Operator::Arith(ArithOp::Mul),
            TokenKind::Slash => Operator::Arith(ArithOp::Div),
            TokenKind::Equal => Operator::Compare(CompareOp::Eq),
            TokenKind::NotEqual => Operator::Compare(CompareOp::Ne),
            TokenKind::Less => Operator::Compare(CompareOp::Lt),
            TokenKind::LessEqual => Operator::Compare(CompareOp::Le),
            TokenKind::Greater => Operator::Compare(CompareOp::Gt),
            TokenKind::GreaterEqual => Operator::Compare(CompareOp::Ge),
            TokenKind::And => Operator::Compare(CompareOp::And),
            TokenKind::Or => Operator::Compare(CompareOp::Or),
            _ => return None,
        })
    }
}

/// Folding order. Each operator is folded completely, first occurrence
/// first, before the next one is considered.
const PRECEDENCE: [Operator; 12] = [
    Operator::Arith(ArithOp::Mul),
    Operator::Arith(ArithOp::Div),
    Operator::Arith(ArithOp::Add),
    Operator::Arith(ArithOp::Sub),
    Operator::Compare(CompareOp::Lt),
    Operator::Compare(CompareOp::Le),
    Operator::Compare(CompareOp::Eq),
    Operator::Compare(CompareOp::Ge),
    Operator::Compare(CompareOp::Gt),
    Operator::Compare(CompareOp::Ne),
    Operator::Compare(CompareOp::And),
    Operator::Compare(CompareOp::Or),
];

fn fold(mut operands: Vec<Expr>, mut operators: Vec<Operator>) -> Expr {
    for op in PRECEDENCE {
        while let Some(i) = operators.iter().position(|o| *o == op) {
            operators.remove(i);
            let right = operands.remove(i + 1);
            let left = std::mem::replace(&mut operands[i], Expr::Literal(String::new()));
            operands[i] = match op {
                Operator::Arith(a) => Expr::Operation(a, Box::new(left), Box::new(right)),
                Operator::Compare(c) => Expr::Comparison(c, Box::new(left), Box::new(right)),
            };
        }
    }
    operands.swap_remove(0)
}

/// Parser over the tokens of a single line
struct LineParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    line: usize,
}

type LineResult<T> = Result<T, SyntaxError>;

impl<'a> LineParser<'a> {
    fn new(tokens: &'a [Token], line: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            line,
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&'a TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn end_column(&self) -> usize {
        self.tokens.last().map(|t| t.end_column()).unwrap_or(0)
    }

    fn error_at(&self, tok: &Token, kind: SyntaxErrorKind) -> SyntaxError {
        SyntaxError::new(tok.line, tok.column, kind)
    }

    fn unexpected(&self, tok: &Token) -> SyntaxError {
        self.error_at(tok, SyntaxErrorKind::UnexpectedToken(tok.text.clone()))
    }

    /// Error for a missing token: unexpected if something else is there,
    /// otherwise "expected ..." at the end of the line
    fn missing(&self, expected: Vec<&'static str>) -> SyntaxError {
        match self.peek() {
            Some(tok) => self.unexpected(tok),
            None => SyntaxError::new(
                self.line,
                self.end_column(),
                SyntaxErrorKind::ExpectedToken(expected),
            ),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> LineResult<&'a Token> {
        match self.peek() {
            Some(tok) if tok.kind == kind => {
                self.pos += 1;
                Ok(tok)
            }
            _ => Err(self.missing(vec![kind.describe()])),
        }
    }

    fn expect_symbol(&mut self) -> LineResult<(&'a Token, &'a str)> {
        match self.peek() {
            Some(tok) => match &tok.kind {
                TokenKind::Symbol(name) => {
                    self.pos += 1;
                    Ok((tok, name.as_str()))
                }
                _ => Err(self.unexpected(tok)),
            },
            None => Err(self.missing(vec!["a variable or an object"])),
        }
    }

    /// Nothing may follow on this line
    fn expect_end(&self) -> LineResult<()> {
        match self.peek() {
            Some(tok) => Err(self.unexpected(tok)),
            None => Ok(()),
        }
    }

    /// Collect operands and operators until one of `closers`, then fold.
    /// The closer token is consumed and returned.
    fn parse_expr(
        &mut self,
        closers: &[Closer],
        allow_comparators: bool,
    ) -> LineResult<(Expr, Closer)> {
        let mut operands = Vec::new();
        let mut operators = Vec::new();

        let closer = loop {
            operands.push(self.parse_operand(closers, allow_comparators)?);

            let Some(tok) = self.peek() else {
                if closers.contains(&Closer::EndOfLine) {
                    break Closer::EndOfLine;
                }
                return Err(self.missing(closers.iter().map(|c| c.describe()).collect()));
            };

            if let Some(closer) = closers.iter().find(|c| c.matches(&tok.kind)) {
                self.pos += 1;
                break *closer;
            }

            let permitted =
                tok.kind.is_operator() || (allow_comparators && tok.kind.is_comparator());
            match Operator::from_token(&tok.kind) {
                Some(op) if permitted => operators.push(op),
                _ => return Err(self.unexpected(tok)),
            }
            self.pos += 1;
        };

        Ok((fold(operands, operators), closer))
    }

    fn parse_operand(&mut self, closers: &[Closer], allow_comparators: bool) -> LineResult<Expr> {
        let Some(tok) = self.peek() else {
            return Err(SyntaxError::new(
                self.line,
                self.end_column(),
                SyntaxErrorKind::ExpectedExpression,
            ));
        };

        match &tok.kind {
            TokenKind::Number(text) | TokenKind::Str(text) => {
                self.pos += 1;
                Ok(Expr::Literal(text.clone()))
            }
            TokenKind::Minus => self.parse_signed_number(),
            TokenKind::LeftParen => {
                self.pos += 1;
                let (expr, _) = self.parse_expr(&[Closer::RightParen], allow_comparators)?;
                Ok(expr)
            }
            TokenKind::Symbol(name) => {
                self.pos += 1;
                self.parse_symbol_operand(tok, name)
            }
            kind if closers.iter().any(|c| c.matches(kind)) => {
                Err(self.error_at(tok, SyntaxErrorKind::ExpectedExpression))
            }
            _ => Err(self.unexpected(tok)),
        }
    }

    /// One or more '-' directly before a number literal fold into its sign
    fn parse_signed_number(&mut self) -> LineResult<Expr> {
        let mut negative = false;
        while let Some(TokenKind::Minus) = self.peek_kind() {
            negative = !negative;
            self.pos += 1;
        }
        match self.peek() {
            Some(Token {
                kind: TokenKind::Number(text),
                ..
            }) => {
                self.pos += 1;
                if negative {
                    Ok(Expr::Literal(format!("-{}", text)))
                } else {
                    Ok(Expr::Literal(text.clone()))
                }
            }
            Some(tok) => Err(self.unexpected(tok)),
            None => Err(SyntaxError::new(
                self.line,
                self.end_column(),
                SyntaxErrorKind::ExpectedExpression,
            )),
        }
    }

    fn parse_symbol_operand(&mut self, name_tok: &'a Token, name: &str) -> LineResult<Expr> {
        match self.peek() {
            Some(tok) if tok.kind == TokenKind::LeftBracket => Ok(Expr::Variable {
                name: name.to_string(),
                indices: self.parse_indices()?,
            }),
            Some(tok) if tok.kind == TokenKind::Dot => {
                self.pos += 1;
                let (member_tok, member) = self.expect_symbol()?;
                if let Some(TokenKind::LeftParen) = self.peek_kind() {
                    self.pos += 1;
                    let args = self.parse_args()?;
                    let (object, method) =
                        self.resolve_method(name_tok, name, member_tok, member, args.len())?;
                    Ok(Expr::Call {
                        object,
                        method,
                        args,
                    })
                } else {
                    let (object, field, kind) = self.resolve_member(name_tok, name, member_tok, member)?;
                    if !matches!(kind, MemberKind::Field { .. }) {
                        return Err(self.error_at(
                            member_tok,
                            SyntaxErrorKind::WrongMemberKind(object.into(), field.into(), "field"),
                        ));
                    }
                    Ok(Expr::Field { object, field })
                }
            }
            // Subroutines return nothing and cannot appear in expressions
            Some(tok) if tok.kind == TokenKind::LeftParen => Err(self.unexpected(tok)),
            _ => Ok(Expr::Variable {
                name: name.to_string(),
                indices: Vec::new(),
            }),
        }
    }

    /// `[expr][expr]...`, starting at the first '['
    fn parse_indices(&mut self) -> LineResult<Vec<Expr>> {
        let mut indices = Vec::new();
        while let Some(TokenKind::LeftBracket) = self.peek_kind() {
            self.pos += 1;
            let (index, _) = self.parse_expr(&[Closer::RightBracket], false)?;
            indices.push(index);
        }
        Ok(indices)
    }

    /// Call arguments, starting just after '('
    fn parse_args(&mut self) -> LineResult<Vec<Expr>> {
        if let Some(TokenKind::RightParen) = self.peek_kind() {
            self.pos += 1;
            return Ok(Vec::new());
        }
        let mut args = Vec::new();
        loop {
            let (arg, closer) = self.parse_expr(&[Closer::Comma, Closer::RightParen], false)?;
            args.push(arg);
            if closer == Closer::RightParen {
                return Ok(args);
            }
        }
    }

    fn resolve_member(
        &self,
        obj_tok: &Token,
        object: &str,
        member_tok: &Token,
        member: &str,
    ) -> LineResult<(&'static str, &'static str, MemberKind)> {
        let registry = &*REGISTRY;
        let Some(obj) = registry.object(object) else {
            return Err(self.error_at(obj_tok, SyntaxErrorKind::UnknownObject(object.to_string())));
        };
        let Some(info) = obj.member(member) else {
            return Err(self.error_at(
                member_tok,
                SyntaxErrorKind::UnknownMember(obj.name.to_string(), member.to_string()),
            ));
        };
        Ok((obj.name, info.name, info.kind))
    }

    fn resolve_method(
        &self,
        obj_tok: &Token,
        object: &str,
        member_tok: &Token,
        member: &str,
        given: usize,
    ) -> LineResult<(&'static str, &'static str)> {
        let (object, method, kind) = self.resolve_member(obj_tok, object, member_tok, member)?;
        match kind {
            MemberKind::Method { arity } if arity == given => Ok((object, method)),
            MemberKind::Method { arity } => Err(self.error_at(
                member_tok,
                SyntaxErrorKind::ArityMismatch {
                    object: object.to_string(),
                    member: method.to_string(),
                    expected: arity,
                    given,
                },
            )),
            _ => Err(self.error_at(
                member_tok,
                SyntaxErrorKind::WrongMemberKind(object.into(), method.into(), "method"),
            )),
        }
    }
}

/// Program parser: drives the line parser and links block statements
pub struct Parser {
    statements: Vec<Stmt>,
    /// Indices of statements whose block is still open
    open_blocks: Vec<usize>,
    errors: Vec<SyntaxError>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            statements: Vec::new(),
            open_blocks: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Parse a whole program. Any syntax error fails the whole parse.
    pub fn parse(mut self, source: &str) -> Result<Program, SyntaxErrors> {
        for (line_no, line) in source.lines().enumerate() {
            let tokens = tokenize(line, line_no);
            if tokens.is_empty() {
                continue;
            }
            match self.parse_line(&tokens, line_no) {
                Ok(kind) => self.statements.push(Stmt {
                    line: line_no,
                    kind,
                }),
                Err(err) => self.errors.push(err),
            }
        }

        for &open in &self.open_blocks {
            let stmt = &self.statements[open];
            self.errors.push(SyntaxError::new(
                stmt.line,
                0,
                SyntaxErrorKind::Unclosed(stmt.kind.keyword(), stmt.kind.closer()),
            ));
        }

        let (labels, subs) = self.scan_names();

        if !self.errors.is_empty() {
            self.errors.sort_by_key(|e| (e.line, e.column));
            return Err(SyntaxErrors(self.errors));
        }

        Ok(Program {
            statements: self.statements,
            labels,
            subs,
        })
    }

    fn parse_line(&mut self, tokens: &[Token], line: usize) -> LineResult<StmtKind> {
        let mut p = LineParser::new(tokens, line);
        let Some(first) = p.advance() else {
            return Err(SyntaxError::new(line, 0, SyntaxErrorKind::UnrecognizedStatement));
        };

        match &first.kind {
            TokenKind::Keyword(kw) => self.parse_keyword_line(&mut p, first, *kw),
            TokenKind::Symbol(name) => Self::parse_symbol_line(&mut p, first, name),
            _ => Err(p.unexpected(first)),
        }
    }

    fn parse_symbol_line(p: &mut LineParser<'_>, first: &Token, name: &str) -> LineResult<StmtKind> {
        let Some(second) = p.advance() else {
            return Err(SyntaxError::new(
                first.line,
                first.column,
                SyntaxErrorKind::UnrecognizedStatement,
            ));
        };

        match &second.kind {
            // label:
            TokenKind::Colon => {
                p.expect_end()?;
                Ok(StmtKind::Label(name.to_string()))
            }

            // Object.Member(...) or Object.Member = expr
            TokenKind::Dot => {
                let (member_tok, member) = p.expect_symbol()?;
                match p.advance() {
                    Some(tok) if tok.kind == TokenKind::LeftParen => {
                        let args = p.parse_args()?;
                        let (object, method) =
                            p.resolve_method(first, name, member_tok, member, args.len())?;
                        p.expect_end()?;
                        Ok(StmtKind::LibraryCall {
                            object,
                            method,
                            args,
                        })
                    }
                    Some(tok) if tok.kind == TokenKind::Equal => {
                        Self::parse_member_assignment(p, first, name, member_tok, member)
                    }
                    Some(tok) => Err(p.unexpected(tok)),
                    None => Err(p.missing(vec!["(", "="])),
                }
            }

            // var[i][j] = expr
            TokenKind::LeftBracket => {
                p.pos -= 1;
                let indices = p.parse_indices()?;
                p.expect(TokenKind::Equal)?;
                let (value, _) = p.parse_expr(&[Closer::EndOfLine], false)?;
                Ok(StmtKind::Assign {
                    target: Target::Variable {
                        name: name.to_string(),
                        indices,
                    },
                    value,
                })
            }

            // var = expr
            TokenKind::Equal => {
                let (value, _) = p.parse_expr(&[Closer::EndOfLine], false)?;
                Ok(StmtKind::Assign {
                    target: Target::Variable {
                        name: name.to_string(),
                        indices: Vec::new(),
                    },
                    value,
                })
            }

            // name()
            TokenKind::LeftParen => {
                p.expect(TokenKind::RightParen)?;
                p.expect_end()?;
                Ok(StmtKind::CallSub {
                    name: name.to_string(),
                    target: UNRESOLVED,
                })
            }

            _ => Err(p.unexpected(second)),
        }
    }

    fn parse_member_assignment(
        p: &mut LineParser<'_>,
        obj_tok: &Token,
        object: &str,
        member_tok: &Token,
        member: &str,
    ) -> LineResult<StmtKind> {
        let (object, member, kind) = p.resolve_member(obj_tok, object, member_tok, member)?;
        match kind {
            MemberKind::Field { read_only: true } => Err(p.error_at(
                member_tok,
                SyntaxErrorKind::ReadOnlyField(object.into(), member.into()),
            )),
            MemberKind::Field { read_only: false } => {
                let (value, _) = p.parse_expr(&[Closer::EndOfLine], false)?;
                Ok(StmtKind::Assign {
                    target: Target::Field {
                        object,
                        field: member,
                    },
                    value,
                })
            }
            MemberKind::Event => {
                let value_tok = p.peek();
                let (value, _) = p.parse_expr(&[Closer::EndOfLine], false)?;
                match value {
                    Expr::Variable { name, indices } if indices.is_empty() => {
                        Ok(StmtKind::BindEvent {
                            object,
                            event: member,
                            sub: name,
                            target: UNRESOLVED,
                        })
                    }
                    _ => {
                        let at = value_tok.unwrap_or(member_tok);
                        Err(p.error_at(
                            at,
                            SyntaxErrorKind::EventNeedsSub(object.into(), member.into()),
                        ))
                    }
                }
            }
            MemberKind::Method { .. } => Err(p.error_at(
                member_tok,
                SyntaxErrorKind::WrongMemberKind(object.into(), member.into(), "field"),
            )),
        }
    }

    fn top_block(&self) -> Option<&StmtKind> {
        self.open_blocks.last().map(|&i| &self.statements[i].kind)
    }

    /// Link an open block statement to `target`
    fn link(&mut self, at: usize, target: usize) {
        match &mut self.statements[at].kind {
            StmtKind::If { next, .. } | StmtKind::ElseIf { next, .. } | StmtKind::Else { next } => {
                *next = target
            }
            StmtKind::While { end, .. } | StmtKind::For { end, .. } | StmtKind::Sub { end, .. } => {
                *end = target
            }
            _ => {}
        }
    }

    fn parse_keyword_line(
        &mut self,
        p: &mut LineParser<'_>,
        kw_tok: &Token,
        kw: Keyword,
    ) -> LineResult<StmtKind> {
        let index = self.statements.len();
        let unopened = |opener: &'static str| {
            SyntaxError::new(
                kw_tok.line,
                kw_tok.column,
                SyntaxErrorKind::Unopened(kw.as_str(), opener),
            )
        };

        match kw {
            Keyword::If => {
                let (condition, _) = p.parse_expr(&[Closer::Then], true)?;
                p.expect_end()?;
                self.open_blocks.push(index);
                Ok(StmtKind::If {
                    condition,
                    next: UNRESOLVED,
                })
            }

            Keyword::ElseIf | Keyword::Else => {
                match self.top_block() {
                    Some(StmtKind::Else { .. }) => return Err(p.unexpected(kw_tok)),
                    Some(top) if top.is_branch() => {}
                    _ => return Err(unopened("If")),
                }
                let kind = if kw == Keyword::ElseIf {
                    let (condition, _) = p.parse_expr(&[Closer::Then], true)?;
                    p.expect_end()?;
                    StmtKind::ElseIf {
                        condition,
                        next: UNRESOLVED,
                    }
                } else {
                    p.expect_end()?;
                    StmtKind::Else { next: UNRESOLVED }
                };
                if let Some(prev) = self.open_blocks.pop() {
                    self.link(prev, index);
                }
                self.open_blocks.push(index);
                Ok(kind)
            }

            Keyword::EndIf => {
                if !self.top_block().is_some_and(|k| k.is_branch()) {
                    return Err(unopened("If"));
                }
                p.expect_end()?;
                if let Some(prev) = self.open_blocks.pop() {
                    self.link(prev, index);
                }
                Ok(StmtKind::EndIf)
            }

            Keyword::While => {
                let (condition, _) = p.parse_expr(&[Closer::EndOfLine], true)?;
                self.open_blocks.push(index);
                Ok(StmtKind::While {
                    condition,
                    end: UNRESOLVED,
                })
            }

            Keyword::EndWhile => {
                if !matches!(self.top_block(), Some(StmtKind::While { .. })) {
                    return Err(unopened("While"));
                }
                p.expect_end()?;
                let start = self.open_blocks.pop().unwrap_or(UNRESOLVED);
                self.link(start, index);
                Ok(StmtKind::EndWhile { start })
            }

            Keyword::For => {
                let (_, var) = p.expect_symbol()?;
                p.expect(TokenKind::Equal)?;
                let (lower, _) = p.parse_expr(&[Closer::To], false)?;
                let (upper, _) = p.parse_expr(&[Closer::EndOfLine], false)?;
                self.open_blocks.push(index);
                Ok(StmtKind::For {
                    var: var.to_string(),
                    lower,
                    upper,
                    end: UNRESOLVED,
                })
            }

            Keyword::EndFor => {
                if !matches!(self.top_block(), Some(StmtKind::For { .. })) {
                    return Err(unopened("For"));
                }
                p.expect_end()?;
                let start = self.open_blocks.pop().unwrap_or(UNRESOLVED);
                self.link(start, index);
                Ok(StmtKind::EndFor { start })
            }

            Keyword::Sub => {
                let (_, name) = p.expect_symbol()?;
                p.expect_end()?;
                let nested = self
                    .open_blocks
                    .iter()
                    .any(|&i| matches!(self.statements[i].kind, StmtKind::Sub { .. }));
                if nested {
                    return Err(SyntaxError::new(
                        kw_tok.line,
                        kw_tok.column,
                        SyntaxErrorKind::NestedSub,
                    ));
                }
                self.open_blocks.push(index);
                Ok(StmtKind::Sub {
                    name: name.to_string(),
                    end: UNRESOLVED,
                })
            }

            Keyword::EndSub => {
                if !matches!(self.top_block(), Some(StmtKind::Sub { .. })) {
                    return Err(unopened("Sub"));
                }
                p.expect_end()?;
                if let Some(start) = self.open_blocks.pop() {
                    self.link(start, index);
                }
                Ok(StmtKind::EndSub)
            }

            Keyword::Goto => {
                let (_, label) = p.expect_symbol()?;
                p.expect_end()?;
                Ok(StmtKind::Goto {
                    label: label.to_string(),
                    target: UNRESOLVED,
                })
            }

            Keyword::Then | Keyword::To | Keyword::Step => Err(p.unexpected(kw_tok)),
        }
    }

    /// Record labels and subroutines, then resolve every reference to them
    fn scan_names(&mut self) -> (HashMap<String, usize>, HashMap<String, usize>) {
        let mut labels = HashMap::new();
        let mut subs = HashMap::new();

        for (index, stmt) in self.statements.iter().enumerate() {
            match &stmt.kind {
                StmtKind::Label(name) => {
                    if labels.insert(name.to_ascii_lowercase(), index).is_some() {
                        self.errors.push(SyntaxError::new(
                            stmt.line,
                            0,
                            SyntaxErrorKind::DuplicateLabel(name.clone()),
                        ));
                    }
                }
                StmtKind::Sub { name, .. } => {
                    if subs.insert(name.to_ascii_lowercase(), index + 1).is_some() {
                        self.errors.push(SyntaxError::new(
                            stmt.line,
                            0,
                            SyntaxErrorKind::DuplicateSub(name.clone()),
                        ));
                    }
                }
                _ => {}
            }
        }

        for stmt in &mut self.statements {
            let line = stmt.line;
            let error = match &mut stmt.kind {
                StmtKind::Goto { label, target } => match labels.get(&label.to_ascii_lowercase()) {
                    Some(&index) => {
                        *target = index;
                        None
                    }
                    None => Some(SyntaxErrorKind::UndefinedLabel(label.clone())),
                },
                StmtKind::CallSub { name, target } | StmtKind::BindEvent { sub: name, target, .. } => {
                    match subs.get(&name.to_ascii_lowercase()) {
                        Some(&index) => {
                            *target = index;
                            None
                        }
                        None => Some(SyntaxErrorKind::UndefinedSub(name.clone())),
                    }
                }
                StmtKind::Assign {
                    target: Target::Variable { .. },
                    value: Expr::Variable { name, indices },
                } if indices.is_empty() && subs.contains_key(&name.to_ascii_lowercase()) => {
                    Some(SyntaxErrorKind::SubAssignedToVariable(name.clone()))
                }
                _ => None,
            };
            if let Some(kind) = error {
                self.errors.push(SyntaxError::new(line, 0, kind));
            }
        }

        (labels, subs)
    }
}

/// Parse source text into a program
pub fn parse(source: &str) -> Result<Program, SyntaxErrors> {
    Parser::new().parse(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<StmtKind> {
        parse(source)
            .unwrap()
            .statements
            .into_iter()
            .map(|s| s.kind)
            .collect()
    }

    fn first_error(source: &str) -> SyntaxErrorKind {
        parse(source).unwrap_err().0.remove(0).kind
    }

    fn lit(s: &str) -> Box<Expr> {
        Box::new(Expr::Literal(s.into()))
    }

    fn value_of(source: &str) -> Expr {
        match kinds(source).remove(0) {
            StmtKind::Assign { value, .. } => value,
            other => panic!("not an assignment: {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            value_of("x = 2 + 3 * 4"),
            Expr::Operation(
                ArithOp::Add,
                lit("2"),
                Box::new(Expr::Operation(ArithOp::Mul, lit("3"), lit("4")))
            )
        );
        assert_eq!(
            value_of("x = (2 + 3) * 4"),
            Expr::Operation(
                ArithOp::Mul,
                Box::new(Expr::Operation(ArithOp::Add, lit("2"), lit("3"))),
                lit("4")
            )
        );
    }

    #[test]
    fn test_addition_folds_before_subtraction() {
        assert_eq!(
            value_of("x = 10 - 2 + 3"),
            Expr::Operation(
                ArithOp::Sub,
                lit("10"),
                Box::new(Expr::Operation(ArithOp::Add, lit("2"), lit("3")))
            )
        );
    }

    #[test]
    fn test_sign_folding() {
        assert_eq!(value_of("x = -5"), Expr::Literal("-5".into()));
        assert_eq!(value_of("x = --5"), Expr::Literal("5".into()));
        assert_eq!(
            value_of("x = 3 - -2"),
            Expr::Operation(ArithOp::Sub, lit("3"), lit("-2"))
        );
        assert!(matches!(
            first_error("x = -y"),
            SyntaxErrorKind::UnexpectedToken(t) if t == "y"
        ));
    }

    #[test]
    fn test_errors_display_one_per_line() {
        let errors = parse("x = 1 <\ny = )").unwrap_err();
        assert_eq!(errors.len(), 2);
        let text = errors.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("line 1, col"));
        assert!(lines[1].starts_with("line 2, col"));
    }

    #[test]
    fn test_comparators_only_in_conditions() {
        assert!(matches!(
            first_error("x = 1 < 2"),
            SyntaxErrorKind::UnexpectedToken(t) if t == "<"
        ));
        let program = kinds("If a = 1 and b <> 2 Then\nEndIf");
        assert_eq!(
            program[0],
            StmtKind::If {
                condition: Expr::Comparison(
                    CompareOp::And,
                    Box::new(Expr::Comparison(CompareOp::Eq, Box::new(var("a")), lit("1"))),
                    Box::new(Expr::Comparison(CompareOp::Ne, Box::new(var("b")), lit("2"))),
                ),
                next: 1,
            }
        );
    }

    fn var(name: &str) -> Expr {
        Expr::Variable {
            name: name.into(),
            indices: Vec::new(),
        }
    }

    #[test]
    fn test_array_indexing() {
        let program = kinds("a[1][\"k\"] = b[i + 1]");
        assert_eq!(
            program[0],
            StmtKind::Assign {
                target: Target::Variable {
                    name: "a".into(),
                    indices: vec![Expr::Literal("1".into()), Expr::Literal("k".into())],
                },
                value: Expr::Variable {
                    name: "b".into(),
                    indices: vec![Expr::Operation(ArithOp::Add, Box::new(var("i")), lit("1"))],
                },
            }
        );
    }

    #[test]
    fn test_library_call_canonical_names() {
        let program = kinds("textwindow.writeline(math.abs(-3))");
        assert_eq!(
            program[0],
            StmtKind::LibraryCall {
                object: "TextWindow",
                method: "WriteLine",
                args: vec![Expr::Call {
                    object: "Math",
                    method: "Abs",
                    args: vec![Expr::Literal("-3".into())],
                }],
            }
        );
    }

    #[test]
    fn test_if_chain_links() {
        let source = "If a Then\nx = 1\nElseIf b Then\nx = 2\nElse\nx = 3\nEndIf";
        let program = kinds(source);
        assert!(matches!(program[0], StmtKind::If { next: 2, .. }));
        assert!(matches!(program[2], StmtKind::ElseIf { next: 4, .. }));
        assert!(matches!(program[4], StmtKind::Else { next: 6 }));
        assert_eq!(program[6], StmtKind::EndIf);
    }

    #[test]
    fn test_loop_links() {
        let program = kinds("While i < 3\ni = i + 1\nEndWhile\nFor j = 1 To 3\nEndFor");
        assert!(matches!(program[0], StmtKind::While { end: 2, .. }));
        assert_eq!(program[2], StmtKind::EndWhile { start: 0 });
        assert!(matches!(program[3], StmtKind::For { end: 4, .. }));
        assert_eq!(program[4], StmtKind::EndFor { start: 3 });
    }

    #[test]
    fn test_sub_and_labels_resolve() {
        let source = "Goto later\nfoo()\nSub Foo\nx = 1\nEndSub\nlater:";
        let program = parse(source).unwrap();
        assert!(matches!(program.statements[0].kind, StmtKind::Goto { target: 5, .. }));
        assert!(matches!(program.statements[1].kind, StmtKind::CallSub { target: 3, .. }));
        assert!(matches!(program.statements[2].kind, StmtKind::Sub { end: 4, .. }));
        assert_eq!(program.sub_start("FOO"), Some(3));
        assert_eq!(program.label("Later"), Some(5));
    }

    #[test]
    fn test_blank_lines_keep_line_numbers() {
        let program = parse("\n' comment\n\nx = 1").unwrap();
        assert_eq!(program.len(), 1);
        assert_eq!(program.statements[0].line, 3);
    }

    #[test]
    fn test_undefined_label_fails() {
        assert_eq!(
            first_error("x = 1\nGoto nowhere"),
            SyntaxErrorKind::UndefinedLabel("nowhere".into())
        );
        assert_eq!(first_error("bar()"), SyntaxErrorKind::UndefinedSub("bar".into()));
    }

    #[test]
    fn test_duplicates() {
        assert_eq!(
            first_error("a:\na:"),
            SyntaxErrorKind::DuplicateLabel("a".into())
        );
        assert_eq!(
            first_error("Sub s\nEndSub\nSub S\nEndSub"),
            SyntaxErrorKind::DuplicateSub("S".into())
        );
    }

    #[test]
    fn test_block_mismatch() {
        assert_eq!(first_error("If a Then"), SyntaxErrorKind::Unclosed("If", "EndIf"));
        assert_eq!(first_error("EndWhile"), SyntaxErrorKind::Unopened("EndWhile", "While"));
        assert_eq!(
            first_error("For i = 1 To 2\nEndIf\nEndFor"),
            SyntaxErrorKind::Unopened("EndIf", "If")
        );
        assert_eq!(first_error("Sub a\nSub b\nEndSub\nEndSub"), SyntaxErrorKind::NestedSub);
        assert!(matches!(
            first_error("If a Then\nElse\nElse\nEndIf"),
            SyntaxErrorKind::UnexpectedToken(_)
        ));
    }

    #[test]
    fn test_errors_are_collected() {
        let errs = parse("x = \ny = (1\nGoto z").unwrap_err();
        assert_eq!(errs.len(), 3);
        assert_eq!(errs.0[0].kind, SyntaxErrorKind::ExpectedExpression);
        assert_eq!(errs.0[1].kind, SyntaxErrorKind::ExpectedToken(vec![")"]));
        assert_eq!(errs.0[2].line, 2);
    }

    #[test]
    fn test_registry_validation() {
        assert_eq!(
            first_error("Foo.Bar()"),
            SyntaxErrorKind::UnknownObject("Foo".into())
        );
        assert_eq!(
            first_error("Math.Cube(2)"),
            SyntaxErrorKind::UnknownMember("Math".into(), "Cube".into())
        );
        assert!(matches!(
            first_error("TextWindow.WriteLine(1, 2)"),
            SyntaxErrorKind::ArityMismatch { expected: 1, given: 2, .. }
        ));
        assert_eq!(
            first_error("Math.Pi = 3"),
            SyntaxErrorKind::ReadOnlyField("Math".into(), "Pi".into())
        );
        assert_eq!(
            first_error("x = Math.Abs"),
            SyntaxErrorKind::WrongMemberKind("Math".into(), "Abs".into(), "field")
        );
    }

    #[test]
    fn test_event_binding() {
        let program = kinds("Timer.Tick = OnTick\nSub OnTick\nEndSub");
        assert_eq!(
            program[0],
            StmtKind::BindEvent {
                object: "Timer",
                event: "Tick",
                sub: "OnTick".into(),
                target: 2,
            }
        );
        assert_eq!(
            first_error("Timer.Tick = 5"),
            SyntaxErrorKind::EventNeedsSub("Timer".into(), "Tick".into())
        );
        assert_eq!(
            first_error("x = s\nSub s\nEndSub"),
            SyntaxErrorKind::SubAssignedToVariable("s".into())
        );
    }

    #[test]
    fn test_label_must_end_line() {
        assert!(matches!(
            first_error("here: x = 1"),
            SyntaxErrorKind::UnexpectedToken(t) if t == "x"
        ));
    }

    #[test]
    fn test_step_unsupported() {
        assert!(matches!(
            first_error("For i = 1 To 10 Step 2\nEndFor"),
            SyntaxErrorKind::UnexpectedToken(t) if t == "Step"
        ));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let source = "While a < 2\nIf a = 1 Then\nGoto l\nEndIf\na = a + 1\nEndWhile\nl:";
        assert_eq!(parse(source).unwrap(), parse(source).unwrap());
    }

    #[test]
    fn test_no_unresolved_targets() {
        let source = "Sub s\nEndSub\nIf 1 Then\ns()\nElse\nEndIf\nFor i = 1 To 2\nEndFor";
        for stmt in parse(source).unwrap().statements {
            let targets: Vec<usize> = match stmt.kind {
                StmtKind::If { next, .. } | StmtKind::ElseIf { next, .. } | StmtKind::Else { next } => {
                    vec![next]
                }
                StmtKind::For { end, .. } | StmtKind::While { end, .. } | StmtKind::Sub { end, .. } => {
                    vec![end]
                }
                StmtKind::CallSub { target, .. } | StmtKind::Goto { target, .. } => vec![target],
                StmtKind::EndFor { start } | StmtKind::EndWhile { start } => vec![start],
                _ => vec![],
            };
            assert!(targets.iter().all(|&t| t != UNRESOLVED));
        }
    }
}
