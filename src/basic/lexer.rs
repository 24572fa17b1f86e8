//! Small Basic lexer/tokenizer
//!
//! Each physical line is tokenized on its own. Rules are tried in a fixed
//! order at the current position and the first match wins, so keywords shadow
//! identifiers and literals are recognized before operators. When nothing
//! matches, the rest of the line becomes a single `Unexpected` token.

use once_cell::sync::Lazy;
use regex::Regex;

/// Token kinds
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Keyword(Keyword),
    /// A variable, label, subroutine, object or member name
    Symbol(String),
    /// Numeric literal, kept as written (sign is folded by the parser)
    Number(String),
    /// String literal without its quotes
    Str(String),

    // Punctuation
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Dot,
    Comma,
    Colon,
    /// `=` is assignment or comparison depending on context
    Equal,

    // Comparators
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,

    // Arithmetic operators
    Plus,
    Minus,
    Star,
    Slash,

    Comment(String),
    Unexpected(String),
}

impl TokenKind {
    pub fn is_comparator(&self) -> bool {
        matches!(
            self,
            TokenKind::Equal
                | TokenKind::NotEqual
                | TokenKind::Less
                | TokenKind::LessEqual
                | TokenKind::Greater
                | TokenKind::GreaterEqual
                | TokenKind::And
                | TokenKind::Or
        )
    }

    pub fn is_operator(&self) -> bool {
        matches!(
            self,
            TokenKind::Plus | TokenKind::Minus | TokenKind::Star | TokenKind::Slash
        )
    }

    /// Human readable class name, used in "expected ..." diagnostics
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Keyword(kw) => kw.as_str(),
            TokenKind::Symbol(_) => "a variable or an object",
            TokenKind::Number(_) | TokenKind::Str(_) => "a number or a string",
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::Dot => ".",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Equal => "=",
            TokenKind::NotEqual
            | TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::And
            | TokenKind::Or => "a comparator",
            TokenKind::Plus | TokenKind::Minus | TokenKind::Star | TokenKind::Slash => {
                "an operator"
            }
            TokenKind::Comment(_) => "a comment",
            TokenKind::Unexpected(_) => "unexpected token",
        }
    }
}

/// Small Basic keywords
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
    If,
    ElseIf,
    Else,
    EndIf,
    Then,
    While,
    EndWhile,
    For,
    EndFor,
    To,
    Step,
    Sub,
    EndSub,
    Goto,
}

impl Keyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::If => "If",
            Keyword::ElseIf => "ElseIf",
            Keyword::Else => "Else",
            Keyword::EndIf => "EndIf",
            Keyword::Then => "Then",
            Keyword::While => "While",
            Keyword::EndWhile => "EndWhile",
            Keyword::For => "For",
            Keyword::EndFor => "EndFor",
            Keyword::To => "To",
            Keyword::Step => "Step",
            Keyword::Sub => "Sub",
            Keyword::EndSub => "EndSub",
            Keyword::Goto => "Goto",
        }
    }

    fn lookup(name: &str) -> Option<Keyword> {
        match name.to_ascii_lowercase().as_str() {
            "if" => Some(Keyword::If),
            "elseif" => Some(Keyword::ElseIf),
            "else" => Some(Keyword::Else),
            "endif" => Some(Keyword::EndIf),
            "then" => Some(Keyword::Then),
            "while" => Some(Keyword::While),
            "endwhile" => Some(Keyword::EndWhile),
            "for" => Some(Keyword::For),
            "endfor" => Some(Keyword::EndFor),
            "to" => Some(Keyword::To),
            "step" => Some(Keyword::Step),
            "sub" => Some(Keyword::Sub),
            "endsub" => Some(Keyword::EndSub),
            "goto" => Some(Keyword::Goto),
            _ => None,
        }
    }
}

/// A token with position info
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text as matched
    pub text: String,
    /// 0-based line number
    pub line: usize,
    /// 0-based character column
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: &str, line: usize, column: usize) -> Self {
        Self {
            kind,
            text: text.to_string(),
            line,
            column,
        }
    }

    /// Column just past the end of this token
    pub fn end_column(&self) -> usize {
        self.column + self.text.chars().count()
    }
}

#[derive(Clone, Copy)]
enum Rule {
    Keyword,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Logical,
    Symbol,
    Number,
    Str,
    Dot,
    Comma,
    Colon,
    Comparator,
    Equal,
    Operator,
    Comment,
}

static RULES: Lazy<Vec<(Rule, Regex)>> = Lazy::new(|| {
    let rules: [(Rule, &str); 16] = [
        (
            Rule::Keyword,
            r"(?i)^(?:ElseIf|Else|EndIf|If|Then|EndWhile|While|EndFor|For|To|Step|EndSub|Sub|Goto)\b",
        ),
        (Rule::LeftParen, r"^\("),
        (Rule::RightParen, r"^\)"),
        (Rule::LeftBracket, r"^\["),
        (Rule::RightBracket, r"^\]"),
        (Rule::Logical, r"(?i)^(?:and|or)\b"),
        (Rule::Symbol, r"^[A-Za-z_]\w*"),
        (Rule::Number, r"^(?:\d+\.?\d*|\.\d+)"),
        (Rule::Str, r#"^"[^"]*(?:"|$)"#),
        (Rule::Dot, r"^\."),
        (Rule::Comma, r"^,"),
        (Rule::Colon, r"^:"),
        (Rule::Comparator, r"^(?:<=|>=|<>|<|>)"),
        (Rule::Equal, r"^="),
        (Rule::Operator, r"^[-+*/]"),
        (Rule::Comment, r"^'.*"),
    ];
    rules
        .iter()
        .map(|(rule, pattern)| (*rule, Regex::new(pattern).expect("lexer rule must compile")))
        .collect()
});

/// The lexer for a single line
pub struct Lexer<'a> {
    line: &'a str,
    line_number: usize,
    include_comments: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(line: &'a str, line_number: usize) -> Self {
        Self {
            line,
            line_number,
            include_comments: false,
        }
    }

    /// Keep comment tokens in the output instead of dropping them
    pub fn with_comments(mut self) -> Self {
        self.include_comments = true;
        self
    }

    /// Tokenize the whole line
    pub fn tokenize(&self) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut offset = self.line.len() - self.line.trim_start().len();

        while offset < self.line.len() {
            let rest = &self.line[offset..];
            let column = self.line[..offset].chars().count();

            let matched = RULES
                .iter()
                .find_map(|(rule, re)| re.find(rest).map(|m| (*rule, m.as_str())));

            let Some((rule, text)) = matched else {
                let text = rest.trim_end();
                tokens.push(Token::new(
                    TokenKind::Unexpected(text.to_string()),
                    text,
                    self.line_number,
                    column,
                ));
                break;
            };

            let kind = Self::classify(rule, text);
            if !matches!(kind, TokenKind::Comment(_)) || self.include_comments {
                tokens.push(Token::new(kind, text, self.line_number, column));
            }

            offset += text.len();
            let skipped = self.line[offset..].len() - self.line[offset..].trim_start().len();
            offset += skipped;
        }

        tokens
    }

    fn classify(rule: Rule, text: &str) -> TokenKind {
        match rule {
            Rule::Keyword => match Keyword::lookup(text) {
                Some(kw) => TokenKind::Keyword(kw),
                None => TokenKind::Symbol(text.to_string()),
            },
            Rule::LeftParen => TokenKind::LeftParen,
            Rule::RightParen => TokenKind::RightParen,
            Rule::LeftBracket => TokenKind::LeftBracket,
            Rule::RightBracket => TokenKind::RightBracket,
            Rule::Logical => {
                if text.eq_ignore_ascii_case("and") {
                    TokenKind::And
                } else {
                    TokenKind::Or
                }
            }
            Rule::Symbol => TokenKind::Symbol(text.to_string()),
            Rule::Number => TokenKind::Number(text.to_string()),
            Rule::Str => {
                let inner = text.strip_prefix('"').unwrap_or(text);
                let inner = inner.strip_suffix('"').unwrap_or(inner);
                TokenKind::Str(inner.to_string())
            }
            Rule::Dot => TokenKind::Dot,
            Rule::Comma => TokenKind::Comma,
            Rule::Colon => TokenKind::Colon,
            Rule::Comparator => match text {
                "<=" => TokenKind::LessEqual,
                ">=" => TokenKind::GreaterEqual,
                "<>" => TokenKind::NotEqual,
                "<" => TokenKind::Less,
                _ => TokenKind::Greater,
            },
            Rule::Equal => TokenKind::Equal,
            Rule::Operator => match text {
                "+" => TokenKind::Plus,
                "-" => TokenKind::Minus,
                "*" => TokenKind::Star,
                _ => TokenKind::Slash,
            },
            Rule::Comment => TokenKind::Comment(text[1..].to_string()),
        }
    }
}

/// Tokenize one line, dropping comments
pub fn tokenize(line: &str, line_number: usize) -> Vec<Token> {
    Lexer::new(line, line_number).tokenize()
}
