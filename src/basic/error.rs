//! Syntax and runtime errors

/// What went wrong while parsing a line
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum SyntaxErrorKind {
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("expected {}", .0.join(" or "))]
    ExpectedToken(Vec<&'static str>),

    #[error("expected an expression here")]
    ExpectedExpression,

    #[error("unrecognized statement")]
    UnrecognizedStatement,

    #[error("'{0}' is missing its closing {1}")]
    Unclosed(&'static str, &'static str),

    #[error("'{0}' has no matching {1}")]
    Unopened(&'static str, &'static str),

    #[error("a subroutine cannot be defined inside another subroutine")]
    NestedSub,

    #[error("another label named '{0}' already exists")]
    DuplicateLabel(String),

    #[error("another subroutine named '{0}' already exists")]
    DuplicateSub(String),

    #[error("cannot find label '{0}' used in Goto")]
    UndefinedLabel(String),

    #[error("subroutine '{0}' is not defined")]
    UndefinedSub(String),

    #[error("unknown object '{0}'")]
    UnknownObject(String),

    #[error("'{0}' has no member named '{1}'")]
    UnknownMember(String, String),

    #[error("'{0}.{1}' is not a {2}")]
    WrongMemberKind(String, String, &'static str),

    #[error("'{object}.{member}' takes {expected} argument(s) but {given} were supplied")]
    ArityMismatch {
        object: String,
        member: String,
        expected: usize,
        given: usize,
    },

    #[error("the property '{1}' of '{0}' is read-only")]
    ReadOnlyField(String, String),

    #[error("event '{0}.{1}' can only be assigned a subroutine name")]
    EventNeedsSub(String, String),

    #[error("subroutine '{0}' can only be assigned to an event")]
    SubAssignedToVariable(String),
}

/// A syntax error located at a 0-based line and column
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("line {}, col {}: {kind}", .line + 1, .column + 1)]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub kind: SyntaxErrorKind,
}

impl SyntaxError {
    pub fn new(line: usize, column: usize, kind: SyntaxErrorKind) -> Self {
        Self { line, column, kind }
    }
}

/// Every syntax error found in one parse attempt, shown one per line
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{}", join_lines(.0))]
pub struct SyntaxErrors(pub Vec<SyntaxError>);

fn join_lines(errors: &[SyntaxError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl SyntaxErrors {
    pub fn iter(&self) -> std::slice::Iter<'_, SyntaxError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render each error under the offending source line with a caret.
    pub fn annotate(&self, source: &str) -> String {
        let lines: Vec<&str> = source.lines().collect();
        let mut out = String::new();
        for err in &self.0 {
            if let Some(text) = lines.get(err.line) {
                out.push_str(text);
                out.push('\n');
                out.push_str(&" ".repeat(err.column));
                out.push_str("^\n");
            }
            out.push_str(&format!("\t{}\n", err));
        }
        out
    }
}

/// Errors that abort a running program
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("unknown object '{0}'")]
    UnknownObject(String),

    #[error("'{0}' has no member named '{1}'")]
    UnknownMember(String, String),

    #[error("'{0}.{1}' is not a {2}")]
    WrongMemberKind(String, String, &'static str),

    #[error("'{object}.{member}' takes {expected} argument(s) but {given} were supplied")]
    ArityMismatch {
        object: String,
        member: String,
        expected: usize,
        given: usize,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Anything that stops a program from running to completion
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("syntax errors:\n{0}")]
    Syntax(#[from] SyntaxErrors),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}
