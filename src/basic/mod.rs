//! Small Basic language interpreter

pub mod array;
pub mod builtins;
pub mod console;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod registry;
pub mod scheduler;
pub mod timer;
pub mod value;

pub use console::{BufferConsole, Console, StdConsole};
pub use error::{Error, RuntimeError, SyntaxError, SyntaxErrors};
pub use interpreter::Interpreter;
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::{Expr, Parser, Program, Stmt};
pub use scheduler::{Scheduler, TickReport};
