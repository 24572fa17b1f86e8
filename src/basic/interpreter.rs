//! Small Basic interpreter with generator-based logical threads
//!
//! Each logical thread is a generator that runs one statement per resume.
//! A library call that cannot finish yet yields `YieldReason::Blocked` from
//! the middle of its statement; the scheduler resumes the generator once the
//! block is resolved and the statement carries on from where it stopped.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use async_recursion::async_recursion;
use genawaiter::rc::{Co, Gen};
use genawaiter::GeneratorState;
use tracing::{debug, trace};

use crate::basic::array;
use crate::basic::builtins::{Block, Library, Outcome};
use crate::basic::console::Console;
use crate::basic::environment::Environment;
use crate::basic::error::{Error, Result, RuntimeError};
use crate::basic::parser::{self, ArithOp, CompareOp, Expr, Program, StmtKind, Target};
use crate::basic::scheduler::Scheduler;
use crate::basic::value::{bool_value, format_number, is_true, parse_number, to_number};

/// Reason for a thread generator to yield
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum YieldReason {
    /// One statement finished
    Stepped,
    /// A library call is waiting for input or a pause to end
    Blocked(Block),
}

/// What the scheduler learns from resuming a thread once
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Ran,
    Blocked(Block),
    Finished,
}

/// State shared by every thread of one program run
#[derive(Clone)]
pub struct Runtime {
    pub program: Rc<Program>,
    pub env: Rc<RefCell<Environment>>,
    pub library: Rc<RefCell<Library>>,
}

impl Runtime {
    pub fn new(program: Program, library: Library) -> Self {
        Self {
            program: Rc::new(program),
            env: Rc::new(RefCell::new(Environment::new())),
            library: Rc::new(RefCell::new(library)),
        }
    }
}

/// Per-thread execution state
#[derive(Debug)]
struct ThreadState {
    ip: usize,
    /// Seeded with one past the last statement, so returning from the
    /// outermost subroutine ends the thread
    return_stack: Vec<usize>,
    error: Option<RuntimeError>,
}

/// Trait for resumable generators
trait Resumable {
    fn resume_gen(&mut self) -> Option<YieldReason>;
}

/// Wrapper to make Gen implement our Resumable trait
struct GenWrapper<F: std::future::Future<Output = ()>> {
    gen: Gen<YieldReason, (), F>,
}

impl<F: std::future::Future<Output = ()>> Resumable for GenWrapper<F> {
    fn resume_gen(&mut self) -> Option<YieldReason> {
        match self.gen.resume() {
            GeneratorState::Yielded(y) => Some(y),
            GeneratorState::Complete(()) => None,
        }
    }
}

type BoxedGenerator = Box<dyn Resumable>;

/// One logical thread: an instruction pointer, a return stack and the
/// generator that advances them
pub struct LogicalThread {
    id: usize,
    state: Rc<RefCell<ThreadState>>,
    generator: BoxedGenerator,
    blocked: Option<Block>,
    finished: bool,
}

impl LogicalThread {
    /// Thread starting at statement `start`
    pub fn new(id: usize, runtime: &Runtime, start: usize) -> Self {
        let state = Rc::new(RefCell::new(ThreadState {
            ip: start,
            return_stack: vec![runtime.program.len()],
            error: None,
        }));
        let gen = create_thread_generator(id, runtime.clone(), state.clone());
        Self {
            id,
            state,
            generator: Box::new(GenWrapper { gen }),
            blocked: None,
            finished: false,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Index of the statement this thread runs next, or is blocked in
    pub fn ip(&self) -> usize {
        self.state.borrow().ip
    }

    pub fn blocked(&self) -> Option<Block> {
        self.blocked
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Run until the current statement completes, blocks, or the thread ends.
    /// A blocked thread must be unblocked first.
    pub fn step(&mut self) -> Result<Step> {
        if self.finished {
            return Ok(Step::Finished);
        }
        if let Some(block) = self.blocked {
            return Ok(Step::Blocked(block));
        }

        match self.generator.resume_gen() {
            Some(YieldReason::Stepped) => Ok(Step::Ran),
            Some(YieldReason::Blocked(block)) => {
                self.blocked = Some(block);
                Ok(Step::Blocked(block))
            }
            None => {
                self.finished = true;
                match self.state.borrow_mut().error.take() {
                    Some(e) => Err(e),
                    None => Ok(Step::Finished),
                }
            }
        }
    }

    /// The block has been resolved; the next step retries the call
    pub fn unblock(&mut self) {
        self.blocked = None;
    }
}

/// Create the generator driving one thread
fn create_thread_generator(
    id: usize,
    runtime: Runtime,
    state: Rc<RefCell<ThreadState>>,
) -> Gen<YieldReason, (), impl std::future::Future<Output = ()>> {
    Gen::new(move |co: Co<YieldReason>| async move {
        if let Err(e) = execute_thread(&co, id, &runtime, &state).await {
            debug!(thread = id, "thread failed: {}", e);
            state.borrow_mut().error = Some(e);
        }
    })
}

/// Result of executing a statement
enum StmtResult {
    Continue,
    Jump(usize),
    End,
}

/// Thread execution loop
async fn execute_thread(
    co: &Co<YieldReason>,
    id: usize,
    rt: &Runtime,
    state: &Rc<RefCell<ThreadState>>,
) -> Result<()> {
    loop {
        let ip = state.borrow().ip;
        let Some(stmt) = rt.program.get(ip) else {
            return Ok(());
        };
        trace!(thread = id, ip, line = stmt.line + 1, "exec");

        let next = match execute_stmt(co, rt, state, ip, &stmt.kind).await? {
            StmtResult::Continue => ip + 1,
            StmtResult::Jump(target) => target,
            StmtResult::End => return Ok(()),
        };
        state.borrow_mut().ip = next;
        if next >= rt.program.len() {
            return Ok(());
        }

        co.yield_(YieldReason::Stepped).await;
    }
}

fn broken_link(ip: usize, what: &str) -> RuntimeError {
    RuntimeError::Internal(format!("statement {} has a broken {} link", ip, what))
}

/// Execute a single statement
async fn execute_stmt(
    co: &Co<YieldReason>,
    rt: &Runtime,
    state: &Rc<RefCell<ThreadState>>,
    ip: usize,
    kind: &StmtKind,
) -> Result<StmtResult> {
    match kind {
        StmtKind::Label(_) | StmtKind::EndIf => Ok(StmtResult::Continue),

        StmtKind::Assign { target, value } => {
            let value = eval(co, rt, value).await?;
            match target {
                Target::Variable { name, indices } if indices.is_empty() => {
                    rt.env.borrow_mut().set(name, value);
                }
                Target::Variable { name, indices } => {
                    let keys = eval_all(co, rt, indices).await?;
                    let mut env = rt.env.borrow_mut();
                    let updated = array::set(env.get(name), &keys, &value);
                    env.set(name, updated);
                }
                Target::Field { object, field } => {
                    rt.library.borrow_mut().set_field(object, field, &value)?;
                }
            }
            Ok(StmtResult::Continue)
        }

        StmtKind::BindEvent {
            object,
            event,
            target,
            ..
        } => {
            rt.library.borrow_mut().bind_event(object, event, *target)?;
            Ok(StmtResult::Continue)
        }

        StmtKind::LibraryCall {
            object,
            method,
            args,
        } => {
            let args = eval_all(co, rt, args).await?;
            call_library(co, rt, object, method, args).await?;
            Ok(StmtResult::Continue)
        }

        StmtKind::Goto { target, .. } => Ok(StmtResult::Jump(*target)),

        StmtKind::CallSub { target, .. } => {
            state.borrow_mut().return_stack.push(ip + 1);
            Ok(StmtResult::Jump(*target))
        }

        StmtKind::EndSub => match state.borrow_mut().return_stack.pop() {
            Some(target) => Ok(StmtResult::Jump(target)),
            None => Ok(StmtResult::End),
        },

        // Reached by falling through, not by CallSub
        StmtKind::Sub { end, .. } => Ok(StmtResult::Jump(end + 1)),

        StmtKind::If { condition, next } => {
            if is_true(&eval(co, rt, condition).await?) {
                Ok(StmtResult::Continue)
            } else {
                Ok(StmtResult::Jump(select_branch(co, rt, *next).await?))
            }
        }

        // A previous branch ran; skip the rest of the chain
        StmtKind::ElseIf { next, .. } | StmtKind::Else { next } => {
            Ok(StmtResult::Jump(end_of_if(&rt.program, *next)?))
        }

        StmtKind::While { condition, end } => {
            if is_true(&eval(co, rt, condition).await?) {
                Ok(StmtResult::Continue)
            } else {
                Ok(StmtResult::Jump(end + 1))
            }
        }

        StmtKind::EndWhile { start } => Ok(StmtResult::Jump(*start)),

        StmtKind::For {
            var,
            lower,
            upper,
            end,
        } => {
            let lower = eval(co, rt, lower).await?;
            rt.env.borrow_mut().set(var, lower.clone());
            let upper = eval(co, rt, upper).await?;
            if to_number(&lower) > to_number(&upper) {
                Ok(StmtResult::Jump(end + 1))
            } else {
                Ok(StmtResult::Continue)
            }
        }

        StmtKind::EndFor { start } => {
            let Some(StmtKind::For { var, upper, .. }) = rt.program.get(*start).map(|s| &s.kind)
            else {
                return Err(broken_link(ip, "EndFor"));
            };
            let counter = {
                let mut env = rt.env.borrow_mut();
                let counter = apply_operation(ArithOp::Add, env.get(var), "1");
                env.set(var, counter.clone());
                counter
            };
            // The bound is evaluated again on every pass
            let upper = eval(co, rt, upper).await?;
            if to_number(&counter) <= to_number(&upper) {
                Ok(StmtResult::Jump(start + 1))
            } else {
                Ok(StmtResult::Continue)
            }
        }
    }
}

/// Walk an If chain from `at` after a false condition.
/// Returns the first statement of the branch to run, or the one after EndIf.
async fn select_branch(co: &Co<YieldReason>, rt: &Runtime, mut at: usize) -> Result<usize> {
    loop {
        match rt.program.get(at).map(|s| &s.kind) {
            Some(StmtKind::ElseIf { condition, next }) => {
                if is_true(&eval(co, rt, condition).await?) {
                    return Ok(at + 1);
                }
                at = *next;
            }
            Some(StmtKind::Else { .. }) | Some(StmtKind::EndIf) => return Ok(at + 1),
            _ => return Err(broken_link(at, "If")),
        }
    }
}

/// Statement after the EndIf closing the chain that continues at `at`
fn end_of_if(program: &Program, mut at: usize) -> Result<usize> {
    loop {
        match program.get(at).map(|s| &s.kind) {
            Some(StmtKind::ElseIf { next, .. }) | Some(StmtKind::Else { next }) => at = *next,
            Some(StmtKind::EndIf) => return Ok(at + 1),
            _ => return Err(broken_link(at, "If")),
        }
    }
}

/// Call a library method, yielding while it is blocked.
/// No borrow of the library is held across a yield.
async fn call_library(
    co: &Co<YieldReason>,
    rt: &Runtime,
    object: &str,
    method: &str,
    args: Vec<String>,
) -> Result<String> {
    let mut resumed = false;
    loop {
        let outcome = rt
            .library
            .borrow_mut()
            .call(object, method, &args, resumed)?;
        match outcome {
            Outcome::Ready(value) => return Ok(value),
            Outcome::Blocked(block) => {
                debug!(?block, "{}.{} blocked", object, method);
                co.yield_(YieldReason::Blocked(block)).await;
                resumed = true;
            }
        }
    }
}

/// Evaluate expressions left to right
async fn eval_all(co: &Co<YieldReason>, rt: &Runtime, exprs: &[Expr]) -> Result<Vec<String>> {
    let mut values = Vec::with_capacity(exprs.len());
    for expr in exprs {
        values.push(eval(co, rt, expr).await?);
    }
    Ok(values)
}

/// Evaluate an expression
#[async_recursion(?Send)]
async fn eval(co: &Co<YieldReason>, rt: &Runtime, expr: &Expr) -> Result<String> {
    match expr {
        Expr::Literal(text) => Ok(text.clone()),

        Expr::Variable { name, indices } => {
            if indices.is_empty() {
                return Ok(rt.env.borrow().get(name).to_string());
            }
            let keys = eval_all(co, rt, indices).await?;
            Ok(array::get(rt.env.borrow().get(name), &keys))
        }

        Expr::Field { object, field } => rt.library.borrow_mut().get_field(object, field),

        Expr::Operation(op, left, right) => {
            let left = eval(co, rt, left).await?;
            let right = eval(co, rt, right).await?;
            Ok(apply_operation(*op, &left, &right))
        }

        Expr::Comparison(op, left, right) => {
            let left = eval(co, rt, left).await?;
            let right = eval(co, rt, right).await?;
            Ok(compare(*op, &left, &right))
        }

        Expr::Call {
            object,
            method,
            args,
        } => {
            let args = eval_all(co, rt, args).await?;
            call_library(co, rt, object, method, args).await
        }
    }
}

/// Apply an arithmetic operator.
/// `+` adds when both sides are numeric and concatenates otherwise;
/// the rest read non-numeric text as 0. Division by zero gives 0.
pub fn apply_operation(op: ArithOp, left: &str, right: &str) -> String {
    match op {
        ArithOp::Add => match (parse_number(left), parse_number(right)) {
            (Some(a), Some(b)) => format_number(a + b),
            _ => format!("{}{}", left, right),
        },
        ArithOp::Sub => format_number(to_number(left) - to_number(right)),
        ArithOp::Mul => format_number(to_number(left) * to_number(right)),
        ArithOp::Div => {
            let divisor = to_number(right);
            if divisor == 0.0 {
                "0".to_string()
            } else {
                format_number(to_number(left) / divisor)
            }
        }
    }
}

/// Apply a comparison or logical operator.
/// `=` and `<>` compare text exactly, ordering compares numbers.
pub fn compare(op: CompareOp, left: &str, right: &str) -> String {
    let result = match op {
        CompareOp::Eq => left == right,
        CompareOp::Ne => left != right,
        CompareOp::Lt => to_number(left) < to_number(right),
        CompareOp::Le => to_number(left) <= to_number(right),
        CompareOp::Gt => to_number(left) > to_number(right),
        CompareOp::Ge => to_number(left) >= to_number(right),
        CompareOp::And => is_true(left) && is_true(right),
        CompareOp::Or => is_true(left) || is_true(right),
    };
    bool_value(result)
}

/// Runs whole programs against a console
#[derive(Clone, Debug)]
pub struct Interpreter {
    args: Vec<String>,
    directory: Option<String>,
    idle: Duration,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            args: Vec::new(),
            directory: None,
            idle: Duration::from_millis(1),
        }
    }

    /// Values exposed through Program.GetArgument
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Value of Program.Directory
    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Sleep between scheduler passes that make no progress
    pub fn with_idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    fn library(&self, console: Box<dyn Console>) -> Library {
        let library = Library::new(console, self.args.clone());
        match &self.directory {
            Some(dir) => library.with_directory(dir.clone()),
            None => library,
        }
    }

    /// Run a parsed program until every thread has ended and no event
    /// can fire any more, or until Program.End
    pub fn run(&self, program: Program, console: Box<dyn Console>) -> Result<()> {
        let runtime = Runtime::new(program, self.library(console));
        let mut scheduler = Scheduler::new(runtime);
        scheduler.run_to_completion(Instant::now, self.idle)
    }

    /// Parse and run source text
    pub fn run_source(&self, source: &str, console: Box<dyn Console>) -> std::result::Result<(), Error> {
        let program = parser::parse(source)?;
        self.run(program, console)?;
        Ok(())
    }
}
