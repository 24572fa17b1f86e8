//! Built-in library objects
//!
//! Every call takes and returns strings. Calls that have to wait for the host
//! return `Outcome::Blocked`; the engine parks the calling thread and retries
//! the same call with `resumed` set once the block has been resolved.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::time::{Duration, Instant};

use chrono::{Datelike, Local, Timelike, Utc};
use rand::Rng;
use tracing::debug;

use crate::basic::array;
use crate::basic::console::Console;
use crate::basic::error::{Result, RuntimeError};
use crate::basic::registry::{MemberKind, REGISTRY};
use crate::basic::timer::Timer;
use crate::basic::value::{bool_value, format_number, parse_number, to_number};

/// Milliseconds between 1900-01-01 and the Unix epoch
const EPOCH_1900_OFFSET_MS: i64 = 2_208_988_800_000;

const PAUSE_MESSAGE: &str = "Press any key to continue...\n";

/// What ends a pause
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resume {
    /// The console reports a key press
    Signal,
    /// The scheduler clock reaches this instant
    At(Instant),
}

/// Why a call cannot finish yet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Block {
    Input,
    Pause(Resume),
}

/// Result of a library call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ready(String),
    Blocked(Block),
}

impl Outcome {
    fn done() -> Self {
        Outcome::Ready(String::new())
    }
}

#[derive(Debug)]
struct TextWindowState {
    visible: bool,
    foreground: String,
    background: String,
    title: String,
    cursor_left: String,
    cursor_top: String,
}

impl Default for TextWindowState {
    fn default() -> Self {
        Self {
            visible: false,
            foreground: "Gray".to_string(),
            background: "Black".to_string(),
            title: String::new(),
            cursor_left: "0".to_string(),
            cursor_top: "0".to_string(),
        }
    }
}

/// State of every library object for one program run
pub struct Library {
    console: Box<dyn Console>,
    window: TextWindowState,
    timer: Timer,
    stacks: HashMap<String, Vec<String>>,
    /// Arrays used by Array.SetValue/GetValue/RemoveValue, stored encoded
    arrays: HashMap<String, String>,
    args: Vec<String>,
    directory: String,
    now: Instant,
    end_requested: bool,
}

impl Library {
    pub fn new(console: Box<dyn Console>, args: Vec<String>) -> Self {
        Self {
            console,
            window: TextWindowState::default(),
            timer: Timer::new(),
            stacks: HashMap::new(),
            arrays: HashMap::new(),
            args,
            directory: std::env::temp_dir().display().to_string(),
            now: Instant::now(),
            end_requested: false,
        }
    }

    /// Directory reported by Program.Directory
    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Scheduler clock for the current tick
    pub fn set_now(&mut self, now: Instant) {
        self.now = now;
    }

    /// Program.End() was called
    pub fn end_requested(&self) -> bool {
        self.end_requested
    }

    /// Whether the host has resolved a block
    pub fn is_resolved(&mut self, block: &Block, now: Instant) -> bool {
        match block {
            Block::Input => self.console.line_available(),
            Block::Pause(Resume::Signal) => self.console.resume_signaled(),
            Block::Pause(Resume::At(at)) => now >= *at,
        }
    }

    /// Subroutine entry points whose events are due at `now`
    pub fn due_events(&mut self, now: Instant) -> Vec<usize> {
        self.timer.poll(now).into_iter().collect()
    }

    /// Whether some event source can still start a thread
    pub fn has_live_events(&self) -> bool {
        self.timer.is_live()
    }

    pub fn next_event_due(&self) -> Option<Instant> {
        if self.timer.is_live() {
            self.timer.next_due()
        } else {
            None
        }
    }

    fn lookup(object: &str, member: &str) -> Result<(&'static str, &'static str, MemberKind)> {
        let registry = &*REGISTRY;
        let obj = registry
            .object(object)
            .ok_or_else(|| RuntimeError::UnknownObject(object.to_string()))?;
        let info = obj
            .member(member)
            .ok_or_else(|| RuntimeError::UnknownMember(obj.name.to_string(), member.to_string()))?;
        Ok((obj.name, info.name, info.kind))
    }

    fn missing(object: &str, member: &str) -> RuntimeError {
        RuntimeError::Internal(format!("{}.{} has no implementation", object, member))
    }

    /// Call a library method
    pub fn call(
        &mut self,
        object: &str,
        method: &str,
        args: &[String],
        resumed: bool,
    ) -> Result<Outcome> {
        let (object, method, kind) = Self::lookup(object, method)?;
        match kind {
            MemberKind::Method { arity } if arity == args.len() => {}
            MemberKind::Method { arity } => {
                return Err(RuntimeError::ArityMismatch {
                    object: object.to_string(),
                    member: method.to_string(),
                    expected: arity,
                    given: args.len(),
                })
            }
            _ => {
                return Err(RuntimeError::WrongMemberKind(
                    object.to_string(),
                    method.to_string(),
                    "method",
                ))
            }
        }

        match object {
            "TextWindow" => self.text_window(method, args, resumed),
            "Program" => self.program(method, args, resumed),
            "Math" => self.math(method, args).map(Outcome::Ready),
            "Text" => text(method, args).map(Outcome::Ready),
            "Array" => self.array(method, args).map(Outcome::Ready),
            "Stack" => self.stack(method, args).map(Outcome::Ready),
            "Timer" => match method {
                "Pause" => {
                    self.timer.pause();
                    Ok(Outcome::done())
                }
                "Resume" => {
                    self.timer.resume(self.now);
                    Ok(Outcome::done())
                }
                _ => Err(Self::missing(object, method)),
            },
            _ => Err(Self::missing(object, method)),
        }
    }

    /// Read a library field
    pub fn get_field(&mut self, object: &str, field: &str) -> Result<String> {
        let (object, field, kind) = Self::lookup(object, field)?;
        if !matches!(kind, MemberKind::Field { .. }) {
            return Err(RuntimeError::WrongMemberKind(
                object.to_string(),
                field.to_string(),
                "field",
            ));
        }

        let w = &self.window;
        let value = match (object, field) {
            ("TextWindow", "ForegroundColor") => w.foreground.clone(),
            ("TextWindow", "BackgroundColor") => w.background.clone(),
            ("TextWindow", "Title") => w.title.clone(),
            ("TextWindow", "CursorLeft") => w.cursor_left.clone(),
            ("TextWindow", "CursorTop") => w.cursor_top.clone(),
            ("Math", "Pi") => format_number(PI),
            ("Program", "ArgumentCount") => self.args.len().to_string(),
            ("Program", "Directory") => self.directory.clone(),
            ("Timer", "Interval") => self.timer.interval(),
            ("Clock", _) => clock(field).ok_or_else(|| Self::missing(object, field))?,
            _ => return Err(Self::missing(object, field)),
        };
        Ok(value)
    }

    /// Write a library field
    pub fn set_field(&mut self, object: &str, field: &str, value: &str) -> Result<()> {
        let (object, field, kind) = Self::lookup(object, field)?;
        if kind != (MemberKind::Field { read_only: false }) {
            return Err(RuntimeError::WrongMemberKind(
                object.to_string(),
                field.to_string(),
                "writable field",
            ));
        }

        let w = &mut self.window;
        match (object, field) {
            ("TextWindow", "ForegroundColor") => w.foreground = value.to_string(),
            ("TextWindow", "BackgroundColor") => w.background = value.to_string(),
            ("TextWindow", "Title") => w.title = value.to_string(),
            ("TextWindow", "CursorLeft") => w.cursor_left = value.to_string(),
            ("TextWindow", "CursorTop") => w.cursor_top = value.to_string(),
            ("Timer", "Interval") => self.timer.set_interval(value, self.now),
            _ => return Err(Self::missing(object, field)),
        }
        Ok(())
    }

    /// Bind an event to the subroutine body starting at `target`
    pub fn bind_event(&mut self, object: &str, event: &str, target: usize) -> Result<()> {
        let (object, event, kind) = Self::lookup(object, event)?;
        if kind != MemberKind::Event {
            return Err(RuntimeError::WrongMemberKind(
                object.to_string(),
                event.to_string(),
                "event",
            ));
        }
        match (object, event) {
            ("Timer", "Tick") => {
                debug!(handler = target, "Timer.Tick bound");
                self.timer.bind_tick(target);
                Ok(())
            }
            _ => Err(Self::missing(object, event)),
        }
    }

    fn pause(&mut self, message: bool, resumed: bool) -> Outcome {
        if resumed {
            self.console.acknowledge_resume();
            return Outcome::done();
        }
        self.window.visible = true;
        if message {
            self.console.write(PAUSE_MESSAGE);
        }
        Outcome::Blocked(Block::Pause(Resume::Signal))
    }

    fn text_window(&mut self, method: &str, args: &[String], resumed: bool) -> Result<Outcome> {
        let outcome = match method {
            "Write" | "WriteLine" => {
                self.window.visible = true;
                self.console.write(&args[0]);
                if method == "WriteLine" {
                    self.console.write("\n");
                }
                Outcome::done()
            }
            "Read" => {
                self.window.visible = true;
                if !self.console.line_available() {
                    return Ok(Outcome::Blocked(Block::Input));
                }
                Outcome::Ready(self.console.take_line().unwrap_or_default())
            }
            "ReadNumber" => {
                self.window.visible = true;
                loop {
                    if !self.console.line_available() {
                        return Ok(Outcome::Blocked(Block::Input));
                    }
                    match self.console.take_line() {
                        None => break Outcome::Ready("0".to_string()),
                        Some(line) => {
                            if let Some(n) = parse_number(&line) {
                                break Outcome::Ready(format_number(n));
                            }
                        }
                    }
                }
            }
            "Pause" => self.pause(true, resumed),
            "PauseWithoutMessage" => self.pause(false, resumed),
            "PauseIfVisible" => {
                if !self.window.visible {
                    return Ok(Outcome::done());
                }
                self.pause(true, resumed)
            }
            "Clear" => {
                self.console.clear();
                Outcome::done()
            }
            "Show" => {
                self.window.visible = true;
                Outcome::done()
            }
            "Hide" => {
                self.window.visible = false;
                Outcome::done()
            }
            _ => return Err(Self::missing("TextWindow", method)),
        };
        Ok(outcome)
    }

    fn program(&mut self, method: &str, args: &[String], resumed: bool) -> Result<Outcome> {
        match method {
            "GetArgument" => {
                let index = to_number(&args[0]).trunc();
                let value = if index >= 1.0 && index <= self.args.len() as f64 {
                    self.args[index as usize - 1].clone()
                } else {
                    String::new()
                };
                Ok(Outcome::Ready(value))
            }
            "Delay" => {
                let ms = to_number(&args[0]);
                if resumed || ms <= 0.0 {
                    return Ok(Outcome::done());
                }
                let until = self.now + Duration::from_millis(ms as u64);
                Ok(Outcome::Blocked(Block::Pause(Resume::At(until))))
            }
            "End" => {
                debug!("Program.End requested");
                self.end_requested = true;
                Ok(Outcome::done())
            }
            _ => Err(Self::missing("Program", method)),
        }
    }

    fn math(&mut self, method: &str, args: &[String]) -> Result<String> {
        let x = || to_number(&args[0]);
        let y = || to_number(&args[1]);
        let n = match method {
            "Abs" => x().abs(),
            "ArcCos" => x().acos(),
            "ArcSin" => x().asin(),
            "ArcTan" => x().atan(),
            "Ceiling" => x().ceil(),
            "Cos" => x().cos(),
            "Floor" => x().floor(),
            "GetDegrees" => x().to_degrees(),
            "GetRadians" => x().to_radians(),
            "Log" => x().log10(),
            "NaturalLog" => x().ln(),
            "Round" => x().round(),
            "Sin" => x().sin(),
            "SquareRoot" => x().sqrt(),
            "Tan" => x().tan(),
            "Max" => x().max(y()),
            "Min" => x().min(y()),
            "Power" => x().powf(y()),
            "Remainder" => {
                let divisor = y();
                if divisor == 0.0 {
                    0.0
                } else {
                    x() % divisor
                }
            }
            "GetRandomNumber" => {
                let max = (x().trunc() as i64).max(1);
                rand::thread_rng().gen_range(1..=max) as f64
            }
            _ => return Err(Self::missing("Math", method)),
        };
        Ok(format_number(n))
    }

    fn array(&mut self, method: &str, args: &[String]) -> Result<String> {
        let value = match method {
            "ContainsIndex" => bool_value(array::contains_key(&args[0], &args[1])),
            "ContainsValue" => bool_value(array::contains_value(&args[0], &args[1])),
            "GetAllIndices" => array::all_keys(&args[0]),
            "GetItemCount" => array::item_count(&args[0]).to_string(),
            "IsArray" => bool_value(array::is_array(&args[0])),
            "SetValue" => {
                let stored = self.arrays.entry(args[0].clone()).or_default();
                *stored = array::set(stored, &args[1..2], &args[2]);
                String::new()
            }
            "GetValue" => self
                .arrays
                .get(&args[0])
                .map(|stored| array::get(stored, &args[1..2]))
                .unwrap_or_default(),
            "RemoveValue" => {
                if let Some(stored) = self.arrays.get_mut(&args[0]) {
                    *stored = array::remove(stored, &args[1]);
                }
                String::new()
            }
            _ => return Err(Self::missing("Array", method)),
        };
        Ok(value)
    }

    fn stack(&mut self, method: &str, args: &[String]) -> Result<String> {
        let stack = self.stacks.entry(args[0].clone()).or_default();
        let value = match method {
            "PushValue" => {
                stack.push(args[1].clone());
                String::new()
            }
            "PopValue" => stack.pop().unwrap_or_default(),
            "GetCount" => stack.len().to_string(),
            _ => return Err(Self::missing("Stack", method)),
        };
        Ok(value)
    }
}

fn text(method: &str, args: &[String]) -> Result<String> {
    let s = &args[0];
    let value = match method {
        "Append" => format!("{}{}", s, args[1]),
        "ConvertToLowerCase" => s.to_lowercase(),
        "ConvertToUpperCase" => s.to_uppercase(),
        "EndsWith" => bool_value(s.ends_with(args[1].as_str())),
        "StartsWith" => bool_value(s.starts_with(args[1].as_str())),
        "IsSubText" => bool_value(s.contains(args[1].as_str())),
        "GetLength" => s.chars().count().to_string(),
        "GetCharacter" => {
            let code = to_number(s).trunc();
            if code >= 0.0 && code <= u32::MAX as f64 {
                char::from_u32(code as u32).map(String::from).unwrap_or_default()
            } else {
                String::new()
            }
        }
        "GetCharacterCode" => s.chars().next().map(|c| c as u32).unwrap_or(0).to_string(),
        "GetIndexOf" => {
            let needle = &args[1];
            let index = if needle.is_empty() {
                0
            } else {
                s.find(needle.as_str())
                    .map(|byte| s[..byte].chars().count() + 1)
                    .unwrap_or(0)
            };
            index.to_string()
        }
        "GetSubText" => sub_text(s, to_number(&args[1]), to_number(&args[2])),
        "GetSubTextToEnd" => sub_text(s, to_number(&args[1]), s.chars().count() as f64),
        _ => return Err(Library::missing("Text", method)),
    };
    Ok(value)
}

/// `length` characters from the 1-based `start`; invalid ranges give ""
fn sub_text(s: &str, start: f64, length: f64) -> String {
    let start = start.trunc();
    let length = length.trunc();
    if start < 1.0 || length < 0.0 {
        return String::new();
    }
    s.chars()
        .skip(start as usize - 1)
        .take(length as usize)
        .collect()
}

fn clock(field: &str) -> Option<String> {
    let now = Local::now();
    let value = match field {
        "Date" => now.format("%m/%d/%Y").to_string(),
        "Time" => now.format("%I:%M:%S %p").to_string(),
        "Year" => now.year().to_string(),
        "Month" => now.month().to_string(),
        "Day" => now.day().to_string(),
        "WeekDay" => now.format("%A").to_string(),
        "Hour" => now.hour().to_string(),
        "Minute" => now.minute().to_string(),
        "Second" => now.second().to_string(),
        "Millisecond" => (now.nanosecond() / 1_000_000 % 1000).to_string(),
        "ElapsedMilliseconds" => (Utc::now().timestamp_millis() + EPOCH_1900_OFFSET_MS).to_string(),
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::console::BufferConsole;

    fn library(console: &BufferConsole) -> Library {
        Library::new(Box::new(console.clone()), vec!["one".into(), "two".into()])
    }

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn ready(lib: &mut Library, object: &str, method: &str, a: &[&str]) -> String {
        match lib.call(object, method, &args(a), false).unwrap() {
            Outcome::Ready(v) => v,
            other => panic!("{}.{} blocked: {:?}", object, method, other),
        }
    }

    #[test]
    fn test_write_and_read() {
        let console = BufferConsole::new();
        let mut lib = library(&console);
        ready(&mut lib, "textwindow", "writeline", &["hello"]);
        ready(&mut lib, "TextWindow", "Write", &["x"]);
        assert_eq!(console.output(), "hello\nx");

        assert_eq!(
            lib.call("TextWindow", "Read", &[], false).unwrap(),
            Outcome::Blocked(Block::Input)
        );
        console.push_line("typed");
        assert!(lib.is_resolved(&Block::Input, Instant::now()));
        assert_eq!(ready(&mut lib, "TextWindow", "Read", &[]), "typed");
    }

    #[test]
    fn test_read_number_skips_text() {
        let console = BufferConsole::new();
        let mut lib = library(&console);
        console.push_line("abc");
        console.push_line("007");
        assert_eq!(ready(&mut lib, "TextWindow", "ReadNumber", &[]), "7");

        console.push_line("nope");
        assert_eq!(
            lib.call("TextWindow", "ReadNumber", &[], false).unwrap(),
            Outcome::Blocked(Block::Input)
        );
        console.close();
        assert_eq!(ready(&mut lib, "TextWindow", "ReadNumber", &[]), "0");
    }

    #[test]
    fn test_pause_blocks_until_resumed() {
        let console = BufferConsole::new();
        let mut lib = library(&console);
        let block = match lib.call("TextWindow", "Pause", &[], false).unwrap() {
            Outcome::Blocked(b) => b,
            other => panic!("expected block, got {:?}", other),
        };
        assert_eq!(console.output(), "Press any key to continue...\n");
        assert!(!lib.is_resolved(&block, Instant::now()));
        console.push_line("");
        assert!(lib.is_resolved(&block, Instant::now()));
        assert_eq!(lib.call("TextWindow", "Pause", &[], true).unwrap(), Outcome::done());
        assert!(!lib.is_resolved(&block, Instant::now()));
    }

    #[test]
    fn test_pause_if_visible() {
        let console = BufferConsole::new();
        let mut lib = library(&console);
        assert_eq!(ready(&mut lib, "TextWindow", "PauseIfVisible", &[]), "");
        ready(&mut lib, "TextWindow", "Show", &[]);
        assert!(matches!(
            lib.call("TextWindow", "PauseIfVisible", &[], false).unwrap(),
            Outcome::Blocked(_)
        ));
    }

    #[test]
    fn test_delay_is_timed_pause() {
        let console = BufferConsole::new();
        let mut lib = library(&console);
        let now = Instant::now();
        lib.set_now(now);
        let outcome = lib.call("Program", "Delay", &args(&["50"]), false).unwrap();
        let block = match outcome {
            Outcome::Blocked(b) => b,
            other => panic!("expected block, got {:?}", other),
        };
        assert!(!lib.is_resolved(&block, now + Duration::from_millis(10)));
        assert!(lib.is_resolved(&block, now + Duration::from_millis(50)));
        assert_eq!(ready(&mut lib, "Program", "Delay", &["0"]), "");
    }

    #[test]
    fn test_math() {
        let console = BufferConsole::new();
        let mut lib = library(&console);
        assert_eq!(ready(&mut lib, "Math", "Abs", &["-4"]), "4");
        assert_eq!(ready(&mut lib, "Math", "Power", &["2", "10"]), "1024");
        assert_eq!(ready(&mut lib, "Math", "Remainder", &["7", "3"]), "1");
        assert_eq!(ready(&mut lib, "Math", "Remainder", &["7", "0"]), "0");
        assert_eq!(ready(&mut lib, "Math", "Max", &["2", "abc"]), "2");
        assert_eq!(ready(&mut lib, "Math", "SquareRoot", &["81"]), "9");
        assert_eq!(ready(&mut lib, "Math", "NaturalLog", &["1"]), "0");
        assert_eq!(lib.get_field("math", "pi").unwrap(), "3.141592653589793");
        for _ in 0..20 {
            let r: f64 = ready(&mut lib, "Math", "GetRandomNumber", &["3"]).parse().unwrap();
            assert!((1.0..=3.0).contains(&r));
        }
    }

    #[test]
    fn test_text() {
        let console = BufferConsole::new();
        let mut lib = library(&console);
        assert_eq!(ready(&mut lib, "Text", "Append", &["1", "2"]), "12");
        assert_eq!(ready(&mut lib, "Text", "GetLength", &["héllo"]), "5");
        assert_eq!(ready(&mut lib, "Text", "GetSubText", &["abcdef", "2", "3"]), "bcd");
        assert_eq!(ready(&mut lib, "Text", "GetSubText", &["abcdef", "0", "3"]), "");
        assert_eq!(ready(&mut lib, "Text", "GetSubText", &["abc", "2", "99"]), "bc");
        assert_eq!(ready(&mut lib, "Text", "GetSubTextToEnd", &["abcdef", "4"]), "def");
        assert_eq!(ready(&mut lib, "Text", "GetIndexOf", &["hello", "l"]), "3");
        assert_eq!(ready(&mut lib, "Text", "GetIndexOf", &["hello", "z"]), "0");
        assert_eq!(ready(&mut lib, "Text", "StartsWith", &["hello", "he"]), "True");
        assert_eq!(ready(&mut lib, "Text", "EndsWith", &["hello", "he"]), "False");
        assert_eq!(ready(&mut lib, "Text", "IsSubText", &["hello", "ell"]), "True");
        assert_eq!(ready(&mut lib, "Text", "GetCharacter", &["65"]), "A");
        assert_eq!(ready(&mut lib, "Text", "GetCharacterCode", &["a"]), "97");
        assert_eq!(ready(&mut lib, "Text", "ConvertToUpperCase", &["abc"]), "ABC");
    }

    #[test]
    fn test_stack_and_named_arrays() {
        let console = BufferConsole::new();
        let mut lib = library(&console);
        ready(&mut lib, "Stack", "PushValue", &["s", "a"]);
        ready(&mut lib, "Stack", "PushValue", &["s", "b"]);
        assert_eq!(ready(&mut lib, "Stack", "GetCount", &["s"]), "2");
        assert_eq!(ready(&mut lib, "Stack", "PopValue", &["s"]), "b");
        assert_eq!(ready(&mut lib, "Stack", "PopValue", &["s"]), "a");
        assert_eq!(ready(&mut lib, "Stack", "PopValue", &["s"]), "");

        ready(&mut lib, "Array", "SetValue", &["arr", "k", "v"]);
        assert_eq!(ready(&mut lib, "Array", "GetValue", &["arr", "k"]), "v");
        ready(&mut lib, "Array", "RemoveValue", &["arr", "k"]);
        assert_eq!(ready(&mut lib, "Array", "GetValue", &["arr", "k"]), "");
        assert_eq!(ready(&mut lib, "Array", "GetValue", &["other", "k"]), "");
    }

    #[test]
    fn test_program_object() {
        let console = BufferConsole::new();
        let mut lib = library(&console).with_directory("/srv/basic");
        assert_eq!(lib.get_field("Program", "ArgumentCount").unwrap(), "2");
        assert_eq!(lib.get_field("Program", "Directory").unwrap(), "/srv/basic");
        assert_eq!(ready(&mut lib, "Program", "GetArgument", &["2"]), "two");
        assert_eq!(ready(&mut lib, "Program", "GetArgument", &["3"]), "");
        assert_eq!(ready(&mut lib, "Program", "GetArgument", &["x"]), "");
        assert!(!lib.end_requested());
        ready(&mut lib, "Program", "End", &[]);
        assert!(lib.end_requested());
    }

    #[test]
    fn test_fields() {
        let console = BufferConsole::new();
        let mut lib = library(&console);
        lib.set_field("TextWindow", "Title", "Demo").unwrap();
        assert_eq!(lib.get_field("TextWindow", "title").unwrap(), "Demo");
        assert_eq!(lib.get_field("TextWindow", "ForegroundColor").unwrap(), "Gray");
        assert!(lib.get_field("Clock", "Year").unwrap().parse::<i32>().is_ok());
        assert!(lib.set_field("Math", "Pi", "3").is_err());
    }

    #[test]
    fn test_timer_events() {
        let console = BufferConsole::new();
        let mut lib = library(&console);
        let now = Instant::now();
        lib.set_now(now);
        lib.bind_event("Timer", "Tick", 4).unwrap();
        assert!(!lib.has_live_events());
        lib.set_field("Timer", "Interval", "20").unwrap();
        assert!(lib.has_live_events());
        assert!(lib.due_events(now).is_empty());
        assert_eq!(lib.due_events(now + Duration::from_millis(20)), vec![4]);
        ready(&mut lib, "Timer", "Pause", &[]);
        assert!(!lib.has_live_events());
    }

    #[test]
    fn test_runtime_errors() {
        let console = BufferConsole::new();
        let mut lib = library(&console);
        assert_eq!(
            lib.call("Nope", "X", &[], false),
            Err(RuntimeError::UnknownObject("Nope".into()))
        );
        assert!(matches!(
            lib.call("Math", "Abs", &[], false),
            Err(RuntimeError::ArityMismatch { expected: 1, given: 0, .. })
        ));
        assert!(matches!(
            lib.call("Math", "Pi", &[], false),
            Err(RuntimeError::WrongMemberKind(..))
        ));
    }
}
