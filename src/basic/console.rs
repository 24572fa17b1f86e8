//! Text console boundary used by TextWindow
//!
//! The interpreter never blocks on I/O. It asks the console whether a line or
//! a resume signal is ready and parks the calling thread until it is.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::rc::Rc;
use std::thread;

use crossbeam_channel::{Receiver, TryRecvError};
use tracing::{debug, warn};

/// Host side of the text window
pub trait Console {
    /// Write text without a trailing newline
    fn write(&mut self, text: &str);

    fn clear(&mut self);

    /// True when `take_line` will not wait, including after input has closed
    fn line_available(&mut self) -> bool;

    /// Next input line, or `None` once input is exhausted
    fn take_line(&mut self) -> Option<String>;

    /// Any pending line counts as the key press that ends a pause
    fn resume_signaled(&mut self) -> bool {
        self.line_available()
    }

    fn acknowledge_resume(&mut self) {
        let _ = self.take_line();
    }
}

/// Console over the process stdin/stdout.
/// Stdin is read on a background thread so polling never blocks.
pub struct StdConsole {
    lines: Receiver<String>,
    pending: VecDeque<String>,
    closed: bool,
    /// Echo consumed input when stdin is not a terminal
    echo: bool,
    ansi: bool,
}

impl StdConsole {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();

        thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("stdin read failed: {}", e);
                        break;
                    }
                }
            }
        });

        let (stdin_tty, stdout_tty) =
            unsafe { (libc::isatty(libc::STDIN_FILENO) != 0, libc::isatty(libc::STDOUT_FILENO) != 0) };

        Self {
            lines: rx,
            pending: VecDeque::new(),
            closed: false,
            echo: !stdin_tty,
            ansi: stdout_tty,
        }
    }

    fn poll(&mut self) {
        loop {
            match self.lines.try_recv() {
                Ok(line) => self.pending.push_back(line),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.closed {
                        debug!("stdin closed");
                        self.closed = true;
                    }
                    break;
                }
            }
        }
    }
}

impl Default for StdConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for StdConsole {
    fn write(&mut self, text: &str) {
        let mut stdout = io::stdout().lock();
        if let Err(e) = stdout.write_all(text.as_bytes()).and_then(|_| stdout.flush()) {
            warn!("stdout write failed: {}", e);
        }
    }

    fn clear(&mut self) {
        if self.ansi {
            self.write("\x1b[2J\x1b[H");
        }
    }

    fn line_available(&mut self) -> bool {
        self.poll();
        !self.pending.is_empty() || self.closed
    }

    fn take_line(&mut self) -> Option<String> {
        self.poll();
        let line = self.pending.pop_front()?;
        if self.echo {
            self.write(&format!("{}\n", line));
        }
        Some(line)
    }
}

#[derive(Debug, Default)]
struct Buffer {
    output: String,
    input: VecDeque<String>,
    closed: bool,
    clears: usize,
}

/// In-memory console. Clones share the same buffers, so a caller can keep
/// one handle to feed input and inspect output.
#[derive(Clone, Debug, Default)]
pub struct BufferConsole {
    inner: Rc<RefCell<Buffer>>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Console with input lines queued up front and closed afterwards
    pub fn with_input<S: AsRef<str>>(lines: &[S]) -> Self {
        let console = Self::new();
        for line in lines {
            console.push_line(line.as_ref());
        }
        console.close();
        console
    }

    pub fn push_line(&self, line: &str) {
        self.inner.borrow_mut().input.push_back(line.to_string());
    }

    /// No more input will arrive
    pub fn close(&self) {
        self.inner.borrow_mut().closed = true;
    }

    pub fn output(&self) -> String {
        self.inner.borrow().output.clone()
    }

    pub fn clears(&self) -> usize {
        self.inner.borrow().clears
    }
}

impl Console for BufferConsole {
    fn write(&mut self, text: &str) {
        self.inner.borrow_mut().output.push_str(text);
    }

    fn clear(&mut self) {
        let mut buf = self.inner.borrow_mut();
        buf.output.clear();
        buf.clears += 1;
    }

    fn line_available(&mut self) -> bool {
        let buf = self.inner.borrow();
        !buf.input.is_empty() || buf.closed
    }

    fn take_line(&mut self) -> Option<String> {
        self.inner.borrow_mut().input.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_console_shares_state() {
        let handle = BufferConsole::new();
        let mut console = handle.clone();
        console.write("hi ");
        console.write("there");
        assert_eq!(handle.output(), "hi there");
    }

    #[test]
    fn test_input_availability() {
        let handle = BufferConsole::new();
        let mut console = handle.clone();
        assert!(!console.line_available());
        assert!(!console.resume_signaled());

        handle.push_line("abc");
        assert!(console.line_available());
        assert_eq!(console.take_line().as_deref(), Some("abc"));

        handle.close();
        assert!(console.line_available());
        assert_eq!(console.take_line(), None);
    }

    #[test]
    fn test_resume_consumes_a_line() {
        let mut console = BufferConsole::new();
        console.push_line("");
        console.push_line("next");
        assert!(console.resume_signaled());
        console.acknowledge_resume();
        assert_eq!(console.take_line().as_deref(), Some("next"));
    }

    #[test]
    fn test_clear() {
        let mut console = BufferConsole::new();
        console.write("x");
        console.clear();
        assert_eq!(console.output(), "");
        assert_eq!(console.clears(), 1);
    }
}
