//! Supervises an external command and captures its output streams.
//!
//! Stdout and stderr are drained concurrently by two background threads,
//! one per stream, so a chatty subprocess can never fill a pipe and stall.
//! Every completed line lands in a per-stream buffer and in one shared
//! merged buffer tagged with its origin, preserving arrival order across
//! both streams. Views over the merged buffer can colorize error-stream
//! lines, and a tee sink can mirror lines live as they are produced.

use chrono::Local;
use colored::Colorize;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Lines of merged output attached to process failure diagnostics.
const ERROR_TAIL_LINES: usize = 20;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {code}\n{tail}")]
    Failed {
        command: String,
        code: i32,
        tail: String,
    },

    #[error("`{command}` was terminated by a signal\n{tail}")]
    Signaled { command: String, tail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone)]
pub struct OutputLine {
    pub source: StreamSource,
    pub text: String,
}

/// Shared destination for live tee output.
pub type TeeSink = Arc<Mutex<dyn Write + Send>>;

/// Knobs for a collection session.
#[derive(Clone)]
pub struct CollectOptions {
    tee: Option<TeeSink>,
    tee_lines: bool,
    tail_on_error: bool,
    colorize: bool,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            tee: None,
            tee_lines: true,
            tail_on_error: true,
            colorize: true,
        }
    }
}

impl CollectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror every line to `sink` as it is produced.
    pub fn tee(mut self, sink: TeeSink) -> Self {
        self.tee = Some(sink);
        self
    }

    /// Convenience wrapper turning any writer into a tee sink.
    pub fn tee_writer<W: Write + Send + 'static>(self, writer: W) -> Self {
        self.tee(Arc::new(Mutex::new(writer)) as TeeSink)
    }

    /// Keep the sink but suppress per-line mirroring. The sink still
    /// receives the failure tail when `tail_on_error` is set.
    pub fn quiet(mut self) -> Self {
        self.tee_lines = false;
        self
    }

    /// Emit the merged tail to the sink once if the process fails while
    /// per-line mirroring was suppressed. On by default.
    pub fn tail_on_error(mut self, enabled: bool) -> Self {
        self.tail_on_error = enabled;
        self
    }

    /// Colorize error-stream lines written to the tee sink.
    pub fn colorize(mut self, enabled: bool) -> Self {
        self.colorize = enabled;
        self
    }
}

/// A running or finished supervised command.
pub struct OutputCollector {
    command: String,
    child: Child,
    stdout_lines: Arc<Mutex<Vec<String>>>,
    stderr_lines: Arc<Mutex<Vec<String>>>,
    merged: Arc<Mutex<Vec<OutputLine>>>,
    readers: Vec<JoinHandle<()>>,
    options: CollectOptions,
    result: Option<bool>,
    exit: Option<ExitStatus>,
}

fn render_command(command: &Command) -> String {
    let mut rendered = command.get_program().to_string_lossy().into_owned();
    for arg in command.get_args() {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}

fn colorized(text: &str, source: StreamSource, colorize: bool) -> String {
    if colorize && source == StreamSource::Stderr {
        text.red().to_string()
    } else {
        text.to_string()
    }
}

struct StreamState {
    source: StreamSource,
    own: Arc<Mutex<Vec<String>>>,
    merged: Arc<Mutex<Vec<OutputLine>>>,
    tee: Option<TeeSink>,
    colorize: bool,
}

impl StreamState {
    fn emit(&self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes).into_owned();
        self.own
            .lock()
            .expect("stream buffer poisoned")
            .push(text.clone());
        self.merged
            .lock()
            .expect("merged buffer poisoned")
            .push(OutputLine {
                source: self.source,
                text: text.clone(),
            });
        if let Some(sink) = &self.tee {
            let stamp = Local::now().format("%H:%M:%S");
            let line = colorized(&text, self.source, self.colorize);
            let mut sink = sink.lock().expect("tee sink poisoned");
            // Tee output is advisory; a broken sink must not kill the drain.
            let _ = writeln!(sink, "[{stamp}] {line}");
        }
    }
}

/// Read loop for one stream. Treats `\n`, `\r` and `\r\n` as line
/// terminators and runs until end-of-stream, so joining this thread
/// guarantees the stream is fully drained.
fn drain_stream<R: Read>(mut reader: R, state: StreamState) {
    let mut buf = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();
    let mut last_was_cr = false;
    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        for &byte in &buf[..read] {
            if last_was_cr && byte == b'\n' {
                last_was_cr = false;
                continue;
            }
            last_was_cr = false;
            match byte {
                b'\n' => {
                    state.emit(&pending);
                    pending.clear();
                }
                b'\r' => {
                    state.emit(&pending);
                    pending.clear();
                    last_was_cr = true;
                }
                _ => pending.push(byte),
            }
        }
    }
    // A final unterminated line still counts as output.
    if !pending.is_empty() {
        state.emit(&pending);
    }
}

impl OutputCollector {
    /// Launch `command` and start draining its streams. Failure to spawn
    /// is reported as an error, never as a hanging session.
    pub fn spawn(mut command: Command, options: CollectOptions) -> Result<Self, ProcessError> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let rendered = render_command(&command);
        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            command: rendered.clone(),
            source,
        })?;

        let stdout_lines = Arc::new(Mutex::new(Vec::new()));
        let stderr_lines = Arc::new(Mutex::new(Vec::new()));
        let merged = Arc::new(Mutex::new(Vec::new()));
        let tee = options.tee_lines.then(|| options.tee.clone()).flatten();

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            let state = StreamState {
                source: StreamSource::Stdout,
                own: Arc::clone(&stdout_lines),
                merged: Arc::clone(&merged),
                tee: tee.clone(),
                colorize: options.colorize,
            };
            readers.push(thread::spawn(move || drain_stream(stdout, state)));
        }
        if let Some(stderr) = child.stderr.take() {
            let state = StreamState {
                source: StreamSource::Stderr,
                own: Arc::clone(&stderr_lines),
                merged: Arc::clone(&merged),
                tee,
                colorize: options.colorize,
            };
            readers.push(thread::spawn(move || drain_stream(stderr, state)));
        }

        Ok(Self {
            command: rendered,
            child,
            stdout_lines,
            stderr_lines,
            merged,
            readers,
            options,
            result: None,
            exit: None,
        })
    }

    /// Spawn, then block until completion.
    pub fn run(command: Command, options: CollectOptions) -> Result<Self, ProcessError> {
        let mut collector = Self::spawn(command, options)?;
        collector.wait();
        Ok(collector)
    }

    /// Block until the process exits and both streams hit end-of-stream,
    /// so no trailing output of a short-lived process is lost. Idempotent:
    /// repeat calls return the cached verdict immediately.
    pub fn wait(&mut self) -> bool {
        if let Some(result) = self.result {
            return result;
        }
        for handle in self.readers.drain(..) {
            let _ = handle.join();
        }
        let status = self.child.wait();
        let success = matches!(&status, Ok(s) if s.success());
        self.exit = status.ok();
        self.result = Some(success);

        if !success && self.options.tail_on_error && !self.options.tee_lines {
            if let Some(sink) = &self.options.tee {
                let tail = self.tail(ERROR_TAIL_LINES, self.options.colorize);
                let mut sink = sink.lock().expect("tee sink poisoned");
                let _ = write!(sink, "{tail}");
            }
        }
        success
    }

    /// Cached verdict, `None` while still running.
    pub fn success(&self) -> Option<bool> {
        self.result
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit.and_then(|status| status.code())
    }

    /// The supervised command line, for diagnostics.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Full interleaved log in arrival order, one line per entry.
    pub fn merged(&self, colorize: bool) -> String {
        let lines = self.merged.lock().expect("merged buffer poisoned");
        let mut out = String::new();
        for line in lines.iter() {
            out.push_str(&colorized(&line.text, line.source, colorize));
            out.push('\n');
        }
        out
    }

    /// Last `max_lines` lines of the merged view.
    pub fn tail(&self, max_lines: usize, colorize: bool) -> String {
        let lines = self.merged.lock().expect("merged buffer poisoned");
        let skip = lines.len().saturating_sub(max_lines);
        let mut out = String::new();
        for line in lines.iter().skip(skip) {
            out.push_str(&colorized(&line.text, line.source, colorize));
            out.push('\n');
        }
        out
    }

    pub fn stdout_only(&self) -> String {
        join_lines(&self.stdout_lines)
    }

    pub fn stderr_only(&self) -> String {
        join_lines(&self.stderr_lines)
    }

    /// Typed failure for a session that did not succeed, carrying the
    /// error-stream tail for diagnostics.
    pub fn failure_error(&self) -> ProcessError {
        let command = self.command.clone();
        let lines = self.stderr_lines.lock().expect("stream buffer poisoned");
        let skip = lines.len().saturating_sub(ERROR_TAIL_LINES);
        let mut tail = String::new();
        for line in lines.iter().skip(skip) {
            tail.push_str(line);
            tail.push('\n');
        }
        drop(lines);
        match self.exit.and_then(|status| status.code()) {
            Some(code) => ProcessError::Failed {
                command,
                code,
                tail,
            },
            None => ProcessError::Signaled { command, tail },
        }
    }
}

fn join_lines(lines: &Arc<Mutex<Vec<String>>>) -> String {
    let lines = lines.lock().expect("stream buffer poisoned");
    let mut out = String::new();
    for line in lines.iter() {
        out.push_str(line);
        out.push('\n');
    }
    out
}
