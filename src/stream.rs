use std::{
    fmt,
    io::{self, BufRead, BufReader, Read},
    process::{Child, ChildStderr, ChildStdout, Command, Stdio},
    sync::{Arc, Weak},
};

use log::debug;
use parking_lot::Mutex;

/// A program and its argument vector, spawned without a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

type SharedChild = Arc<Mutex<Child>>;

/// Children of every live stream, so they can be killed when the daemon exits
/// without unwinding its workers.
#[derive(Debug, Clone, Default)]
pub struct ChildTracker(Arc<Mutex<Vec<Weak<Mutex<Child>>>>>);

impl ChildTracker {
    pub fn track<R>(&self, stream: &LineStream<R>) {
        if let Some(child) = &stream.child {
            let mut children = self.0.lock();
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(child));
        }
    }

    /// Kills and reaps every tracked child still owned by a stream. Returns
    /// how many were killed.
    pub fn kill_all(&self) -> usize {
        let children: Vec<_> = self.0.lock().drain(..).collect();
        let mut killed = 0;
        for child in children.iter().filter_map(Weak::upgrade) {
            let mut child = child.lock();
            match child.kill() {
                Ok(()) => {
                    let _ = child.wait();
                    killed += 1;
                }
                Err(e) => debug!("Failed to kill child {}: {}", child.id(), e),
            }
        }
        killed
    }

    #[cfg(test)]
    fn live(&self) -> usize {
        self.0.lock().iter().filter(|weak| weak.strong_count() > 0).count()
    }
}

/// Line-by-line view over a child's stdout, keeping its stderr around for
/// diagnostics once the stream ends.
pub struct LineStream<R> {
    reader: R,
    stderr: Option<ChildStderr>,
    child: Option<SharedChild>,
    buf: Vec<u8>,
}

impl LineStream<BufReader<ChildStdout>> {
    pub fn spawn(command: &CommandLine) -> io::Result<Self> {
        debug!("Spawning: {}", command);
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "child stdout not captured"))?;
        let stderr = child.stderr.take();

        Ok(Self {
            reader: BufReader::new(stdout),
            stderr,
            child: Some(Arc::new(Mutex::new(child))),
            buf: Vec::new(),
        })
    }
}

impl<R: BufRead> LineStream<R> {
    #[cfg(test)]
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader,
            stderr: None,
            child: None,
            buf: Vec::new(),
        }
    }

    /// Blocks for the next line. `Ok(None)` means end of stream.
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }

    /// Reads whatever the child wrote to stderr. Empty when there is no child.
    pub fn drain_stderr(&mut self) -> String {
        let mut out = Vec::new();
        if let Some(stderr) = self.stderr.as_mut() {
            if let Err(e) = stderr.read_to_end(&mut out) {
                debug!("Failed to read child stderr: {}", e);
            }
        }
        String::from_utf8_lossy(&out).trim().to_string()
    }
}

impl<R> Drop for LineStream<R> {
    fn drop(&mut self) {
        if let Some(child) = self.child.take() {
            let mut child = child.lock();
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn yields_lines_then_end_of_stream() {
        let mut stream = LineStream::from_reader(Cursor::new("first\r\nsecond\n\nlast"));
        assert_eq!(stream.next_line().unwrap().as_deref(), Some("first"));
        assert_eq!(stream.next_line().unwrap().as_deref(), Some("second"));
        assert_eq!(stream.next_line().unwrap().as_deref(), Some(""));
        assert_eq!(stream.next_line().unwrap().as_deref(), Some("last"));
        assert_eq!(stream.next_line().unwrap(), None);
        assert_eq!(stream.drain_stderr(), "");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut stream = LineStream::from_reader(Cursor::new(b"a\xffb\n".to_vec()));
        assert_eq!(stream.next_line().unwrap().as_deref(), Some("a\u{fffd}b"));
    }

    #[test]
    fn captures_child_stdout_and_stderr() {
        let command = CommandLine::new("sh", ["-c", "echo out; echo err >&2"]);
        let mut stream = LineStream::spawn(&command).unwrap();
        assert_eq!(stream.next_line().unwrap().as_deref(), Some("out"));
        assert_eq!(stream.next_line().unwrap(), None);
        assert_eq!(stream.drain_stderr(), "err");
    }

    #[test]
    fn command_line_displays_like_a_shell_invocation() {
        let command = CommandLine::new("gdbus", ["monitor", "--system"]);
        assert_eq!(command.to_string(), "gdbus monitor --system");
    }

    #[test]
    fn tracked_children_are_killed_on_shutdown() {
        let children = ChildTracker::default();
        let mut stream = LineStream::spawn(&CommandLine::new("sleep", ["30"])).unwrap();
        children.track(&stream);
        assert_eq!(children.live(), 1);

        assert_eq!(children.kill_all(), 1);
        // The killed child closes its stdout, so the blocked reader sees EOF.
        assert_eq!(stream.next_line().unwrap(), None);
        assert_eq!(children.live(), 0);
    }

    #[test]
    fn dropped_streams_are_not_tracked() {
        let children = ChildTracker::default();
        let stream = LineStream::spawn(&CommandLine::new("sleep", ["30"])).unwrap();
        children.track(&stream);
        drop(stream);
        assert_eq!(children.live(), 0);
        assert_eq!(children.kill_all(), 0);
    }

    #[test]
    fn spawning_a_missing_program_fails() {
        let command = CommandLine::new("easyland-definitely-missing-binary", Vec::<String>::new());
        assert!(LineStream::spawn(&command).is_err());
    }
}
