//! In-process channels behind emulated descriptors.

use crate::backend::emulated::errors::ErrorTable;
use crate::config::types::Result;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct PipeState {
    buffer: VecDeque<u8>,
    readers: usize,
    writers: usize,
}

/// Unbounded in-memory pipe. End of file is reported once every write end is closed.
pub(crate) struct Pipe {
    state: Mutex<PipeState>,
    ready: Condvar,
}

impl Pipe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PipeState {
                buffer: VecDeque::new(),
                readers: 1,
                writers: 1,
            }),
            ready: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PipeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Blocks until data arrives or the write end closes; empty result means EOF.
    pub fn read(&self, length: usize, nonblocking: bool, errors: &ErrorTable) -> Result<Vec<u8>> {
        let mut state = self.lock();
        while state.buffer.is_empty() && state.writers > 0 {
            if nonblocking {
                return Err(errors.err("EAGAIN"));
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        let n = length.min(state.buffer.len());
        Ok(state.buffer.drain(..n).collect())
    }

    pub fn write(&self, data: &[u8], errors: &ErrorTable) -> Result<usize> {
        let mut state = self.lock();
        if state.readers == 0 {
            return Err(errors.err("EPIPE"));
        }
        state.buffer.extend(data);
        self.ready.notify_all();
        Ok(data.len())
    }

    /// Data is available or every writer is gone.
    pub fn readable(&self) -> bool {
        let state = self.lock();
        !state.buffer.is_empty() || state.writers == 0
    }

    /// Writes would not fail with `EPIPE`.
    pub fn writable(&self) -> bool {
        self.lock().readers > 0
    }

    /// Extra write end, e.g. held by a thread feeding a child's output into the pipe.
    pub fn add_writer(&self) {
        self.lock().writers += 1;
    }

    pub fn close_reader(&self) {
        let mut state = self.lock();
        state.readers = state.readers.saturating_sub(1);
        self.ready.notify_all();
    }

    pub fn close_writer(&self) {
        let mut state = self.lock();
        state.writers = state.writers.saturating_sub(1);
        self.ready.notify_all();
    }

    /// Wait for readability, at most `timeout`.
    pub fn wait_readable(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .ready
            .wait_timeout_while(state, timeout, |s| s.buffer.is_empty() && s.writers > 0)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        !state.buffer.is_empty() || state.writers == 0
    }
}

pub(crate) enum Channel {
    File { file: File, path: PathBuf },
    Directory { path: PathBuf },
    PipeReader(Arc<Pipe>),
    PipeWriter(Arc<Pipe>),
    Input(Box<dyn Read + Send>),
    Output(Box<dyn Write + Send>),
    Closed,
}

impl Channel {
    pub fn kind(&self) -> &'static str {
        match self {
            Channel::File { .. } => "file",
            Channel::Directory { .. } => "directory",
            Channel::PipeReader(_) => "pipe-reader",
            Channel::PipeWriter(_) => "pipe-writer",
            Channel::Input(_) => "input",
            Channel::Output(_) => "output",
            Channel::Closed => "closed",
        }
    }

    fn close(&mut self) {
        match std::mem::replace(self, Channel::Closed) {
            Channel::PipeReader(pipe) => pipe.close_reader(),
            Channel::PipeWriter(pipe) => pipe.close_writer(),
            Channel::Output(mut out) => {
                let _ = out.flush();
            }
            _ => {}
        }
    }
}

/// Advisory lock held through one wrapper.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LockKind {
    Shared,
    Exclusive,
}

static NEXT_WRAPPER_ID: AtomicU64 = AtomicU64::new(1);

/// Channel shared by every descriptor `dup`ed from the same open.
pub(crate) struct ChannelWrapper {
    id: u64,
    channel: Mutex<Channel>,
    refcount: AtomicUsize,
    std_stream: bool,
    nonblocking: AtomicBool,
    lock: Mutex<Option<LockKind>>,
}

impl ChannelWrapper {
    pub fn new(channel: Channel) -> Arc<Self> {
        Self::build(channel, false)
    }

    /// Standard stream wrapper: never physically closed.
    pub fn std_stream(channel: Channel) -> Arc<Self> {
        Self::build(channel, true)
    }

    fn build(channel: Channel, std_stream: bool) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_WRAPPER_ID.fetch_add(1, Ordering::Relaxed),
            channel: Mutex::new(channel),
            refcount: AtomicUsize::new(1),
            std_stream,
            nonblocking: AtomicBool::new(false),
            lock: Mutex::new(None),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_std_stream(&self) -> bool {
        self.std_stream
    }

    pub fn channel(&self) -> MutexGuard<'_, Channel> {
        self.channel.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn refcount(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    pub fn retain(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one reference; closes the channel when it was the last one.
    /// Returns whether the channel was physically closed.
    pub fn release(&self) -> bool {
        let previous = self.refcount.fetch_sub(1, Ordering::AcqRel);
        if previous > 1 {
            return false;
        }
        *self.lock.lock().unwrap_or_else(|p| p.into_inner()) = None;
        if self.std_stream {
            if let Channel::Output(out) = &mut *self.channel() {
                let _ = out.flush();
            }
            return false;
        }
        self.channel().close();
        true
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.channel(), Channel::Closed)
    }

    pub fn nonblocking(&self) -> bool {
        self.nonblocking.load(Ordering::Acquire)
    }

    pub fn set_nonblocking(&self, value: bool) {
        self.nonblocking.store(value, Ordering::Release);
    }

    pub fn held_lock(&self) -> Option<LockKind> {
        *self.lock.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_held_lock(&self, kind: Option<LockKind>) {
        *self.lock.lock().unwrap_or_else(|p| p.into_inner()) = kind;
    }

    /// Pipe behind a read end, cloned out so blocking reads do not hold the channel lock.
    pub fn pipe_reader(&self) -> Option<Arc<Pipe>> {
        match &*self.channel() {
            Channel::PipeReader(pipe) => Some(Arc::clone(pipe)),
            _ => None,
        }
    }

    pub fn pipe_writer(&self) -> Option<Arc<Pipe>> {
        match &*self.channel() {
            Channel::PipeWriter(pipe) => Some(Arc::clone(pipe)),
            _ => None,
        }
    }

    pub fn read(&self, length: usize, errors: &ErrorTable) -> Result<Vec<u8>> {
        if let Some(pipe) = self.pipe_reader() {
            return pipe.read(length, self.nonblocking(), errors);
        }
        let mut buf = vec![0u8; length];
        let n = match &mut *self.channel() {
            Channel::File { file, .. } => file.read(&mut buf).map_err(|e| errors.io(&e))?,
            Channel::Input(input) => input.read(&mut buf).map_err(|e| errors.io(&e))?,
            Channel::Directory { .. } => return Err(errors.err("EISDIR")),
            _ => return Err(errors.err("EBADF")),
        };
        buf.truncate(n);
        Ok(buf)
    }

    pub fn write(&self, data: &[u8], errors: &ErrorTable) -> Result<usize> {
        if let Some(pipe) = self.pipe_writer() {
            return pipe.write(data, errors);
        }
        match &mut *self.channel() {
            Channel::File { file, .. } => file.write(data).map_err(|e| errors.io(&e)),
            Channel::Output(out) => {
                let n = out.write(data).map_err(|e| errors.io(&e))?;
                out.flush().map_err(|e| errors.io(&e))?;
                Ok(n)
            }
            Channel::Directory { .. } => Err(errors.err("EISDIR")),
            _ => Err(errors.err("EBADF")),
        }
    }

    pub fn seek(&self, pos: SeekFrom, errors: &ErrorTable) -> Result<u64> {
        match &mut *self.channel() {
            Channel::File { file, .. } => file.seek(pos).map_err(|e| errors.io(&e)),
            Channel::Closed => Err(errors.err("EBADF")),
            _ => Err(errors.err("ESPIPE")),
        }
    }

    /// Run `f` on the underlying file, `EINVAL` for other channel kinds.
    pub fn with_file<T>(&self, errors: &ErrorTable, f: impl FnOnce(&mut File) -> std::io::Result<T>) -> Result<T> {
        match &mut *self.channel() {
            Channel::File { file, .. } => f(file).map_err(|e| errors.io(&e)),
            Channel::Closed => Err(errors.err("EBADF")),
            _ => Err(errors.err("EINVAL")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::constants::{Platform, PosixConstants};

    fn errors() -> ErrorTable {
        ErrorTable::new(PosixConstants::for_platform(Platform::Linux))
    }

    #[test]
    fn test_pipe_read_after_writer_close_is_eof() {
        let pipe = Pipe::new();
        pipe.write(b"abc", &errors()).unwrap();
        pipe.close_writer();
        assert_eq!(pipe.read(10, false, &errors()).unwrap(), b"abc");
        assert!(pipe.read(10, false, &errors()).unwrap().is_empty());
    }

    #[test]
    fn test_pipe_write_without_reader_is_epipe() {
        let pipe = Pipe::new();
        pipe.close_reader();
        assert_eq!(pipe.write(b"x", &errors()).unwrap_err().errno(), Some(32));
    }

    #[test]
    fn test_nonblocking_empty_pipe_is_eagain() {
        let pipe = Pipe::new();
        assert_eq!(pipe.read(1, true, &errors()).unwrap_err().errno(), Some(11));
    }

    #[test]
    fn test_blocking_read_wakes_on_write() {
        let pipe = Pipe::new();
        let reader = Arc::clone(&pipe);
        let handle = std::thread::spawn(move || reader.read(4, false, &errors()).unwrap());
        std::thread::sleep(Duration::from_millis(20));
        pipe.write(b"ping", &errors()).unwrap();
        assert_eq!(handle.join().unwrap(), b"ping");
    }

    #[test]
    fn test_eof_waits_for_every_writer() {
        let pipe = Pipe::new();
        pipe.add_writer();
        pipe.close_writer();
        assert!(!pipe.readable());
        assert!(!pipe.wait_readable(Duration::from_millis(5)));
        pipe.close_writer();
        assert!(pipe.readable());
    }

    #[test]
    fn test_wrapper_release_closes_on_last_reference() {
        let pipe = Pipe::new();
        let wrapper = ChannelWrapper::new(Channel::PipeWriter(Arc::clone(&pipe)));
        wrapper.retain();
        assert!(!wrapper.release());
        assert!(!wrapper.is_closed());
        assert!(wrapper.release());
        assert!(wrapper.is_closed());
        assert!(pipe.readable());
    }

    #[test]
    fn test_std_stream_never_closed() {
        let wrapper = ChannelWrapper::std_stream(Channel::Output(Box::new(Vec::new())));
        assert!(!wrapper.release());
        assert!(!wrapper.is_closed());
    }
}
