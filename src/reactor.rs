//! Asynchronous redirection of file descriptors into log sinks.
//!
//! A [`Reactor`] owns one background thread blocked on an epoll instance.
//! [`Reactor::redirect`] swaps a target descriptor for the write end of a
//! fresh pipe and registers the read end; whatever the process writes to the
//! target afterwards is read by the reactor thread and forwarded to the sink.
//! Producers never wait on the reactor beyond normal pipe backpressure.
//!
//! The thread also refreshes the coarse clock
//! ([`current_seconds`](crate::current_seconds)) once per tick, so sinks get
//! event times without a clock read per chunk.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use lazy_static::lazy_static;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::efficient_clock::{self, current_seconds};
use crate::error::{Error, Result};
use crate::logger::{LogSink, Logger};
use crate::size_rotate::SizeRotate;

/// Registration handle reserved for the wake channel.
const WAKE_TOKEN: u64 = 0;
/// Readiness wait timeout; bounds the staleness of the coarse clock.
const TICK_MS: libc::c_int = 1000;
/// Largest chunk forwarded per readiness event.
const CHUNK_SIZE: usize = 16 * 1024;
const MAX_EVENTS: usize = 64;

/// Outcome of one read from a redirected source.
enum Progress {
    Forwarded,
    Idle,
    Exhausted,
}

/// One redirected source: the pipe's read end and the sink it feeds.
struct Proxy {
    source: File,
    sink: Box<dyn LogSink>,
}

impl Proxy {
    fn forward(&mut self, buf: &mut [u8]) -> Progress {
        loop {
            match self.source.read(buf) {
                Ok(0) => return Progress::Exhausted,
                Ok(n) => {
                    trace!(len = n, "forwarding");
                    self.sink.log(&buf[..n], current_seconds());
                    return Progress::Forwarded;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Progress::Idle,
                Err(e) => {
                    debug!(error = %e, "read failed, dropping source");
                    return Progress::Exhausted;
                }
            }
        }
    }

    /// Forwards everything still readable without blocking.
    fn drain(&mut self, buf: &mut [u8]) {
        while let Progress::Forwarded = self.forward(buf) {}
    }
}

/// State shared between the reactor thread and callers of `redirect`.
///
/// The registry lock is only held to look handlers up, insert them and
/// destroy them. Forwarding runs under the handler's own lock, so a slow sink
/// never stalls `redirect`.
struct Shared {
    epoll: OwnedFd,
    handlers: Mutex<HashMap<u64, Arc<Mutex<Proxy>>>>,
}

impl Shared {
    fn dispatch(&self, token: u64, buf: &mut [u8]) {
        let Some(proxy) = self.handlers.lock().get(&token).cloned() else {
            return;
        };
        let progress = proxy.lock().forward(buf);

        if let Progress::Exhausted = progress {
            let mut handlers = self.handlers.lock();
            if handlers.remove(&token).is_some() {
                sys::epoll_del(&self.epoll, &proxy.lock().source);
                // Last reference; the sink is flushed before the lock is released.
                drop(proxy);
                debug!(token, "source closed");
            }
        }
    }
}

/// The redirection reactor: one background thread and its handler registry.
///
/// Dropping a reactor stops it.
///
/// # Examples
///
/// ```no_run
/// # use redirect_logger::{Logger, Reactor, SizeRotate};
/// let reactor = Reactor::start().unwrap();
/// let rotate = SizeRotate::builder().name("stderr").build();
/// reactor.redirect(2, Logger::new(rotate).unwrap()).unwrap();
/// eprintln!("this line lands in ./stderr.0.log");
/// ```
pub struct Reactor {
    shared: Arc<Shared>,
    next_token: AtomicU64,
    wake: File,
    thread: Option<JoinHandle<()>>,
}

impl Reactor {
    /// Creates the multiplexer and wake channel and spawns the reactor thread.
    pub fn start() -> Result<Self> {
        let epoll = sys::epoll_create().map_err(Error::Multiplexer)?;
        let (wake_read, wake_write) = sys::pipe().map_err(Error::Pipe)?;
        sys::set_nonblocking(&wake_read).map_err(Error::Pipe)?;
        sys::epoll_add(&epoll, &wake_read, WAKE_TOKEN).map_err(Error::Register)?;

        let shared = Arc::new(Shared {
            epoll,
            handlers: Mutex::new(HashMap::new()),
        });
        efficient_clock::refresh();

        let thread = thread::Builder::new()
            .name("redirect-reactor".to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                let wake_read = File::from(wake_read);
                move || run(&shared, wake_read)
            })
            .map_err(Error::Spawn)?;
        debug!("reactor started");

        Ok(Self {
            shared,
            next_token: AtomicU64::new(WAKE_TOKEN + 1),
            wake: File::from(wake_write),
            thread: Some(thread),
        })
    }

    /// Sends everything written to `target` from now on to `sink`.
    ///
    /// `target` is replaced by the write end of a new pipe; its previous
    /// destination is no longer written to. Redirecting the same descriptor
    /// again closes the earlier pipe, which retires the earlier handler.
    ///
    /// `target` is only touched once the handler is registered. On error it
    /// still refers to whatever it referred to before.
    pub fn redirect(&self, target: RawFd, sink: impl LogSink + 'static) -> Result<()> {
        if self.thread.is_none() {
            return Err(Error::Stopped);
        }

        let (mut read_end, write_end) = sys::pipe().map_err(Error::Pipe)?;
        if read_end.as_raw_fd() == target {
            // `target` was closed and the read end took its number.
            read_end = read_end.try_clone().map_err(Error::Pipe)?;
        }
        sys::set_nonblocking(&read_end).map_err(Error::Pipe)?;

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let source = File::from(read_end);
        {
            let mut handlers = self.shared.handlers.lock();
            sys::epoll_add(&self.shared.epoll, &source, token).map_err(Error::Register)?;
            let proxy = Proxy {
                source,
                sink: Box::new(sink),
            };
            handlers.insert(token, Arc::new(Mutex::new(proxy)));
        }

        if let Err(source) = attach(write_end, target) {
            if let Some(proxy) = self.shared.handlers.lock().remove(&token) {
                sys::epoll_del(&self.shared.epoll, &proxy.lock().source);
            }
            return Err(Error::Redirect { fd: target, source });
        }
        debug!(fd = target, token, "redirected");
        Ok(())
    }

    /// Number of live redirections.
    pub fn handler_count(&self) -> usize {
        self.shared.handlers.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stops the reactor thread, then drains and destroys every handler,
    /// which flushes their sinks. Calling it again is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        (&self.wake).write_all(&[1])?;
        if thread.join().is_err() {
            warn!("reactor thread panicked");
        }

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut handlers = self.shared.handlers.lock();
        for (token, proxy) in handlers.drain() {
            let mut handler = proxy.lock();
            handler.drain(&mut buf);
            sys::epoll_del(&self.shared.epoll, &handler.source);
            debug!(token, "handler closed");
        }
        debug!("reactor stopped");
        Ok(())
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "reactor stop failed");
        }
    }
}

/// Makes `target` the write end of the pipe.
fn attach(write_end: OwnedFd, target: RawFd) -> io::Result<()> {
    if write_end.as_raw_fd() == target {
        // `target` was closed and the write end took its number; keep it open.
        sys::clear_cloexec(&write_end)?;
        let _ = write_end.into_raw_fd();
        return Ok(());
    }
    sys::dup2(&write_end, target)
}

fn run(shared: &Shared, _wake: File) {
    let mut events = [libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS];
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let ready = sys::epoll_wait(&shared.epoll, &mut events, TICK_MS);
        efficient_clock::refresh();

        let ready = match ready {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "epoll_wait failed, reactor exiting");
                return;
            }
        };

        for event in events[..ready].iter().copied() {
            let token = event.u64;
            if token == WAKE_TOKEN {
                return;
            }
            shared.dispatch(token, &mut buf);
        }
    }
}

lazy_static! {
    /// Process-wide reactor, started on first use.
    static ref GLOBAL: Mutex<Option<Reactor>> = Mutex::new(None);
}

/// Redirects `target` into `sink` on the process-wide reactor, starting it
/// if needed.
pub fn redirect(target: RawFd, sink: impl LogSink + 'static) -> Result<()> {
    let mut global = GLOBAL.lock();
    if global.is_none() {
        *global = Some(Reactor::start()?);
    }
    global.as_ref().ok_or(Error::Stopped)?.redirect(target, sink)
}

/// Redirects `target` into size-rotated files named `name` under the current
/// directory, with default settings.
pub fn redirect_named(target: RawFd, name: &str) -> Result<()> {
    let rotate = SizeRotate::builder().name(name).build();
    redirect(target, Logger::new(rotate)?)
}

/// Stops the process-wide reactor and flushes every sink it owned.
///
/// A later [`redirect`] starts a fresh reactor.
pub fn shutdown() -> Result<()> {
    let reactor = GLOBAL.lock().take();
    match reactor {
        Some(mut reactor) => reactor.stop(),
        None => Ok(()),
    }
}

mod sys {
    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

    fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret)
        }
    }

    pub fn pipe() -> io::Result<(OwnedFd, OwnedFd)> {
        let mut fds = [0 as libc::c_int; 2];
        cvt(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) })?;
        Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
    }

    pub fn set_nonblocking(fd: &impl AsRawFd) -> io::Result<()> {
        let fd = fd.as_raw_fd();
        let flags = cvt(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
        cvt(unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) })?;
        Ok(())
    }

    pub fn clear_cloexec(fd: &impl AsRawFd) -> io::Result<()> {
        cvt(unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, 0) })?;
        Ok(())
    }

    /// Makes `target` refer to the same open file as `fd`.
    pub fn dup2(fd: &impl AsRawFd, target: RawFd) -> io::Result<()> {
        loop {
            match cvt(unsafe { libc::dup2(fd.as_raw_fd(), target) }) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => return result.map(|_| ()),
            }
        }
    }

    pub fn epoll_create() -> io::Result<OwnedFd> {
        let fd = cvt(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })?;
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    pub fn epoll_add(epoll: &OwnedFd, fd: &impl AsRawFd, token: u64) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: libc::EPOLLIN as u32,
            u64: token,
        };
        cvt(unsafe {
            libc::epoll_ctl(
                epoll.as_raw_fd(),
                libc::EPOLL_CTL_ADD,
                fd.as_raw_fd(),
                &mut event,
            )
        })?;
        Ok(())
    }

    /// Best effort; closing the descriptor deregisters it anyway.
    pub fn epoll_del(epoll: &OwnedFd, fd: &impl AsRawFd) {
        let _ = cvt(unsafe {
            libc::epoll_ctl(
                epoll.as_raw_fd(),
                libc::EPOLL_CTL_DEL,
                fd.as_raw_fd(),
                std::ptr::null_mut(),
            )
        });
    }

    pub fn epoll_wait(
        epoll: &OwnedFd,
        events: &mut [libc::epoll_event],
        timeout_ms: libc::c_int,
    ) -> io::Result<usize> {
        let n = cvt(unsafe {
            libc::epoll_wait(
                epoll.as_raw_fd(),
                events.as_mut_ptr(),
                events.len() as libc::c_int,
                timeout_ms,
            )
        })?;
        Ok(n as usize)
    }
}
