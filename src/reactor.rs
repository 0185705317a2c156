//! Reactor interface.
//!
//! The poll/epoll dispatcher itself lives outside this crate. Components that
//! need readiness notifications register socket handles through [`Reactor`]
//! and expose `handle_*` entry points that the dispatcher calls when a
//! registered handle becomes readable, writable, times out or fails.

use std::fmt;
use std::io;

/// OS-level socket handle as seen by the reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(pub i32);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Readiness a registration waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
    ReadWrite,
}

impl Interest {
    pub fn is_readable(&self) -> bool {
        matches!(self, Interest::Read | Interest::ReadWrite)
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, Interest::Write | Interest::ReadWrite)
    }
}

/// Event delivered by the dispatcher for a registered handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorEvent {
    Readable,
    Writable,
    Timeout,
    Error,
}

/// Registration surface of the external event loop.
///
/// Exactly one registration maps to one live socket at a time; callers
/// unregister a handle before registering its replacement.
pub trait Reactor {
    fn register(&mut self, socket: SocketId, interest: Interest) -> io::Result<()>;

    fn modify(&mut self, socket: SocketId, interest: Interest) -> io::Result<()>;

    fn unregister(&mut self, socket: SocketId) -> io::Result<()>;
}

impl<R> Reactor for &mut R
where
    R: Reactor + ?Sized,
{
    fn register(&mut self, socket: SocketId, interest: Interest) -> io::Result<()> {
        (**self).register(socket, interest)
    }

    fn modify(&mut self, socket: SocketId, interest: Interest) -> io::Result<()> {
        (**self).modify(socket, interest)
    }

    fn unregister(&mut self, socket: SocketId) -> io::Result<()> {
        (**self).unregister(socket)
    }
}
