//! Transport trait: the point-to-point layer every collective is built on

use crate::error::Result;
use std::fmt;

/// Message matching key
///
/// Messages between a pair of world ranks that share an envelope are
/// delivered in send order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Envelope {
    /// Communicator context id
    pub context: u64,
    /// Operation tag within the context
    pub tag: u32,
}

/// Byte-level messaging between world ranks
///
/// Implementations must make `send` non-blocking with respect to the
/// matching `recv` (buffered), and must deliver messages with equal
/// `(from, to, envelope)` in order. A blocking `recv` may return
/// [`Error::Timeout`](crate::error::Error::Timeout) if the transport was
/// configured with a deadline.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Number of world ranks
    fn size(&self) -> usize;

    /// Queue `payload` for delivery from world rank `from` to world rank `to`
    fn send(&self, from: usize, to: usize, envelope: Envelope, payload: Vec<u8>) -> Result<()>;

    /// Block until a message from `from` to `at` with `envelope` arrives
    fn recv(&self, at: usize, from: usize, envelope: Envelope) -> Result<Vec<u8>>;
}
