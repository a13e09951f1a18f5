//! In-process transport: every world rank is a thread sharing one mailbox set

use super::Comm;
use super::transport::{Envelope, Transport};
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Context id of the world communicator
pub(crate) const WORLD_CONTEXT: u64 = 0x9e37_79b9_7f4a_7c15;

#[derive(Debug, Default)]
struct Mailbox {
    queues: Mutex<HashMap<(usize, Envelope), VecDeque<Vec<u8>>>>,
    arrived: Condvar,
}

/// Mailbox transport for SPMD programs run as threads of one process
///
/// Each destination rank owns a mailbox keyed by `(source, envelope)`;
/// `send` appends and wakes the owner, `recv` blocks on a condition variable.
#[derive(Debug)]
pub struct LocalTransport {
    mailboxes: Vec<Mailbox>,
    recv_timeout: Option<Duration>,
}

impl LocalTransport {
    /// Create a transport for `size` ranks
    ///
    /// With `recv_timeout` set, a receive that waits longer fails with
    /// [`Error::Timeout`] instead of blocking forever.
    pub fn new(size: usize, recv_timeout: Option<Duration>) -> Self {
        assert!(size > 0, "a transport needs at least one rank");
        Self {
            mailboxes: (0..size).map(|_| Mailbox::default()).collect(),
            recv_timeout,
        }
    }

    /// World communicators for `size` ranks, one per thread
    pub fn universe(size: usize) -> Vec<Comm> {
        Self::universe_with_timeout(size, None)
    }

    /// Like [`universe`](Self::universe) with a receive deadline
    pub fn universe_with_timeout(size: usize, recv_timeout: Option<Duration>) -> Vec<Comm> {
        let transport: Arc<dyn Transport> = Arc::new(Self::new(size, recv_timeout));
        let members: Arc<[usize]> = (0..size).collect();
        (0..size)
            .map(|rank| Comm::from_parts(Arc::clone(&transport), Arc::clone(&members), rank, WORLD_CONTEXT))
            .collect()
    }

    fn mailbox(&self, rank: usize) -> Result<&Mailbox> {
        self.mailboxes
            .get(rank)
            .ok_or_else(|| Error::Transport(format!("world rank {rank} does not exist")))
    }
}

impl Transport for LocalTransport {
    fn size(&self) -> usize {
        self.mailboxes.len()
    }

    fn send(&self, from: usize, to: usize, envelope: Envelope, payload: Vec<u8>) -> Result<()> {
        let mailbox = self.mailbox(to)?;
        mailbox
            .queues
            .lock()
            .entry((from, envelope))
            .or_default()
            .push_back(payload);
        mailbox.arrived.notify_all();
        Ok(())
    }

    fn recv(&self, at: usize, from: usize, envelope: Envelope) -> Result<Vec<u8>> {
        let mailbox = self.mailbox(at)?;
        let deadline = self.recv_timeout.map(|t| (Instant::now() + t, t));
        let mut queues = mailbox.queues.lock();
        loop {
            if let Some(queue) = queues.get_mut(&(from, envelope)) {
                if let Some(payload) = queue.pop_front() {
                    if queue.is_empty() {
                        queues.remove(&(from, envelope));
                    }
                    return Ok(payload);
                }
            }
            match deadline {
                Some((at_time, waited)) => {
                    if mailbox.arrived.wait_until(&mut queues, at_time).timed_out() {
                        let ready = queues
                            .get(&(from, envelope))
                            .is_some_and(|queue| !queue.is_empty());
                        if !ready {
                            return Err(Error::Timeout {
                                source_rank: from,
                                waited,
                            });
                        }
                    }
                }
                None => mailbox.arrived.wait(&mut queues),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(tag: u32) -> Envelope {
        Envelope { context: 7, tag }
    }

    #[test]
    fn test_messages_are_fifo_per_envelope() {
        let transport = LocalTransport::new(2, None);
        transport.send(0, 1, envelope(0), vec![1]).unwrap();
        transport.send(0, 1, envelope(1), vec![9]).unwrap();
        transport.send(0, 1, envelope(0), vec![2]).unwrap();

        assert_eq!(transport.recv(1, 0, envelope(1)).unwrap(), vec![9]);
        assert_eq!(transport.recv(1, 0, envelope(0)).unwrap(), vec![1]);
        assert_eq!(transport.recv(1, 0, envelope(0)).unwrap(), vec![2]);
    }

    #[test]
    fn test_recv_times_out() {
        let transport = LocalTransport::new(2, Some(Duration::from_millis(20)));
        let err = transport.recv(0, 1, envelope(0)).unwrap_err();
        assert!(matches!(err, Error::Timeout { source_rank: 1, .. }));
    }

    #[test]
    fn test_cross_thread_delivery() {
        let transport = Arc::new(LocalTransport::new(2, Some(Duration::from_secs(10))));
        let sender = Arc::clone(&transport);
        let handle = std::thread::spawn(move || {
            sender.send(1, 0, envelope(3), vec![4, 5, 6]).unwrap();
        });
        assert_eq!(transport.recv(0, 1, envelope(3)).unwrap(), vec![4, 5, 6]);
        handle.join().unwrap();
    }

    #[test]
    fn test_unknown_rank_is_an_error() {
        let transport = LocalTransport::new(1, None);
        assert!(transport.send(0, 3, envelope(0), vec![]).is_err());
    }
}
