//! Communicators and blocking collectives
//!
//! A [`Comm`] is an ordered subset of world ranks plus a context id that
//! keeps its traffic apart from every other communicator. All collectives
//! are blocking and must be entered by every member in the same order.
//!
//! Payloads are flat `bytemuck::Pod` slices; element counts must agree
//! between matching calls. Reductions gather every contribution and fold in
//! rank order, so all members observe bitwise identical results.

mod local;
mod transport;

pub use local::LocalTransport;
pub use transport::{Envelope, Transport};

use crate::dtype::Element;
use crate::error::{Error, Result};
use bytemuck::Pod;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

const TAG_P2P: u32 = 0;
const TAG_BCAST: u32 = 1;
const TAG_GATHER: u32 = 2;
const TAG_SCATTER: u32 = 3;
const TAG_ALLGATHER: u32 = 4;
const TAG_ALLTOALL: u32 = 5;

/// Reduction operators for [`Comm::all_reduce`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    /// Elementwise sum
    Sum,
    /// Elementwise maximum
    Max,
    /// Elementwise minimum
    Min,
}

/// A communicator handle
///
/// Cloning is cheap and yields a handle to the same communicator; clones
/// share the split counter, so a split issued through any clone counts for
/// all of them.
#[derive(Clone)]
pub struct Comm {
    transport: Arc<dyn Transport>,
    members: Arc<[usize]>,
    rank: usize,
    context: u64,
    splits: Arc<AtomicU64>,
}

impl fmt::Debug for Comm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Comm")
            .field("rank", &self.rank)
            .field("size", &self.members.len())
            .field("context", &format_args!("{:#018x}", self.context))
            .finish()
    }
}

fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

fn derive_context(parent: u64, seq: u64, color: u64) -> u64 {
    mix(mix(parent ^ mix(seq)) ^ color.rotate_left(17))
}

fn to_bytes<T: Pod>(data: &[T]) -> Vec<u8> {
    bytemuck::cast_slice(data).to_vec()
}

fn copy_from_bytes<T: Pod>(bytes: &[u8], out: &mut [T]) -> Result<()> {
    let dst: &mut [u8] = bytemuck::cast_slice_mut(out);
    if dst.len() != bytes.len() {
        return Err(Error::Transport(format!(
            "message size mismatch: expected {} bytes, received {}",
            dst.len(),
            bytes.len()
        )));
    }
    dst.copy_from_slice(bytes);
    Ok(())
}

impl Comm {
    pub(crate) fn from_parts(
        transport: Arc<dyn Transport>,
        members: Arc<[usize]>,
        rank: usize,
        context: u64,
    ) -> Self {
        debug_assert!(rank < members.len());
        Self {
            transport,
            members,
            rank,
            context,
            splits: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Rank of the calling process within this communicator
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of members
    #[inline]
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Context id; equal ids mean the same communicator
    #[inline]
    pub fn context(&self) -> u64 {
        self.context
    }

    /// World rank of the calling process
    #[inline]
    pub fn world_rank(&self) -> usize {
        self.members[self.rank]
    }

    /// World rank of member `rank`
    #[inline]
    pub fn world_rank_of(&self, rank: usize) -> usize {
        self.members[rank]
    }

    /// Whether two handles name the same communicator
    pub fn same_as(&self, other: &Comm) -> bool {
        self.context == other.context && self.members == other.members
    }

    /// A communicator containing only the calling process
    ///
    /// Not collective: no peer is involved.
    pub fn self_comm(&self) -> Comm {
        let world = self.world_rank();
        Comm::from_parts(
            Arc::clone(&self.transport),
            Arc::from(vec![world]),
            0,
            derive_context(self.context, u64::MAX, world as u64),
        )
    }

    fn envelope(&self, tag: u32) -> Envelope {
        Envelope {
            context: self.context,
            tag,
        }
    }

    fn send_tagged<T: Pod>(&self, data: &[T], dest: usize, tag: u32) -> Result<()> {
        self.transport
            .send(self.world_rank(), self.members[dest], self.envelope(tag), to_bytes(data))
    }

    fn recv_tagged<T: Pod>(&self, out: &mut [T], source: usize, tag: u32) -> Result<()> {
        let bytes = self
            .transport
            .recv(self.world_rank(), self.members[source], self.envelope(tag))?;
        copy_from_bytes(&bytes, out)
    }

    /// Send `data` to member `dest`
    pub fn send<T: Pod>(&self, data: &[T], dest: usize) -> Result<()> {
        self.send_tagged(data, dest, TAG_P2P)
    }

    /// Receive exactly `out.len()` elements from member `source`
    pub fn recv<T: Pod>(&self, out: &mut [T], source: usize) -> Result<()> {
        self.recv_tagged(out, source, TAG_P2P)
    }

    /// Paired exchange: send to `dest` while receiving from `source`
    pub fn send_recv<T: Pod>(&self, send: &[T], dest: usize, recv: &mut [T], source: usize) -> Result<()> {
        if dest == self.rank && source == self.rank {
            recv.copy_from_slice(send);
            return Ok(());
        }
        self.send(send, dest)?;
        self.recv(recv, source)
    }

    /// Binomial-tree broadcast of `buf` from member `root`
    pub fn broadcast<T: Pod>(&self, buf: &mut [T], root: usize) -> Result<()> {
        let size = self.size();
        if size == 1 {
            return Ok(());
        }
        let relative = (self.rank + size - root) % size;
        let mut mask = 1;
        while mask < size {
            if relative & mask != 0 {
                let source = (relative - mask + root) % size;
                self.recv_tagged(buf, source, TAG_BCAST)?;
                break;
            }
            mask <<= 1;
        }
        mask >>= 1;
        while mask > 0 {
            if relative + mask < size {
                let dest = (relative + mask + root) % size;
                self.send_tagged(buf, dest, TAG_BCAST)?;
            }
            mask >>= 1;
        }
        Ok(())
    }

    /// Gather equal-size contributions onto `root`
    ///
    /// `recv` is only touched on the root and must hold `size * send.len()`
    /// elements there.
    pub fn gather<T: Pod>(&self, send: &[T], recv: &mut [T], root: usize) -> Result<()> {
        if self.rank != root {
            return self.send_tagged(send, root, TAG_GATHER);
        }
        let count = send.len();
        assert_eq!(recv.len(), count * self.size(), "gather buffer has the wrong size");
        for source in 0..self.size() {
            let chunk = &mut recv[source * count..(source + 1) * count];
            if source == self.rank {
                chunk.copy_from_slice(send);
            } else {
                self.recv_tagged(chunk, source, TAG_GATHER)?;
            }
        }
        Ok(())
    }

    /// Scatter equal-size chunks of `send` (significant on `root` only)
    pub fn scatter<T: Pod>(&self, send: &[T], recv: &mut [T], root: usize) -> Result<()> {
        if self.rank != root {
            return self.recv_tagged(recv, root, TAG_SCATTER);
        }
        let count = recv.len();
        assert_eq!(send.len(), count * self.size(), "scatter buffer has the wrong size");
        for dest in 0..self.size() {
            let chunk = &send[dest * count..(dest + 1) * count];
            if dest == self.rank {
                recv.copy_from_slice(chunk);
            } else {
                self.send_tagged(chunk, dest, TAG_SCATTER)?;
            }
        }
        Ok(())
    }

    /// Every member receives every contribution, ordered by rank
    pub fn all_gather<T: Pod>(&self, send: &[T], recv: &mut [T]) -> Result<()> {
        let count = send.len();
        let size = self.size();
        assert_eq!(recv.len(), count * size, "all-gather buffer has the wrong size");
        for dest in 0..size {
            if dest != self.rank {
                self.send_tagged(send, dest, TAG_ALLGATHER)?;
            }
        }
        for source in 0..size {
            let chunk = &mut recv[source * count..(source + 1) * count];
            if source == self.rank {
                chunk.copy_from_slice(send);
            } else {
                self.recv_tagged(chunk, source, TAG_ALLGATHER)?;
            }
        }
        Ok(())
    }

    /// Personalized exchange: chunk `k` of `send` goes to member `k`, and
    /// chunk `k` of `recv` comes from member `k`
    pub fn all_to_all<T: Pod>(&self, send: &[T], recv: &mut [T]) -> Result<()> {
        let size = self.size();
        assert_eq!(send.len(), recv.len(), "all-to-all buffers differ in size");
        assert_eq!(send.len() % size, 0, "all-to-all buffer not divisible by comm size");
        let count = send.len() / size;
        for dest in 0..size {
            if dest != self.rank {
                self.send_tagged(&send[dest * count..(dest + 1) * count], dest, TAG_ALLTOALL)?;
            }
        }
        for source in 0..size {
            let chunk = &mut recv[source * count..(source + 1) * count];
            if source == self.rank {
                chunk.copy_from_slice(&send[source * count..(source + 1) * count]);
            } else {
                self.recv_tagged(chunk, source, TAG_ALLTOALL)?;
            }
        }
        Ok(())
    }

    /// All-reduce with a caller-supplied elementwise fold
    ///
    /// Contributions are combined in rank order on every member.
    pub fn all_reduce_with<T: Pod, F>(&self, buf: &mut [T], fold: F) -> Result<()>
    where
        F: Fn(T, T) -> T,
    {
        let size = self.size();
        if size == 1 {
            return Ok(());
        }
        let count = buf.len();
        let mut all = vec![T::zeroed(); count * size];
        self.all_gather(buf, &mut all)?;
        buf.copy_from_slice(&all[..count]);
        for source in 1..size {
            let chunk = &all[source * count..(source + 1) * count];
            for (acc, &x) in buf.iter_mut().zip(chunk) {
                *acc = fold(*acc, x);
            }
        }
        Ok(())
    }

    /// Elementwise sum over all members
    pub fn all_reduce_sum<T: Element>(&self, buf: &mut [T]) -> Result<()> {
        self.all_reduce_with(buf, |a, b| a + b)
    }

    /// All-reduce with an ordered operator
    pub fn all_reduce<T: Element + PartialOrd>(&self, buf: &mut [T], op: ReduceOp) -> Result<()> {
        match op {
            ReduceOp::Sum => self.all_reduce_sum(buf),
            ReduceOp::Max => self.all_reduce_with(buf, |a, b| if b > a { b } else { a }),
            ReduceOp::Min => self.all_reduce_with(buf, |a, b| if b < a { b } else { a }),
        }
    }

    /// Scalar convenience for [`all_reduce`](Self::all_reduce)
    pub fn all_reduce_scalar<T: Element + PartialOrd>(&self, value: T, op: ReduceOp) -> Result<T> {
        let mut buf = [value];
        self.all_reduce(&mut buf, op)?;
        Ok(buf[0])
    }

    /// Sum every member's `send`, then keep chunk `rank` of the result
    pub fn reduce_scatter_sum<T: Element>(&self, send: &[T], recv: &mut [T]) -> Result<()> {
        let size = self.size();
        assert_eq!(send.len(), recv.len() * size, "reduce-scatter buffer has the wrong size");
        let mut exchanged = vec![T::zeroed(); send.len()];
        self.all_to_all(send, &mut exchanged)?;
        let count = recv.len();
        recv.copy_from_slice(&exchanged[..count]);
        for source in 1..size {
            for (acc, &x) in recv.iter_mut().zip(&exchanged[source * count..(source + 1) * count]) {
                *acc = *acc + x;
            }
        }
        Ok(())
    }

    /// Block until every member has arrived
    pub fn barrier(&self) -> Result<()> {
        let mut all = vec![0u8; self.size()];
        self.all_gather(&[0u8], &mut all)
    }

    /// Partition into sub-communicators by `color`
    ///
    /// Members passing the same `Some(color)` end up in one communicator,
    /// ordered by `(key, parent rank)`. Members passing `None` get `None`.
    /// Collective over this communicator.
    pub fn split(&self, color: Option<u64>, key: usize) -> Result<Option<Comm>> {
        let seq = self.splits.fetch_add(1, Ordering::Relaxed);
        const NO_COLOR: u64 = u64::MAX;
        let mine = [color.unwrap_or(NO_COLOR), key as u64];
        let mut all = vec![0u64; 2 * self.size()];
        self.all_gather(&mine, &mut all)?;

        let Some(color) = color else {
            return Ok(None);
        };
        assert_ne!(color, NO_COLOR, "color u64::MAX is reserved");
        let mut group: Vec<(u64, usize)> = all
            .chunks_exact(2)
            .enumerate()
            .filter(|(_, entry)| entry[0] == color)
            .map(|(parent_rank, entry)| (entry[1], parent_rank))
            .collect();
        group.sort_unstable();
        let members: Arc<[usize]> = group.iter().map(|&(_, r)| self.members[r]).collect();
        let rank = group
            .iter()
            .position(|&(_, r)| r == self.rank)
            .ok_or_else(|| Error::Transport("calling rank missing from its own split".into()))?;
        let context = derive_context(self.context, seq, color);
        tracing::trace!(
            parent = format_args!("{:#x}", self.context),
            color,
            size = members.len(),
            rank,
            "split communicator"
        );
        Ok(Some(Comm::from_parts(Arc::clone(&self.transport), members, rank, context)))
    }

    /// Collective duplicate with a fresh context
    pub fn dup(&self) -> Result<Comm> {
        self.split(Some(0), self.rank)?
            .ok_or_else(|| Error::Transport("duplicate lost the calling rank".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn run<F>(size: usize, f: F)
    where
        F: Fn(Comm) + Sync,
    {
        let comms = LocalTransport::universe_with_timeout(size, Some(Duration::from_secs(20)));
        std::thread::scope(|s| {
            for comm in comms {
                let f = &f;
                s.spawn(move || f(comm));
            }
        });
    }

    #[test]
    fn test_broadcast_from_every_root() {
        run(5, |comm| {
            for root in 0..comm.size() {
                let mut buf = if comm.rank() == root { [root as f64, 2.5] } else { [0.0, 0.0] };
                comm.broadcast(&mut buf, root).unwrap();
                assert_eq!(buf, [root as f64, 2.5]);
            }
        });
    }

    #[test]
    fn test_all_gather_orders_by_rank() {
        run(4, |comm| {
            let mine = [comm.rank() as i64 * 10, comm.rank() as i64];
            let mut all = [0i64; 8];
            comm.all_gather(&mine, &mut all).unwrap();
            assert_eq!(all, [0, 0, 10, 1, 20, 2, 30, 3]);
        });
    }

    #[test]
    fn test_all_to_all_and_reduce_scatter() {
        run(3, |comm| {
            let r = comm.rank() as i64;
            let send: Vec<i64> = (0..3).map(|dest| 10 * r + dest).collect();
            let mut recv = vec![0i64; 3];
            comm.all_to_all(&send, &mut recv).unwrap();
            assert_eq!(recv, (0..3).map(|src| 10 * src + r).collect::<Vec<_>>());

            let mut mine = [0i64];
            comm.reduce_scatter_sum(&send, &mut mine).unwrap();
            assert_eq!(mine[0], 30 + 3 * r);
        });
    }

    #[test]
    fn test_all_reduce_ops() {
        run(4, |comm| {
            let x = comm.rank() as f64;
            assert_eq!(comm.all_reduce_scalar(x, ReduceOp::Sum).unwrap(), 6.0);
            assert_eq!(comm.all_reduce_scalar(x, ReduceOp::Max).unwrap(), 3.0);
            assert_eq!(comm.all_reduce_scalar(x, ReduceOp::Min).unwrap(), 0.0);
        });
    }

    #[test]
    fn test_gather_and_scatter() {
        run(3, |comm| {
            let mut all = vec![0.0f32; 6];
            comm.gather(&[comm.rank() as f32; 2], &mut all, 1).unwrap();
            if comm.rank() == 1 {
                assert_eq!(all, vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
            }
            let source: Vec<f32> = (0..6).map(|x| x as f32).collect();
            let mut mine = [0.0f32; 2];
            comm.scatter(&source, &mut mine, 1).unwrap();
            let r = comm.rank() as f32;
            assert_eq!(mine, [2.0 * r, 2.0 * r + 1.0]);
        });
    }

    #[test]
    fn test_split_groups_by_color_and_key() {
        run(6, |comm| {
            let color = (comm.rank() % 2) as u64;
            let key = comm.size() - comm.rank();
            let sub = comm.split(Some(color), key).unwrap().unwrap();
            assert_eq!(sub.size(), 3);
            // keys are descending in parent rank, so the order flips
            let expected = 2 - comm.rank() / 2;
            assert_eq!(sub.rank(), expected);

            let total = sub.all_reduce_scalar(comm.rank() as i64, ReduceOp::Sum).unwrap();
            assert_eq!(total, if color == 0 { 6 } else { 9 });

            let excluded = comm.split(if comm.rank() == 0 { None } else { Some(1) }, 0).unwrap();
            assert_eq!(excluded.is_none(), comm.rank() == 0);
        });
    }

    #[test]
    fn test_send_recv_ring() {
        run(4, |comm| {
            let size = comm.size();
            let next = (comm.rank() + 1) % size;
            let prev = (comm.rank() + size - 1) % size;
            let mut got = [0u32];
            comm.send_recv(&[comm.rank() as u32], next, &mut got, prev).unwrap();
            assert_eq!(got[0] as usize, prev);
            comm.barrier().unwrap();
        });
    }

    #[test]
    fn test_size_mismatch_is_reported() {
        run(2, |comm| {
            if comm.rank() == 0 {
                comm.send(&[1.0f64, 2.0], 1).unwrap();
            } else {
                let mut short = [0.0f64];
                assert!(matches!(comm.recv(&mut short, 0), Err(Error::Transport(_))));
            }
        });
    }
}
