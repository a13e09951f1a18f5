//! Route planning between distribution pairs
//!
//! Every direct conversion the hop primitives support is an edge in a small
//! graph over the 14 valid pairs. A conversion without a direct edge is the
//! cheapest chain of edges. The search is deterministic, so all processes
//! agree on the same chain without talking.

use crate::dist::{Dist, DistPair, VALID_PAIRS};
use crate::error::{Error, Result};
use crate::grid::CommKind;
use std::fmt;
use std::sync::LazyLock;

use Dist::{Circ, Mc, Md, Mr, Star, Vc, Vr};

/// The communication pattern of one hop
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HopKind {
    /// Same layout: local copy
    Copy,
    /// Each process keeps a subset of what it already holds
    Filter,
    /// One paired send/receive per process (realignment, `VC` ↔ `VR`)
    Permute,
    /// Move `MD` or `CIRC` data to another root
    RootMove,
    /// All-gather over a sub-communicator
    Gather,
    /// All-to-all within a sub-communicator
    Exchange,
    /// Gather everything onto the `CIRC` root
    ToRoot,
    /// Scatter from the `CIRC` root
    FromRoot,
    /// Broadcast from the `CIRC` root
    Broadcast,
}

impl HopKind {
    /// Relative cost used by the router
    pub fn cost(self) -> u32 {
        match self {
            HopKind::Copy => 0,
            HopKind::Filter => 1,
            HopKind::Permute | HopKind::RootMove => 2,
            HopKind::Gather | HopKind::Exchange | HopKind::ToRoot | HopKind::FromRoot | HopKind::Broadcast => 3,
        }
    }
}

/// One direct conversion
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Hop {
    /// Source pair
    pub from: DistPair,
    /// Destination pair
    pub to: DistPair,
    /// Communication pattern
    pub kind: HopKind,
    /// Communicator the pattern runs over
    pub comm: CommKind,
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{}] -{:?}/{:?}-> [{},{}]",
            self.from.0, self.from.1, self.kind, self.comm, self.to.0, self.to.1
        )
    }
}

const fn hop(from: DistPair, to: DistPair, kind: HopKind, comm: CommKind) -> Hop {
    Hop { from, to, kind, comm }
}

fn catalog() -> Vec<Hop> {
    use HopKind::{Broadcast, Exchange, Filter, FromRoot, Gather, Permute, ToRoot};

    let gathers = [
        ((Mc, Mr), (Star, Mr), CommKind::Mc),
        ((Mc, Mr), (Mc, Star), CommKind::Mr),
        ((Mr, Mc), (Star, Mc), CommKind::Mr),
        ((Mr, Mc), (Mr, Star), CommKind::Mc),
        ((Mc, Star), (Star, Star), CommKind::Mc),
        ((Star, Mc), (Star, Star), CommKind::Mc),
        ((Mr, Star), (Star, Star), CommKind::Mr),
        ((Star, Mr), (Star, Star), CommKind::Mr),
        ((Vc, Star), (Mc, Star), CommKind::Mr),
        ((Vr, Star), (Mr, Star), CommKind::Mc),
        ((Star, Vc), (Star, Mc), CommKind::Mr),
        ((Star, Vr), (Star, Mr), CommKind::Mc),
        ((Vc, Star), (Star, Star), CommKind::Vc),
        ((Star, Vc), (Star, Star), CommKind::Vc),
        ((Vr, Star), (Star, Star), CommKind::Vr),
        ((Star, Vr), (Star, Star), CommKind::Vr),
        ((Md, Star), (Star, Star), CommKind::Md),
        ((Star, Md), (Star, Star), CommKind::Md),
    ];

    let mut edges = Vec::new();
    for (from, to, comm) in gathers {
        edges.push(hop(from, to, Gather, comm));
    }
    // Filters undo the gathers that do not come out of [STAR,STAR]
    for (from, to, _) in gathers {
        if to != (Star, Star) {
            edges.push(hop(to, from, Filter, CommKind::Own));
        }
    }
    for to in VALID_PAIRS {
        if to != (Star, Star) {
            edges.push(hop((Star, Star), to, Filter, CommKind::Own));
        }
    }
    for (from, to, comm) in [
        ((Mc, Mr), (Vc, Star), CommKind::Mr),
        ((Mc, Mr), (Star, Vr), CommKind::Mc),
        ((Mr, Mc), (Vr, Star), CommKind::Mc),
        ((Mr, Mc), (Star, Vc), CommKind::Mr),
    ] {
        edges.push(hop(from, to, Exchange, comm));
        edges.push(hop(to, from, Exchange, comm));
    }
    edges.push(hop((Vc, Star), (Vr, Star), Permute, CommKind::Vc));
    edges.push(hop((Vr, Star), (Vc, Star), Permute, CommKind::Vc));
    edges.push(hop((Star, Vc), (Star, Vr), Permute, CommKind::Vc));
    edges.push(hop((Star, Vr), (Star, Vc), Permute, CommKind::Vc));
    edges.push(hop((Mc, Mr), (Circ, Circ), ToRoot, CommKind::Vc));
    edges.push(hop((Circ, Circ), (Mc, Mr), FromRoot, CommKind::Vc));
    edges.push(hop((Circ, Circ), (Star, Star), Broadcast, CommKind::Vc));
    edges
}

static EDGES: LazyLock<Vec<Hop>> = LazyLock::new(catalog);

/// Every direct conversion, in tie-breaking order
pub fn edges() -> &'static [Hop] {
    &EDGES
}

fn node(pair: DistPair) -> usize {
    VALID_PAIRS
        .iter()
        .position(|&p| p == pair)
        .unwrap_or_else(|| panic!("[{},{}] is not a supported distribution pair", pair.0, pair.1))
}

/// Cheapest chain of hops from `from` to `to`; empty when they are equal
pub fn plan(from: DistPair, to: DistPair) -> Result<Vec<Hop>> {
    let (start, goal) = (node(from), node(to));
    let n = VALID_PAIRS.len();
    let mut dist = vec![u32::MAX; n];
    let mut via: Vec<Option<Hop>> = vec![None; n];
    let mut done = vec![false; n];
    dist[start] = 0;

    loop {
        let Some(u) = (0..n).filter(|&v| !done[v] && dist[v] != u32::MAX).min_by_key(|&v| (dist[v], v)) else {
            break;
        };
        if u == goal {
            break;
        }
        done[u] = true;
        for edge in edges().iter().filter(|e| node(e.from) == u) {
            let v = node(edge.to);
            let candidate = dist[u] + edge.kind.cost();
            if candidate < dist[v] {
                dist[v] = candidate;
                via[v] = Some(*edge);
            }
        }
    }

    if dist[goal] == u32::MAX {
        return Err(Error::NotImplemented {
            feature: "redistribution between these distribution pairs",
        });
    }
    let mut route = Vec::new();
    let mut at = goal;
    while at != start {
        let Some(edge) = via[at] else {
            return Err(Error::NotImplemented {
                feature: "redistribution between these distribution pairs",
            });
        };
        route.push(edge);
        at = node(edge.from);
    }
    route.reverse();
    Ok(route)
}

/// Total router cost of a chain
pub fn route_cost(route: &[Hop]) -> u32 {
    route.iter().map(|h| h.kind.cost()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_pair_reaches_every_pair() {
        for from in VALID_PAIRS {
            for to in VALID_PAIRS {
                let route = plan(from, to).unwrap();
                if from == to {
                    assert!(route.is_empty());
                    continue;
                }
                assert_eq!(route.first().map(|h| h.from), Some(from));
                assert_eq!(route.last().map(|h| h.to), Some(to));
                for pair in route.windows(2) {
                    assert_eq!(pair[0].to, pair[1].from);
                }
            }
        }
    }

    #[test]
    fn test_direct_edges_are_preferred() {
        let route = plan((Mc, Mr), (Star, Mr)).unwrap();
        assert_eq!(route.len(), 1);
        assert_eq!(route[0].kind, HopKind::Gather);
        assert_eq!(route[0].comm, CommKind::Mc);

        let route = plan((Star, Star), (Md, Star)).unwrap();
        assert_eq!(route.len(), 1);
        assert_eq!(route[0].kind, HopKind::Filter);

        let route = plan((Vc, Star), (Vr, Star)).unwrap();
        assert_eq!(route[0].kind, HopKind::Permute);
    }

    #[test]
    fn test_chained_route_to_transposed_pair() {
        let route = plan((Mc, Mr), (Mr, Mc)).unwrap();
        assert!(route.len() >= 2);
        assert_eq!(route_cost(&route), route.iter().map(|h| h.kind.cost()).sum::<u32>());
        // [MC,MR] -> [VC,STAR] -> [VR,STAR] -> [MR,MC] costs 3 + 2 + 3
        assert!(route_cost(&route) <= 8);
    }

    #[test]
    fn test_plan_is_deterministic() {
        for from in VALID_PAIRS {
            for to in VALID_PAIRS {
                assert_eq!(plan(from, to).unwrap(), plan(from, to).unwrap());
            }
        }
    }
}
