//! Integration tests for process grid construction

mod common;

use common::spmd;
use distla::grid::find_factor;
use distla::prelude::*;

#[test]
fn test_find_factor() {
    assert_eq!(find_factor(1), 1);
    assert_eq!(find_factor(4), 2);
    assert_eq!(find_factor(6), 2);
    assert_eq!(find_factor(7), 1);
    assert_eq!(find_factor(12), 3);
    assert_eq!(find_factor(16), 4);
}

#[test]
fn test_default_grid_shape_and_comms() {
    let results = spmd(6, |env| {
        let grid = env.default_grid()?;
        let coords = grid.my_coords();
        let sizes = [
            grid.comm(CommKind::Vc).size(),
            grid.comm(CommKind::Vr).size(),
            grid.comm(CommKind::Mc).size(),
            grid.comm(CommKind::Mr).size(),
            grid.comm(CommKind::Md).size(),
            grid.comm(CommKind::MdPerp).size(),
        ];
        let ranks = [
            grid.comm(CommKind::Mc).rank(),
            grid.comm(CommKind::Mr).rank(),
            grid.comm(CommKind::Md).rank(),
        ];
        Ok((grid.height(), grid.width(), grid.gcd(), grid.lcm(), coords, sizes, ranks))
    });
    for (vc, (h, w, gcd, lcm, coords, sizes, ranks)) in results.into_iter().enumerate() {
        assert_eq!((h, w, gcd, lcm), (2, 3, 1, 6));
        assert_eq!(coords.vc, vc);
        assert_eq!((coords.mc, coords.mr), (vc % 2, vc / 2));
        assert_eq!(coords.vr, coords.mr + coords.mc * 3);
        assert_eq!(sizes, [6, 6, 2, 3, 6, 1]);
        assert_eq!(ranks, [coords.mc, coords.mr, coords.diag_path_rank]);
    }
}

#[test]
fn test_diagonal_paths_on_square_grid() {
    let results = spmd(4, |env| {
        let grid = env.default_grid()?;
        let vc = grid.vc_rank().unwrap_or(usize::MAX);
        Ok((vc, grid.diag_path(vc), grid.diag_path_rank(vc), grid.first_vc_rank(1)))
    });
    let expected = [(0, 0, 0), (1, 1, 1), (2, 1, 0), (3, 0, 1)];
    for ((vc, path, step, first), (evc, epath, estep)) in results.into_iter().zip(expected) {
        assert_eq!((vc, path, step), (evc, epath, estep));
        assert_eq!(first, 2);
    }
}

#[test]
fn test_diagonal_path_walks_every_process() {
    let results = spmd(6, |env| {
        let grid = env.default_grid()?;
        Ok((0..6).map(|step| grid.vc_on_path(0, step)).collect::<Vec<_>>())
    });
    for walk in results {
        assert_eq!(walk, vec![0, 3, 4, 1, 2, 5]);
    }
}

#[test]
fn test_non_owning_ranks() {
    let results = spmd(5, |env| {
        let grid = Grid::with_owners(env.world(), vec![4, 0, 1, 2], 2)?;
        let mut a = DistMatrix::<f64>::new(&grid, Dist::Mc, Dist::Mr);
        if grid.vc_rank() == Some(0) {
            a.resize(5, 3);
        }
        a.make_consistent()?;
        Ok((grid.vc_rank(), grid.viewing_to_vc(4), a.height(), a.width(), a.local_height()))
    });
    assert_eq!(results[4].0, Some(0));
    assert_eq!(results[3].0, None);
    assert_eq!(results[3].4, 0);
    for (vc, owner_of_4, h, w, _) in &results {
        assert_eq!(*owner_of_4, Some(0));
        assert_eq!((*h, *w), (5, 3));
        if let Some(vc) = vc {
            assert!(*vc < 4);
        }
    }
}

#[test]
fn test_scoped_block_size_reaches_grid() {
    let results = spmd(1, |env| {
        let grid = env.default_grid()?;
        let before = grid.block_size();
        let during = {
            let _guard = env.scoped_block_size(7);
            grid.block_size()
        };
        Ok((before, during, grid.block_size()))
    });
    assert_eq!(results[0], (128, 7, 128));
}
