//! Integration tests for distributed matrix storage, element access and views

mod common;

use common::{entries, on_grid, sample};
use distla::blas::{make_triangular, set_diagonal};
use distla::dist::VALID_PAIRS;
use distla::prelude::*;

#[test]
fn test_set_then_get_on_square_grid() {
    let results = on_grid(4, |_, grid| {
        assert_eq!((grid.height(), grid.width()), (2, 2));
        let mut a = DistMatrix::<f64>::with_shape(&grid, Dist::Mc, Dist::Mr, 4, 4);
        a.set(2, 1, 7.0);
        let held = a.local_matrix().data().contains(&7.0);
        let first = a.get(2, 1)?;
        let again = a.get(2, 1)?;
        Ok((held, first, again, grid.my_coords()))
    });
    let holders: Vec<_> = results.iter().filter(|r| r.0).map(|r| r.3).collect();
    assert_eq!(holders.len(), 1);
    // Row 2 lives on mesh row 0, column 1 on mesh column 1
    assert_eq!((holders[0].mc, holders[0].mr), (0, 1));
    for (_, first, again, _) in results {
        assert_eq!(first, 7.0);
        assert_eq!(again, 7.0);
    }
}

#[test]
fn test_ownership_totality() {
    let results = on_grid(6, |_, grid| {
        for &(col, row) in VALID_PAIRS.iter() {
            for (ca, ra) in [(0, 0), (1, 1)] {
                let mut a = DistMatrix::<f64>::new(&grid, col, row);
                let meta = a.meta();
                let ca = ca % meta.col_stride();
                let ra = ra % meta.row_stride();
                a.align(ca, ra);
                a.resize(7, 5);
                let meta = a.meta();
                for i in 0..7 {
                    for j in 0..5 {
                        let canonical: Vec<usize> = (0..grid.size())
                            .map(|vc| grid.coords_of(vc))
                            .filter(|c| meta.holds_at(c, i, j) && meta.redundant_rank_of(c) == 0)
                            .map(|c| c.vc)
                            .collect();
                        assert_eq!(canonical, vec![meta.owner(i, j)], "[{col},{row}] entry ({i}, {j})");
                    }
                }
                // Local shapes add up to the global one, counting each copy once
                let counted = if meta.participating() && meta.redundant_comm().rank() == 0 {
                    (a.local_height() * a.local_width()) as i64
                } else {
                    0
                };
                let total = grid.comm(CommKind::Vc).all_reduce_scalar(counted, ReduceOp::Sum)?;
                assert_eq!(total, 35, "[{col},{row}]");
            }
        }
        Ok(())
    });
    assert_eq!(results.len(), 6);
}

#[test]
fn test_from_fn_matches_global_indices() {
    let results = on_grid(4, |_, grid| {
        let a = DistMatrix::from_fn(&grid, Dist::Vr, Dist::Star, 9, 2, |i, j| (10 * i + j) as f64);
        let gathered = a.to_matrix()?;
        let sub = a.get_submatrix(&[8, 0], &[1])?;
        Ok((entries(&gathered), sub.local_matrix().data().to_vec()))
    });
    let expected: Vec<f64> = (0..2).flat_map(|j| (0..9).map(move |i| (10 * i + j) as f64)).collect();
    for (gathered, sub) in results {
        assert_eq!(gathered, expected);
        assert_eq!(sub, vec![81.0, 1.0]);
    }
}

#[test]
fn test_mutable_view_writes_through() {
    let results = on_grid(4, |_, grid| {
        let mut a = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, 6, 6, |i, j| sample(i, j, 6));
        {
            let mut v = a.view_mut(2, 3, 3, 2);
            assert_eq!((v.height(), v.width()), (3, 2));
            v.set(1, 1, -100.0);
            let through_view = v.get(0, 0)?;
            assert_eq!(through_view, sample(2, 3, 6));
        }
        let seen = a.get(3, 4)?;
        a.set(4, 3, 55.0);
        let back = a.view(2, 3, 3, 2).get(2, 0)?;
        Ok((seen, back))
    });
    for (seen, back) in results {
        assert_eq!(seen, -100.0);
        assert_eq!(back, 55.0);
    }
}

#[test]
fn test_view_assign_lands_in_window() {
    let results = on_grid(6, |_, grid| {
        let mut a = DistMatrix::<f64>::with_shape(&grid, Dist::Mc, Dist::Mr, 5, 7);
        let block = DistMatrix::from_fn(&grid, Dist::Star, Dist::Vc, 2, 3, |i, j| (1 + i + 2 * j) as f64);
        a.view_mut(1, 2, 2, 3).assign(&block)?;
        Ok(entries(&a.to_matrix()?))
    });
    for flat in results {
        for j in 0..7 {
            for i in 0..5 {
                let inside = (1..3).contains(&i) && (2..5).contains(&j);
                let expected = if inside { (1 + (i - 1) + 2 * (j - 2)) as f64 } else { 0.0 };
                assert_eq!(flat[i + 5 * j], expected, "({i}, {j})");
            }
        }
    }
}

#[test]
fn test_triangular_idempotence() {
    let results = on_grid(4, |_, grid| {
        let mut a = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, 5, 5, |i, j| sample(i, j, 5));
        make_triangular(UpperOrLower::Upper, &mut a);
        make_triangular(UpperOrLower::Lower, &mut a);
        let diag_only = a.to_matrix()?;

        let mut b = DistMatrix::from_fn(&grid, Dist::Vc, Dist::Star, 5, 5, |i, j| sample(i, j, 5));
        make_triangular(UpperOrLower::Lower, &mut b);
        let once = b.to_matrix()?;
        make_triangular(UpperOrLower::Lower, &mut b);
        Ok((diag_only, once, b.to_matrix()?))
    });
    for (diag_only, once, twice) in results {
        for j in 0..5 {
            for i in 0..5 {
                let d = if i == j { sample(i, j, 5) } else { 0.0 };
                assert_eq!(diag_only.get(i, j), d);
                let l = if i >= j { sample(i, j, 5) } else { 0.0 };
                assert_eq!(once.get(i, j), l);
            }
        }
        assert_eq!(entries(&once), entries(&twice));
    }
}

#[test]
fn test_diagonal_round_trip() {
    let results = on_grid(6, |_, grid| {
        let mut a = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, 4, 6, |i, j| sample(i, j, 6));
        let d = a.get_diagonal(1)?;
        assert_eq!((d.height(), d.width()), (4, 1));
        assert_eq!(d.meta().pair(), (Dist::Md, Dist::Star));
        let values = d.to_matrix()?;

        set_diagonal(&mut a, 0.0, 1);
        a.set_diagonal(&d, 1)?;
        Ok((entries(&values), a.get(3, 4)?))
    });
    for (values, restored) in results {
        let expected: Vec<f64> = (0..4).map(|k| sample(k, k + 1, 6)).collect();
        assert_eq!(values, expected);
        assert_eq!(restored, sample(3, 4, 6));
    }
}

#[test]
fn test_make_consistent_adopts_root_metadata() {
    let results = on_grid(4, |_, grid| {
        let mut a = DistMatrix::<f64>::new(&grid, Dist::Mc, Dist::Mr);
        if grid.vc_rank() == Some(0) {
            a.align(1, 1);
            a.resize(3, 8);
        } else {
            a.resize(1, 1);
        }
        a.make_consistent()?;
        let meta = a.meta();
        Ok((meta.col_align(), meta.row_align(), a.height(), a.width(), a.local_height()))
    });
    for (rank, (ca, ra, h, w, lh)) in results.into_iter().enumerate() {
        assert_eq!((ca, ra, h, w), (1, 1, 3, 8));
        // Rows 0 and 2 go to mesh row 1, row 1 to mesh row 0
        let mc = rank % 2;
        assert_eq!(lh, if mc == 1 { 2 } else { 1 });
    }
}

#[test]
#[should_panic(expected = "out of bounds")]
fn test_set_out_of_bounds_panics() {
    let comm = LocalTransport::universe(1).remove(0);
    let grid = Grid::new(&comm).unwrap();
    let mut a = DistMatrix::<f64>::with_shape(&grid, Dist::Star, Dist::Star, 2, 2);
    a.set(2, 0, 1.0);
}

#[test]
#[should_panic(expected = "row 5 out of bounds")]
fn test_get_submatrix_rejects_bad_row() {
    let comm = LocalTransport::universe(1).remove(0);
    let grid = Grid::new(&comm).unwrap();
    let a = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, 4, 4, |i, j| (10 * i + j) as f64);
    let _ = a.get_submatrix(&[5], &[0]);
}

#[test]
fn test_get_submatrix_bad_column_fails_on_every_rank() {
    let comm = LocalTransport::universe(4);
    let panicked = std::thread::scope(|s| {
        let handles: Vec<_> = comm
            .into_iter()
            .map(|comm| {
                s.spawn(move || {
                    let grid = Grid::new(&comm).unwrap();
                    let a = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, 4, 4, |i, j| (10 * i + j) as f64);
                    // No rank may enter the reduction with a bad index
                    let _ = a.get_submatrix(&[0, 1], &[2, 4]);
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().is_err()).collect::<Vec<_>>()
    });
    assert_eq!(panicked, vec![true; 4]);
}

#[test]
fn test_align_with_keeps_root_of_pinned_layout() {
    let results = on_grid(4, |_, grid| {
        let mut source = DistMatrix::<f64>::new(&grid, Dist::Circ, Dist::Circ);
        source.set_root(2);

        let mut pinned = DistMatrix::<f64>::new(&grid, Dist::Circ, Dist::Circ);
        pinned.align(0, 0);
        pinned.align_with(source.meta());

        let mut free = DistMatrix::<f64>::new(&grid, Dist::Circ, Dist::Circ);
        free.align_with(source.meta());
        Ok((pinned.meta().root(), free.meta().root()))
    });
    for (pinned, free) in results {
        assert_eq!(pinned, 0);
        assert_eq!(free, 2);
    }
}
