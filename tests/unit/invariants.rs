//! Structural properties of a filled matrix.

use crate::helpers::*;
use dnadec::decoder::viterbi::{mut_t, MUT_D, MUT_S};
use dnadec::decoder::{DecodeError, InputModel, ViterbiMatrix};
use dnadec::mutator::{MutatorParams, MutatorScores};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn dup_capable_matrix<'a>(
    machine: &'a dnadec::machine::Machine,
    model: &InputModel,
    scores: &'a MutatorScores,
    seq: &[u8],
) -> ViterbiMatrix<'a> {
    ViterbiMatrix::new(machine, model, scores, seq).unwrap()
}

fn rich_scores() -> MutatorScores {
    MutatorScores::new(&MutatorParams {
        p_transition: 0.05,
        p_transversion: 0.02,
        p_del_open: 0.05,
        p_del_extend: 0.4,
        p_tan_dup: 0.05,
        dup_len_prob: MutatorParams::uniform_dup_len(2),
        local: false,
    })
}

#[test]
fn test_cells_are_log_probabilities() {
    let machine = acac_chain_machine();
    let model = bit_model();
    let scores = rich_scores();
    let matrix = dup_capable_matrix(&machine, &model, &scores, b"ACCAC");
    assert!(matrix.cells().iter().all(|&c| c <= 0.0));
}

#[test]
fn test_deletion_end_slack() {
    let machine = acac_chain_machine();
    let model = bit_model();
    let scores = rich_scores();
    let matrix = dup_capable_matrix(&machine, &model, &scores, b"ACAC");
    for state in 0..matrix.n_states() {
        for pos in 0..=matrix.seq_len() {
            let s = matrix.s_cell(state, pos);
            let d = matrix.d_cell(state, pos);
            assert!(
                s >= d + scores.del_end - 1e-9,
                "S({state},{pos}) = {s} < D + del_end = {}",
                d + scores.del_end
            );
        }
    }
}

#[test]
fn test_closure_is_idempotent() {
    let machine = acac_chain_machine();
    let model = bit_model();
    let scores = rich_scores();
    let mut matrix = dup_capable_matrix(&machine, &model, &scores, b"ACGAC");
    let before = matrix.cells().to_vec();
    for pos in 0..=matrix.seq_len() {
        matrix.epsilon_closure(pos);
    }
    assert_eq!(before, matrix.cells());
}

#[test]
fn test_input_model_normalization() {
    for (sym_w, ctl_w) in [(1.0, 1.0), (1.0, 1e-6), (2.5, 0.25), (1.0, 4f64.powi(-16))] {
        let model = InputModel::new(&['0', '1', '2', '#', '!'], sym_w, ctl_w).unwrap();
        let total: f64 = model.sym_prob.values().sum();
        assert!(
            (total - 1.0).abs() < 1e-12,
            "sum {total} for weights ({sym_w},{ctl_w})"
        );
    }
}

/// Recomputing any finite cell from its predecessors must reproduce the
/// stored value. The global start cell is the one finite cell with no
/// predecessor.
#[test]
fn test_stored_cells_match_recomputation() {
    let machine = acac_chain_machine();
    let model = bit_model();
    let scores = rich_scores();
    let matrix = dup_capable_matrix(&machine, &model, &scores, b"ACCACA");

    let mut checked = 0usize;
    for state in 0..matrix.n_states() {
        for pos in 0..=matrix.seq_len() {
            for m in 0..matrix.n_mut_states() {
                let stored = matrix.get(state, pos, m);
                if stored == f64::NEG_INFINITY || (state == 0 && pos == 0 && m == MUT_S) {
                    continue;
                }
                let recomputed = match matrix.recompute_cell(state, pos, m) {
                    Ok(v) => v,
                    Err(DecodeError::UnknownTracebackState(_)) => continue,
                    Err(e) => panic!("unexpected error: {e}"),
                };
                let denom = if stored.abs() < 1e-6 { 1.0 } else { stored };
                assert!(
                    ((recomputed - stored) / denom).abs() < 1e-6,
                    "cell ({state},{pos},{m}): stored {stored}, recomputed {recomputed}"
                );
                checked += 1;
            }
        }
    }
    assert!(checked > 0);
}

/// Spot-check 100 random finite cells the way a traceback would.
#[test]
fn test_random_cells_match_recomputation() {
    let machine = acac_chain_machine();
    let model = bit_model();
    let scores = rich_scores();
    let matrix = dup_capable_matrix(&machine, &model, &scores, b"ACACCA");

    let mut rng = StdRng::seed_from_u64(7);
    let mut checked = 0usize;
    let mut attempts = 0usize;
    while checked < 100 && attempts < 100_000 {
        attempts += 1;
        let state = rng.gen_range(0..matrix.n_states());
        let pos = rng.gen_range(0..=matrix.seq_len());
        let m = match rng.gen_range(0..3) {
            0 => MUT_S,
            1 => MUT_D,
            _ => mut_t(rng.gen_range(0..matrix.max_dup_len().max(1))),
        };
        let stored = matrix.get(state, pos, m);
        if stored == f64::NEG_INFINITY || (state == 0 && pos == 0 && m == MUT_S) {
            continue;
        }
        let recomputed = match matrix.recompute_cell(state, pos, m) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let denom = if stored.abs() < 1e-6 { 1.0 } else { stored };
        assert!(((recomputed - stored) / denom).abs() < 1e-6);
        checked += 1;
    }
    assert!(checked >= 100, "only found {checked} finite cells");
}
