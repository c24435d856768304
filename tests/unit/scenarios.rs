//! End-to-end decodes over small hand-built machines.

use crate::helpers::*;
use dnadec::decoder::{decode_records, InputModel, MutationEvent, ViterbiMatrix};
use dnadec::mutator::{MutatorParams, MutatorScores};
use dnadec::sequence::FastaRecord;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn test_clean_decode() {
    let machine = bit_loop_machine();
    let model = InputModel::new(&['0', '1'], 1.0, 1.0).unwrap();
    let scores = MutatorScores::neutral(0, false);

    let matrix = ViterbiMatrix::new(&machine, &model, &scores, b"ACAC").unwrap();
    let tb = matrix.traceback().unwrap();
    assert_eq!(tb.input, "0101");
    assert!(tb.events.is_empty());
    assert!((matrix.loglike() - 4.0 * 0.5f64.ln()).abs() < 1e-9);
}

#[test]
fn test_deletion_decode() {
    let machine = acac_chain_machine();
    machine.verify_contexts().unwrap();
    let model = bit_model();
    let scores = deletion_scores(0.1f64.ln(), 0.5f64.ln(), 0.0);

    // The machine always emits ACAC; observing AAC forces one deletion.
    let matrix = ViterbiMatrix::new(&machine, &model, &scores, b"AAC").unwrap();
    assert!(matrix.loglike() > f64::NEG_INFINITY);
    let expected = 3.0 * 0.5f64.ln() + 0.1f64.ln();
    assert!((matrix.loglike() - expected).abs() < 1e-9);

    let tb = matrix.traceback().unwrap();
    assert_eq!(tb.input.len(), 3);
    assert_eq!(tb.input, "011");
    let deletions: Vec<_> = tb
        .events
        .iter()
        .filter(|e| matches!(e, MutationEvent::Deletion { .. }))
        .collect();
    assert_eq!(deletions.len(), 1);
}

#[test]
fn test_tandem_dup_decode() {
    let machine = ac_dup_machine();
    machine.verify_contexts().unwrap();
    let model = bit_model();
    let mut scores = MutatorScores::neutral(2, false);
    scores.tan_dup = 0.3f64.ln();
    scores.len = vec![0.0, 0.0];

    // The machine only emits AC; the trailing AC must be read as a
    // length-2 duplication of the accept state's left context.
    let matrix = ViterbiMatrix::new(&machine, &model, &scores, b"ACAC").unwrap();
    let expected = 2.0 * 0.5f64.ln() + 0.3f64.ln();
    assert!((matrix.loglike() - expected).abs() < 1e-9);

    let tb = matrix.traceback().unwrap();
    assert_eq!(tb.input, "01");
    assert_eq!(
        tb.events,
        vec![MutationEvent::Duplication {
            pos: 2,
            seq: "AC".to_string()
        }]
    );
}

#[test]
fn test_control_symbol_decode() {
    let machine = control_chain_machine();
    let alphabet = machine.input_alphabet(dnadec::machine::SYM_ALL);
    assert_eq!(alphabet, vec!['#', '0', '1']);

    let model = InputModel::new(&alphabet, 1.0, 4f64.powi(-8)).unwrap();
    let scores = MutatorScores::neutral(0, false);

    let matrix = ViterbiMatrix::new(&machine, &model, &scores, b"ACG").unwrap();
    assert!(matrix.loglike() > f64::NEG_INFINITY);
    let tb = matrix.traceback().unwrap();
    assert_eq!(tb.input, "0#1");
    assert_eq!(tb.input.matches('#').count(), 1);
}

#[test]
fn test_local_decode_ignores_padding() {
    let machine = flanked_signal_machine();
    let model = unit_model(&['0', '1']);

    let global = MutatorScores::neutral(0, false);
    let unpadded = ViterbiMatrix::new(&machine, &model, &global, b"ACAC").unwrap();

    let mut rng = StdRng::seed_from_u64(42);
    let pad = |rng: &mut StdRng| -> Vec<u8> {
        (0..20).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
    };
    let mut padded_seq = pad(&mut rng);
    padded_seq.extend_from_slice(b"ACAC");
    padded_seq.extend_from_slice(&pad(&mut rng));

    let local = MutatorScores::neutral(0, true);
    let padded = ViterbiMatrix::new(&machine, &model, &local, &padded_seq).unwrap();

    assert!((padded.loglike() - unpadded.loglike()).abs() < 1e-6);
    assert!(unpadded.loglike().abs() < 1e-9);
}

#[test]
fn test_driver_batch_preserves_names_and_order() {
    let machine = bit_loop_machine();
    let params = MutatorParams {
        p_transition: 0.01,
        p_transversion: 0.005,
        p_del_open: 0.01,
        p_del_extend: 0.5,
        p_tan_dup: 0.0,
        dup_len_prob: Vec::new(),
        local: false,
    };
    let scores = MutatorScores::new(&params);
    let records = vec![
        FastaRecord {
            name: "read1".into(),
            seq: b"ACAC".to_vec(),
        },
        FastaRecord {
            name: "read2".into(),
            seq: b"CCAA".to_vec(),
        },
    ];

    let decoded = decode_records(&machine, &scores, &records, false).unwrap();
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded[0].name, "read1");
    assert_eq!(decoded[0].input, "0101");
    assert_eq!(decoded[1].name, "read2");
    assert_eq!(decoded[1].input, "1100");
    assert!(decoded.iter().all(|d| d.loglike < 0.0));
}

#[test]
fn test_driver_rejects_non_dna_read() {
    let machine = bit_loop_machine();
    let scores = MutatorScores::neutral(0, false);
    let records = vec![FastaRecord {
        name: "bad".into(),
        seq: b"ACXC".to_vec(),
    }];
    let err = decode_records(&machine, &scores, &records, false).unwrap_err();
    assert!(err.to_string().contains("bad"));
}
