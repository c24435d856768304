//! Batch decoding driver.
//!
//! Builds the input model once per machine, then decodes each observed
//! sequence independently (one matrix per sequence, in parallel) and collects
//! the tracebacks in input order.

pub mod args;
pub mod error;
pub mod input_model;
pub mod machine_scores;
pub mod viterbi;

pub use args::DecodeArgs;
pub use error::{DecodeError, DecodeResult};
pub use input_model::InputModel;
pub use machine_scores::MachineScores;
pub use viterbi::{MutationEvent, Traceback, ViterbiMatrix};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::machine::{Machine, SYM_ALL};
use crate::mutator::MutatorScores;
use crate::sequence::{read_fasta, write_fasta, FastaRecord};

/// One decoded sequence: the recovered input string, its log-likelihood, and
/// the mutations on the best path.
#[derive(Debug, Clone)]
pub struct DecodedSeq {
    pub name: String,
    pub input: String,
    pub loglike: f64,
    pub events: Vec<MutationEvent>,
}

/// Prior weight for control symbols. Duplication contexts run to about half
/// a codeword, so this keeps a spurious control detour more expensive than
/// any plausible mutation path.
pub fn control_weight(max_dup_len: usize) -> f64 {
    4f64.powi(-4 * max_dup_len as i32)
}

pub fn decode_records(
    machine: &Machine,
    mutator: &MutatorScores,
    records: &[FastaRecord],
    verbose: bool,
) -> Result<Vec<DecodedSeq>> {
    let alphabet = machine.input_alphabet(SYM_ALL);
    let max_dup_len = machine.max_left_context().min(mutator.max_dup_len());
    let input_model = InputModel::new(&alphabet, 1.0, control_weight(max_dup_len))?;
    if verbose {
        eprintln!("[INFO] input model for decoding:\n{}", input_model.dump());
    }
    let debug_mode = std::env::var("DNADEC_DEBUG").is_ok();

    let bar = ProgressBar::new(records.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap(),
    );

    let results: Vec<Result<DecodedSeq>> = records
        .par_iter()
        .map(|rec| {
            let decoded = decode_one(machine, &input_model, mutator, rec, debug_mode);
            bar.inc(1);
            decoded
        })
        .collect();
    bar.finish_and_clear();

    let mut decoded = Vec::with_capacity(results.len());
    for r in results {
        decoded.push(r?);
    }

    if verbose {
        for d in &decoded {
            eprintln!("[INFO] {}: loglike {:.4}", d.name, d.loglike);
            for e in &d.events {
                eprintln!("[INFO] {}: {}", d.name, e);
            }
        }
    }
    Ok(decoded)
}

fn decode_one(
    machine: &Machine,
    input_model: &InputModel,
    mutator: &MutatorScores,
    rec: &FastaRecord,
    debug_mode: bool,
) -> Result<DecodedSeq> {
    let matrix = ViterbiMatrix::new(machine, input_model, mutator, &rec.seq)
        .with_context(|| format!("failed to decode record '{}'", rec.name))?;
    if debug_mode {
        eprintln!("[DEBUG] Viterbi matrix for '{}':\n{}", rec.name, matrix.dump());
    }
    let tb = matrix
        .traceback()
        .with_context(|| format!("failed to decode record '{}'", rec.name))?;
    if !(tb.loglike > f64::NEG_INFINITY) {
        eprintln!("[WARN] no valid decoding found for '{}'", rec.name);
    }
    Ok(DecodedSeq {
        name: rec.name.clone(),
        input: tb.input,
        loglike: tb.loglike,
        events: tb.events,
    })
}

pub fn run(args: DecodeArgs) -> Result<()> {
    let machine = Machine::from_json_file(&args.machine)?;
    machine
        .verify_contexts()
        .context("machine left-context annotations are inconsistent")?;

    let params = args.mutator_params();
    let mutator = MutatorScores::new(&params);
    let records = read_fasta(&args.seqs)?;
    if args.verbose {
        eprintln!(
            "[INFO] decoding {} sequence(s) against {} machine states",
            records.len(),
            machine.n_states()
        );
    }

    let decoded = decode_records(&machine, &mutator, &records, args.verbose)?;
    write_fasta(
        decoded.iter().map(|d| (d.name.as_str(), d.input.as_bytes())),
        args.out.as_ref(),
    )?;
    Ok(())
}
