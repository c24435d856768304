//! Per-state transition score lists, precomputed once per decode.
//!
//! The fill loop touches emit transitions once per observed position but
//! sweeps null transitions repeatedly to closure, so the two kinds are kept
//! on separate lists, each mirrored on both endpoints.

use super::error::{DecodeError, DecodeResult};
use super::input_model::InputModel;
use crate::machine::{Machine, StateIndex};
use crate::sequence::base_index;

#[derive(Debug, Clone)]
pub struct IncomingEmit {
    pub src: StateIndex,
    pub score: f64,
    pub in_sym: Option<char>,
    /// Base index emitted into the intermediate DNA.
    pub base: u8,
}

#[derive(Debug, Clone)]
pub struct IncomingNull {
    pub src: StateIndex,
    pub score: f64,
    pub in_sym: Option<char>,
}

#[derive(Debug, Clone)]
pub struct OutgoingEmit {
    pub dest: StateIndex,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct OutgoingNull {
    pub dest: StateIndex,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct StateScores {
    /// Left-context template as base indices, oldest first.
    pub left_context: Vec<u8>,
    pub incoming_emit: Vec<IncomingEmit>,
    pub incoming_null: Vec<IncomingNull>,
    pub outgoing_emit: Vec<OutgoingEmit>,
    pub outgoing_null: Vec<OutgoingNull>,
}

#[derive(Debug, Clone)]
pub struct MachineScores {
    pub state_scores: Vec<StateScores>,
}

impl MachineScores {
    pub fn build(machine: &Machine, input_model: &InputModel) -> DecodeResult<Self> {
        for c in machine.output_alphabet() {
            if !c.is_ascii() || base_index(c as u8).is_none() {
                return Err(DecodeError::NonDnaOutput(c));
            }
        }

        let mut state_scores = vec![StateScores::default(); machine.n_states()];
        for (src, state) in machine.states.iter().enumerate() {
            state_scores[src].left_context = state
                .context_suffix()
                .chars()
                .filter_map(|c| base_index(c as u8))
                .collect();

            for t in &state.trans {
                // ε and SEOF inputs are free; modeled symbols pay their
                // prior; anything else is not decodable and is dropped.
                let score = match t.in_sym {
                    None => 0.0,
                    Some(c) if Machine::is_seof(c) => 0.0,
                    Some(c) => match input_model.sym_prob.get(&c) {
                        Some(&p) => p.ln(),
                        None => continue,
                    },
                };

                match t.out_base {
                    None => {
                        state_scores[t.dest].incoming_null.push(IncomingNull {
                            src,
                            score,
                            in_sym: t.in_sym,
                        });
                        state_scores[src]
                            .outgoing_null
                            .push(OutgoingNull { dest: t.dest, score });
                    }
                    Some(out) => {
                        let base = base_index(out as u8).ok_or(DecodeError::NonDnaOutput(out))?;
                        state_scores[t.dest].incoming_emit.push(IncomingEmit {
                            src,
                            score,
                            in_sym: t.in_sym,
                            base,
                        });
                        state_scores[src]
                            .outgoing_emit
                            .push(OutgoingEmit { dest: t.dest, score });
                    }
                }
            }
        }
        Ok(Self { state_scores })
    }
}
