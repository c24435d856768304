//! Prior over the machine's input alphabet.

use super::error::{DecodeError, DecodeResult};
use crate::machine::Machine;
use rustc_hash::FxHashMap;
use std::fmt::Write;

/// Normalized symbol probabilities. Control symbols get a separate (usually
/// tiny) weight so that decodings do not invent spurious control characters.
#[derive(Debug, Clone)]
pub struct InputModel {
    pub input_alphabet: Vec<char>,
    pub sym_prob: FxHashMap<char, f64>,
}

impl InputModel {
    pub fn new(alphabet: &[char], sym_weight: f64, control_weight: f64) -> DecodeResult<Self> {
        if alphabet.is_empty() {
            return Err(DecodeError::EmptyAlphabet);
        }
        let mut sym_prob = FxHashMap::default();
        let mut norm = 0.0;
        for &c in alphabet {
            let weight = if Machine::is_control(c) {
                control_weight
            } else {
                sym_weight
            };
            if sym_prob.insert(c, weight).is_none() {
                norm += weight;
            }
        }
        for p in sym_prob.values_mut() {
            *p /= norm;
        }
        Ok(Self {
            input_alphabet: alphabet.to_vec(),
            sym_prob,
        })
    }

    /// One `symbol probability` line per symbol, sorted.
    pub fn dump(&self) -> String {
        let mut symbols: Vec<char> = self.sym_prob.keys().copied().collect();
        symbols.sort_unstable();
        let mut out = String::new();
        for c in symbols {
            let _ = writeln!(out, "{} {}", c, self.sym_prob[&c]);
        }
        out
    }
}
