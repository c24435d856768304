//! The three-layer Viterbi matrix and its traceback.
//!
//! For every machine state `s` and observed position `p` the matrix keeps
//! `2 + max_dup_len` sub-states: `S` (no pending mutation), `D` (inside an
//! open deletion), and `T(k)` (emitting offset `k` of a tandem duplication
//! drawn from `s`'s left context). Cells hold natural-log probabilities;
//! -inf is "impossible" and must survive arithmetic.
//!
//! The fill walks observed positions in order. Within a column, edges that
//! consumed an observed base read only the previous column and go first; the
//! within-column dependencies (null transitions and the deletion layer) are
//! then driven to a fixed point by a worklist closure. Tandem-dup entries are
//! seeded last so they see final `S` values.

use super::error::{DecodeError, DecodeResult};
use super::input_model::InputModel;
use super::machine_scores::{MachineScores, StateScores};
use crate::machine::{Machine, StateIndex};
use crate::mutator::MutatorScores;
use crate::sequence::{encode_dna, index_base};
use std::fmt;

/// Sub-state index: no pending mutation.
pub const MUT_S: usize = 0;
/// Sub-state index: inside an open deletion.
pub const MUT_D: usize = 1;

/// Sub-state index of tandem-dup offset `k`.
#[inline]
pub fn mut_t(k: usize) -> usize {
    2 + k
}

pub fn mut_state_name(m: usize) -> String {
    match m {
        MUT_S => "S".to_string(),
        MUT_D => "D".to_string(),
        _ => format!("T{}", m - 1),
    }
}

/// Base emitted at dup offset `k` from a state's left context (`k = 0` is the
/// most recently emitted base).
#[inline]
fn tan_dup_base(ss: &StateScores, k: usize) -> u8 {
    ss.left_context[ss.left_context.len() - 1 - k]
}

/// A mutation recovered from the traceback. Positions refer to the observed
/// sequence, 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationEvent {
    /// Observed base `to` where the machine emitted `from`.
    Substitution { pos: usize, from: char, to: char },
    /// Machine base `base` missing from the observed sequence just before
    /// `pos`.
    Deletion { pos: usize, base: char },
    /// Copy of the left-context bases `seq` inserted starting at `pos`.
    Duplication { pos: usize, seq: String },
}

impl fmt::Display for MutationEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MutationEvent::Substitution { pos, from, to } => {
                write!(f, "substitution at {}: {} -> {}", pos, from, to)
            }
            MutationEvent::Deletion { pos, base } => {
                write!(f, "deletion of {} before position {}", base, pos)
            }
            MutationEvent::Duplication { pos, seq } => {
                write!(f, "duplication at {}: {}", pos, seq)
            }
        }
    }
}

/// Result of a traceback: the recovered input string and the mutations along
/// the best path.
#[derive(Debug, Clone)]
pub struct Traceback {
    pub input: String,
    pub loglike: f64,
    pub events: Vec<MutationEvent>,
}

/// Best predecessor of a cell, as recomputed during traceback.
#[derive(Debug, Clone, Copy)]
struct Best {
    score: f64,
    state: StateIndex,
    pos: usize,
    mut_state: usize,
    in_sym: Option<char>,
    base: Option<u8>,
    found: bool,
}

impl Best {
    fn new() -> Self {
        Self {
            score: f64::NEG_INFINITY,
            state: 0,
            pos: 0,
            mut_state: MUT_S,
            in_sym: None,
            base: None,
            found: false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[inline]
    fn update(
        &mut self,
        cell: f64,
        trans: f64,
        state: StateIndex,
        pos: usize,
        mut_state: usize,
        in_sym: Option<char>,
        base: Option<u8>,
    ) {
        let score = cell + trans;
        if score > self.score {
            *self = Self {
                score,
                state,
                pos,
                mut_state,
                in_sym,
                base,
                found: true,
            };
        }
    }
}

#[derive(Debug)]
pub struct ViterbiMatrix<'a> {
    machine: &'a Machine,
    scores: MachineScores,
    mutator: &'a MutatorScores,
    max_dup_len: usize,
    n_states: usize,
    seq_len: usize,
    n_mut: usize,
    cell: Vec<f64>,
    seq: Vec<u8>,
    loglike: f64,
}

impl<'a> ViterbiMatrix<'a> {
    /// Build the matrix for one observed sequence and fill it.
    pub fn new(
        machine: &'a Machine,
        input_model: &InputModel,
        mutator: &'a MutatorScores,
        seq: &[u8],
    ) -> DecodeResult<Self> {
        let scores = MachineScores::build(machine, input_model)?;
        let seq = encode_dna(seq).map_err(|b| DecodeError::InvalidBase(b as char))?;
        let max_dup_len = machine.max_left_context().min(mutator.max_dup_len());
        let n_states = machine.n_states();
        let seq_len = seq.len();
        let n_mut = 2 + max_dup_len;
        let mut matrix = Self {
            machine,
            scores,
            mutator,
            max_dup_len,
            n_states,
            seq_len,
            n_mut,
            cell: vec![f64::NEG_INFINITY; n_states * (seq_len + 1) * n_mut],
            seq,
            loglike: f64::NEG_INFINITY,
        };
        let order = machine.decoder_toposort(&input_model.input_alphabet);
        matrix.fill(&order);
        Ok(matrix)
    }

    #[inline]
    fn index(&self, state: StateIndex, pos: usize, mut_state: usize) -> usize {
        (state * (self.seq_len + 1) + pos) * self.n_mut + mut_state
    }

    #[inline]
    pub fn get(&self, state: StateIndex, pos: usize, mut_state: usize) -> f64 {
        self.cell[self.index(state, pos, mut_state)]
    }

    #[inline]
    pub fn s_cell(&self, state: StateIndex, pos: usize) -> f64 {
        self.get(state, pos, MUT_S)
    }

    #[inline]
    pub fn d_cell(&self, state: StateIndex, pos: usize) -> f64 {
        self.get(state, pos, MUT_D)
    }

    #[inline]
    pub fn t_cell(&self, state: StateIndex, pos: usize, k: usize) -> f64 {
        self.get(state, pos, mut_t(k))
    }

    pub fn cells(&self) -> &[f64] {
        &self.cell
    }

    #[inline]
    pub fn loglike(&self) -> f64 {
        self.loglike
    }

    #[inline]
    pub fn n_states(&self) -> usize {
        self.n_states
    }

    #[inline]
    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    #[inline]
    pub fn n_mut_states(&self) -> usize {
        self.n_mut
    }

    #[inline]
    pub fn max_dup_len(&self) -> usize {
        self.max_dup_len
    }

    /// Dup offsets usable at a state: capped by its left-context template.
    #[inline]
    fn max_dup_len_at(&self, ss: &StateScores) -> usize {
        ss.left_context.len().min(self.max_dup_len)
    }

    fn fill(&mut self, order: &[StateIndex]) {
        let sl = self.seq_len;
        let nm = self.n_mut;
        let ix = |s: StateIndex, p: usize, m: usize| (s * (sl + 1) + p) * nm + m;
        let mu = self.mutator;

        if mu.local {
            for s in 0..self.n_states {
                self.cell[ix(s, 0, MUT_S)] = 0.0;
            }
        } else {
            self.cell[ix(0, 0, MUT_S)] = 0.0;
        }

        for pos in 0..=sl {
            let obs = if pos > 0 {
                Some(self.seq[pos - 1] as usize)
            } else {
                None
            };

            for &state in order {
                let ss = &self.scores.state_scores[state];
                let mdl = ss.left_context.len().min(self.max_dup_len);

                if let Some(y) = obs {
                    for t in &ss.incoming_emit {
                        let sc = self.cell[ix(t.src, pos - 1, MUT_S)]
                            + t.score
                            + mu.no_gap
                            + mu.sub[t.base as usize][y];
                        if sc > self.cell[ix(state, pos, MUT_S)] {
                            self.cell[ix(state, pos, MUT_S)] = sc;
                        }
                    }
                }

                for t in &ss.incoming_null {
                    let sc = self.cell[ix(t.src, pos, MUT_S)] + t.score;
                    if sc > self.cell[ix(state, pos, MUT_S)] {
                        self.cell[ix(state, pos, MUT_S)] = sc;
                    }
                }

                if mdl > 0 {
                    if let Some(y) = obs {
                        let sc = self.cell[ix(state, pos - 1, mut_t(0))]
                            + mu.sub[tan_dup_base(ss, 0) as usize][y];
                        if sc > self.cell[ix(state, pos, MUT_S)] {
                            self.cell[ix(state, pos, MUT_S)] = sc;
                        }
                        for k in 0..mdl - 1 {
                            self.cell[ix(state, pos, mut_t(k))] = self.cell
                                [ix(state, pos - 1, mut_t(k + 1))]
                                + mu.sub[tan_dup_base(ss, k + 1) as usize][y];
                        }
                    }
                }
            }

            self.epsilon_closure(pos);

            // Dup entry reads the closed S value, so it must come last.
            if obs.is_some() {
                for state in 0..self.n_states {
                    let ss = &self.scores.state_scores[state];
                    let mdl = ss.left_context.len().min(self.max_dup_len);
                    for k in 0..mdl {
                        let sc = self.cell[ix(state, pos, MUT_S)] + mu.tan_dup + mu.len[k];
                        if sc > self.cell[ix(state, pos, mut_t(k))] {
                            self.cell[ix(state, pos, mut_t(k))] = sc;
                        }
                    }
                }
            }
        }

        self.loglike = if mu.local {
            (0..self.n_states)
                .map(|s| self.cell[ix(s, sl, MUT_S)])
                .fold(f64::NEG_INFINITY, f64::max)
        } else {
            self.cell[ix(self.n_states - 1, sl, MUT_S)]
        };
    }

    /// Drive the within-column dependencies (null transitions and the
    /// deletion layer) to their fixed point. Every relaxation strictly
    /// increases a score bounded above by 0, so the worklist drains.
    ///
    /// Running this a second time on a finished column is a no-op.
    pub fn epsilon_closure(&mut self, pos: usize) {
        let sl = self.seq_len;
        let nm = self.n_mut;
        let ix = |s: StateIndex, p: usize, m: usize| (s * (sl + 1) + p) * nm + m;
        let mu = self.mutator;

        let mut stack: Vec<StateIndex> = (0..self.n_states).collect();
        let mut on_stack = vec![true; self.n_states];
        while let Some(state) = stack.pop() {
            on_stack[state] = false;
            let ss = &self.scores.state_scores[state];

            let dsrc = self.cell[ix(state, pos, MUT_D)];
            let ssrc = self.cell[ix(state, pos, MUT_S)].max(dsrc + mu.del_end);
            self.cell[ix(state, pos, MUT_S)] = ssrc;

            // Emit transitions advance the intermediate DNA without
            // consuming an observed base: they open or extend a deletion.
            for t in &ss.outgoing_emit {
                let dsc = (dsrc + mu.del_extend).max(ssrc + mu.del_open) + t.score;
                if dsc > self.cell[ix(t.dest, pos, MUT_D)] {
                    self.cell[ix(t.dest, pos, MUT_D)] = dsc;
                    if !on_stack[t.dest] {
                        stack.push(t.dest);
                        on_stack[t.dest] = true;
                    }
                }
            }

            for t in &ss.outgoing_null {
                let mut push = false;

                let dsc = dsrc + t.score;
                if dsc > self.cell[ix(t.dest, pos, MUT_D)] {
                    self.cell[ix(t.dest, pos, MUT_D)] = dsc;
                    push = true;
                }

                let ssc = ssrc + t.score;
                if ssc > self.cell[ix(t.dest, pos, MUT_S)] {
                    self.cell[ix(t.dest, pos, MUT_S)] = ssc;
                    push = true;
                }

                if push && !on_stack[t.dest] {
                    stack.push(t.dest);
                    on_stack[t.dest] = true;
                }
            }
        }
    }

    /// Recompute the best predecessor score of a cell the way the traceback
    /// does. Diagnostic: for a filled matrix this must equal the stored cell
    /// (to relative tolerance) wherever the cell is finite.
    pub fn recompute_cell(
        &self,
        state: StateIndex,
        pos: usize,
        mut_state: usize,
    ) -> DecodeResult<f64> {
        Ok(self.best_pred(state, pos, mut_state)?.score)
    }

    fn best_pred(&self, state: StateIndex, pos: usize, mut_state: usize) -> DecodeResult<Best> {
        let ss = &self.scores.state_scores[state];
        let mdl = self.max_dup_len_at(ss);
        let mu = self.mutator;
        let mut best = Best::new();

        if mut_state == MUT_S {
            if pos > 0 {
                let y = self.seq[pos - 1] as usize;
                for t in &ss.incoming_emit {
                    best.update(
                        self.get(t.src, pos - 1, MUT_S),
                        t.score + mu.no_gap + mu.sub[t.base as usize][y],
                        t.src,
                        pos - 1,
                        MUT_S,
                        t.in_sym,
                        Some(t.base),
                    );
                }
            }
            for t in &ss.incoming_null {
                best.update(
                    self.get(t.src, pos, MUT_S),
                    t.score,
                    t.src,
                    pos,
                    MUT_S,
                    t.in_sym,
                    None,
                );
            }
            best.update(
                self.get(state, pos, MUT_D),
                mu.del_end,
                state,
                pos,
                MUT_D,
                None,
                None,
            );
            if mdl > 0 && pos > 0 {
                let y = self.seq[pos - 1] as usize;
                best.update(
                    self.get(state, pos - 1, mut_t(0)),
                    mu.sub[tan_dup_base(ss, 0) as usize][y],
                    state,
                    pos - 1,
                    mut_t(0),
                    None,
                    None,
                );
            }
            if pos == 0 && mu.local {
                best.update(0.0, 0.0, 0, 0, MUT_S, None, None);
            }
        } else if mut_state == MUT_D {
            for t in &ss.incoming_emit {
                best.update(
                    self.get(t.src, pos, MUT_D),
                    t.score + mu.del_extend,
                    t.src,
                    pos,
                    MUT_D,
                    t.in_sym,
                    Some(t.base),
                );
                best.update(
                    self.get(t.src, pos, MUT_S),
                    t.score + mu.del_open,
                    t.src,
                    pos,
                    MUT_S,
                    t.in_sym,
                    Some(t.base),
                );
            }
            for t in &ss.incoming_null {
                best.update(
                    self.get(t.src, pos, MUT_D),
                    t.score,
                    t.src,
                    pos,
                    MUT_D,
                    t.in_sym,
                    None,
                );
            }
        } else if mut_state >= mut_t(0) && mut_state < mut_t(mdl) {
            let k = mut_state - mut_t(0);
            if k + 1 < mdl && pos > 0 {
                let y = self.seq[pos - 1] as usize;
                best.update(
                    self.get(state, pos - 1, mut_t(k + 1)),
                    mu.sub[tan_dup_base(ss, k + 1) as usize][y],
                    state,
                    pos - 1,
                    mut_t(k + 1),
                    None,
                    None,
                );
            }
            best.update(
                self.get(state, pos, MUT_S),
                mu.tan_dup + mu.len[k],
                state,
                pos,
                MUT_S,
                None,
                None,
            );
        } else {
            return Err(DecodeError::UnknownTracebackState(mut_state));
        }

        Ok(best)
    }

    fn check_step(
        &self,
        best: &Best,
        expected: f64,
        state: StateIndex,
        pos: usize,
        mut_state: usize,
    ) -> DecodeResult<()> {
        let fail = |computed: f64| DecodeError::TracebackInconsistent {
            state: self.machine.states[state].name.clone(),
            pos,
            mut_state: mut_state_name(mut_state),
            computed,
            stored: expected,
        };
        if !best.found {
            return Err(fail(f64::NEG_INFINITY));
        }
        let denom = if expected.abs() < 1e-6 { 1.0 } else { expected };
        if ((best.score - expected) / denom).abs() >= 1e-6 {
            return Err(fail(best.score));
        }
        Ok(())
    }

    /// Walk the best path back from the end, re-deriving each step from the
    /// same predecessors the fill considered and checking the recomputed
    /// score against the stored cell. Input symbols on the chosen transitions
    /// accumulate into the decoded string.
    pub fn traceback(&self) -> DecodeResult<Traceback> {
        let trace_debug = std::env::var("DNADEC_DEBUG").is_ok();

        if !(self.loglike > f64::NEG_INFINITY) {
            return Ok(Traceback {
                input: String::new(),
                loglike: f64::NEG_INFINITY,
                events: Vec::new(),
            });
        }

        let mut start = Best::new();
        if self.mutator.local {
            for s in 0..self.n_states {
                start.update(self.get(s, self.seq_len, MUT_S), 0.0, s, self.seq_len, MUT_S, None, None);
            }
        } else {
            let end = self.n_states - 1;
            start.update(self.get(end, self.seq_len, MUT_S), 0.0, end, self.seq_len, MUT_S, None, None);
        }
        self.check_step(&start, self.loglike, self.n_states - 1, self.seq_len, MUT_S)?;

        let mut state = start.state;
        let mut pos = start.pos;
        let mut mut_state = start.mut_state;

        let mut trace: Vec<char> = Vec::new();
        let mut events: Vec<MutationEvent> = Vec::new();
        let mut steps = 0usize;
        let step_limit = 2 * self.cell.len() + 16;

        while !(state == 0 && pos == 0) {
            steps += 1;
            if steps > step_limit {
                return Err(DecodeError::TracebackInconsistent {
                    state: self.machine.states[state].name.clone(),
                    pos,
                    mut_state: mut_state_name(mut_state),
                    computed: f64::NEG_INFINITY,
                    stored: self.get(state, pos, mut_state),
                });
            }
            if trace_debug {
                eprintln!(
                    "[TRACE] at ({},{},{})",
                    self.machine.states[state].name,
                    pos,
                    mut_state_name(mut_state)
                );
            }

            let best = self.best_pred(state, pos, mut_state)?;

            if mut_state == MUT_S {
                if let Some(b) = best.base {
                    if best.pos < pos && self.seq[pos - 1] != b {
                        events.push(MutationEvent::Substitution {
                            pos: pos - 1,
                            from: index_base(b),
                            to: index_base(self.seq[pos - 1]),
                        });
                    }
                }
            } else if mut_state == MUT_D {
                if let Some(b) = best.base {
                    events.push(MutationEvent::Deletion {
                        pos,
                        base: index_base(b),
                    });
                }
            } else if best.found && best.mut_state == MUT_S && best.state == state && best.pos == pos
            {
                let ss = &self.scores.state_scores[state];
                let k = mut_state - mut_t(0);
                let seq: String = (0..=k).rev().map(|i| index_base(tan_dup_base(ss, i))).collect();
                events.push(MutationEvent::Duplication { pos, seq });
            }

            self.check_step(&best, self.get(state, pos, mut_state), state, pos, mut_state)?;

            if let Some(c) = best.in_sym {
                if !Machine::is_seof(c) {
                    trace.push(c);
                }
            }
            state = best.state;
            pos = best.pos;
            mut_state = best.mut_state;
        }

        trace.reverse();
        events.reverse();
        Ok(Traceback {
            input: trace.into_iter().collect(),
            loglike: self.loglike,
            events,
        })
    }

    /// Row-per-(position, state) dump of every cell, for debugging.
    pub fn dump(&self) -> String {
        let sw = self.machine.state_name_width();
        let mut out = String::new();
        for pos in 0..=self.seq_len {
            for state in 0..self.n_states {
                out.push_str(&format!(
                    "{:>4} {:>sw$} {:>10.6}(S) {:>10.6}(D) ",
                    pos,
                    self.machine.states[state].name,
                    self.s_cell(state, pos),
                    self.d_cell(state, pos),
                    sw = sw
                ));
                for k in 0..self.max_dup_len {
                    out.push_str(&format!("{:>10.6}(T{}) ", self.t_cell(state, pos, k), k + 1));
                }
                out.push('\n');
            }
        }
        out
    }
}
