//! The transducer graph consumed by the decoder.
//!
//! A machine maps strings over an input alphabet (data symbols, control
//! symbols, and the `^`/`$` start/end-of-input markers) to DNA strings via a
//! directed state graph. Transitions may be null on either side: a missing
//! input symbol consumes nothing, a missing output base emits nothing.
//!
//! Machines are built elsewhere; this module only loads them (JSON), answers
//! the structural queries the decoder needs, and checks the left-context
//! annotation every state carries.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub type StateIndex = usize;

/// Wildcard entry in a left-context annotation. Matches any base and never
/// contributes to tandem-dup emission.
pub const WILD_CONTEXT: char = '*';

/// Start-of-input marker.
pub const SEQ_START: char = '^';
/// End-of-input marker.
pub const SEQ_END: char = '$';

/// Input-alphabet filter bits for [`Machine::input_alphabet`].
pub const SYM_DATA: u32 = 1;
pub const SYM_CONTROL: u32 = 1 << 1;
pub const SYM_SEOF: u32 = 1 << 2;
pub const SYM_ALL: u32 = SYM_DATA | SYM_CONTROL | SYM_SEOF;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineTrans {
    pub dest: StateIndex,
    #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
    pub in_sym: Option<char>,
    #[serde(rename = "out", default, skip_serializing_if = "Option::is_none")]
    pub out_base: Option<char>,
}

impl MachineTrans {
    #[inline]
    pub fn input_empty(&self) -> bool {
        self.in_sym.is_none()
    }

    #[inline]
    pub fn output_empty(&self) -> bool {
        self.out_base.is_none()
    }

    /// True when the transition consumes a start/end-of-input marker.
    #[inline]
    pub fn is_seof(&self) -> bool {
        matches!(self.in_sym, Some(c) if Machine::is_seof(c))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineState {
    pub name: String,
    /// DNA guaranteed to precede this state on every path, newest base last.
    /// `*` marks positions where no single base is guaranteed.
    #[serde(default)]
    pub left_context: String,
    #[serde(default)]
    pub trans: Vec<MachineTrans>,
}

impl MachineState {
    /// The non-wildcard suffix of the left context: the bases usable as a
    /// tandem-dup template.
    pub fn context_suffix(&self) -> &str {
        match self.left_context.rfind(WILD_CONTEXT) {
            Some(i) => &self.left_context[i + WILD_CONTEXT.len_utf8()..],
            None => &self.left_context,
        }
    }
}

/// State 0 is the start state; the last state accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub states: Vec<MachineState>,
}

impl Machine {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("failed to open machine file {}", path.display()))?;
        let machine: Machine = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse machine file {}", path.display()))?;
        if machine.states.is_empty() {
            bail!("machine file {} contains no states", path.display());
        }
        Ok(machine)
    }

    #[inline]
    pub fn n_states(&self) -> usize {
        self.states.len()
    }

    #[inline]
    pub fn start_state(&self) -> StateIndex {
        0
    }

    #[inline]
    pub fn end_state(&self) -> StateIndex {
        self.states.len() - 1
    }

    /// Longest usable tandem-dup template over all states.
    pub fn max_left_context(&self) -> usize {
        self.states
            .iter()
            .map(|s| s.context_suffix().chars().count())
            .max()
            .unwrap_or(0)
    }

    /// True for symbols that steer the machine without carrying data.
    #[inline]
    pub fn is_control(c: char) -> bool {
        c.is_ascii_graphic() && !c.is_ascii_alphanumeric() && !Self::is_seof(c)
    }

    #[inline]
    pub fn is_seof(c: char) -> bool {
        c == SEQ_START || c == SEQ_END
    }

    /// Distinct input symbols appearing on transitions, filtered by the
    /// `SYM_*` bits and sorted.
    pub fn input_alphabet(&self, flags: u32) -> Vec<char> {
        let mut alphabet: Vec<char> = self
            .states
            .iter()
            .flat_map(|s| s.trans.iter())
            .filter_map(|t| t.in_sym)
            .filter(|&c| {
                if Self::is_seof(c) {
                    flags & SYM_SEOF != 0
                } else if Self::is_control(c) {
                    flags & SYM_CONTROL != 0
                } else {
                    flags & SYM_DATA != 0
                }
            })
            .collect();
        alphabet.sort_unstable();
        alphabet.dedup();
        alphabet
    }

    /// Distinct output symbols appearing on transitions, sorted.
    pub fn output_alphabet(&self) -> Vec<char> {
        let mut alphabet: Vec<char> = self
            .states
            .iter()
            .flat_map(|s| s.trans.iter())
            .filter_map(|t| t.out_base)
            .collect();
        alphabet.sort_unstable();
        alphabet.dedup();
        alphabet
    }

    /// Order states so that along null-output transitions (restricted to
    /// decodable input symbols) every predecessor precedes its successors.
    /// States on a residual cycle are appended in index order; the decoder's
    /// closure pass still reaches the fixed point for those.
    pub fn decoder_toposort(&self, input_alphabet: &[char]) -> Vec<StateIndex> {
        let decodable = |t: &MachineTrans| match t.in_sym {
            None => true,
            Some(c) => Self::is_seof(c) || input_alphabet.contains(&c),
        };

        let n = self.n_states();
        let mut indegree = vec![0usize; n];
        for (src, state) in self.states.iter().enumerate() {
            for t in &state.trans {
                if t.output_empty() && t.dest != src && decodable(t) {
                    indegree[t.dest] += 1;
                }
            }
        }

        let mut queue: VecDeque<StateIndex> =
            (0..n).filter(|&s| indegree[s] == 0).collect();
        let mut order = Vec::with_capacity(n);
        let mut placed = vec![false; n];
        while let Some(s) = queue.pop_front() {
            order.push(s);
            placed[s] = true;
            for t in &self.states[s].trans {
                if t.output_empty() && t.dest != s && decodable(t) {
                    indegree[t.dest] -= 1;
                    if indegree[t.dest] == 0 {
                        queue.push_back(t.dest);
                    }
                }
            }
        }
        for s in 0..n {
            if !placed[s] {
                order.push(s);
            }
        }
        order
    }

    /// Check that every transition into a state agrees with that state's
    /// left-context annotation. Wildcards (and positions older than the
    /// source's annotation) match anything.
    pub fn verify_contexts(&self) -> Result<()> {
        for (src, state) in self.states.iter().enumerate() {
            let src_context: Vec<char> = state.left_context.chars().collect();
            for t in &state.trans {
                let dest = &self.states[t.dest];
                let mut incoming: Vec<char> = src_context.clone();
                if let Some(out) = t.out_base {
                    incoming.push(out);
                }
                for (offset, expect) in dest.left_context.chars().rev().enumerate() {
                    let got = if offset < incoming.len() {
                        incoming[incoming.len() - 1 - offset]
                    } else {
                        WILD_CONTEXT
                    };
                    if expect != WILD_CONTEXT && got != WILD_CONTEXT && expect != got {
                        bail!(
                            "left context of state '{}' expects '{}' {} base(s) back, \
                             but the transition from state '{}' provides '{}'",
                            dest.name,
                            expect,
                            offset + 1,
                            self.states[src].name,
                            got
                        );
                    }
                }
            }
        }
        Ok(())
    }

    pub fn state_name_width(&self) -> usize {
        self.states.iter().map(|s| s.name.len()).max().unwrap_or(0)
    }
}
