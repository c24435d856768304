//! The noisy channel applied to machine output: point substitutions, affine
//! deletions, and tandem duplications of recently emitted context.

/// Channel parameters in probability space. `dup_len_prob[k]` is the
/// probability that a duplication copies exactly `k + 1` bases.
#[derive(Debug, Clone)]
pub struct MutatorParams {
    /// Transition substitutions (A<->G, C<->T).
    pub p_transition: f64,
    /// Each of the two transversion substitutions per base.
    pub p_transversion: f64,
    pub p_del_open: f64,
    pub p_del_extend: f64,
    pub p_tan_dup: f64,
    pub dup_len_prob: Vec<f64>,
    /// Free choice of start and end machine state.
    pub local: bool,
}

impl MutatorParams {
    #[inline]
    pub fn max_dup_len(&self) -> usize {
        self.dup_len_prob.len()
    }

    /// Uniform duplication-length distribution over `1..=max_dup_len`.
    pub fn uniform_dup_len(max_dup_len: usize) -> Vec<f64> {
        if max_dup_len == 0 {
            Vec::new()
        } else {
            vec![1.0 / max_dup_len as f64; max_dup_len]
        }
    }
}

impl Default for MutatorParams {
    fn default() -> Self {
        Self {
            p_transition: 0.01,
            p_transversion: 0.005,
            p_del_open: 0.01,
            p_del_extend: 0.5,
            p_tan_dup: 0.01,
            dup_len_prob: Self::uniform_dup_len(4),
            local: false,
        }
    }
}

#[inline]
fn log_prob(p: f64) -> f64 {
    if p > 0.0 {
        p.ln()
    } else {
        f64::NEG_INFINITY
    }
}

/// Natural-log score table derived from [`MutatorParams`]. All entries are
/// <= 0; impossible events are -inf.
#[derive(Debug, Clone)]
pub struct MutatorScores {
    /// `sub[i][j]`: emitted base `i` observed as base `j`.
    pub sub: [[f64; 4]; 4],
    pub no_gap: f64,
    pub del_open: f64,
    pub del_extend: f64,
    pub del_end: f64,
    pub tan_dup: f64,
    /// `len[k]`: duplication of length `k + 1`.
    pub len: Vec<f64>,
    pub local: bool,
}

impl MutatorScores {
    pub fn new(params: &MutatorParams) -> Self {
        let p_match = 1.0 - params.p_transition - 2.0 * params.p_transversion;
        let mut sub = [[0.0; 4]; 4];
        for (i, row) in sub.iter_mut().enumerate() {
            for (j, entry) in row.iter_mut().enumerate() {
                // Transition partner of base i is i ^ 2 (A<->G, C<->T).
                *entry = if i == j {
                    log_prob(p_match)
                } else if j == (i ^ 2) {
                    log_prob(params.p_transition)
                } else {
                    log_prob(params.p_transversion)
                };
            }
        }
        Self {
            sub,
            no_gap: log_prob(1.0 - params.p_del_open - params.p_tan_dup),
            del_open: log_prob(params.p_del_open),
            del_extend: log_prob(params.p_del_extend),
            del_end: log_prob(1.0 - params.p_del_extend),
            tan_dup: log_prob(params.p_tan_dup),
            len: params.dup_len_prob.iter().map(|&p| log_prob(p)).collect(),
            local: params.local,
        }
    }

    /// Scores for a channel that never mutates: matches are free, everything
    /// else is impossible.
    pub fn neutral(max_dup_len: usize, local: bool) -> Self {
        Self::new(&MutatorParams {
            p_transition: 0.0,
            p_transversion: 0.0,
            p_del_open: 0.0,
            p_del_extend: 0.0,
            p_tan_dup: 0.0,
            dup_len_prob: MutatorParams::uniform_dup_len(max_dup_len),
            local,
        })
    }

    #[inline]
    pub fn max_dup_len(&self) -> usize {
        self.len.len()
    }
}
