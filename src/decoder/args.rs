use clap::Args;
use std::path::PathBuf;

use crate::mutator::MutatorParams;

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Machine graph (JSON) mapping input strings to DNA
    #[arg(short, long)]
    pub machine: PathBuf,
    /// Observed DNA sequences (FASTA)
    #[arg(short, long)]
    pub seqs: PathBuf,
    /// Output FASTA of decoded input strings (stdout if omitted)
    #[arg(short, long)]
    pub out: Option<PathBuf>,
    /// Probability of a transition substitution (A<->G, C<->T)
    #[arg(long, default_value_t = 0.01)]
    pub sub_transition: f64,
    /// Probability of each transversion substitution
    #[arg(long, default_value_t = 0.005)]
    pub sub_transversion: f64,
    /// Probability of opening a deletion
    #[arg(long, default_value_t = 0.01)]
    pub del_open: f64,
    /// Probability of extending an open deletion
    #[arg(long, default_value_t = 0.5)]
    pub del_extend: f64,
    /// Probability of opening a tandem duplication
    #[arg(long, default_value_t = 0.01)]
    pub dup_open: f64,
    /// Longest tandem duplication considered
    #[arg(long, default_value_t = 4)]
    pub max_dup_len: usize,
    /// Allow the decode to start and end at any machine state
    #[arg(long, default_value_t = false)]
    pub local: bool,
    #[arg(long, short = 'v', default_value_t = false)]
    pub verbose: bool,
}

impl DecodeArgs {
    pub fn mutator_params(&self) -> MutatorParams {
        MutatorParams {
            p_transition: self.sub_transition,
            p_transversion: self.sub_transversion,
            p_del_open: self.del_open,
            p_del_extend: self.del_extend,
            p_tan_dup: self.dup_open,
            dup_len_prob: MutatorParams::uniform_dup_len(self.max_dup_len),
            local: self.local,
        }
    }
}
