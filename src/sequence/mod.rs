//! DNA alphabet plumbing and FASTA I/O.
//!
//! Observed sequences are kept as ASCII bytes at the edges and converted to
//! 2-bit base indices before any scoring work.

use anyhow::{Context, Result};
use bio::io::fasta;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const DNA_ALPHABET: &[u8; 4] = b"ACGT";

/// 2-bit index of a DNA base (A=0, C=1, G=2, T=3).
#[inline]
pub fn base_index(b: u8) -> Option<u8> {
    match b {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

#[inline]
pub fn index_base(i: u8) -> char {
    DNA_ALPHABET[i as usize] as char
}

/// Encode a sequence as base indices. `Err` carries the first byte that is
/// not a DNA base.
pub fn encode_dna(seq: &[u8]) -> std::result::Result<Vec<u8>, u8> {
    seq.iter().map(|&b| base_index(b).ok_or(b)).collect()
}

/// A named sequence, uppercased, id trimmed at the first whitespace.
#[derive(Debug, Clone)]
pub struct FastaRecord {
    pub name: String,
    pub seq: Vec<u8>,
}

pub fn read_fasta(path: &Path) -> Result<Vec<FastaRecord>> {
    let reader = fasta::Reader::from_file(path)
        .with_context(|| format!("failed to open FASTA file {}", path.display()))?;
    let mut records = Vec::new();
    for rec in reader.records() {
        let rec = rec.with_context(|| format!("malformed FASTA record in {}", path.display()))?;
        let name = rec
            .id()
            .split_whitespace()
            .next()
            .unwrap_or("unknown")
            .to_string();
        records.push(FastaRecord {
            name,
            seq: rec.seq().to_ascii_uppercase(),
        });
    }
    Ok(records)
}

/// Write `(name, seq)` pairs as FASTA to a file, or to stdout when no path is
/// given.
pub fn write_fasta<'a, I>(records: I, out_path: Option<&PathBuf>) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let stdout = io::stdout();
    let writer: Box<dyn Write> = if let Some(path) = out_path {
        Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        ))
    } else {
        Box::new(BufWriter::new(stdout.lock()))
    };
    let mut writer = fasta::Writer::new(writer);
    for (name, seq) in records {
        writer.write(name, None, seq)?;
    }
    Ok(())
}
