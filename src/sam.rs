//! Tiny library to read SAM file(read only).
//!
//! Only what is needed to list the reads mapped over a locus: names, flags,
//! positions, and CIGAR strings.
use crate::error::{Result, VntrError};
use std::collections::HashSet;
use std::io::BufRead;

/// SAM Record. Optional columns past the quality string are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    q_name: String,
    flag: u32,
    r_name: String,
    pos: usize,
    cigar: String,
}

impl Record {
    pub fn new(input: &str) -> Option<Self> {
        let mut contents = input.split('\t');
        let q_name = contents.next()?.to_string();
        let flag = contents.next()?.parse().ok()?;
        let r_name = contents.next()?.to_string();
        let pos = contents.next()?.parse().ok()?;
        // MAPQ is only checked.
        contents.next()?.parse::<u8>().ok()?;
        let cigar = contents.next()?.to_string();
        Some(Self {
            q_name,
            flag,
            r_name,
            pos,
            cigar,
        })
    }
    pub fn q_name(&self) -> &str {
        &self.q_name
    }
    pub fn r_name(&self) -> &str {
        &self.r_name
    }
    pub fn flag(&self) -> u32 {
        self.flag
    }
    pub fn is_unmapped(&self) -> bool {
        (self.flag & 0x4) == 0x4
    }
    /// Neither a secondary nor a supplementary alignment.
    pub fn is_primary(&self) -> bool {
        (self.flag & 0x900) == 0
    }
    /// Return the mapping region with respect to the reference(0-based,
    /// half open).
    pub fn get_range(&self) -> (usize, usize) {
        let start = self.pos;
        if start == 0 {
            return (0, 0);
        };
        use self::Op::*;
        let len: usize = self
            .cigar()
            .iter()
            .map(|op| match *op {
                Align(b) | Match(b) | Deletion(b) | Skipped(b) | Mismatch(b) => b,
                Insertion(_) | SoftClip(_) | HardClip(_) | Padding(_) => 0,
            })
            .sum();
        (start - 1, start + len - 1)
    }
    #[inline]
    pub fn cigar(&self) -> Vec<Op> {
        parse_cigar_string(&self.cigar)
    }
    /// Whether the aligned part of the read overlaps `[start, end)` of
    /// `chromosome`.
    pub fn overlaps(&self, chromosome: &str, start: usize, end: usize) -> bool {
        if self.is_unmapped() || self.r_name != chromosome {
            return false;
        }
        let (ref_start, ref_end) = self.get_range();
        ref_start < ref_end && ref_start < end && start < ref_end
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Op {
    Align(usize),     //M
    Insertion(usize), //I
    Deletion(usize),  //D
    Skipped(usize),   //N
    SoftClip(usize),  //S
    HardClip(usize),  //H
    Padding(usize),   //P
    Match(usize),     //=
    Mismatch(usize),  //X
}

impl Op {
    pub fn from(num: usize, op: u8) -> Option<Op> {
        match op {
            b'M' => Some(Op::Align(num)),
            b'I' => Some(Op::Insertion(num)),
            b'D' => Some(Op::Deletion(num)),
            b'N' => Some(Op::Skipped(num)),
            b'S' => Some(Op::SoftClip(num)),
            b'H' => Some(Op::HardClip(num)),
            b'P' => Some(Op::Padding(num)),
            b'=' => Some(Op::Match(num)),
            b'X' => Some(Op::Mismatch(num)),
            _ => None,
        }
    }
}

/// Parse a CIGAR string. `*` and unknown operations yield nothing.
#[inline]
pub fn parse_cigar_string(cigar: &str) -> Vec<Op> {
    let mut ops = vec![];
    let mut num = 0;
    for x in cigar.bytes() {
        if x.is_ascii_digit() {
            num = 10 * num + (x - b'0') as usize;
        } else {
            if let Some(res) = Op::from(num, x) {
                ops.push(res);
            }
            num = 0;
        }
    }
    ops
}

/// Names of the reads whose alignment overlaps `[start, end)` on
/// `chromosome`, along with the number of primary records read.
/// Secondary and supplementary alignments are ignored.
pub fn related_reads<R: BufRead>(
    rdr: R,
    chromosome: &str,
    start: usize,
    end: usize,
) -> Result<(HashSet<String>, usize)> {
    let mut related = HashSet::new();
    let mut records = 0;
    for (lineno, line) in rdr.lines().enumerate() {
        let line = line?;
        if line.starts_with('@') || line.is_empty() {
            continue;
        }
        let record = Record::new(&line)
            .ok_or_else(|| VntrError::Sam(format!("line {}: {}", lineno + 1, line)))?;
        if !record.is_primary() {
            continue;
        }
        records += 1;
        if record.overlaps(chromosome, start, end) {
            related.insert(record.q_name);
        }
    }
    debug!(
        "{} of {} records overlap {}:{}-{}",
        related.len(),
        records,
        chromosome,
        start,
        end
    );
    Ok((related, records))
}
