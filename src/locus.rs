//! Reference VNTR loci.
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// A reference VNTR: the repeat unit, the segments observed in the
/// reference genome, and the sequence around them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VntrLocus {
    id: String,
    pattern: Vec<u8>,
    repeat_segments: Vec<Vec<u8>>,
    left_flank: Vec<u8>,
    right_flank: Vec<u8>,
    chromosome: String,
    start: usize,
}

impl VntrLocus {
    pub fn new(
        id: String,
        pattern: Vec<u8>,
        repeat_segments: Vec<Vec<u8>>,
        left_flank: Vec<u8>,
        right_flank: Vec<u8>,
        chromosome: String,
        start: usize,
    ) -> Self {
        Self {
            id,
            pattern,
            repeat_segments,
            left_flank,
            right_flank,
            chromosome,
            start,
        }
    }
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }
    pub fn unit_len(&self) -> usize {
        self.pattern.len()
    }
    pub fn repeat_segments(&self) -> &[Vec<u8>] {
        &self.repeat_segments
    }
    pub fn left_flank(&self) -> &[u8] {
        &self.left_flank
    }
    pub fn right_flank(&self) -> &[u8] {
        &self.right_flank
    }
    pub fn chromosome(&self) -> &str {
        &self.chromosome
    }
    pub fn start(&self) -> usize {
        self.start
    }
    /// Length of the repeat region in the reference.
    pub fn length(&self) -> usize {
        self.repeat_segments.iter().map(|s| s.len()).sum()
    }
    pub fn end(&self) -> usize {
        self.start + self.length()
    }
    /// The number of unit copies a read of `read_length` can span.
    pub fn copy_count(&self, read_length: usize) -> usize {
        let unit_len = self.unit_len().max(1);
        (read_length as f64 / unit_len as f64 + 0.5).round() as usize
    }
    /// The reference haplotype: flanks around the repeat segments.
    pub fn reference_sequence(&self) -> Vec<u8> {
        let mut seq = self.left_flank.clone();
        self.repeat_segments
            .iter()
            .for_each(|segment| seq.extend_from_slice(segment));
        seq.extend_from_slice(&self.right_flank);
        seq
    }
}

// Sequences are stored as strings in the JSON files.
#[derive(Deserialize)]
struct RawLocus {
    id: String,
    pattern: String,
    repeat_segments: Vec<String>,
    left_flank: String,
    right_flank: String,
    chromosome: String,
    start: usize,
}

impl From<RawLocus> for VntrLocus {
    fn from(raw: RawLocus) -> Self {
        Self::new(
            raw.id,
            raw.pattern.into_bytes(),
            raw.repeat_segments
                .into_iter()
                .map(String::into_bytes)
                .collect(),
            raw.left_flank.into_bytes(),
            raw.right_flank.into_bytes(),
            raw.chromosome,
            raw.start,
        )
    }
}

/// Parse a JSON array of loci.
pub fn load_loci<R: std::io::Read>(rdr: R) -> Result<Vec<VntrLocus>> {
    let raw: Vec<RawLocus> = serde_json::from_reader(rdr)?;
    Ok(raw.into_iter().map(VntrLocus::from).collect())
}
