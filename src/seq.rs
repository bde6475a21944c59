// Nucleotide encoding shared by the trainer and the decoder.
//
// Bases are mapped to two bits (A->00, C->01, G->10, T->11) regardless of
// case. The gap of an aligned row gets its own code, and everything else
// maps to `NULL` so that a single table lookup doubles as validation.
use crate::error::{Result, VntrError};

pub(crate) const ADENINE: u8 = 0b00;
pub(crate) const CYTOSINE: u8 = 0b01;
pub(crate) const GUANINE: u8 = 0b10;
pub(crate) const THYMINE: u8 = 0b11;
pub(crate) const GAP: u8 = 0b100;
pub(crate) const NULL: u8 = 0b101;

/// The emission alphabet, in twobit order.
pub const ALPHABET: &[u8; 4] = b"ACGT";

const fn lookup_table() -> [u8; 256] {
    let mut slots = [NULL; 256];
    slots[b'A' as usize] = ADENINE;
    slots[b'a' as usize] = ADENINE;
    slots[b'C' as usize] = CYTOSINE;
    slots[b'c' as usize] = CYTOSINE;
    slots[b'G' as usize] = GUANINE;
    slots[b'g' as usize] = GUANINE;
    slots[b'T' as usize] = THYMINE;
    slots[b't' as usize] = THYMINE;
    slots[b'-' as usize] = GAP;
    slots
}
pub(crate) const LOOKUP_TABLE: [u8; 256] = lookup_table();

// Convert a char to two bit encoding.
pub(crate) const fn convert_to_twobit(base: &u8) -> u8 {
    LOOKUP_TABLE[*base as usize]
}

/// Encode a read for decoding. Gaps and any non-ACGT symbol are rejected.
pub fn encode(seq: &[u8]) -> Result<Vec<u8>> {
    if seq.is_empty() {
        return Err(VntrError::EmptySequence);
    }
    seq.iter()
        .enumerate()
        .map(|(position, base)| match convert_to_twobit(base) {
            code if code < GAP => Ok(code),
            _ => Err(VntrError::Alphabet {
                symbol: *base,
                position,
            }),
        })
        .collect()
}

/// Reverse complement. Lower-case input is returned upper-case; symbols
/// outside ACGT are kept as they are so the decoder can reject them.
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|base| match convert_to_twobit(base) {
            ADENINE => b'T',
            CYTOSINE => b'G',
            GUANINE => b'C',
            THYMINE => b'A',
            _ => *base,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn twobit() {
        let xs = b"CACAGTCGATGCTAGCTAGTACGTacgt";
        let encoded = encode(xs).unwrap();
        let decoded: Vec<_> = encoded.iter().map(|&x| ALPHABET[x as usize]).collect();
        assert_eq!(decoded, xs.to_ascii_uppercase());
    }
    #[test]
    fn rejects() {
        assert!(matches!(encode(b""), Err(VntrError::EmptySequence)));
        match encode(b"ACGNT") {
            Err(VntrError::Alphabet { symbol, position }) => {
                assert_eq!(symbol, b'N');
                assert_eq!(position, 3);
            }
            x => panic!("{:?}", x),
        }
        assert!(encode(b"AC-GT").is_err());
    }
    #[test]
    fn revcmp() {
        assert_eq!(reverse_complement(b"AACGTt"), b"AACGTT".to_vec());
        let xs = b"GATTACAGGC";
        assert_eq!(reverse_complement(&reverse_complement(xs)), xs.to_vec());
    }
}
