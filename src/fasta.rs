//! Very thin Fasta reader and writer.
//!
//! Sequencing reads are streamed record by record through [`FastaReads`],
//! possibly over several files, while small files such as aligned repeat
//! segments are read at once.
use crate::error::Result;
use std::io::{BufRead, BufReader};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
pub type FASTARecord = (String, Vec<u8>);

/// A sequencing read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    pub id: String,
    pub seq: Vec<u8>,
    /// Precomputed reverse complement, if the source provides one.
    pub reverse_complement: Option<Vec<u8>>,
}

impl ReadRecord {
    pub fn new(id: String, seq: Vec<u8>) -> Self {
        Self {
            id,
            seq,
            reverse_complement: None,
        }
    }
    pub fn with_reverse_complement(mut self, revcomp: Vec<u8>) -> Self {
        self.reverse_complement = Some(revcomp);
        self
    }
}

/// Streaming reader over the records of one or more Fasta files, in order.
/// A record never spans two files.
pub struct FastaReads {
    files: std::vec::IntoIter<PathBuf>,
    lines: Option<std::io::Lines<Box<dyn BufRead>>>,
    id: Option<String>,
    seq: Vec<u8>,
}

impl FastaReads {
    pub fn open<P: AsRef<Path>>(files: &[P]) -> Self {
        let files: Vec<_> = files.iter().map(|f| f.as_ref().to_path_buf()).collect();
        Self {
            files: files.into_iter(),
            lines: None,
            id: None,
            seq: vec![],
        }
    }
    pub fn from_reader<R: BufRead + 'static>(rdr: R) -> Self {
        let rdr: Box<dyn BufRead> = Box::new(rdr);
        Self {
            files: vec![].into_iter(),
            lines: Some(rdr.lines()),
            id: None,
            seq: vec![],
        }
    }
    // Finish the pending record, if any, and start `next_id`.
    fn take_pending(&mut self, next_id: Option<String>) -> Option<ReadRecord> {
        let seq = std::mem::take(&mut self.seq);
        let id = std::mem::replace(&mut self.id, next_id)?;
        Some(ReadRecord::new(id, seq))
    }
}

impl Iterator for FastaReads {
    type Item = Result<ReadRecord>;
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let lines = match self.lines.as_mut() {
                Some(lines) => lines,
                None => {
                    let file = self.files.next()?;
                    debug!("Opening {}", file.display());
                    match std::fs::File::open(&file) {
                        Ok(rdr) => {
                            let rdr: Box<dyn BufRead> = Box::new(BufReader::new(rdr));
                            self.lines = Some(rdr.lines());
                            continue;
                        }
                        Err(why) => return Some(Err(why.into())),
                    }
                }
            };
            match lines.next() {
                Some(Ok(line)) => match line.strip_prefix('>') {
                    Some(header) => {
                        let id = header.split_whitespace().next().unwrap_or("").to_string();
                        if let Some(record) = self.take_pending(Some(id)) {
                            return Some(Ok(record));
                        }
                    }
                    None => self.seq.extend(line.trim_end().bytes()),
                },
                Some(Err(why)) => return Some(Err(why.into())),
                None => {
                    self.lines = None;
                    if let Some(record) = self.take_pending(None) {
                        return Some(Ok(record));
                    }
                }
            }
        }
    }
}

/// Write records into the writer
pub fn write_fasta<W: Write>(
    wtr: &mut BufWriter<W>,
    records: &[FASTARecord],
) -> std::io::Result<()> {
    for (id, seq) in records {
        writeln!(wtr, ">{}\n{}", id, String::from_utf8_lossy(seq))?;
    }
    Ok(())
}

/// Read a whole Fasta file.
pub fn read_fasta<P: AsRef<Path>>(file: P) -> std::io::Result<Vec<FASTARecord>> {
    let mut reader = std::fs::File::open(file).map(BufReader::new)?;
    let mut contents = vec![];
    std::io::Read::read_to_end(&mut reader, &mut contents)?;
    Ok(parse_fasta(&contents))
}

/// Parse Fasta records. Anything before the first '>' is ignored.
pub fn parse_fasta(contents: &[u8]) -> Vec<FASTARecord> {
    contents
        .split(|&x| x == b'>')
        .skip(1)
        .filter_map(|record| {
            let mut record = record.splitn(2, |&x| x == b'\n');
            let id = record.next()?.split(|&x| x == b' ').next()?;
            let contents = record.next()?;
            let contents: Vec<_> = contents
                .iter()
                .filter(|&&x| x != b'\n' && x != b'\r')
                .copied()
                .collect();
            let id = String::from_utf8_lossy(id).trim_end().to_string();
            Some((id, contents))
        })
        .collect()
}
