//! Multiple alignment of the repeat segments of a locus.
//!
//! The profile trainer needs equal-length gapped rows. Segments taken from a
//! reference annotation usually have different lengths, so they are handed
//! to an external aligner (MUSCLE by default) through Fasta on stdin/stdout.
use crate::error::{Result, VntrError};
use crate::fasta::{parse_fasta, write_fasta};
use std::io::{BufWriter, Write};
use std::process::{Command, Stdio};

pub trait SegmentAligner: Send + Sync {
    /// Align `segments`. The i-th output row corresponds to the i-th segment.
    fn align(&self, segments: &[Vec<u8>]) -> Result<Vec<Vec<u8>>>;
}

/// Segments that are already aligned.
#[derive(Debug, Clone, Copy, Default)]
pub struct Prealigned;

impl SegmentAligner for Prealigned {
    fn align(&self, segments: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        let width = segments.first().map(|s| s.len()).unwrap_or(0);
        match segments.iter().position(|s| s.len() != width) {
            Some(i) => Err(VntrError::InputShape(format!(
                "segment {} has length {}, expected {}",
                i,
                segments[i].len(),
                width
            ))),
            None => Ok(segments.to_vec()),
        }
    }
}

/// An aligner run as a child process reading Fasta on stdin and writing the
/// aligned Fasta to stdout, e.g., `muscle -quiet`.
#[derive(Debug, Clone)]
pub struct ExternalAligner {
    program: String,
    args: Vec<String>,
}

impl ExternalAligner {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|x| x.to_string()).collect(),
        }
    }
    /// Split a command line on whitespace. `None` if it is blank.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut words = command.split_whitespace();
        let program = words.next()?;
        let args: Vec<_> = words.collect();
        Some(Self::new(program, &args))
    }
    fn run(&self, input: &[u8]) -> Result<Vec<u8>> {
        let tool_error = |why: std::io::Error| {
            VntrError::ExternalTool(format!("could not run {}: {}", self.program, why))
        };
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(tool_error)?;
        // Feed stdin from another thread, as the tool may start writing
        // before it has read everything.
        let feeder = child.stdin.take().map(|mut stdin| {
            let input = input.to_vec();
            std::thread::spawn(move || stdin.write_all(&input))
        });
        let output = child.wait_with_output().map_err(tool_error)?;
        let fed = match feeder.map(|feeder| feeder.join()) {
            Some(Ok(result)) => result.map_err(tool_error),
            Some(Err(_)) => Err(VntrError::ExternalTool(format!(
                "could not feed {}",
                self.program
            ))),
            None => Ok(()),
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(VntrError::ExternalTool(format!(
                "{} exited with {}: {}",
                self.program, output.status, stderr
            )));
        }
        fed?;
        Ok(output.stdout)
    }
}

impl std::default::Default for ExternalAligner {
    fn default() -> Self {
        Self::new("muscle", &["-quiet"])
    }
}

impl SegmentAligner for ExternalAligner {
    fn align(&self, segments: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        let records: Vec<_> = segments
            .iter()
            .enumerate()
            .map(|(i, seq)| (i.to_string(), seq.clone()))
            .collect();
        let mut wtr = BufWriter::new(vec![]);
        write_fasta(&mut wtr, &records)?;
        let input = wtr
            .into_inner()
            .map_err(|why| VntrError::Io(why.into_error()))?;
        debug!("Aligning {} segments with {}", segments.len(), self.program);
        let output = self.run(&input)?;
        // Aligners may reorder the records.
        let mut rows: Vec<Option<Vec<u8>>> = vec![None; segments.len()];
        for (id, row) in parse_fasta(&output) {
            match id.parse::<usize>().ok().and_then(|i| rows.get_mut(i)) {
                Some(slot) => *slot = Some(row),
                None => {
                    return Err(VntrError::ExternalTool(format!(
                        "{} returned an unknown record {}",
                        self.program, id
                    )))
                }
            }
        }
        rows.into_iter()
            .enumerate()
            .map(|(i, row)| {
                row.ok_or_else(|| {
                    VntrError::ExternalTool(format!("{} dropped segment {}", self.program, i))
                })
            })
            .collect()
    }
}

/// Use the segments as they are if they share one length; otherwise align
/// them with the external aligner, if any.
#[derive(Debug, Clone, Default)]
pub struct AutoAligner {
    external: Option<ExternalAligner>,
}

impl AutoAligner {
    pub fn new(external: Option<ExternalAligner>) -> Self {
        Self { external }
    }
}

impl SegmentAligner for AutoAligner {
    fn align(&self, segments: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        match (Prealigned.align(segments), self.external.as_ref()) {
            (Ok(rows), _) => Ok(rows),
            (Err(_), Some(external)) => external.align(segments),
            (Err(why), None) => Err(why),
        }
    }
}
