//! Candidate reads of a locus, as selected by an external prefilter.
use crate::error::Result;
use crate::locus::VntrLocus;
use std::collections::HashSet;
use std::io::BufRead;
use std::path::{Path, PathBuf};

pub trait CandidateSource: Send + Sync {
    /// Identifiers of the reads that may overlap `locus`.
    fn candidates(&self, locus: &VntrLocus) -> Result<HashSet<String>>;
}

/// The same identifiers for every locus.
impl CandidateSource for HashSet<String> {
    fn candidates(&self, _locus: &VntrLocus) -> Result<HashSet<String>> {
        Ok(self.clone())
    }
}

/// A directory with one `<locus id>.ids` file per locus, one read id per
/// line. This is the tabular output of a BLAST search with `sallseqid` as
/// the only column.
#[derive(Debug, Clone)]
pub struct IdListDirectory {
    root: PathBuf,
}

impl IdListDirectory {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl CandidateSource for IdListDirectory {
    fn candidates(&self, locus: &VntrLocus) -> Result<HashSet<String>> {
        let path = self.root.join(format!("{}.ids", locus.id()));
        let rdr = match std::fs::File::open(&path) {
            Ok(rdr) => std::io::BufReader::new(rdr),
            Err(why) if why.kind() == std::io::ErrorKind::NotFound => {
                warn!("No candidate list for {} ({})", locus.id(), path.display());
                return Ok(HashSet::new());
            }
            Err(why) => return Err(why.into()),
        };
        let mut ids = HashSet::new();
        for line in rdr.lines() {
            let line = line?;
            let id = line.trim();
            if !id.is_empty() {
                ids.insert(id.to_string());
            }
        }
        debug!("{} candidate reads for {}", ids.len(), locus.id());
        Ok(ids)
    }
}
