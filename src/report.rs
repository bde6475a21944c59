//! Tab-separated outputs: one estimate per locus, and the per-threshold
//! diagnostics used to tune the score ladder offline.
use crate::estimate::{CopyNumber, Estimate};
use crate::locus::VntrLocus;
use std::io::Write;

/// `locus_id<TAB>copy_number`, or `NA` if unresolved.
pub fn write_estimate<W: Write>(
    wtr: &mut W,
    locus: &VntrLocus,
    copy_number: &CopyNumber,
) -> std::io::Result<()> {
    match copy_number {
        CopyNumber::Resolved(cn) => writeln!(wtr, "{}\t{}", locus.id(), cn),
        CopyNumber::Unresolved(_) => writeln!(wtr, "{}\tNA", locus.id()),
    }
}

/// `fp<TAB>sensitivity<TAB>threshold<TAB>locus_id<TAB>unit_length<TAB>tp`,
/// one line per threshold.
pub fn append_diagnostics<W: Write>(
    wtr: &mut W,
    locus: &VntrLocus,
    estimate: &Estimate,
) -> std::io::Result<()> {
    for eval in estimate.evaluations.iter() {
        writeln!(
            wtr,
            "{}\t{}\t{}\t{}\t{}\t{}",
            eval.false_positives,
            eval.sensitivity,
            eval.threshold,
            locus.id(),
            locus.unit_len(),
            eval.true_positives
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::{ThresholdEvaluation, UnresolvedReason};
    fn locus() -> VntrLocus {
        VntrLocus::new(
            "12".to_string(),
            b"CAGG".to_vec(),
            vec![b"CAGG".to_vec(); 3],
            vec![],
            vec![],
            "chr1".to_string(),
            0,
        )
    }
    #[test]
    fn estimates() {
        let mut out = vec![];
        write_estimate(&mut out, &locus(), &CopyNumber::Resolved(3.5)).unwrap();
        let unresolved = CopyNumber::Unresolved(UnresolvedReason::CoverageUnavailable);
        write_estimate(&mut out, &locus(), &unresolved).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "12\t3.5\n12\tNA\n");
    }
    #[test]
    fn diagnostics() {
        let eval = ThresholdEvaluation {
            threshold: -40f64,
            accepted: 10,
            true_positives: 9,
            false_positives: 1,
            sensitivity: 0.75,
            occurrence: 30f64,
        };
        let estimate = Estimate {
            copy_number: CopyNumber::Resolved(3f64),
            min_score: -35.5,
            coverage: 10f64,
            read_length: 150,
            reads_scanned: 100,
            reads_decoded: 12,
            reads_skipped: 0,
            evaluations: vec![eval],
            selected_threshold: Some(-40f64),
        };
        let mut out = vec![];
        append_diagnostics(&mut out, &locus(), &estimate).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1\t0.75\t-40\t12\t4\t9\n");
    }
}
