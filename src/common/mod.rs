//! Common functionality.

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

/// Commonly used command line arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: Verbosity::new(0, 0),
        }
    }
}

/// Strip leading separator from genotype string, e.g., "/1" for hemizygous calls.
pub fn strip_gt_leading_slash(gt: &str) -> &str {
    if gt.starts_with('/') || gt.starts_with('|') {
        &gt[1..]
    } else {
        gt
    }
}

/// Canonicalize chromosome name by removing any "chr" prefix, so that
/// "chr1" and "1" compare equal.
pub fn canonicalize_chrom(chrom: &str) -> &str {
    chrom.strip_prefix("chr").unwrap_or(chrom)
}

/// Return the zero-based alternate allele indices of a genotype string.
///
/// Allele `1` maps to the first alternate allele at index `0` and so on.
/// Reference alleles and no-calls (".") are skipped; phased and unphased
/// genotypes are treated the same.  The result is sorted and contains each
/// index at most once, so "2/2" yields `[1]` and "1/2" yields `[0, 1]`.
///
/// # Errors
///
/// Returns an error if an allele is neither "." nor a number.
pub fn alt_allele_indices(gt: &str) -> Result<Vec<usize>, anyhow::Error> {
    let mut result = Vec::new();
    for allele in strip_gt_leading_slash(gt).split(['/', '|']) {
        if allele == "." || allele.is_empty() {
            continue;
        }
        let allele = allele
            .parse::<usize>()
            .map_err(|e| anyhow::anyhow!("invalid allele {:?} in genotype {:?}: {}", allele, gt, e))?;
        if allele > 0 && !result.contains(&(allele - 1)) {
            result.push(allele - 1);
        }
    }
    result.sort_unstable();
    Ok(result)
}
