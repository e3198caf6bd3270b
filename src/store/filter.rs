use rand::{rngs::SmallRng, Rng, SeedableRng};

use super::SeqStore;
use crate::{error::Result, read::Which};

/// Outcome of [`SeqStore::filter_to_target_coverage`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterSummary {
    /// Bases wanted: genome size times coverage
    pub target_bases: u64,
    pub reads_kept: u64,
    pub bases_kept: u64,
    pub reads_ignored: u64,
    pub bases_ignored: u64,
}

struct Scored {
    id: u32,
    length: u32,
    score: f64,
}

impl SeqStore {
    /// Keeps a random, length-biased subset of reads covering the genome `coverage` times
    ///
    /// Every read with a usable sequence of the selected form is scored
    /// `uniform(0, 1] * length^bias`. Reads are taken in decreasing score order until
    /// their bases reach `genome_size * coverage`; the remaining reads are marked
    /// ignored. A positive bias favors long reads, zero is unbiased and a negative bias
    /// favors short reads.
    ///
    /// The same non-zero `seed` always selects the same reads; seed zero draws entropy
    /// from the operating system. A target of zero bases leaves the store untouched.
    pub fn filter_to_target_coverage(
        &mut self,
        genome_size: u64,
        coverage: f64,
        bias: f64,
        seed: u64,
        which: Which,
    ) -> Result<FilterSummary> {
        self.writable()?;
        let which = self.resolve(which);
        let target_bases = target_bases(genome_size, coverage);
        let mut summary = FilterSummary {
            target_bases,
            ..FilterSummary::default()
        };
        if target_bases == 0 {
            return Ok(summary);
        }

        let mut rng = if seed == 0 {
            SmallRng::from_os_rng()
        } else {
            SmallRng::seed_from_u64(seed)
        };

        let mut reads: Vec<Scored> = (1..=self.last_read_id())
            .filter_map(|id| {
                let length = self.read_length(id, which);
                (length > 0).then(|| Scored {
                    id,
                    length,
                    score: (1.0 - rng.random::<f64>()) * f64::from(length).powf(bias),
                })
            })
            .collect();
        reads.sort_by(|a, b| b.score.total_cmp(&a.score));

        for read in reads {
            if summary.bases_kept < target_bases {
                summary.reads_kept += 1;
                summary.bases_kept += u64::from(read.length);
            } else {
                self.set_ignored(read.id, true, true, which)?;
                summary.reads_ignored += 1;
                summary.bases_ignored += u64::from(read.length);
            }
        }

        log::info!(
            "coverage filter: wanted {target_bases} bases, kept {} reads ({} bases), ignored {} reads ({} bases)",
            summary.reads_kept,
            summary.bases_kept,
            summary.reads_ignored,
            summary.bases_ignored,
        );
        Ok(summary)
    }
}

/// Bases wanted for `coverage`-fold coverage of a genome of `genome_size` bases
#[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn target_bases(genome_size: u64, coverage: f64) -> u64 {
    (genome_size as f64 * coverage).floor().max(0.0) as u64
}
