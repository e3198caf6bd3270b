//! Homopolymer compression
//!
//! Collapses every run of identical bases to its first base. The map between normal and
//! compressed coordinates is never stored; [`HomopolyMap`] rebuilds it from the normal
//! sequence whenever a clear range has to be translated.

/// Appends the homopolymer-compressed form of `seq` to `out`
///
/// Bases are compared case-insensitively.
pub fn compress(seq: &[u8], out: &mut Vec<u8>) {
    let mut last = None;
    for &base in seq {
        let upper = base.to_ascii_uppercase();
        if last != Some(upper) {
            out.push(base);
            last = Some(upper);
        }
    }
}

/// Returns the length `seq` would have after homopolymer compression
#[must_use]
pub fn compressed_len(seq: &[u8]) -> usize {
    if seq.is_empty() {
        return 0;
    }
    1 + seq
        .windows(2)
        .filter(|w| !w[0].eq_ignore_ascii_case(&w[1]))
        .count()
}

/// Position map between a normal sequence and its homopolymer-compressed form
///
/// Coordinates are half-open interval boundaries: a boundary of `0` is before the first
/// base and a boundary of `len` is after the last.
#[derive(Debug, Clone)]
pub struct HomopolyMap {
    /// Normal position where each compressed base (run) starts, plus a final sentinel
    /// holding the normal length
    run_starts: Vec<u32>,
    /// Run index of every normal position
    run_of: Vec<u32>,
}
impl HomopolyMap {
    #[must_use]
    pub fn new(seq: &[u8]) -> Self {
        let mut run_starts = Vec::new();
        let mut run_of = Vec::with_capacity(seq.len());
        for (pos, &base) in seq.iter().enumerate() {
            if pos == 0 || !base.eq_ignore_ascii_case(&seq[pos - 1]) {
                run_starts.push(pos as u32);
            }
            run_of.push(run_starts.len() as u32 - 1);
        }
        run_starts.push(seq.len() as u32);
        Self { run_starts, run_of }
    }

    /// Length of the normal sequence
    #[must_use]
    pub fn normal_len(&self) -> u32 {
        self.run_of.len() as u32
    }

    /// Length of the compressed sequence
    #[must_use]
    pub fn compressed_len(&self) -> u32 {
        self.run_starts.len() as u32 - 1
    }

    /// Translates a normal clear range to compressed coordinates
    ///
    /// Any run touched by the range is kept in full. Boundaries beyond the sequence are
    /// clamped to its end.
    #[must_use]
    pub fn to_compressed(&self, bgn: u32, end: u32) -> (u32, u32) {
        let len = self.normal_len();
        let bgn = bgn.min(len);
        let end = end.min(len);

        let cbgn = if bgn == len {
            self.compressed_len()
        } else {
            self.run_of[bgn as usize]
        };
        let cend = if end <= bgn {
            cbgn
        } else {
            self.run_of[end as usize - 1] + 1
        };
        (cbgn, cend.max(cbgn))
    }

    /// Translates a compressed clear range to normal coordinates
    ///
    /// The result covers every normal base of each compressed base in the range.
    #[must_use]
    pub fn to_normal(&self, cbgn: u32, cend: u32) -> (u32, u32) {
        let clen = self.compressed_len();
        let cbgn = cbgn.min(clen);
        let cend = cend.min(clen).max(cbgn);
        (
            self.run_starts[cbgn as usize],
            self.run_starts[cend as usize],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress() {
        let mut out = Vec::new();
        compress(b"AAACCGTTTTA", &mut out);
        assert_eq!(out, b"ACGTA");
        assert_eq!(compressed_len(b"AAACCGTTTTA"), 5);
        assert_eq!(compressed_len(b""), 0);
        assert_eq!(compressed_len(b"G"), 1);
    }

    #[test]
    fn test_map_lengths() {
        let map = HomopolyMap::new(b"AAACCGTTTTA");
        assert_eq!(map.normal_len(), 11);
        assert_eq!(map.compressed_len(), 5);
    }

    #[test]
    fn test_to_compressed() {
        //         runs: AAA CC G TTTT A
        //  normal:      012 34 5 6789 10
        //  compressed:  0   1  2 3    4
        let map = HomopolyMap::new(b"AAACCGTTTTA");
        assert_eq!(map.to_compressed(0, 11), (0, 5));
        assert_eq!(map.to_compressed(1, 4), (0, 2));
        assert_eq!(map.to_compressed(5, 6), (2, 3));
        assert_eq!(map.to_compressed(7, 7), (3, 3));
        assert_eq!(map.to_compressed(0, 40), (0, 5));
    }

    #[test]
    fn test_to_normal() {
        let map = HomopolyMap::new(b"AAACCGTTTTA");
        assert_eq!(map.to_normal(0, 5), (0, 11));
        assert_eq!(map.to_normal(1, 3), (3, 6));
        assert_eq!(map.to_normal(3, 4), (6, 10));
        assert_eq!(map.to_normal(4, 2), (10, 10));
    }

    #[test]
    fn test_empty_map() {
        let map = HomopolyMap::new(b"");
        assert_eq!(map.compressed_len(), 0);
        assert_eq!(map.to_compressed(0, 0), (0, 0));
        assert_eq!(map.to_normal(0, 3), (0, 0));
    }
}
