//! Cis-window classification over the coordinate-sorted SNP walk.

use crate::types::{Anchor, Ftr, SnpCatalog, SnpIdx};

/// Where a SNP falls relative to a feature's cis window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CisStatus {
    /// Before the window; keep walking.
    Upstream,
    InCis,
    /// Past the window; the sorted walk can stop.
    Downstream,
}

/// Classify one coordinate against a feature window. Under `FSS` the window
/// is anchored on the feature start only; under `FSS+FES` it spans from
/// start to end. The lower bound clamps at the chromosome origin.
pub fn classify(coord: u64, start: u64, end: u64, anchor: Anchor, len_cis: u64) -> CisStatus {
    let (lo_anchor, hi_anchor) = match anchor {
        Anchor::Fss => (start, start),
        Anchor::FssFes => (start, end),
    };
    let lo = lo_anchor.saturating_sub(len_cis);
    let hi = hi_anchor + len_cis;
    if coord > hi {
        CisStatus::Downstream
    } else if coord >= lo {
        CisStatus::InCis
    } else {
        CisStatus::Upstream
    }
}

/// Walk the feature's chromosome in coordinate order and collect the cis
/// SNPs, terminating at the first SNP past the window.
pub fn find_cis_snps(ftr: &Ftr, catalog: &SnpCatalog, anchor: Anchor, len_cis: u64) -> Vec<SnpIdx> {
    let mut out = Vec::new();
    for &idx in catalog.on_chr(&ftr.chr) {
        match classify(catalog.snps[idx].coord, ftr.start, ftr.end, anchor, len_cis) {
            CisStatus::Downstream => break,
            CisStatus::Upstream => continue,
            CisStatus::InCis => out.push(idx),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Ftr, Snp};

    fn snp(name: &str, coord: u64) -> Snp {
        Snp {
            name: name.into(),
            chr: "chr1".into(),
            coord,
            genos: vec![0.0],
            is_na: vec![false],
            maf: 0.1,
        }
    }

    #[test]
    fn fss_window_boundaries_are_inclusive() {
        let (start, end, l) = (1000u64, 1100u64, 100u64);
        let c = |coord| classify(coord, start, end, Anchor::Fss, l);
        assert_eq!(c(899), CisStatus::Upstream);
        assert_eq!(c(900), CisStatus::InCis);
        assert_eq!(c(1100), CisStatus::InCis);
        assert_eq!(c(1101), CisStatus::Downstream);
    }

    #[test]
    fn fss_fes_extends_past_the_feature_end() {
        let (start, end, l) = (1000u64, 1100u64, 100u64);
        let c = |coord| classify(coord, start, end, Anchor::FssFes, l);
        assert_eq!(c(1101), CisStatus::InCis);
        assert_eq!(c(1200), CisStatus::InCis);
        assert_eq!(c(1201), CisStatus::Downstream);
    }

    #[test]
    fn window_clamps_at_chromosome_origin() {
        assert_eq!(classify(1, 50, 60, Anchor::Fss, 100), CisStatus::InCis);
    }

    #[test]
    fn sorted_walk_collects_in_window_and_stops_early() {
        let catalog = SnpCatalog::new(vec![
            snp("a", 899),
            snp("b", 900),
            snp("c", 1100),
            snp("d", 1101),
            snp("e", 5000),
        ]);
        let mut ftr = Ftr::new("gene1", 1);
        ftr.chr = "chr1".into();
        ftr.start = 1000;
        ftr.end = 1100;
        let cis = find_cis_snps(&ftr, &catalog, Anchor::Fss, 100);
        let names: Vec<&str> = cis.iter().map(|&i| catalog.snps[i].name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }
}
