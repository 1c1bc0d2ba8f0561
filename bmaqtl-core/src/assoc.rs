//! Association engine: for each feature, locate its cis-SNPs and run the
//! per-pair kernel for every subgroup with data.
//!
//! Features are independent once the catalogues are built, so the scan fans
//! out across threads; every result lands in its own feature, which keeps the
//! output identical with or without parallelism.

use rayon::prelude::*;

use crate::types::{AnalysisStep, Anchor, BfSet, Ftr, PairResult, SampleMaps, Snp, SnpCatalog};
use crate::{abf, cis, numerics};

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    pub anchor: Anchor,
    pub len_cis: u64,
    pub step: AnalysisStep,
    pub qnorm: bool,
    pub which_bfs: BfSet,
}

/// Aligned, non-missing (genotype, phenotype) pairs for one subgroup.
pub fn gather_pairs(
    ftr: &Ftr,
    snp: &Snp,
    s: usize,
    pheno_idx: &[Vec<Option<usize>>],
    geno_idx: &[Vec<Option<usize>>],
) -> (Vec<f64>, Vec<f64>) {
    let mut g = Vec::new();
    let mut y = Vec::new();
    for i in 0..pheno_idx[s].len() {
        if let (Some(ip), Some(ig)) = (pheno_idx[s][i], geno_idx[0][i]) {
            if !ftr.is_na[s][ip] && !snp.is_na[ig] {
                y.push(ftr.phenos[s][ip]);
                g.push(snp.genos[ig]);
            }
        }
    }
    (g, y)
}

/// Same gathering, but the phenotype side reads through a shuffled index
/// vector while the genotype side stays in place.
pub fn gather_pairs_permuted(
    ftr: &Ftr,
    snp: &Snp,
    s: usize,
    pheno_idx: &[Vec<Option<usize>>],
    geno_idx: &[Vec<Option<usize>>],
    perm: &[usize],
) -> (Vec<f64>, Vec<f64>) {
    let mut g = Vec::new();
    let mut y = Vec::new();
    for i in 0..pheno_idx[s].len() {
        if let (Some(ip), Some(ig)) = (pheno_idx[s][perm[i]], geno_idx[0][i]) {
            if !ftr.is_na[s][ip] && !snp.is_na[ig] {
                y.push(ftr.phenos[s][ip]);
                g.push(snp.genos[ig]);
            }
        }
    }
    (g, y)
}

/// OLS summary statistics for every subgroup of one (feature, SNP) pair.
pub fn pair_sstats(
    res: &mut PairResult,
    ftr: &Ftr,
    snp: &Snp,
    maps: &SampleMaps,
    qnorm: bool,
) {
    for s in 0..ftr.phenos.len() {
        if ftr.phenos[s].is_empty() {
            continue;
        }
        let (g, mut y) = gather_pairs(ftr, snp, s, &maps.pheno_idx, &maps.geno_idx);
        if qnorm {
            numerics::quantile_normalize(&mut y);
        }
        res.ns[s] = y.len();
        if res.ns[s] > 1 {
            let sum = numerics::ols(&g, &y);
            res.betahat[s] = sum.betahat;
            res.sebetahat[s] = sum.sebetahat;
            res.sigmahat[s] = sum.sigmahat;
            res.beta_pval[s] = sum.pval;
            res.pve[s] = sum.pve;
        }
    }
}

/// Run the scan over every feature; returns the number of analyzed pairs.
pub fn infer_associations(
    ftrs: &mut [Ftr],
    catalog: &SnpCatalog,
    maps: &SampleMaps,
    grid: &[(f64, f64)],
    opts: &ScanOptions,
) -> usize {
    ftrs.par_iter_mut().for_each(|ftr| {
        let cis_snps = cis::find_cis_snps(ftr, catalog, opts.anchor, opts.len_cis);
        for &snp_idx in &cis_snps {
            let snp = &catalog.snps[snp_idx];
            let mut res = PairResult::new(snp_idx, ftr.phenos.len());
            pair_sstats(&mut res, ftr, snp, maps, opts.qnorm);
            if opts.step.joint() {
                abf::compute_abfs(&mut res, opts.which_bfs, grid);
            }
            ftr.results.push(res);
        }
        ftr.cis_snps = cis_snps;
    });
    ftrs.iter().map(|f| f.results.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn identity_maps(n: usize, nb_subgroups: usize) -> SampleMaps {
        SampleMaps {
            samples: (0..n).map(|i| format!("ind{}", i)).collect(),
            pheno_idx: vec![(0..n).map(Some).collect(); nb_subgroups],
            geno_idx: vec![(0..n).map(Some).collect()],
        }
    }

    fn one_snp_catalog(genos: Vec<f64>, coord: u64) -> SnpCatalog {
        let n = genos.len();
        SnpCatalog::new(vec![Snp {
            name: "rs1".into(),
            chr: "chr1".into(),
            coord,
            genos,
            is_na: vec![false; n],
            maf: 0.3,
        }])
    }

    fn scan_opts(step: u8, which_bfs: BfSet) -> ScanOptions {
        ScanOptions {
            anchor: Anchor::Fss,
            len_cis: 1000,
            step: AnalysisStep::from_number(step).unwrap(),
            qnorm: false,
            which_bfs,
        }
    }

    #[test]
    fn scan_fills_per_subgroup_summary_stats() {
        let catalog = one_snp_catalog(vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0, 1.0, 2.0], 500);
        let maps = identity_maps(9, 1);
        let mut ftr = Ftr::new("geneA", 1);
        ftr.chr = "chr1".into();
        ftr.start = 400;
        ftr.end = 450;
        ftr.phenos[0] = vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0, 2.0, 3.0];
        ftr.is_na[0] = vec![false; 9];

        let mut ftrs = vec![ftr];
        let pairs = infer_associations(&mut ftrs, &catalog, &maps, &[], &scan_opts(1, BfSet::Const));
        assert_eq!(pairs, 1);
        let res = &ftrs[0].results[0];
        assert_eq!(res.ns[0], 9);
        assert_relative_eq!(res.betahat[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(res.pve[0], 1.0, epsilon = 1e-10);
        // separate-only step computes no ABFs
        assert!(res.weighted_abfs.is_empty());
    }

    #[test]
    fn missing_samples_are_dropped_before_the_regression() {
        let n = 6;
        let mut snp = Snp {
            name: "rs1".into(),
            chr: "chr1".into(),
            coord: 100,
            genos: vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0],
            is_na: vec![false; n],
            maf: 0.3,
        };
        snp.is_na[5] = true;
        let catalog = SnpCatalog::new(vec![snp]);
        let maps = identity_maps(n, 1);

        let mut ftr = Ftr::new("geneA", 1);
        ftr.chr = "chr1".into();
        ftr.start = 100;
        ftr.end = 120;
        ftr.phenos[0] = vec![0.5, 1.5, 2.5, 0.5, f64::NAN, 2.5];
        ftr.is_na[0] = vec![false, false, false, false, true, false];

        let mut ftrs = vec![ftr];
        infer_associations(&mut ftrs, &catalog, &maps, &[], &scan_opts(1, BfSet::Const));
        // 6 samples minus one NA phenotype minus one NA genotype
        assert_eq!(ftrs[0].results[0].ns[0], 4);
    }

    #[test]
    fn joint_step_attaches_abfs() {
        let catalog = one_snp_catalog(vec![0.0, 1.0, 2.0, 1.0, 0.0, 2.0, 1.0, 2.0, 0.0], 500);
        let maps = identity_maps(9, 1);
        let mut ftr = Ftr::new("geneA", 1);
        ftr.chr = "chr1".into();
        ftr.start = 400;
        ftr.end = 450;
        ftr.phenos[0] = vec![0.1, 1.2, 2.3, 0.8, 0.3, 1.9, 1.1, 2.2, 0.2];
        ftr.is_na[0] = vec![false; 9];

        let mut ftrs = vec![ftr];
        let grid = [(0.1, 0.4), (0.2, 0.8)];
        infer_associations(&mut ftrs, &catalog, &maps, &grid, &scan_opts(3, BfSet::Const));
        let res = &ftrs[0].results[0];
        assert_eq!(res.unweighted_abfs["const"].len(), 2);
        assert!(res.weighted_abfs["const"].is_finite());
        assert!(res.weighted_abfs.contains_key("const-fix"));
        assert!(res.weighted_abfs.contains_key("const-maxh"));
    }

    #[test]
    fn permuted_gathering_reorders_only_the_phenotypes() {
        let catalog = one_snp_catalog(vec![0.0, 1.0, 2.0], 500);
        let maps = identity_maps(3, 1);
        let mut ftr = Ftr::new("geneA", 1);
        ftr.chr = "chr1".into();
        ftr.phenos[0] = vec![10.0, 20.0, 30.0];
        ftr.is_na[0] = vec![false; 3];

        let perm = vec![2, 0, 1];
        let (g, y) = gather_pairs_permuted(
            &ftr,
            &catalog.snps[0],
            0,
            &maps.pheno_idx,
            &maps.geno_idx,
            &perm,
        );
        assert_eq!(g, vec![0.0, 1.0, 2.0]);
        assert_eq!(y, vec![30.0, 10.0, 20.0]);
    }
}
