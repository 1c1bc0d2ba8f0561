//! Feature-level permutation engines.
//!
//! Two pseudo-random streams drive each run: one for the shuffles, one for
//! the early-stop uniform draw. Both are re-seeded from the user seed once
//! per subgroup in separate mode and once before the joint run, and features
//! are visited in name order, so a given seed reproduces every p-value.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::types::{BfSet, Ftr, PairResult, SnpCatalog, Trick};
use crate::{abf, assoc, configs, numerics};

#[derive(Debug, Clone, Copy)]
pub struct PermOptions {
    pub nb_perms: u64,
    pub seed: u64,
    pub trick: Trick,
    pub which_perm_bf: BfSet,
    pub qnorm: bool,
}

/// Hit counters start at 1, so a full run yields (1 + #exceedances)/(N+1);
/// an early stop draws from the bounded uniform instead.
fn calibrate(hits: u64, done: u64, requested: u64, rng_trick: &mut StdRng) -> f64 {
    if done == requested {
        hits as f64 / (requested + 1) as f64
    } else {
        let lo = 11.0 / (done + 2) as f64;
        let hi = 11.0 / (done + 1) as f64;
        rng_trick.gen_range(lo..hi)
    }
}

/// Smallest per-subgroup p-value over the feature's analyzed pairs.
fn min_true_beta_pval(ftr: &Ftr, s: usize) -> f64 {
    let mut min_p = 1.0;
    for res in &ftr.results {
        if res.ns[s] > 1 && res.beta_pval[s] < min_p {
            min_p = res.beta_pval[s];
        }
    }
    min_p
}

/// Separate permutations: for each subgroup, compare the true minimum
/// p-value over cis-SNPs against its permutation distribution.
///
/// With a single genotype source the genotype side of each permuted pair is
/// indexed through the phenotype maps, unpermuted.
pub fn separate_permutations(
    ftrs: &mut [Ftr],
    catalog: &SnpCatalog,
    pheno_idx: &[Vec<Option<usize>>],
    opts: &PermOptions,
) {
    for s in 0..pheno_idx.len() {
        let mut rng_perm = StdRng::seed_from_u64(opts.seed);
        let mut rng_trick = StdRng::seed_from_u64(opts.seed);
        for ftr in ftrs.iter_mut() {
            if ftr.cis_snps.is_empty() || ftr.phenos[s].is_empty() {
                continue;
            }
            permute_one_subgroup(ftr, catalog, pheno_idx, s, opts, &mut rng_perm, &mut rng_trick);
        }
    }
}

fn permute_one_subgroup(
    ftr: &mut Ftr,
    catalog: &SnpCatalog,
    pheno_idx: &[Vec<Option<usize>>],
    s: usize,
    opts: &PermOptions,
    rng_perm: &mut StdRng,
    rng_trick: &mut StdRng,
) {
    let min_true = min_true_beta_pval(ftr, s);
    let mut hits = 1u64;
    let mut done = 0u64;
    let mut shuffle_only = false;
    let mut perm: Vec<usize> = (0..pheno_idx[s].len()).collect();

    for _ in 0..opts.nb_perms {
        perm.shuffle(rng_perm);
        if shuffle_only {
            continue;
        }
        done += 1;

        let mut min_perm = 1.0f64;
        for &snp_idx in &ftr.cis_snps {
            let snp = &catalog.snps[snp_idx];
            let (g, mut y) =
                assoc::gather_pairs_permuted(ftr, snp, s, pheno_idx, pheno_idx, &perm);
            if opts.qnorm {
                numerics::quantile_normalize(&mut y);
            }
            if y.len() > 1 {
                let pval = numerics::ols(&g, &y).pval;
                if pval < min_perm {
                    min_perm = pval;
                }
            }
        }

        if min_perm <= min_true {
            hits += 1;
        }
        if opts.trick != Trick::Off && hits == 11 {
            match opts.trick {
                Trick::EarlyStop => break,
                Trick::ShuffleOnly => shuffle_only = true,
                Trick::Off => {}
            }
        }
    }

    ftr.nb_perms_sep[s] = done;
    ftr.perm_pval_sep[s] = calibrate(hits, done, opts.nb_perms, rng_trick);
}

/// Labels whose weighted ABFs enter the true joint statistic for a family.
fn joint_labels(nb_subgroups: usize, which: BfSet) -> Vec<String> {
    let mut labels = vec!["const".to_string()];
    labels.extend(configs::config_labels(nb_subgroups, which));
    labels
}

/// Highest weighted ABF over the feature's cis-SNPs among the family's
/// configuration labels (0 if every candidate is negative or missing).
fn max_true_abf(ftr: &Ftr, which: BfSet) -> f64 {
    let labels = joint_labels(ftr.phenos.len(), which);
    let mut max = 0.0f64;
    for res in &ftr.results {
        for label in &labels {
            if let Some(&v) = res.weighted_abfs.get(label.as_str()) {
                if v > max {
                    max = v;
                }
            }
        }
    }
    max
}

/// Joint permutations: compare the feature's max weighted ABF against the
/// permutation distribution of the family's statistic.
pub fn joint_permutations(
    ftrs: &mut [Ftr],
    catalog: &SnpCatalog,
    pheno_idx: &[Vec<Option<usize>>],
    grid: &[(f64, f64)],
    opts: &PermOptions,
) {
    let mut rng_perm = StdRng::seed_from_u64(opts.seed);
    let mut rng_trick = StdRng::seed_from_u64(opts.seed);
    for ftr in ftrs.iter_mut() {
        if ftr.cis_snps.is_empty() {
            continue;
        }
        permute_joint_one(ftr, catalog, pheno_idx, grid, opts, &mut rng_perm, &mut rng_trick);
    }
}

fn permute_joint_one(
    ftr: &mut Ftr,
    catalog: &SnpCatalog,
    pheno_idx: &[Vec<Option<usize>>],
    grid: &[(f64, f64)],
    opts: &PermOptions,
    rng_perm: &mut StdRng,
    rng_trick: &mut StdRng,
) {
    let nb_subgroups = ftr.phenos.len();
    let max_true = max_true_abf(ftr, opts.which_perm_bf);
    ftr.max_l10_true_abf = max_true;

    let mut hits = 1u64;
    let mut done = 0u64;
    let mut shuffle_only = false;
    let mut perm: Vec<usize> = (0..pheno_idx[0].len()).collect();

    for _ in 0..opts.nb_perms {
        perm.shuffle(rng_perm);
        if shuffle_only {
            continue;
        }
        done += 1;

        let mut max_perm = 0.0f64;
        for &snp_idx in &ftr.cis_snps {
            let snp = &catalog.snps[snp_idx];
            let mut res = PairResult::new(snp_idx, nb_subgroups);
            for s in 0..nb_subgroups {
                if ftr.phenos[s].is_empty() {
                    continue;
                }
                let (g, mut y) =
                    assoc::gather_pairs_permuted(ftr, snp, s, pheno_idx, pheno_idx, &perm);
                if opts.qnorm {
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
            abf::standardize(&mut res);
            let stat = match opts.which_perm_bf {
                BfSet::Const => abf::abf_const(&res, grid),
                BfSet::Subset => abf::abf_subset_average(&mut res, grid),
                BfSet::All => abf::abf_all_average(&mut res, grid),
            };
            if stat > max_perm {
                max_perm = stat;
            }
        }

        if max_perm >= max_true {
            hits += 1;
        }
        if opts.trick != Trick::Off && hits == 11 {
            match opts.trick {
                Trick::EarlyStop => break,
                Trick::ShuffleOnly => shuffle_only = true,
                Trick::Off => {}
            }
        }
    }

    ftr.nb_perms_joint = done;
    ftr.joint_perm_pval = calibrate(hits, done, opts.nb_perms, rng_trick);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assoc::{infer_associations, ScanOptions};
    use crate::types::{AnalysisStep, Anchor, SampleMaps, Snp};

    fn identity_maps(n: usize, nb_subgroups: usize) -> SampleMaps {
        SampleMaps {
            samples: (0..n).map(|i| format!("ind{}", i)).collect(),
            pheno_idx: vec![(0..n).map(Some).collect(); nb_subgroups],
            geno_idx: vec![(0..n).map(Some).collect()],
        }
    }

    fn constant_geno_dataset(n: usize) -> (Vec<Ftr>, SnpCatalog, SampleMaps) {
        // constant genotype: every p-value (true and permuted) is exactly 1
        let catalog = SnpCatalog::new(vec![Snp {
            name: "rs1".into(),
            chr: "chr1".into(),
            coord: 500,
            genos: vec![1.0; n],
            is_na: vec![false; n],
            maf: 0.0,
        }]);
        let maps = identity_maps(n, 1);
        let mut ftr = Ftr::new("geneA", 1);
        ftr.chr = "chr1".into();
        ftr.start = 400;
        ftr.end = 450;
        ftr.phenos[0] = (0..n).map(|i| i as f64).collect();
        ftr.is_na[0] = vec![false; n];
        (vec![ftr], catalog, maps)
    }

    fn scan(ftrs: &mut [Ftr], catalog: &SnpCatalog, maps: &SampleMaps) {
        let opts = ScanOptions {
            anchor: Anchor::Fss,
            len_cis: 1000,
            step: AnalysisStep::Separate,
            qnorm: false,
            which_bfs: BfSet::Const,
        };
        infer_associations(ftrs, catalog, maps, &[], &opts);
    }

    fn perm_opts(nb_perms: u64, trick: Trick) -> PermOptions {
        PermOptions {
            nb_perms,
            seed: 1859,
            trick,
            which_perm_bf: BfSet::Const,
            qnorm: false,
        }
    }

    #[test]
    fn every_permutation_hits_when_the_true_pvalue_is_one() {
        let (mut ftrs, catalog, maps) = constant_geno_dataset(8);
        scan(&mut ftrs, &catalog, &maps);
        separate_permutations(&mut ftrs, &catalog, &maps.pheno_idx, &perm_opts(50, Trick::Off));
        assert_eq!(ftrs[0].nb_perms_sep[0], 50);
        // hits = 1 + 50, p = 51/51 = 1
        assert_eq!(ftrs[0].perm_pval_sep[0], 1.0);
    }

    #[test]
    fn no_permutation_hits_when_the_true_pvalue_is_unbeatable() {
        let (mut ftrs, catalog, maps) = constant_geno_dataset(8);
        scan(&mut ftrs, &catalog, &maps);
        // pretend the observed signal was perfect
        ftrs[0].results[0].beta_pval[0] = -1.0;
        separate_permutations(&mut ftrs, &catalog, &maps.pheno_idx, &perm_opts(50, Trick::Off));
        assert_eq!(ftrs[0].nb_perms_sep[0], 50);
        assert!((ftrs[0].perm_pval_sep[0] - 1.0 / 51.0).abs() < 1e-12);
    }

    #[test]
    fn early_stop_draws_from_the_bounded_uniform() {
        let (mut ftrs, catalog, maps) = constant_geno_dataset(8);
        scan(&mut ftrs, &catalog, &maps);
        separate_permutations(
            &mut ftrs,
            &catalog,
            &maps.pheno_idx,
            &perm_opts(1000, Trick::EarlyStop),
        );
        // every permutation hits, so the counter reaches 11 after 10 tests
        let m = ftrs[0].nb_perms_sep[0];
        assert_eq!(m, 10);
        let p = ftrs[0].perm_pval_sep[0];
        assert!(p > 11.0 / (m as f64 + 2.0) && p < 11.0 / (m as f64 + 1.0));
    }

    #[test]
    fn shuffle_only_keeps_consuming_the_stream_but_stops_testing() {
        let (mut ftrs, catalog, maps) = constant_geno_dataset(8);
        scan(&mut ftrs, &catalog, &maps);
        separate_permutations(
            &mut ftrs,
            &catalog,
            &maps.pheno_idx,
            &perm_opts(200, Trick::ShuffleOnly),
        );
        let m = ftrs[0].nb_perms_sep[0];
        assert_eq!(m, 10);
        let p = ftrs[0].perm_pval_sep[0];
        assert!(p > 11.0 / (m as f64 + 2.0) && p < 11.0 / (m as f64 + 1.0));
    }

    #[test]
    fn separate_permutations_are_reproducible_under_a_seed() {
        let run = || {
            let (mut ftrs, catalog, maps) = constant_geno_dataset(12);
            scan(&mut ftrs, &catalog, &maps);
            ftrs[0].results[0].beta_pval[0] = 0.5;
            separate_permutations(
                &mut ftrs,
                &catalog,
                &maps.pheno_idx,
                &perm_opts(40, Trick::Off),
            );
            (ftrs[0].perm_pval_sep[0], ftrs[0].nb_perms_sep[0])
        };
        assert_eq!(run(), run());
    }

    fn joint_dataset(n: usize) -> (Vec<Ftr>, SnpCatalog, SampleMaps) {
        let genos: Vec<f64> = (0..n).map(|i| (i % 3) as f64).collect();
        let catalog = SnpCatalog::new(vec![Snp {
            name: "rs1".into(),
            chr: "chr1".into(),
            coord: 500,
            genos: genos.clone(),
            is_na: vec![false; n],
            maf: 0.3,
        }]);
        let maps = identity_maps(n, 1);
        let mut ftr = Ftr::new("geneA", 1);
        ftr.chr = "chr1".into();
        ftr.start = 400;
        ftr.end = 450;
        ftr.phenos[0] = genos.iter().map(|&g| 2.0 * g + 0.1).collect();
        ftr.is_na[0] = vec![false; n];
        (vec![ftr], catalog, maps)
    }

    #[test]
    fn joint_permutations_store_the_true_statistic_and_counters() {
        let (mut ftrs, catalog, maps) = joint_dataset(12);
        let grid = [(0.1, 0.4), (0.2, 0.8)];
        let opts = ScanOptions {
            anchor: Anchor::Fss,
            len_cis: 1000,
            step: AnalysisStep::Joint,
            qnorm: false,
            which_bfs: BfSet::Const,
        };
        infer_associations(&mut ftrs, &catalog, &maps, &grid, &opts);
        let expected_max = ftrs[0].results[0].weighted_abfs["const"].max(0.0);

        joint_permutations(
            &mut ftrs,
            &catalog,
            &maps.pheno_idx,
            &grid,
            &perm_opts(30, Trick::Off),
        );
        assert_eq!(ftrs[0].nb_perms_joint, 30);
        assert_eq!(ftrs[0].max_l10_true_abf, expected_max);
        let p = ftrs[0].joint_perm_pval;
        assert!(p >= 1.0 / 31.0 && p <= 1.0);
    }

    #[test]
    fn joint_permutations_are_reproducible_under_a_seed() {
        let run = || {
            let (mut ftrs, catalog, maps) = joint_dataset(12);
            let grid = [(0.1, 0.4)];
            let opts = ScanOptions {
                anchor: Anchor::Fss,
                len_cis: 1000,
                step: AnalysisStep::Joint,
                qnorm: false,
                which_bfs: BfSet::Const,
            };
            infer_associations(&mut ftrs, &catalog, &maps, &grid, &opts);
            joint_permutations(
                &mut ftrs,
                &catalog,
                &maps.pheno_idx,
                &grid,
                &perm_opts(25, Trick::Off),
            );
            ftrs[0].joint_perm_pval
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn features_without_cis_snps_keep_initial_values() {
        let (_, catalog, maps) = constant_geno_dataset(8);
        let mut lonely = Ftr::new("geneB", 1);
        lonely.chr = "chr9".into();
        lonely.start = 10;
        lonely.end = 20;
        lonely.phenos[0] = vec![1.0; 8];
        lonely.is_na[0] = vec![false; 8];
        let mut ftrs = vec![lonely];
        scan(&mut ftrs, &catalog, &maps);
        separate_permutations(&mut ftrs, &catalog, &maps.pheno_idx, &perm_opts(20, Trick::Off));
        assert!(ftrs[0].perm_pval_sep[0].is_nan());
        assert_eq!(ftrs[0].nb_perms_sep[0], 0);
    }
}
