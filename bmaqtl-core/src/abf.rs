//! Approximate Bayes Factors from standardized summary statistics.
//!
//! For each (phi2, omega2) pair the kernel combines per-subgroup evidence
//! with a cross-subgroup meta term under a Gaussian prior on effect size.
//! Families: `const` (all subgroups share the effect), `const-fix`
//! (fixed-effect limit), `const-maxh` (maximum-heterogeneity limit), plus
//! subgroup-specific and arbitrary-subset configurations obtained by masking
//! the summary statistics.

use crate::configs::{config_label, Combinations};
use crate::numerics::{log10_weighted_sum, standardized_triple};
use crate::types::{BfSet, PairResult};

const LN10: f64 = std::f64::consts::LN_10;

/// Fill the standardized (b, se_b, t) triples from the raw OLS statistics.
pub fn standardize(res: &mut PairResult) {
    res.std_sstats = res
        .ns
        .iter()
        .enumerate()
        .map(|(s, &n)| standardized_triple(n, res.betahat[s], res.sebetahat[s], res.sigmahat[s]))
        .collect();
}

/// log10 ABF at one (phi2, omega2) from the per-subgroup standardized stats.
///
/// Subgroups with n <= 1 or a vanishing t contribute nothing; with no data at
/// all the result is 0 (no evidence either way).
pub fn abf_from_std_sstats(ns: &[usize], sstats: &[[f64; 3]], phi2: f64, oma2: f64) -> f64 {
    let mut sum_single = 0.0;
    let mut bbar_num = 0.0;
    let mut bbar_denom = 0.0;
    for (s, &n) in ns.iter().enumerate() {
        if n <= 1 {
            continue;
        }
        let [bhat, sebhat, t] = sstats[s];
        if t.abs() < 1e-8 {
            continue;
        }
        let varbhat = sebhat * sebhat;
        bbar_num += bhat / (varbhat + phi2);
        bbar_denom += 1.0 / (varbhat + phi2);
        sum_single += 0.5 * (varbhat.log10() - (varbhat + phi2).log10())
            + (0.5 * t * t * phi2 / (varbhat + phi2)) / LN10;
    }

    let bbar = if bbar_denom != 0.0 {
        bbar_num / bbar_denom
    } else {
        0.0
    };
    let varbbar = if bbar_denom != 0.0 {
        1.0 / bbar_denom
    } else {
        f64::INFINITY
    };
    let t2 = bbar * bbar / varbbar;
    let l_abf_bbar = if t2 != 0.0 {
        0.5 * (varbbar.log10() - (varbbar + oma2).log10())
            + (0.5 * t2 * oma2 / (varbbar + oma2)) / LN10
    } else {
        0.0
    };

    l_abf_bbar + sum_single
}

fn uniform_weights(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

/// Mask the summary statistics down to the subgroups satisfying `keep`
/// (subgroups without data are always dropped).
fn mask_sstats(
    ns: &[usize],
    sstats: &[[f64; 3]],
    keep: impl Fn(usize) -> bool,
) -> (Vec<usize>, Vec<[f64; 3]>) {
    let mut masked_ns = vec![0; ns.len()];
    let mut masked_sstats = vec![[0.0; 3]; ns.len()];
    for s in 0..ns.len() {
        if ns[s] > 1 && keep(s) {
            masked_ns[s] = ns[s];
            masked_sstats[s] = sstats[s];
        }
    }
    (masked_ns, masked_sstats)
}

fn grid_abfs(ns: &[usize], sstats: &[[f64; 3]], grid: &[(f64, f64)]) -> Vec<f64> {
    grid.iter()
        .map(|&(phi2, oma2)| abf_from_std_sstats(ns, sstats, phi2, oma2))
        .collect()
}

/// The `const`, `const-fix` and `const-maxh` families over the grid.
pub fn compute_default_abfs(res: &mut PairResult, grid: &[(f64, f64)]) {
    let mut consts = Vec::with_capacity(grid.len());
    let mut fixes = Vec::with_capacity(grid.len());
    let mut maxhs = Vec::with_capacity(grid.len());
    for &(phi2, oma2) in grid {
        consts.push(abf_from_std_sstats(&res.ns, &res.std_sstats, phi2, oma2));
        fixes.push(abf_from_std_sstats(&res.ns, &res.std_sstats, 0.0, phi2 + oma2));
        maxhs.push(abf_from_std_sstats(&res.ns, &res.std_sstats, phi2 + oma2, 0.0));
    }
    let w = uniform_weights(grid.len());
    res.weighted_abfs
        .insert("const".into(), log10_weighted_sum(&consts, &w));
    res.weighted_abfs
        .insert("const-fix".into(), log10_weighted_sum(&fixes, &w));
    res.weighted_abfs
        .insert("const-maxh".into(), log10_weighted_sum(&maxhs, &w));
    res.unweighted_abfs.insert("const".into(), consts);
    res.unweighted_abfs.insert("const-fix".into(), fixes);
    res.unweighted_abfs.insert("const-maxh".into(), maxhs);
}

/// One configuration per subgroup ("1" .. "S"), each masking out the others.
/// Subgroups with no data get all-NaN vectors and a NaN scalar.
pub fn compute_subset_abfs(res: &mut PairResult, grid: &[(f64, f64)]) {
    let w = uniform_weights(grid.len());
    for s in 0..res.ns.len() {
        let label = (s + 1).to_string();
        if res.ns[s] > 1 {
            let (ns, sstats) = mask_sstats(&res.ns, &res.std_sstats, |i| i == s);
            let abfs = grid_abfs(&ns, &sstats, grid);
            res.weighted_abfs
                .insert(label.clone(), log10_weighted_sum(&abfs, &w));
            res.unweighted_abfs.insert(label, abfs);
        } else {
            res.unweighted_abfs
                .insert(label.clone(), vec![f64::NAN; grid.len()]);
            res.weighted_abfs.insert(label, f64::NAN);
        }
    }
}

/// Every non-empty proper subset of subgroups (k = 1 .. S-1).
pub fn compute_all_config_abfs(res: &mut PairResult, grid: &[(f64, f64)]) {
    let nb = res.ns.len();
    let w = uniform_weights(grid.len());
    for k in 1..nb {
        for comb in Combinations::new(nb, k) {
            let label = config_label(&comb);
            let (ns, sstats) = mask_sstats(&res.ns, &res.std_sstats, |s| comb.contains(&s));
            if ns.iter().sum::<usize>() > 0 {
                let abfs = grid_abfs(&ns, &sstats, grid);
                res.weighted_abfs
                    .insert(label.clone(), log10_weighted_sum(&abfs, &w));
                res.unweighted_abfs.insert(label, abfs);
            } else {
                res.unweighted_abfs
                    .insert(label.clone(), vec![f64::NAN; grid.len()]);
                res.weighted_abfs.insert(label, f64::NAN);
            }
        }
    }
}

/// Standardize, then compute the families requested by the selector.
pub fn compute_abfs(res: &mut PairResult, which: BfSet, grid: &[(f64, f64)]) {
    standardize(res);
    compute_default_abfs(res, grid);
    match which {
        BfSet::Const => {}
        BfSet::Subset => compute_subset_abfs(res, grid),
        BfSet::All => compute_all_config_abfs(res, grid),
    }
}

/// Grid-averaged "const" ABF of a (possibly permuted) pair result.
pub fn abf_const(res: &PairResult, grid: &[(f64, f64)]) -> f64 {
    let abfs = grid_abfs(&res.ns, &res.std_sstats, grid);
    log10_weighted_sum(&abfs, &uniform_weights(grid.len()))
}

/// Joint-permutation statistic for `pbf=subset`: the uniform log10-weighted
/// average over {const} and each single-subgroup weighted ABF.
pub fn abf_subset_average(res: &mut PairResult, grid: &[(f64, f64)]) -> f64 {
    let mut vals = vec![abf_const(res, grid)];
    compute_subset_abfs(res, grid);
    for s in 0..res.ns.len() {
        let label = (s + 1).to_string();
        vals.push(res.weighted_abfs.get(&label).copied().unwrap_or(f64::NAN));
    }
    log10_weighted_sum(&vals, &uniform_weights(vals.len()))
}

/// Joint-permutation statistic for `pbf=all`: the uniform log10-weighted
/// average over {const} and every proper-subset weighted ABF.
pub fn abf_all_average(res: &mut PairResult, grid: &[(f64, f64)]) -> f64 {
    let mut vals = vec![abf_const(res, grid)];
    compute_all_config_abfs(res, grid);
    let nb = res.ns.len();
    for k in 1..nb {
        for comb in Combinations::new(nb, k) {
            let label = config_label(&comb);
            vals.push(res.weighted_abfs.get(&label).copied().unwrap_or(f64::NAN));
        }
    }
    log10_weighted_sum(&vals, &uniform_weights(vals.len()))
}
