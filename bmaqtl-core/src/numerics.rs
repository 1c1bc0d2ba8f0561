//! Scalar statistics behind the association kernel: simple-regression summary
//! statistics, small-sample standardization, log-scale weighted averaging and
//! rank-based quantile normalization.
//!
//! The distribution functions are wrapped so that degenerate inputs yield
//! sentinel values (NaN/∞) instead of errors; the kernel absorbs them.

use statrs::distribution::{ContinuousCDF, FisherSnedecor, Normal, StudentsT};

/// Summary statistics of y = mu + beta * g + e, e ~ N(0, sigma^2).
#[derive(Debug, Clone, Copy)]
pub struct OlsSummary {
    pub betahat: f64,
    pub sebetahat: f64,
    pub sigmahat: f64,
    pub pval: f64,
    pub pve: f64,
}

/// Simple linear regression on paired vectors with missing values already
/// filtered out. Callers guarantee `g.len() == y.len()` with n >= 2.
pub fn ols(g: &[f64], y: &[f64]) -> OlsSummary {
    let n = g.len() as f64;
    let (mut ym, mut gm, mut yty, mut gtg, mut gty) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (&gi, &yi) in g.iter().zip(y) {
        ym += yi;
        gm += gi;
        yty += yi * yi;
        gtg += gi * gi;
        gty += gi * yi;
    }
    ym /= n;
    gm /= n;
    let vg = gtg - n * gm * gm;

    if vg > 1e-8 {
        let betahat = (gty - n * gm * ym) / vg;
        let rss1 = yty - 1.0 / vg * (n * ym * (gtg * ym - gm * gty) - gty * (n * gm * ym - gty));
        let sigmahat = if betahat.abs() > 1e-8 {
            (rss1 / (n - 2.0)).sqrt()
        } else {
            // y is not variable enough among samples
            ((yty - n * ym * ym) / (n - 2.0)).sqrt()
        };
        let sebetahat = sigmahat / vg.sqrt();
        let muhat = (ym * gtg - gm * gty) / vg;
        let mss: f64 = g
            .iter()
            .map(|&gi| (muhat + betahat * gi - ym).powi(2))
            .sum();
        OlsSummary {
            betahat,
            sebetahat,
            sigmahat,
            pval: fdist_upper_tail(mss / (sigmahat * sigmahat), 1.0, n - 2.0),
            pve: mss / (mss + rss1),
        }
    } else {
        // constant genotype: no effect estimable
        OlsSummary {
            betahat: 0.0,
            sebetahat: f64::INFINITY,
            sigmahat: ((yty - n * ym * ym) / (n - 2.0)).sqrt(),
            pval: 1.0,
            pve: 0.0,
        }
    }
}

/// Standardized (b, se_b, t) triple for one subgroup, with the small-sample
/// rescaling applied. Subgroups with n <= 1 get the zero triple.
pub fn standardized_triple(n: usize, betahat: f64, sebetahat: f64, sigmahat: f64) -> [f64; 3] {
    if n <= 1 {
        return [0.0, 0.0, 0.0];
    }
    let bhat = betahat / sigmahat;
    let sebhat = sebetahat / sigmahat;
    let t = std_normal_quantile(student_t_cdf(-(bhat / sebhat).abs(), n as f64 - 2.0));
    if t.abs() > 1e-8 {
        let scale = betahat.abs() / (t.abs() * sebhat);
        let b = betahat / scale;
        [b, b / t, t]
    } else {
        [0.0, f64::INFINITY, 0.0]
    }
}

/// log10 of a weighted sum of values given on the log10 scale.
///
/// NaN entries contribute nothing; the result is NaN only when every entry is
/// NaN. -inf entries fall out of the sum naturally.
pub fn log10_weighted_sum(vals: &[f64], weights: &[f64]) -> f64 {
    debug_assert_eq!(vals.len(), weights.len());
    let max = vals
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return if vals.iter().all(|v| v.is_nan()) {
            f64::NAN
        } else {
            f64::NEG_INFINITY
        };
    }
    let sum: f64 = vals
        .iter()
        .zip(weights)
        .filter(|(v, _)| !v.is_nan())
        .map(|(&v, &w)| w * 10f64.powf(v - max))
        .sum();
    max + sum.log10()
}

/// Replace values by the standard-normal quantiles of their midranks
/// (ties share the average rank).
pub fn quantile_normalize(v: &mut [f64]) {
    let n = v.len();
    if n == 0 {
        return;
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| v[a].partial_cmp(&v[b]).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && v[order[j]] == v[order[i]] {
            j += 1;
        }
        let midrank = (i + j + 1) as f64 / 2.0;
        for k in i..j {
            ranks[order[k]] = midrank;
        }
        i = j;
    }

    for (x, r) in v.iter_mut().zip(&ranks) {
        *x = std_normal_quantile((r - 0.5) / n as f64);
    }
}

/// Upper tail of the F(d1, d2) distribution; 0 at +inf, NaN when the degrees
/// of freedom are degenerate.
pub fn fdist_upper_tail(x: f64, d1: f64, d2: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    if x == f64::INFINITY {
        return 0.0;
    }
    match FisherSnedecor::new(d1, d2) {
        Ok(d) => 1.0 - d.cdf(x),
        Err(_) => f64::NAN,
    }
}

/// Lower tail of Student's t with `df` degrees of freedom; NaN when degenerate.
pub fn student_t_cdf(x: f64, df: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(d) => d.cdf(x),
        Err(_) => f64::NAN,
    }
}

/// Standard normal quantile function.
pub fn std_normal_quantile(p: f64) -> f64 {
    if p.is_nan() {
        return f64::NAN;
    }
    match Normal::new(0.0, 1.0) {
        Ok(d) => d.inverse_cdf(p),
        Err(_) => f64::NAN,
    }
}
