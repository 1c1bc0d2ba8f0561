//! bmaqtl-core: statistical engine for cis-QTL mapping via Bayesian
//! meta-analysis across subgroups (tissues, populations, conditions).
//!
//! For every (feature, cis-SNP) pair the engine estimates a simple
//! linear-regression effect per subgroup, standardizes the summary
//! statistics, and combines them into Approximate Bayes Factors under a
//! family of configurations describing which subgroups share the effect.
//! Feature-level significance comes from phenotype permutations.
//!
//! ## Module Organization
//! - `types`: data model (Snp, Ftr, PairResult, sample alignment, enums)
//! - `numerics`: OLS summary statistics, standardization, log10-weighted-sum,
//!   quantile normalization
//! - `abf`: ABF kernel and configuration families
//! - `configs`: subgroup configuration enumerator
//! - `cis`: cis-window classification
//! - `assoc`: association engine over (feature x cis-SNP)
//! - `perm`: separate and joint permutation engines

pub mod abf;
pub mod assoc;
pub mod cis;
pub mod configs;
pub mod numerics;
pub mod perm;
pub mod types;

pub use assoc::{infer_associations, ScanOptions};
pub use configs::{config_label, config_labels, Combinations};
pub use perm::{joint_permutations, separate_permutations, PermOptions};
pub use types::{
    AnalysisStep, Anchor, BfSet, Ftr, PairResult, SampleMaps, Snp, SnpCatalog, SnpIdx, Trick,
};
