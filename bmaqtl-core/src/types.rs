//! Core data types for bmaqtl.
//!
//! Features reference SNPs by index into a [`SnpCatalog`] arena rather than
//! by pointer, and all name-keyed collections are iterated in sorted order so
//! results are reproducible run to run.

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

pub type SnpIdx = usize;

/// One SNP from the (single) genotype source.
#[derive(Debug, Clone)]
pub struct Snp {
    pub name: String,
    pub chr: String,
    /// 1-based coordinate.
    pub coord: u64,
    /// Expected dosages 0·AA + 1·AB + 2·BB, one per genotype column.
    pub genos: Vec<f64>,
    pub is_na: Vec<bool>,
    /// Folded allele frequency min(p, 1-p) over non-missing samples.
    pub maf: f64,
}

/// Arena of SNPs with a per-chromosome, coordinate-sorted index.
#[derive(Debug, Clone, Default)]
pub struct SnpCatalog {
    pub snps: Vec<Snp>,
    chr_index: BTreeMap<String, Vec<SnpIdx>>,
}

impl SnpCatalog {
    pub fn new(snps: Vec<Snp>) -> Self {
        let mut chr_index: BTreeMap<String, Vec<SnpIdx>> = BTreeMap::new();
        for (idx, snp) in snps.iter().enumerate() {
            chr_index.entry(snp.chr.clone()).or_default().push(idx);
        }
        for list in chr_index.values_mut() {
            list.sort_by_key(|&i| snps[i].coord);
        }
        Self { snps, chr_index }
    }

    pub fn len(&self) -> usize {
        self.snps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snps.is_empty()
    }

    /// SNP indices on a chromosome, sorted by coordinate.
    pub fn on_chr(&self, chr: &str) -> &[SnpIdx] {
        self.chr_index.get(chr).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Result of one (feature, cis-SNP) pair, with per-subgroup vectors.
#[derive(Debug, Clone)]
pub struct PairResult {
    pub snp: SnpIdx,
    pub ns: Vec<usize>,
    pub betahat: Vec<f64>,
    pub sebetahat: Vec<f64>,
    pub sigmahat: Vec<f64>,
    pub beta_pval: Vec<f64>,
    pub pve: Vec<f64>,
    /// Standardized (b, se_b, t) triple per subgroup.
    pub std_sstats: Vec<[f64; 3]>,
    /// Per-config vectors of log10 ABFs, one entry per grid row.
    pub unweighted_abfs: std::collections::HashMap<String, Vec<f64>>,
    /// Per-config grid-averaged log10 ABFs.
    pub weighted_abfs: std::collections::HashMap<String, f64>,
}

impl PairResult {
    pub fn new(snp: SnpIdx, nb_subgroups: usize) -> Self {
        Self {
            snp,
            ns: vec![0; nb_subgroups],
            betahat: vec![f64::NAN; nb_subgroups],
            sebetahat: vec![f64::NAN; nb_subgroups],
            sigmahat: vec![f64::NAN; nb_subgroups],
            beta_pval: vec![f64::NAN; nb_subgroups],
            pve: vec![f64::NAN; nb_subgroups],
            std_sstats: Vec::new(),
            unweighted_abfs: std::collections::HashMap::new(),
            weighted_abfs: std::collections::HashMap::new(),
        }
    }

    /// Number of subgroups with at least one usable sample.
    pub fn nb_subgroups_with_data(&self) -> usize {
        self.ns.iter().filter(|&&n| n > 0).count()
    }

    /// Total sample count over subgroups.
    pub fn nb_samples(&self) -> usize {
        self.ns.iter().sum()
    }
}

/// A molecular phenotype (e.g. one gene's expression) across subgroups.
#[derive(Debug, Clone)]
pub struct Ftr {
    pub name: String,
    pub chr: String,
    /// 1-based inclusive interval.
    pub start: u64,
    pub end: u64,
    /// Per-subgroup phenotype columns; empty if the subgroup lacks this feature.
    pub phenos: Vec<Vec<f64>>,
    pub is_na: Vec<Vec<bool>>,
    pub cis_snps: Vec<SnpIdx>,
    pub results: Vec<PairResult>,
    pub perm_pval_sep: Vec<f64>,
    pub nb_perms_sep: Vec<u64>,
    pub joint_perm_pval: f64,
    pub nb_perms_joint: u64,
    pub max_l10_true_abf: f64,
}

impl Ftr {
    pub fn new(name: &str, nb_subgroups: usize) -> Self {
        Self {
            name: name.to_string(),
            chr: String::new(),
            start: 0,
            end: 0,
            phenos: vec![Vec::new(); nb_subgroups],
            is_na: vec![Vec::new(); nb_subgroups],
            cis_snps: Vec::new(),
            results: Vec::new(),
            perm_pval_sep: vec![f64::NAN; nb_subgroups],
            nb_perms_sep: vec![0; nb_subgroups],
            joint_perm_pval: f64::NAN,
            nb_perms_joint: 0,
            max_l10_true_abf: 0.0,
        }
    }
}

/// Alignment of the sample universe onto each source's columns.
///
/// `pheno_idx[s][i]` is the column of universe sample `i` in subgroup `s`'s
/// phenotype matrix, `None` if absent; `geno_idx[0][i]` likewise for the
/// single genotype source.
#[derive(Debug, Clone)]
pub struct SampleMaps {
    pub samples: Vec<String>,
    pub pheno_idx: Vec<Vec<Option<usize>>>,
    pub geno_idx: Vec<Vec<Option<usize>>>,
}

/// Cis-window anchor policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Window around the feature start only.
    Fss,
    /// Window from start to end.
    FssFes,
}

impl Anchor {
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "FSS" => Ok(Anchor::Fss),
            "FSS+FES" => Ok(Anchor::FssFes),
            other => Err(anyhow!("Unknown anchor: {}. Use: FSS or FSS+FES", other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Anchor::Fss => "FSS",
            Anchor::FssFes => "FSS+FES",
        }
    }
}

/// Which Bayes Factor configurations to compute (and, for permutations,
/// which family drives the joint test statistic).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BfSet {
    Const,
    Subset,
    All,
}

impl BfSet {
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "const" => Ok(BfSet::Const),
            "subset" => Ok(BfSet::Subset),
            "all" => Ok(BfSet::All),
            other => Err(anyhow!("Unknown BF set: {}. Use: const, subset or all", other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BfSet::Const => "const",
            BfSet::Subset => "subset",
            BfSet::All => "all",
        }
    }
}

/// Permutation speed-up mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trick {
    Off,
    /// Stop permuting once the hit counter reaches 11.
    EarlyStop,
    /// Keep shuffling (to preserve the RNG trajectory) but stop testing.
    ShuffleOnly,
}

impl Trick {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Trick::Off),
            1 => Ok(Trick::EarlyStop),
            2 => Ok(Trick::ShuffleOnly),
            other => Err(anyhow!("--trick should be 0, 1 or 2, got {}", other)),
        }
    }
}

/// The five analysis steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStep {
    Separate,
    SeparateWithPerms,
    Joint,
    JointWithJointPerms,
    JointWithAllPerms,
}

impl AnalysisStep {
    pub fn from_number(n: u8) -> Result<Self> {
        match n {
            1 => Ok(AnalysisStep::Separate),
            2 => Ok(AnalysisStep::SeparateWithPerms),
            3 => Ok(AnalysisStep::Joint),
            4 => Ok(AnalysisStep::JointWithJointPerms),
            5 => Ok(AnalysisStep::JointWithAllPerms),
            other => Err(anyhow!("--step should be 1, 2, 3, 4 or 5, got {}", other)),
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            AnalysisStep::Separate => 1,
            AnalysisStep::SeparateWithPerms => 2,
            AnalysisStep::Joint => 3,
            AnalysisStep::JointWithJointPerms => 4,
            AnalysisStep::JointWithAllPerms => 5,
        }
    }

    /// Does this step run the joint (ABF) analysis?
    pub fn joint(&self) -> bool {
        self.number() >= 3
    }

    pub fn permutes_separate(&self) -> bool {
        matches!(
            self,
            AnalysisStep::SeparateWithPerms | AnalysisStep::JointWithAllPerms
        )
    }

    pub fn permutes_joint(&self) -> bool {
        matches!(
            self,
            AnalysisStep::JointWithJointPerms | AnalysisStep::JointWithAllPerms
        )
    }

    pub fn permutes(&self) -> bool {
        self.permutes_separate() || self.permutes_joint()
    }
}
