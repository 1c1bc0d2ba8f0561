//! Gzipped result writers.
//!
//! Column order is contractual; configuration columns and rows are emitted in
//! enumerator order with "const" first, so files line up across runs and
//! match the label-keyed maps filled during the scan.

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::BufWriter;

use bmaqtl_core::{config_labels, AnalysisStep, BfSet, Ftr, SnpCatalog};

type GzCsvWriter = csv::Writer<BufWriter<GzEncoder<File>>>;

fn gz_writer(path: &str) -> Result<GzCsvWriter> {
    let file = File::create(path).with_context(|| format!("creating {}", path))?;
    let encoder = GzEncoder::new(file, Compression::default());
    Ok(csv::WriterBuilder::new()
        .delimiter(b' ')
        .from_writer(BufWriter::with_capacity(64 * 1024, encoder)))
}

fn num(v: f64) -> String {
    v.to_string()
}

/// `<prefix>_sumstats_<subgroup>.txt.gz`, one file per subgroup.
pub fn write_sumstats(
    prefix: &str,
    subgroups: &[String],
    ftrs: &[Ftr],
    catalog: &SnpCatalog,
    verbose: u8,
) -> Result<()> {
    for (s, subgroup) in subgroups.iter().enumerate() {
        let path = format!("{}_sumstats_{}.txt.gz", prefix, subgroup);
        if verbose > 0 {
            eprintln!("file {}", path);
        }
        let mut wtr = gz_writer(&path)?;
        wtr.write_record([
            "ftr",
            "snp",
            "maf",
            "n",
            "betahat",
            "sebetahat",
            "sigmahat",
            "betaPval",
            "pve",
        ])?;
        for ftr in ftrs {
            for res in &ftr.results {
                let snp = &catalog.snps[res.snp];
                wtr.write_record([
                    ftr.name.as_str(),
                    snp.name.as_str(),
                    &num(snp.maf),
                    &res.ns[s].to_string(),
                    &num(res.betahat[s]),
                    &num(res.sebetahat[s]),
                    &num(res.sigmahat[s]),
                    &num(res.beta_pval[s]),
                    &num(res.pve[s]),
                ])?;
            }
        }
        wtr.flush()?;
    }
    Ok(())
}

/// `<prefix>_permPval_<subgroup>.txt.gz`; every feature appears, including
/// those with no cis-SNP (NaN p-value, 0 permutations).
pub fn write_sep_perm_pvals(
    prefix: &str,
    subgroups: &[String],
    ftrs: &[Ftr],
    verbose: u8,
) -> Result<()> {
    for (s, subgroup) in subgroups.iter().enumerate() {
        let path = format!("{}_permPval_{}.txt.gz", prefix, subgroup);
        if verbose > 0 {
            eprintln!("file {}", path);
        }
        let mut wtr = gz_writer(&path)?;
        wtr.write_record(["ftr", "nbSnps", "permPval", "nbPerms"])?;
        for ftr in ftrs {
            wtr.write_record([
                ftr.name.as_str(),
                &ftr.cis_snps.len().to_string(),
                &num(ftr.perm_pval_sep[s]),
                &ftr.nb_perms_sep[s].to_string(),
            ])?;
        }
        wtr.flush()?;
    }
    Ok(())
}

/// `<prefix>_abfs_unweighted.txt.gz`: one row per (ftr, snp, config) with the
/// grid-indexed log10 ABFs; "const" first, then the selector's configs.
pub fn write_abfs_unweighted(
    prefix: &str,
    ftrs: &[Ftr],
    catalog: &SnpCatalog,
    nb_subgroups: usize,
    grid_len: usize,
    which_bfs: BfSet,
    verbose: u8,
) -> Result<()> {
    let path = format!("{}_abfs_unweighted.txt.gz", prefix);
    if verbose > 0 {
        eprintln!("file {}", path);
    }
    let mut wtr = gz_writer(&path)?;

    let mut header = vec!["ftr".to_string(), "snp".to_string(), "config".to_string()];
    for i in 0..grid_len {
        header.push(format!("ABFgrid{}", i + 1));
    }
    wtr.write_record(&header)?;

    let labels = config_labels(nb_subgroups, which_bfs);
    for ftr in ftrs {
        for res in &ftr.results {
            let snp = &catalog.snps[res.snp];
            for label in std::iter::once("const").chain(labels.iter().map(String::as_str)) {
                let mut record = vec![ftr.name.clone(), snp.name.clone(), label.to_string()];
                for v in &res.unweighted_abfs[label] {
                    record.push(num(*v));
                }
                wtr.write_record(&record)?;
            }
        }
    }
    wtr.flush()?;
    Ok(())
}

/// `<prefix>_abfs_weighted.txt.gz`: grid-averaged ABFs per (ftr, snp).
pub fn write_abfs_weighted(
    prefix: &str,
    ftrs: &[Ftr],
    catalog: &SnpCatalog,
    nb_subgroups: usize,
    which_bfs: BfSet,
    verbose: u8,
) -> Result<()> {
    let path = format!("{}_abfs_weighted.txt.gz", prefix);
    if verbose > 0 {
        eprintln!("file {}", path);
    }
    let mut wtr = gz_writer(&path)?;

    let labels = config_labels(nb_subgroups, which_bfs);
    let mut header = vec![
        "ftr".to_string(),
        "snp".to_string(),
        "nb.subgroups".to_string(),
        "nb.samples".to_string(),
        "abf.const".to_string(),
        "abf.const.fix".to_string(),
        "abf.const.maxh".to_string(),
    ];
    for label in &labels {
        header.push(format!("abf.{}", label));
    }
    wtr.write_record(&header)?;

    for ftr in ftrs {
        for res in &ftr.results {
            let snp = &catalog.snps[res.snp];
            let mut record = vec![
                ftr.name.clone(),
                snp.name.clone(),
                res.nb_subgroups_with_data().to_string(),
                res.nb_samples().to_string(),
                num(res.weighted_abfs["const"]),
                num(res.weighted_abfs["const-fix"]),
                num(res.weighted_abfs["const-maxh"]),
            ];
            for label in &labels {
                record.push(num(res.weighted_abfs[label.as_str()]));
            }
            wtr.write_record(&record)?;
        }
    }
    wtr.flush()?;
    Ok(())
}

/// `<prefix>_jointPermPvals.txt.gz`; every feature appears.
pub fn write_joint_perm_pvals(prefix: &str, ftrs: &[Ftr], verbose: u8) -> Result<()> {
    let path = format!("{}_jointPermPvals.txt.gz", prefix);
    if verbose > 0 {
        eprintln!("file {}", path);
    }
    let mut wtr = gz_writer(&path)?;
    wtr.write_record(["ftr", "nbSnps", "jointPermPval", "nbPerms", "maxL10TrueAbf"])?;
    for ftr in ftrs {
        wtr.write_record([
            ftr.name.as_str(),
            &ftr.cis_snps.len().to_string(),
            &num(ftr.joint_perm_pval),
            &ftr.nb_perms_joint.to_string(),
            &num(ftr.max_l10_true_abf),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Emit every output file the step calls for.
pub fn write_results(
    prefix: &str,
    ftrs: &[Ftr],
    catalog: &SnpCatalog,
    subgroups: &[String],
    step: AnalysisStep,
    grid_len: usize,
    which_bfs: BfSet,
    verbose: u8,
) -> Result<()> {
    write_sumstats(prefix, subgroups, ftrs, catalog, verbose)?;
    if step.permutes_separate() {
        write_sep_perm_pvals(prefix, subgroups, ftrs, verbose)?;
    }
    if step.joint() {
        write_abfs_unweighted(prefix, ftrs, catalog, subgroups.len(), grid_len, which_bfs, verbose)?;
        write_abfs_weighted(prefix, ftrs, catalog, subgroups.len(), which_bfs, verbose)?;
    }
    if step.permutes_joint() {
        write_joint_perm_pvals(prefix, ftrs, verbose)?;
    }
    Ok(())
}
