//! Input loaders.
//!
//! All formats are whitespace-delimited text, optionally gzip-compressed.
//! Parsing is line-oriented: runs of spaces/tabs separate columns, so the
//! mixed separators found in the wild all work.

use anyhow::{anyhow, bail, Context, Result};
use flate2::read::MultiGzDecoder;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use bmaqtl_core::{Ftr, SampleMaps, Snp, SnpCatalog};

/// Open a text file, transparently gunzipping `.gz` paths.
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    if path.extension().map_or(false, |e| e == "gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Two-column list file: `subgroup identifier <ws> path`. Lines starting
/// with `#` are comments.
pub fn load_subgroup_list(path: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    for line in open_text(path)?.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut it = trimmed.split_whitespace();
        let id = it
            .next()
            .ok_or_else(|| anyhow!("{}: empty line", path.display()))?;
        let file = it.next().ok_or_else(|| {
            anyhow!(
                "{}: expected 'subgroup<space/tab>path' lines",
                path.display()
            )
        })?;
        out.push((id.to_string(), PathBuf::from(file)));
    }
    Ok(out)
}

/// One name per line; `None` yields an empty (= keep everything) set.
pub fn load_name_list(path: Option<&Path>) -> Result<HashSet<String>> {
    let mut out = HashSet::new();
    if let Some(path) = path {
        for line in open_text(path)?.lines() {
            let line = line?;
            let name = line.trim();
            if !name.is_empty() {
                out.insert(name.to_string());
            }
        }
    }
    Ok(out)
}

/// Grid of (phi2, omega2) prior variances, two columns per row.
pub fn load_grid(path: &Path) -> Result<Vec<(f64, f64)>> {
    let mut grid = Vec::new();
    for (line_no, line) in open_text(path)?.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 2 {
            bail!(
                "{} line {}: grid rows must be phi2<space/tab>omega2",
                path.display(),
                line_no + 1
            );
        }
        let phi2: f64 = tokens[0]
            .parse()
            .with_context(|| format!("{} line {}: bad phi2", path.display(), line_no + 1))?;
        let oma2: f64 = tokens[1]
            .parse()
            .with_context(|| format!("{} line {}: bad omega2", path.display(), line_no + 1))?;
        grid.push((phi2, oma2));
    }
    if grid.is_empty() {
        bail!("{}: empty grid", path.display());
    }
    Ok(grid)
}

fn first_line(path: &Path) -> Result<String> {
    open_text(path)?
        .lines()
        .next()
        .ok_or_else(|| anyhow!("{}: empty file", path.display()))?
        .map_err(Into::into)
}

/// Sample names from a phenotype matrix header (optional leading `Id`).
fn pheno_header_samples(path: &Path) -> Result<Vec<String>> {
    let header = first_line(path)?;
    let mut tokens: Vec<String> = header.split_whitespace().map(String::from).collect();
    if tokens.first().map(String::as_str) == Some("Id") {
        tokens.remove(0);
    }
    Ok(tokens)
}

/// Drop the `_aNaM` suffix of an IMPUTE triplet column name.
fn strip_impute_suffix(token: &str) -> &str {
    token.rsplit_once("_a").map(|(head, _)| head).unwrap_or(token)
}

/// Sample names from an IMPUTE header: five fixed columns, then one triplet
/// `<id>_a1a1 <id>_a1a2 <id>_a2a2` per sample.
fn impute_header_samples(path: &Path) -> Result<Vec<String>> {
    let header = first_line(path)?;
    let tokens: Vec<&str> = header.split_whitespace().collect();
    if tokens.len() < 8 || (tokens.len() - 5) % 3 != 0 {
        bail!("{}: badly formatted IMPUTE header", path.display());
    }
    Ok(tokens[5..]
        .iter()
        .step_by(3)
        .map(|t| strip_impute_suffix(t).to_string())
        .collect())
}

fn index_into(source: &[String], universe: &[String]) -> Vec<Option<usize>> {
    let pos: HashMap<&str, usize> = source
        .iter()
        .enumerate()
        .map(|(i, s)| (s.as_str(), i))
        .collect();
    universe.iter().map(|s| pos.get(s.as_str()).copied()).collect()
}

/// Build the sample universe (phenotype samples in subgroup order, then any
/// genotype-only samples) and the per-source alignment maps.
pub fn load_sample_maps(
    geno_list: &[(String, PathBuf)],
    pheno_list: &[(String, PathBuf)],
    verbose: u8,
) -> Result<SampleMaps> {
    let mut pheno_samples = Vec::with_capacity(pheno_list.len());
    for (_, path) in pheno_list {
        pheno_samples.push(pheno_header_samples(path)?);
    }
    let geno_samples = impute_header_samples(&geno_list[0].1)?;

    let mut universe: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for list in pheno_samples.iter().chain(std::iter::once(&geno_samples)) {
        for sample in list {
            if seen.insert(sample.clone()) {
                universe.push(sample.clone());
            }
        }
    }
    if verbose > 0 {
        eprintln!("total nb of samples: {}", universe.len());
    }

    let pheno_idx = pheno_samples
        .iter()
        .map(|list| index_into(list, &universe))
        .collect();
    let geno_idx = vec![index_into(&geno_samples, &universe)];
    Ok(SampleMaps {
        samples: universe,
        pheno_idx,
        geno_idx,
    })
}

/// Load every subgroup's phenotype matrix into the feature catalogue,
/// sorted by feature name.
pub fn load_phenotypes(
    pheno_list: &[(String, PathBuf)],
    ftrs_to_keep: &HashSet<String>,
    verbose: u8,
) -> Result<Vec<Ftr>> {
    let nb_subgroups = pheno_list.len();
    let mut ftrs: BTreeMap<String, Ftr> = BTreeMap::new();

    for (s, (_, path)) in pheno_list.iter().enumerate() {
        let mut lines = open_text(path)?.lines();
        let header = lines
            .next()
            .ok_or_else(|| anyhow!("{}: empty phenotype file", path.display()))??;
        let mut header_tokens: Vec<&str> = header.split_whitespace().collect();
        if header_tokens.first() == Some(&"Id") {
            header_tokens.remove(0);
        }
        let nb_samples = header_tokens.len();

        for (line_no, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let cells: Vec<&str> = line.split_whitespace().collect();
            let name = cells[0];
            if !ftrs_to_keep.is_empty() && !ftrs_to_keep.contains(name) {
                continue;
            }
            if cells.len() != nb_samples + 1 {
                bail!(
                    "{} line {}: expected {} columns, found {}",
                    path.display(),
                    line_no + 2,
                    nb_samples + 1,
                    cells.len()
                );
            }
            let ftr = ftrs
                .entry(name.to_string())
                .or_insert_with(|| Ftr::new(name, nb_subgroups));
            let mut values = vec![f64::NAN; nb_samples];
            let mut is_na = vec![false; nb_samples];
            for (i, cell) in cells[1..].iter().enumerate() {
                if *cell == "NA" {
                    is_na[i] = true;
                } else {
                    values[i] = cell.parse().with_context(|| {
                        format!(
                            "{} line {}: bad phenotype value '{}'",
                            path.display(),
                            line_no + 2,
                            cell
                        )
                    })?;
                }
            }
            ftr.phenos[s] = values;
            ftr.is_na[s] = is_na;
        }
    }

    if ftrs.is_empty() {
        bail!("no feature to analyze");
    }
    if verbose > 0 {
        eprintln!("nb of features: {}", ftrs.len());
    }
    Ok(ftrs.into_values().collect())
}

/// Attach BED coordinates (0-based half-open start stored 1-based inclusive)
/// to the loaded features. Every feature must end up with a coordinate.
pub fn load_feature_coords(path: &Path, ftrs: &mut [Ftr]) -> Result<()> {
    let by_name: HashMap<String, usize> = ftrs
        .iter()
        .enumerate()
        .map(|(i, f)| (f.name.clone(), i))
        .collect();

    for (line_no, line) in open_text(path)?.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 4 {
            bail!(
                "{} line {}: BED lines need chr start end name",
                path.display(),
                line_no + 1
            );
        }
        if let Some(&i) = by_name.get(tokens[3]) {
            let start: u64 = tokens[1].parse().with_context(|| {
                format!("{} line {}: bad start", path.display(), line_no + 1)
            })?;
            let end: u64 = tokens[2].parse().with_context(|| {
                format!("{} line {}: bad end", path.display(), line_no + 1)
            })?;
            ftrs[i].chr = tokens[0].to_string();
            ftrs[i].start = start + 1;
            ftrs[i].end = end;
        }
    }

    for ftr in ftrs.iter() {
        if ftr.chr.is_empty() {
            bail!("feature {} has no coordinate", ftr.name);
        }
    }
    Ok(())
}

/// Load the IMPUTE genotype matrix: dosage = 0·AA + 1·AB + 2·BB, an all-zero
/// probability triple marks a missing call.
pub fn load_genotypes(
    path: &Path,
    snps_to_keep: &HashSet<String>,
    verbose: u8,
) -> Result<SnpCatalog> {
    let mut lines = open_text(path)?.lines();
    let header = lines
        .next()
        .ok_or_else(|| anyhow!("{}: empty genotype file", path.display()))??;
    let header_tokens: Vec<&str> = header.split_whitespace().collect();
    if header_tokens.len() < 8 || (header_tokens.len() - 5) % 3 != 0 {
        bail!("{}: badly formatted IMPUTE header", path.display());
    }
    let nb_samples = (header_tokens.len() - 5) / 3;

    let mut seen = HashSet::new();
    let mut snps = Vec::new();
    for (line_no, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            bail!("{} line {}: truncated row", path.display(), line_no + 2);
        }
        let name = tokens[1];
        if !snps_to_keep.is_empty() && !snps_to_keep.contains(name) {
            continue;
        }
        if tokens.len() != 5 + 3 * nb_samples {
            bail!(
                "{} line {}: expected {} columns, found {}",
                path.display(),
                line_no + 2,
                5 + 3 * nb_samples,
                tokens.len()
            );
        }
        if !seen.insert(name.to_string()) {
            continue;
        }

        let mut genos = vec![0.0; nb_samples];
        let mut is_na = vec![false; nb_samples];
        let mut dose_sum = 0.0;
        for i in 0..nb_samples {
            let parse_prob = |j: usize| -> Result<f64> {
                tokens[5 + 3 * i + j].parse().with_context(|| {
                    format!("{} line {}: bad probability", path.display(), line_no + 2)
                })
            };
            let aa = parse_prob(0)?;
            let ab = parse_prob(1)?;
            let bb = parse_prob(2)?;
            if aa == 0.0 && ab == 0.0 && bb == 0.0 {
                is_na[i] = true;
            } else {
                genos[i] = ab + 2.0 * bb;
                dose_sum += genos[i];
            }
        }
        let nb_obs = is_na.iter().filter(|&&na| !na).count();
        let freq = if nb_obs > 0 {
            dose_sum / (2.0 * nb_obs as f64)
        } else {
            f64::NAN
        };
        snps.push(Snp {
            name: name.to_string(),
            chr: tokens[0].to_string(),
            coord: tokens[2].parse().with_context(|| {
                format!("{} line {}: bad coordinate", path.display(), line_no + 2)
            })?,
            genos,
            is_na,
            maf: if freq <= 0.5 { freq } else { 1.0 - freq },
        });
    }

    if snps.is_empty() {
        bail!("no SNP to analyze");
    }
    if verbose > 0 {
        eprintln!("nb of SNPs: {}", snps.len());
    }
    Ok(SnpCatalog::new(snps))
}
