use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use bmaqtl_core::{
    infer_associations, joint_permutations, separate_permutations, AnalysisStep, Anchor, BfSet,
    PermOptions, ScanOptions, Trick,
};
use bmaqtl_io as io;

/// bmaqtl: cis-QTL mapping via Bayesian meta-analysis across subgroups
#[derive(Parser)]
#[command(
    name = "bmaqtl",
    version,
    about = "bmaqtl: cis-QTL mapping via Bayesian meta-analysis across subgroups",
    after_help = "STEPS:
    1   separate analysis of each subgroup
    2   separate analysis, with permutations
    3   separate and joint analysis
    4   separate and joint analysis, with permutations for the joint only
    5   separate and joint analysis, with permutations for both

EXAMPLES:
    # per-subgroup summary statistics only
    bmaqtl --geno geno_list.txt --pheno pheno_list.txt --fcoord genes.bed \\
        --out results --step 1

    # joint analysis over all configurations, with permutations
    bmaqtl --geno geno_list.txt --pheno pheno_list.txt --fcoord genes.bed \\
        --out results --step 5 --grid grid.txt --bfs all --pbf all \\
        --nperm 10000 --seed 1859 --trick 1"
)]
struct Cli {
    // === Input/Output ===
    /// File listing the genotype file: subgroup identifier <ws> path (one row)
    #[arg(long, short = 'g', help_heading = "Input/Output")]
    geno: PathBuf,

    /// File listing phenotype files: subgroup identifier <ws> path, one row per subgroup
    #[arg(long, short = 'p', help_heading = "Input/Output")]
    pheno: PathBuf,

    /// Feature coordinates in BED format
    #[arg(long, help_heading = "Input/Output")]
    fcoord: PathBuf,

    /// Prefix for the gzipped output files
    #[arg(long, short = 'o', help_heading = "Input/Output")]
    out: String,

    // === Analysis ===
    /// Analysis step (1-5, see STEPS below)
    #[arg(long, help_heading = "Analysis")]
    step: u8,

    /// Cis anchor: FSS or FSS+FES
    #[arg(long, default_value = "FSS", help_heading = "Analysis")]
    anchor: String,

    /// Half-width of the cis window in bp
    #[arg(long, default_value_t = 100_000, help_heading = "Analysis")]
    cis: u64,

    /// Quantile-normalize the phenotypes
    #[arg(long, default_value_t = false, help_heading = "Analysis")]
    qnorm: bool,

    /// File with the grid of phi2/omega2 prior variances (steps 3-5)
    #[arg(long, help_heading = "Analysis")]
    grid: Option<PathBuf>,

    /// Bayes Factors to compute: const, subset or all
    #[arg(long, default_value = "const", help_heading = "Analysis")]
    bfs: String,

    // === Permutations ===
    /// Number of permutations (steps 2, 4 and 5)
    #[arg(long, default_value_t = 0, help_heading = "Permutations")]
    nperm: u64,

    /// Seed for the two random streams (default: microseconds since epoch)
    #[arg(long, help_heading = "Permutations")]
    seed: Option<u64>,

    /// Permutation speed-up: 0=off, 1=early stop, 2=shuffle-only
    #[arg(long, default_value_t = 0, help_heading = "Permutations")]
    trick: u8,

    /// BF used as the joint-permutation statistic: const, subset or all
    #[arg(long, default_value = "const", help_heading = "Permutations")]
    pbf: String,

    // === Filters ===
    /// File listing features to analyze (one per line)
    #[arg(long, short = 'f', help_heading = "Filters")]
    ftr: Option<PathBuf>,

    /// File listing SNPs to analyze (one per line)
    #[arg(long, short = 's', help_heading = "Filters")]
    snp: Option<PathBuf>,

    /// Verbosity level (0/1/2)
    #[arg(long, short = 'v', default_value_t = 1)]
    verbose: u8,
}

struct Config {
    step: AnalysisStep,
    anchor: Anchor,
    which_bfs: BfSet,
    which_perm_bf: BfSet,
    trick: Trick,
    seed: u64,
}

fn validate(cli: &Cli) -> Result<Config> {
    let step = AnalysisStep::from_number(cli.step)?;
    let anchor = Anchor::from_str(&cli.anchor)?;
    let which_bfs = BfSet::from_str(&cli.bfs)?;
    let which_perm_bf = BfSet::from_str(&cli.pbf)?;
    let trick = Trick::from_code(cli.trick)?;

    if step.joint() && cli.grid.is_none() {
        bail!("--grid is required when --step is 3, 4 or 5");
    }
    if step.permutes() && cli.nperm == 0 {
        bail!("--step {} needs permutations, see --nperm", cli.step);
    }
    if step.permutes_joint() {
        if which_bfs == BfSet::Const && which_perm_bf != BfSet::Const {
            bail!("if --bfs const, then --pbf should be const");
        }
        if which_bfs == BfSet::Subset && which_perm_bf == BfSet::All {
            bail!("if --bfs subset, then --pbf should be const or subset");
        }
    }

    let seed = match cli.seed {
        Some(seed) => seed,
        None => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0),
    };

    Ok(Config {
        step,
        anchor,
        which_bfs,
        which_perm_bf,
        trick,
        seed,
    })
}

fn run(cli: &Cli, cfg: &Config) -> Result<()> {
    let verbose = cli.verbose;

    let ftrs_to_keep = io::load_name_list(cli.ftr.as_deref())?;
    let snps_to_keep = io::load_name_list(cli.snp.as_deref())?;
    let grid = match &cli.grid {
        Some(path) => io::load_grid(path)?,
        None => Vec::new(),
    };
    if verbose > 0 && !grid.is_empty() {
        eprintln!("grid size: {}", grid.len());
    }

    let geno_list = io::load_subgroup_list(&cli.geno)?;
    if geno_list.len() != 1 {
        bail!("a single genotype file shared across subgroups is required");
    }
    let pheno_list = io::load_subgroup_list(&cli.pheno)?;
    if pheno_list.is_empty() {
        bail!("{}: no phenotype file listed", cli.pheno.display());
    }
    let subgroups: Vec<String> = pheno_list.iter().map(|(id, _)| id.clone()).collect();
    if verbose > 0 {
        eprintln!("nb of subgroups: {}", subgroups.len());
    }

    let maps = io::load_sample_maps(&geno_list, &pheno_list, verbose)?;
    let mut ftrs = io::load_phenotypes(&pheno_list, &ftrs_to_keep, verbose)?;
    io::load_feature_coords(&cli.fcoord, &mut ftrs)?;
    let catalog = io::load_genotypes(&geno_list[0].1, &snps_to_keep, verbose)?;

    let scan = ScanOptions {
        anchor: cfg.anchor,
        len_cis: cli.cis,
        step: cfg.step,
        qnorm: cli.qnorm,
        which_bfs: cfg.which_bfs,
    };
    if verbose > 0 {
        eprintln!(
            "look for associations between each pair feature-SNP (anchor={}, cis={}) ...",
            cfg.anchor.as_str(),
            cli.cis
        );
    }
    let nb_pairs = infer_associations(&mut ftrs, &catalog, &maps, &grid, &scan);
    if verbose > 0 {
        eprintln!("nb of analyzed feature-SNP pairs: {}", nb_pairs);
    }

    if cfg.step.permutes() {
        if verbose > 0 {
            eprintln!(
                "get feature-level P-values by permuting phenotypes (nperm={}, seed={}, trick={}) ...",
                cli.nperm, cfg.seed, cli.trick
            );
        }
        let perm_opts = PermOptions {
            nb_perms: cli.nperm,
            seed: cfg.seed,
            trick: cfg.trick,
            which_perm_bf: cfg.which_perm_bf,
            qnorm: cli.qnorm,
        };
        if cfg.step.permutes_separate() {
            separate_permutations(&mut ftrs, &catalog, &maps.pheno_idx, &perm_opts);
        }
        if cfg.step.permutes_joint() {
            joint_permutations(&mut ftrs, &catalog, &maps.pheno_idx, &grid, &perm_opts);
        }
    }

    io::write_results(
        &cli.out,
        &ftrs,
        &catalog,
        &subgroups,
        cfg.step,
        grid.len(),
        cfg.which_bfs,
        verbose,
    )?;

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = validate(&cli)?;

    let started = Instant::now();
    if cli.verbose > 0 {
        eprintln!("START bmaqtl (step {})", cfg.step.number());
    }

    run(&cli, &cfg)?;

    if cli.verbose > 0 {
        eprintln!("END bmaqtl (elapsed {:.2?})", started.elapsed());
    }
    Ok(())
}
