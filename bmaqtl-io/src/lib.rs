//! bmaqtl-io: file I/O for the bmaqtl cis-QTL mapper.
//!
//! Loaders for the whitespace-delimited inputs (subgroup list files,
//! phenotype matrices, IMPUTE genotype matrices, BED feature coordinates,
//! prior-variance grids, allow-lists) and writers for the five gzipped
//! result files. Inputs may be gzip-compressed; outputs always are.

pub mod read;
pub mod write;

pub use read::{
    load_feature_coords, load_genotypes, load_grid, load_name_list, load_phenotypes,
    load_sample_maps, load_subgroup_list, open_text,
};
pub use write::{
    write_abfs_unweighted, write_abfs_weighted, write_joint_perm_pvals, write_results,
    write_sep_perm_pvals, write_sumstats,
};
