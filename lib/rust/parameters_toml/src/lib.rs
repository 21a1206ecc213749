// Warning groups (as of rust 1.55)
#![deny(
    future_incompatible,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2021_compatibility,
    rust_2018_idioms,
    unused
)]
// Other warnings (as of rust 1.55)
#![deny(
    bindings_with_variant_name,
    confusable_idents,
    const_item_mutation,
    deprecated,
    drop_bounds,
    dyn_drop,
    elided_lifetimes_in_paths,
    exported_private_dependencies,
    function_item_references,
    invalid_value,
    irrefutable_let_patterns,
    mixed_script_confusables,
    non_shorthand_field_patterns,
    overlapping_range_endpoints,
    renamed_and_removed_lints,
    stable_features,
    trivial_bounds,
    type_alias_bounds,
    uncommon_codepoints,
    unconditional_recursion,
    unknown_lints,
    unused_comparisons,
    while_true
)]

use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct Parameters {
    /// Number of agglomeration steps to rewind from the most probable
    /// partition when seeding the next round.
    best_minus_margin: usize,
    /// Shard rebalancing continues while the smallest shard is smaller than
    /// the largest divided by this ratio.
    rebalance_ratio: f64,
    /// Upper bound on shard rebalancing passes.
    max_rebalance_iterations: usize,
    /// Keep the number of processes for another round while each process
    /// still has at least this many clusters to work on.
    max_clusters_per_proc: usize,
}

const DEFAULT_PARAMETERS: Parameters = Parameters {
    best_minus_margin: 10,
    rebalance_ratio: 1.5,
    max_rebalance_iterations: 100,
    max_clusters_per_proc: 5,
};

impl Default for Parameters {
    fn default() -> Self {
        DEFAULT_PARAMETERS
    }
}

static PARAMETERS: OnceLock<Result<Parameters>> = OnceLock::new();

fn load_parameters(path: &Path) -> Result<Parameters> {
    let s = std::fs::read_to_string(path).with_context(|| path.display().to_string())?;
    toml::from_str(&s).with_context(|| path.display().to_string())
}

/// Return a reference to the global parameters.
/// The parameters may need to be loaded; if loading fails, return Err.
fn parameters() -> &'static Result<Parameters> {
    PARAMETERS.get_or_init(|| {
        let path = std::env::current_exe()
            .context("Unable to locate the running executable")?
            .with_file_name("parameters.toml");
        if !path.exists() {
            warn!(
                "could not find parameters.toml at {}, falling back to defaults",
                path.display()
            );
            Ok(DEFAULT_PARAMETERS)
        } else {
            load_parameters(&path)
        }
    })
}

macro_rules! parameter_getter {
    ($a:ident, $t:ty) => {
        pub fn $a() -> Result<&'static $t> {
            let val = match parameters() {
                Err(e) => return Err(anyhow::anyhow!("{e:#}")),
                Ok(p) => &p.$a,
            };
            if DEFAULT_PARAMETERS.$a != *val {
                warn!("using non-default {} = {:?}", stringify!($a), val);
            }
            Ok(val)
        }
    };
}

parameter_getter!(best_minus_margin, usize);
parameter_getter!(rebalance_ratio, f64);
parameter_getter!(max_rebalance_iterations, usize);
parameter_getter!(max_clusters_per_proc, usize);

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "best_minus_margin = 3")?;
        let params = load_parameters(file.path())?;
        assert_eq!(
            params,
            Parameters {
                best_minus_margin: 3,
                ..DEFAULT_PARAMETERS
            }
        );
        Ok(())
    }

    #[test]
    fn test_unknown_key_is_an_error() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "best_minus = 3")?;
        assert!(load_parameters(file.path()).is_err());
        Ok(())
    }

    #[test]
    fn test_defaults_without_file() -> Result<()> {
        // no parameters.toml sits next to the test binary
        assert_eq!(*best_minus_margin()?, 10);
        assert_eq!(*rebalance_ratio()?, 1.5);
        assert_eq!(*max_rebalance_iterations()?, 100);
        assert_eq!(*max_clusters_per_proc()?, 5);
        Ok(())
    }
}
