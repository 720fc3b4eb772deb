//! Layered configuration loading via the `config` crate.
//!
//! Sources, lowest to highest precedence:
//!
//! | Source                     | Example                          |
//! |----------------------------|----------------------------------|
//! | [`SimConfig::default`]     | built in                         |
//! | TOML / JSON / YAML file    | `--config bounce.toml`           |
//! | `BOUNCE_*` environment     | `BOUNCE_BUFFER_SIZE=512`         |
//!
//! Command-line flags in the binary override all of these.

use std::path::Path;

use ::config::{Config, Environment, File};

use crate::error::Result;
use crate::types::SimConfig;

pub const ENV_PREFIX: &str = "BOUNCE";

pub fn load(path: Option<&Path>) -> Result<SimConfig> {
    let mut builder = Config::builder().add_source(Config::try_from(&SimConfig::default())?);

    if let Some(path) = path {
        builder = builder.add_source(File::from(path));
    }

    let loaded: SimConfig = builder
        .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()?
        .try_deserialize()?;

    loaded.validate()?;
    Ok(loaded)
}
