//! `reward-claimer config`: print the effective configuration.

use super::output::{self, Tone};
use crate::config::AppConfig;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    if let Err(errors) = config.validate() {
        for error in &errors {
            output::report(Tone::Notice, format_args!("⚠ {error}"));
        }
    }
    print!("{}", config.to_toml()?);
    Ok(())
}
