mod generate;
mod install;

use anyhow::bail;
use camino::Utf8PathBuf;
use clap::{
    ValueEnum,
    builder::{Styles, styling::AnsiColor},
};
use tracing::level_filters::LevelFilter;

pub use generate::Generate;
pub use install::Install;

const MAIN_COLOR: AnsiColor = AnsiColor::Cyan;
const SECONDARY_COLOR: AnsiColor = AnsiColor::Yellow;
const HELP_STYLES: Styles = Styles::styled()
    .header(MAIN_COLOR.on_default().bold())
    .usage(MAIN_COLOR.on_default().bold())
    .placeholder(SECONDARY_COLOR.on_default())
    .literal(SECONDARY_COLOR.on_default());

/// Scaffoldix generates project trees from versioned, content-addressed
/// template packs.
#[derive(clap::Parser, Debug)]
#[command(version, author, styles = HELP_STYLES)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
    /// Directory of the pack store.
    ///
    /// Defaults to the `SCAFFOLDIX_HOME` environment variable, then to
    /// `~/.scaffoldix`.
    #[arg(long, global = true, env = "SCAFFOLDIX_HOME")]
    store_dir: Option<Utf8PathBuf>,
    /// Increase log verbosity.
    ///
    /// `-v` prints progress, `-vv` debug details, `-vvv` traces. To change
    /// the log level without the flags, use the `SCAFFOLDIX_LOG`
    /// environment variable.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl CliArgs {
    pub fn verbosity(&self) -> anyhow::Result<Option<LevelFilter>> {
        let level = match self.verbose {
            0 => None,
            1 => Some(LevelFilter::INFO),
            2 => Some(LevelFilter::DEBUG),
            3 => Some(LevelFilter::TRACE),
            _ => bail!("invalid verbosity level. Use -v, -vv, or -vvv."),
        };
        Ok(level)
    }

    /// The absolute store root: flag, environment, or `~/.scaffoldix`.
    pub fn store_root(&self) -> anyhow::Result<Utf8PathBuf> {
        if let Some(dir) = &self.store_dir {
            return absolute(dir.clone());
        }
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("cannot determine the home directory"))?;
        let home = Utf8PathBuf::from_path_buf(home)
            .map_err(|p| anyhow::anyhow!("home directory is not utf-8: {p:?}"))?;
        Ok(home.join(".scaffoldix"))
    }
}

fn absolute(path: Utf8PathBuf) -> anyhow::Result<Utf8PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    Ok(scaffoldix_core::fs_utils::current_directory()?.join(path))
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Install a template pack into the store.
    ///
    /// Packs are content-addressed: the same pack content always lands in
    /// the same store directory, and installing it twice is a no-op.
    Install(Install),
    /// Generate a project tree from an installed archetype.
    ///
    /// The archetype is addressed as `packId[:version]:archetypeId`, e.g.
    /// `@org/starter:2.1.0:app`. Without a version the highest installed
    /// one is used.
    Generate(Generate),
    /// List the archetypes of all installed packs.
    List(List),
    /// List the installed versions of a pack, newest first.
    Versions(Versions),
    /// Remove a pack from the registry.
    Uninstall(Uninstall),
}

#[derive(clap::Args, Debug)]
pub struct List {
    /// Output format.
    #[arg(short, long)]
    pub output: Option<OutputType>,
}

#[derive(clap::Args, Debug)]
pub struct Versions {
    /// Pack id, e.g. `@org/starter`.
    pub pack_id: String,
    /// Output format.
    #[arg(short, long)]
    pub output: Option<OutputType>,
}

#[derive(clap::Args, Debug)]
pub struct Uninstall {
    /// Pack id to remove from the registry.
    pub pack_id: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputType {
    Json,
}
