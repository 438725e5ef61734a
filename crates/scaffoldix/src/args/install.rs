use camino::Utf8PathBuf;

#[derive(clap::Args, Debug)]
pub struct Install {
    /// Local directory containing the pack manifest, or a git URL with
    /// `--git`.
    pub source: String,
    /// Treat the source as a git repository URL and clone it.
    #[arg(long)]
    pub git: bool,
    /// Git ref (branch, tag, or commit) to check out before installing.
    /// Only meaningful with `--git`.
    #[arg(long, requires = "git")]
    pub rev: Option<String>,
    /// Install into the store without recording the pack in the registry.
    #[arg(long)]
    pub no_register: bool,
}

impl Install {
    pub fn local_source(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.source)
    }
}
