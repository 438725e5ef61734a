use std::collections::BTreeMap;

use anyhow::Context as _;
use camino::Utf8PathBuf;
use scaffoldix_core::GenerateRequest;

#[derive(clap::Args, Debug)]
pub struct Generate {
    /// Archetype reference: `packId[:version]:archetypeId`.
    pub archetype_ref: String,
    /// Target directory. Defaults to the current directory.
    pub target: Option<Utf8PathBuf>,
    /// Plan only: report what would be written without touching the target.
    #[arg(long)]
    pub dry_run: bool,
    /// Overwrite files that already exist with different content.
    #[arg(long)]
    pub force: bool,
    /// Never prompt; use provided data and defaults, fail on missing
    /// required inputs.
    #[arg(long)]
    pub non_interactive: bool,
    /// Input data binding, repeatable: `-d name=value`.
    #[arg(short, long = "data", value_name = "KEY=VALUE")]
    pub data: Vec<String>,
    /// Print the phase trace after the run.
    #[arg(long)]
    pub trace: bool,
}

impl Generate {
    pub fn generate_request(&self) -> anyhow::Result<GenerateRequest> {
        let target = match &self.target {
            Some(target) if target.is_absolute() => target.clone(),
            Some(target) => scaffoldix_core::fs_utils::current_directory()?.join(target),
            None => scaffoldix_core::fs_utils::current_directory()?,
        };

        let mut request = GenerateRequest::new(&self.archetype_ref, target);
        request.dry_run = self.dry_run;
        request.force = self.force;
        request.non_interactive = self.non_interactive;
        request.data = parse_data_bindings(&self.data)?;
        Ok(request)
    }
}

fn parse_data_bindings(
    bindings: &[String],
) -> anyhow::Result<BTreeMap<String, serde_json::Value>> {
    let mut data = BTreeMap::new();
    for binding in bindings {
        let (key, value) = binding
            .split_once('=')
            .with_context(|| format!("invalid data binding {binding:?}, expected KEY=VALUE"))?;
        anyhow::ensure!(!key.is_empty(), "empty key in data binding {binding:?}");
        // Values stay strings; the input resolver coerces them per the
        // declared input type.
        data.insert(
            key.to_owned(),
            serde_json::Value::String(value.to_owned()),
        );
    }
    Ok(data)
}
