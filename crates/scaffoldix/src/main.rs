mod args;
mod exit_code;
mod log;
mod prompt;

use std::process::ExitCode;

use clap::Parser as _;
use git_fetch::GitCli;
use scaffoldix_core::{
    EngineContext, GenerateDeps, GenerateResult, InstallOptions, InstallStatus, PackResolver,
    ScaffoldError, ShellRunner, StorePaths, TeraEvaluator,
};
use serde::Serialize;
use tracing::error;

use crate::args::{CliArgs, Command, OutputType};
use crate::prompt::StdinPrompt;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    let verbosity = match args.verbosity() {
        Ok(verbosity) => verbosity,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    log::init(verbosity);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:?}");
            report(&e);
            exit_code::for_error(&e)
        }
    }
}

fn report(error: &anyhow::Error) {
    match error.downcast_ref::<ScaffoldError>() {
        Some(scaffold) => {
            eprintln!("error[{}]: {}", scaffold.code(), scaffold.message());
            if let Some(hint) = scaffold.hint() {
                eprintln!("hint: {hint}");
            }
        }
        None => eprintln!("error: {error:#}"),
    }
}

fn run(args: CliArgs) -> anyhow::Result<()> {
    let paths = StorePaths::new(args.store_root()?)?;
    let ctx = EngineContext::new(paths);

    match args.command {
        Command::Install(cmd_args) => {
            let options = InstallOptions {
                update_registry: !cmd_args.no_register,
            };
            let outcome = if cmd_args.git {
                scaffoldix_core::install_git_pack(
                    &ctx,
                    &GitCli,
                    &cmd_args.source,
                    cmd_args.rev.as_deref(),
                    &options,
                )?
            } else {
                let source =
                    scaffoldix_core::fs_utils::canonicalize_utf8(&cmd_args.local_source())?;
                scaffoldix_core::install_local_pack(&ctx, &source, &options)?
            };
            match outcome.status {
                InstallStatus::Installed => println!(
                    "installed {}@{} ({})",
                    outcome.pack_id,
                    outcome.version,
                    short_hash(&outcome.hash)
                ),
                InstallStatus::AlreadyInstalled => println!(
                    "{}@{} is already installed ({})",
                    outcome.pack_id,
                    outcome.version,
                    short_hash(&outcome.hash)
                ),
            }
        }
        Command::Generate(cmd_args) => {
            let request = cmd_args.generate_request()?;
            let deps = GenerateDeps {
                prompt: &StdinPrompt,
                evaluator: &TeraEvaluator,
                hook_runner: &ShellRunner,
                check_runner: &ShellRunner,
            };
            let result = scaffoldix_core::generate(&ctx, &deps, &request)?;
            print_generate_summary(&result, request.dry_run);
            if cmd_args.trace {
                eprint!("{}", result.trace.detailed());
            }
        }
        Command::List(cmd_args) => {
            let listing = scaffoldix_core::list_archetypes(&ctx)?;
            for warning in &listing.warnings {
                eprintln!("warning: {warning}");
            }
            match cmd_args.output {
                Some(output) => print_output(output, &listing),
                None => {
                    for entry in &listing.archetypes {
                        println!(
                            "{} ({}@{}, {} inputs)",
                            entry.reference,
                            entry.pack_id,
                            entry.pack_version,
                            entry.inputs_count
                        );
                    }
                }
            }
        }
        Command::Versions(cmd_args) => {
            let resolver = PackResolver::new(&ctx.registry);
            let versions = resolver.list_versions(&cmd_args.pack_id)?;
            match cmd_args.output {
                Some(output) => print_output(output, &versions),
                None => {
                    for record in &versions {
                        println!(
                            "{} ({}, installed {})",
                            record.version,
                            short_hash(&record.hash),
                            record.installed_at
                        );
                    }
                }
            }
        }
        Command::Uninstall(cmd_args) => {
            match scaffoldix_core::uninstall_pack(&ctx, &cmd_args.pack_id)? {
                Some(entry) => println!("uninstalled {}@{}", entry.id, entry.version),
                None => println!("pack {} is not installed", cmd_args.pack_id),
            }
        }
    }
    Ok(())
}

fn print_generate_summary(result: &GenerateResult, dry_run: bool) {
    if dry_run {
        println!(
            "dry-run: {} file(s) planned for {}:{}",
            result.files_planned.len(),
            result.pack_id,
            result.archetype_id
        );
        for entry in &result.files_planned {
            println!("  {:?} {}", entry.operation, entry.dest_relative_path);
        }
        if result.patches_skipped_for_dry_run {
            println!("patches skipped (dry-run)");
        }
        return;
    }

    println!(
        "generated {}:{} ({} written, {} planned)",
        result.pack_id,
        result.archetype_id,
        result.files_written.len(),
        result.files_planned.len()
    );
    if let Some(patches) = &result.patch_report {
        println!(
            "patches: {} applied, {} skipped of {}",
            patches.applied, patches.skipped, patches.total
        );
    }
}

fn print_output(output_type: OutputType, output: impl Serialize) {
    match output_type {
        OutputType::Json => match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{json}"),
            Err(e) => error!("can't serialize output to json: {e}"),
        },
    }
}

fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}
