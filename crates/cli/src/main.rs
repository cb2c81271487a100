//! modelrepo command-line tool.
//!
//! Creates and validates repository configuration, reports the state of the
//! model stored in the working tree, rewrites it in canonical form, restores
//! objects lost from the tree out of git history, and walks through merge
//! conflicts one object at a time.

mod conflicts;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use modelrepo_core::conflict::{Choice, DefaultPolicy, PreferPolicy, ResolutionState};
use modelrepo_core::errors::ConflictError;
use modelrepo_core::model::UnresolvedReference;
use modelrepo_core::vcs::{GitClient, MergeStatus};
use modelrepo_core::{CancelToken, ModelRepository, RepoConfig};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// modelrepo command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "modelrepo",
    version,
    about = "Store a design model in git as one file per object"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "./modelrepo.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file and create the git repository.
    Init,

    /// Validate a configuration file.
    Validate,

    /// Show the working tree and the model stored in it.
    Status,

    /// Load the model and list references whose target is missing.
    Import {
        /// Print the unresolved references as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Load the model and write it back in canonical form.
    Normalize,

    /// Restore objects that only survive in history.
    Recover {
        /// Commit the restored files afterwards.
        #[arg(long)]
        commit: bool,

        /// Print the recovery report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Merge a branch and resolve conflicts per object.
    Merge {
        /// Branch, tag or commit to merge.
        reference: String,

        /// Decide every conflict without asking.
        #[arg(long, value_enum)]
        prefer: Option<Prefer>,

        /// Message of the merge commit.
        #[arg(short, long)]
        message: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Prefer {
    /// Always keep our side.
    Ours,
    /// Always keep their side.
    Theirs,
    /// Keep ours where it exists, else theirs.
    Default,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // The config may not exist yet (`init`); fall back to warnings only.
    let level = RepoConfig::load_from_file(&cli.config)
        .map(|c| c.logging.level)
        .unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .without_time()
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.config;
    match cli.command {
        Commands::Init => cmd_init(&config),
        Commands::Validate => cmd_validate(&config),
        Commands::Status => cmd_status(&open_repository(&config)?),
        Commands::Import { json } => cmd_import(&open_repository(&config)?, json),
        Commands::Normalize => cmd_normalize(&open_repository(&config)?).await,
        Commands::Recover { commit, json } => {
            cmd_recover(&open_repository(&config)?, commit, json)
        }
        Commands::Merge {
            reference,
            prefer,
            message,
        } => cmd_merge(
            &open_repository(&config)?,
            &reference,
            prefer,
            message.as_deref(),
        ),
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<RepoConfig> {
    RepoConfig::load_and_resolve(path).context("failed to load configuration file")
}

fn open_repository(path: &Path) -> Result<ModelRepository<GitClient>> {
    let config = load_config(path)?;
    debug!(root = %config.repository.path.display(), "opening repository");
    ModelRepository::open(config).context("failed to open git repository")
}

/// A token that trips on Ctrl-C.
fn interrupt_token() -> CancelToken {
    let token = CancelToken::new();
    let trip = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trip.cancel();
        }
    });
    token
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    let defaults = RepoConfig::default();
    let rendered = defaults.to_toml().context("failed to render default configuration")?;
    let contents = format!("# modelrepo configuration\n\n{rendered}");
    std::fs::write(output, contents).context("failed to write config file")?;

    let config = RepoConfig::load_from_file(output).context("failed to re-read config file")?;
    let root = config.repository.path.clone();
    if root.join(".git").exists() {
        println!("{}", style::dim(&format!("Using existing git repository at {}", root.display())));
    } else {
        ModelRepository::init(config).context("failed to create git repository")?;
        println!("{}", style::success(&format!("Created git repository at {}", root.display())));
    }

    println!("{}", style::success(&format!("Default configuration written to {}", output.display())));
    println!();
    println!("Next steps:");
    println!("  1. Set the commit author in the [commit] section");
    println!("  2. Validate with: modelrepo validate --config {}", output.display());
    println!("  3. Export a model into {}/model", root.display());

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        RepoConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    println!("  [OK] Environment variable references processed");

    match config.validate() {
        Ok(()) => println!("  [OK] All required fields are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    let repo_ok = GitClient::new(&config.repository.path, config.signature()).is_ok();
    if repo_ok {
        println!("  [OK] Git working tree found");
    } else {
        println!("  [FAIL] No git working tree at {}", config.repository.path.display());
    }

    println!();
    println!("Configuration summary:");
    println!("  Working tree  : {}", config.repository.path.display());
    println!(
        "  Commit author : {} <{}>",
        config.commit.author_name, config.commit.author_email
    );
    println!("  Export workers: {}", config.export.workers);
    println!(
        "  Recovery      : {} round(s), {}",
        config.recovery.max_rounds,
        match config.recovery.max_commits {
            0 => "whole history".to_string(),
            n => format!("last {n} commits"),
        }
    );
    println!("  Log level     : {}", config.logging.level);
    println!();

    if !repo_ok {
        anyhow::bail!("repository check failed");
    }
    println!("Configuration is valid.");
    Ok(())
}

fn cmd_status(repo: &ModelRepository<GitClient>) -> Result<()> {
    let head = repo.vcs().head_sha().context("failed to read HEAD")?;
    let dirty = repo.has_changes().context("failed to read working tree status")?;
    let imported = repo.import_model().context("failed to import model")?;

    println!("{}", style::header("modelrepo status"));
    println!();
    println!("  Working tree : {}", repo.root().display());
    println!(
        "  HEAD         : {}",
        head.as_deref().map(short_sha).unwrap_or("none")
    );
    println!(
        "  Changes      : {}",
        if dirty { "uncommitted" } else { "clean" }
    );

    match imported {
        None => println!("  Model        : none exported yet"),
        Some(imported) => {
            let model = &imported.model;
            println!("  Model        : {} ({})", model.name, model.id());
            println!("  Folders      : {}", model.folder_count());
            println!("  Objects      : {}", model.object_count());
            println!("  Assets       : {}", model.assets.len());
            println!("  Unresolved   : {}", imported.unresolved.len());
            if !imported.is_complete() {
                println!();
                println!(
                    "{}",
                    style::warn("Some references point at missing objects; run `modelrepo recover`")
                );
            }
        }
    }

    Ok(())
}

fn cmd_import(repo: &ModelRepository<GitClient>, json: bool) -> Result<()> {
    let imported = repo
        .import_model()
        .context("failed to import model")?
        .context("no model found in the working tree")?;

    if json {
        let out = serde_json::to_string_pretty(&imported.unresolved)
            .context("failed to serialize unresolved references")?;
        println!("{}", out);
        return Ok(());
    }

    let model = &imported.model;
    println!(
        "{}",
        style::success(&format!(
            "Imported '{}': {} folders, {} objects, {} assets",
            model.name,
            model.folder_count(),
            model.object_count(),
            model.assets.len()
        ))
    );

    if imported.is_complete() {
        return Ok(());
    }
    println!();
    println!(
        "{}",
        style::warn(&format!("{} unresolved reference(s)", imported.unresolved.len()))
    );
    print_unresolved(&imported.unresolved);
    Ok(())
}

async fn cmd_normalize(repo: &ModelRepository<GitClient>) -> Result<()> {
    let imported = repo
        .import_model()
        .context("failed to import model")?
        .context("no model found in the working tree")?;
    if !imported.is_complete() {
        println!(
            "{}",
            style::warn(&format!(
                "{} reference(s) still point at missing objects and are written as-is",
                imported.unresolved.len()
            ))
        );
    }

    let summary = repo
        .export_model(&imported.model)
        .await
        .context("failed to export model")?;
    let changed = repo.has_changes().context("failed to read working tree status")?;

    println!(
        "{}",
        style::success(&format!(
            "Wrote {} folders, {} objects, {} assets",
            summary.folders, summary.objects, summary.assets
        ))
    );
    if changed {
        println!("{}", style::dim("The working tree now differs from HEAD."));
    }
    Ok(())
}

fn cmd_recover(repo: &ModelRepository<GitClient>, commit: bool, json: bool) -> Result<()> {
    let cancel = interrupt_token();
    let outcome = repo
        .load_model(&cancel)
        .context("recovery failed")?
        .context("no model found in the working tree")?;
    let report = &outcome.report;

    if json {
        let out = serde_json::to_string_pretty(report).context("failed to serialize report")?;
        println!("{}", out);
    } else if report.is_empty() {
        println!("{}", style::success("Nothing to recover"));
    } else {
        if !report.restored.is_empty() {
            println!(
                "{}",
                style::header(&format!("Restored ({})", report.restored.len()))
            );
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["ID", "Type", "Name", "Path", "Commit"]);
            for restored in &report.restored {
                table.add_row(vec![
                    Cell::new(&restored.id),
                    Cell::new(&restored.type_tag),
                    Cell::new(&restored.name),
                    Cell::new(&restored.path),
                    Cell::new(short_sha(&restored.commit)),
                ]);
            }
            println!("{}", table);
        }
        if !report.permanently_unresolved.is_empty() {
            println!();
            println!(
                "{}",
                style::error(&format!(
                    "{} reference(s) point at objects no commit contains",
                    report.permanently_unresolved.len()
                ))
            );
            print_unresolved(&report.permanently_unresolved);
        }
    }

    if commit && !report.restored.is_empty() {
        let sha = repo
            .commit_changes(&report.commit_message(), false)
            .context("failed to commit restored files")?;
        if let Some(sha) = sha {
            println!("{}", style::success(&format!("Committed {}", short_sha(&sha))));
        }
    }
    Ok(())
}

fn cmd_merge(
    repo: &ModelRepository<GitClient>,
    reference: &str,
    prefer: Option<Prefer>,
    message: Option<&str>,
) -> Result<()> {
    let outcome = repo
        .merge(reference)
        .with_context(|| format!("failed to merge '{}'", reference))?;

    match outcome.status {
        MergeStatus::UpToDate => {
            println!("{}", style::success("Already up to date"));
            return Ok(());
        }
        MergeStatus::Ok => {
            println!("{}", style::success(&format!("Merged '{}'", reference)));
            return Ok(());
        }
        MergeStatus::Conflicting => {}
    }

    let cancel = interrupt_token();
    let mut resolver = repo
        .resolve_conflicts(&outcome, &cancel)
        .context("failed to read conflicting files")?;

    println!();
    println!(
        "{}",
        style::header(&format!("Conflicts ({})", resolver.entries().len()))
    );
    conflicts::print_table(resolver.entries());

    let interactive = prefer.is_none() && console::Term::stdout().is_term();
    let decided = match prefer {
        Some(Prefer::Ours) => resolver.decide_with(&mut PreferPolicy(Choice::Ours)),
        Some(Prefer::Theirs) => resolver.decide_with(&mut PreferPolicy(Choice::Theirs)),
        Some(Prefer::Default) => resolver.decide_with(&mut DefaultPolicy),
        None if interactive => {
            let mut policy = conflicts::InteractivePolicy::new(resolver.entries().len());
            let result = resolver.decide_with(&mut policy);
            if let Some(e) = policy.failure {
                return Err(e).context("failed to read decision from terminal");
            }
            result
        }
        None => resolver.decide_with(&mut DefaultPolicy),
    };
    match decided {
        Err(ConflictError::Cancelled) => {
            println!("{}", style::warn("Merge aborted; working tree reset to HEAD"));
            return Ok(());
        }
        other => other.context("failed to record decisions")?,
    }

    if interactive {
        println!();
        conflicts::print_table(resolver.entries());
    }

    let message = message
        .map(str::to_string)
        .unwrap_or_else(|| format!("Merge {}", reference));
    let finished = resolver
        .apply()
        .context("failed to check out chosen sides")
        .and_then(|()| {
            resolver
                .commit(&message, false)
                .context("failed to create merge commit")
        });
    let sha = match finished {
        Ok(sha) => sha,
        Err(e) => {
            if resolver.state() != ResolutionState::Cancelled {
                if let Err(cancel) = resolver.cancel() {
                    warn!(error = %cancel, "failed to reset after an unfinished merge");
                }
            }
            println!("{}", style::warn("Merge abandoned; working tree reset to HEAD"));
            return Err(e);
        }
    };

    println!(
        "{}",
        style::success(&format!(
            "Resolved {} conflict(s), merge commit {}",
            resolver.entries().len(),
            short_sha(&sha)
        ))
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn print_unresolved(references: &[UnresolvedReference]) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Source", "Container", "Field", "Missing target"]);
    for reference in references {
        table.add_row(vec![
            Cell::new(&reference.source),
            Cell::new(&reference.container),
            Cell::new(&reference.field),
            Cell::new(&reference.target),
        ]);
    }
    println!("{}", table);
}

fn short_sha(sha: &str) -> &str {
    sha.get(..10).unwrap_or(sha)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_merge_with_prefer() {
        let cli = Cli::try_parse_from([
            "modelrepo",
            "--config",
            "/tmp/m.toml",
            "merge",
            "feature",
            "--prefer",
            "theirs",
            "-m",
            "take theirs",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/tmp/m.toml"));
        match cli.command {
            Commands::Merge {
                reference,
                prefer,
                message,
            } => {
                assert_eq!(reference, "feature");
                assert!(matches!(prefer, Some(Prefer::Theirs)));
                assert_eq!(message.as_deref(), Some("take theirs"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_rejects_unknown_prefer() {
        assert!(Cli::try_parse_from(["modelrepo", "merge", "x", "--prefer", "both"]).is_err());
    }

    #[test]
    fn test_short_sha() {
        assert_eq!(short_sha("0123456789abcdef"), "0123456789");
        assert_eq!(short_sha("abc"), "abc");
    }

    #[tokio::test]
    async fn test_repository_commands_need_a_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("missing.toml");
        for command in [Commands::Status, Commands::Normalize, Commands::Import { json: true }] {
            let cli = Cli {
                config: config.clone(),
                command,
            };
            let err = run(cli).await.unwrap_err();
            assert!(format!("{err:#}").contains("failed to load configuration file"));
        }
    }

    #[test]
    fn test_init_writes_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modelrepo.toml");
        cmd_init(&path).unwrap();

        let config = RepoConfig::load_and_resolve(&path).unwrap();
        assert_eq!(config.repository.path, dir.path().join("."));
        assert!(dir.path().join(".git").exists());
        assert!(cmd_init(&path).is_err());
    }
}
