//! Command-line interface argument parsing and definitions
//!
//! This module defines the CLI structure using clap's derive API,
//! providing a type-safe and well-documented command interface.

use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;

/// Shapemap CLI - map records between schemas
///
/// Loads record schemas from a TOML, YAML or JSON file, plans the field
/// bindings between two of them and maps JSON input through the plan.
#[derive(Parser, Debug)]
#[command(
    name = "shapemap",
    version,
    author,
    about,
    long_about = None,
    propagate_version = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Enable verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "SHAPEMAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(short, long, value_enum, global = true, default_value = "human")]
    pub output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Map JSON records from one schema to another
    Map(MapArgs),

    /// Show the binding plan between two schemas
    Plan(PlanArgs),

    /// Manage configuration files and settings
    Config(ConfigArgs),

    /// Generate shell completions for the specified shell
    Completions(CompletionsArgs),
}

/// Schema selection shared by `map` and `plan`
#[derive(Parser, Debug, Clone)]
pub struct MappingArgs {
    /// File declaring the record schemas (TOML, YAML or JSON)
    #[arg(short, long, value_name = "SCHEMA_FILE")]
    pub schema: PathBuf,

    /// Name of the source schema
    #[arg(long, value_name = "NAME")]
    pub from: String,

    /// Name of the target schema
    #[arg(long, value_name = "NAME")]
    pub to: String,

    /// Bind a target field from a differently named source field
    #[arg(long = "override", value_name = "TARGET=SOURCE", value_parser = parse_override)]
    pub overrides: Vec<(String, String)>,

    /// Leave a target field unbound
    #[arg(long, value_name = "FIELD")]
    pub exclude: Vec<String>,
}

/// Arguments for the map command
#[derive(Parser, Debug)]
pub struct MapArgs {
    /// JSON file holding one object or an array of objects ("-" for stdin)
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[command(flatten)]
    pub mapping: MappingArgs,

    /// Write the mapped records to a file instead of stdout
    #[arg(long = "save-to", value_name = "OUTPUT_FILE")]
    pub save_to: Option<PathBuf>,
}

/// Arguments for the plan command
#[derive(Parser, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub mapping: MappingArgs,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a configuration file with default values
    Init(ConfigInitArgs),

    /// Show the effective configuration
    Show(ConfigShowArgs),
}

/// Arguments for config init
#[derive(Parser, Debug)]
pub struct ConfigInitArgs {
    /// Where to write the file (defaults to the user config location)
    #[arg(long, value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Force overwrite existing config files
    #[arg(long)]
    pub force: bool,
}

/// Arguments for config show
#[derive(Parser, Debug)]
pub struct ConfigShowArgs {
    /// Show configuration in specified format
    #[arg(short, long, value_enum, default_value = "toml")]
    pub format: ConfigFormat,
}

/// Configuration file formats
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    /// TOML format
    Toml,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

/// Arguments for generating shell completions
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Output format options
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable formatted output
    Human,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
    /// Pretty-printed JSON output
    JsonPretty,
}

/// Supported shells for completion generation
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

fn parse_override(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((target, source)) if !target.trim().is_empty() && !source.trim().is_empty() => {
            Ok((target.trim().to_string(), source.trim().to_string()))
        }
        _ => Err(format!("expected TARGET=SOURCE, got '{}'", raw)),
    }
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective verbosity level (considering quiet flag)
    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }

    /// Check if colored output should be used
    pub fn use_color(&self) -> bool {
        !self.no_color && std::io::stdout().is_terminal()
    }
}

impl Shell {
    /// Convert to clap_complete shell type
    pub fn to_clap_shell(self) -> clap_complete::Shell {
        match self {
            Shell::Bash => clap_complete::Shell::Bash,
            Shell::Zsh => clap_complete::Shell::Zsh,
            Shell::Fish => clap_complete::Shell::Fish,
            Shell::PowerShell => clap_complete::Shell::PowerShell,
            Shell::Elvish => clap_complete::Shell::Elvish,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_map_arguments() {
        let cli = Cli::parse_from([
            "shapemap",
            "-vv",
            "map",
            "people.json",
            "--schema",
            "schemas.toml",
            "--from",
            "Person",
            "--to",
            "PersonRow",
            "--override",
            "full_name=name",
            "--exclude",
            "email",
        ]);
        assert_eq!(cli.verbosity_level(), 2);
        let Commands::Map(args) = cli.command else {
            panic!("expected map command");
        };
        assert_eq!(args.mapping.from, "Person");
        assert_eq!(
            args.mapping.overrides,
            vec![("full_name".to_string(), "name".to_string())]
        );
        assert_eq!(args.mapping.exclude, vec!["email".to_string()]);
        assert!(args.save_to.is_none());
    }

    #[test]
    fn test_override_syntax() {
        assert_eq!(
            parse_override(" id = code "),
            Ok(("id".to_string(), "code".to_string()))
        );
        assert!(parse_override("id").is_err());
        assert!(parse_override("=code").is_err());
    }

    #[test]
    fn test_quiet_resets_verbosity() {
        let cli = Cli::parse_from([
            "shapemap", "--quiet", "plan", "-s", "s.toml", "--from", "A", "--to", "B",
        ]);
        assert_eq!(cli.verbosity_level(), 0);
    }
}
