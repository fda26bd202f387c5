use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Index filesystem paths and search them by substring.
#[derive(Parser, Debug)]
#[command(name = "dfind", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Walk a directory tree and record every entry in the store
    Scan(ScanArgs),
    /// Print every stored path containing PATTERN
    Search(SearchArgs),
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Log debug output to stderr
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Directory holding the database (overrides configuration)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Configuration file (TOML or YAML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Directory to scan
    #[arg(default_value = ".")]
    pub root: PathBuf,

    #[command(flatten)]
    pub common: CommonArgs,

    /// Follow symbolic links, descending into linked directories
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Stay on the root's filesystem
    #[arg(long)]
    pub one_filesystem: bool,

    /// Carry on past unreadable entries instead of stopping at the first one
    #[arg(long)]
    pub keep_going: bool,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Match case-insensitively
    #[arg(long, short = 'i')]
    pub insensitive: bool,

    #[command(flatten)]
    pub common: CommonArgs,

    /// Substring to look for; multiple words are joined with single spaces
    #[arg(required = true, num_args = 1..)]
    pub pattern: Vec<String>,
}

impl SearchArgs {
    pub fn pattern(&self) -> String {
        self.pattern.join(" ")
    }
}

impl Command {
    pub fn common(&self) -> &CommonArgs {
        match self {
            Self::Scan(args) => &args.common,
            Self::Search(args) => &args.common,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_joins_pattern_words() {
        let cli = Cli::try_parse_from(["dfind", "search", "-i", "annual", "report"]).unwrap();
        let Command::Search(args) = cli.command else { panic!("expected search") };
        assert!(args.insensitive);
        assert_eq!(args.pattern(), "annual report");
    }

    #[test]
    fn test_search_requires_a_pattern() {
        assert!(Cli::try_parse_from(["dfind", "search"]).is_err());
    }

    #[test]
    fn test_scan_defaults() {
        let cli = Cli::try_parse_from(["dfind", "scan", "--keep-going", "-v"]).unwrap();
        let Command::Scan(args) = &cli.command else { panic!("expected scan") };
        assert_eq!(args.root, PathBuf::from("."));
        assert!(args.keep_going);
        assert!(!args.follow_symlinks);
        assert!(cli.command.common().verbose);
    }
}
