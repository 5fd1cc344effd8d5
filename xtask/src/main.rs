use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace gates for magic-portal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every gate in order: fmt, clippy, tests
    Check,
    /// Check formatting of all crates, or rewrite it with --write
    Fmt {
        #[arg(long)]
        write: bool,
    },
    /// Run clippy on all targets with warnings denied
    Clippy,
    /// Run the workspace tests
    Test,
}

/// One cargo invocation: a label for the log line and its arguments.
struct Gate {
    label: &'static str,
    args: Vec<&'static str>,
}

impl Gate {
    fn fmt(write: bool) -> Self {
        let mut args = vec!["fmt", "--all"];
        if !write {
            args.extend(["--", "--check"]);
        }
        Self {
            label: "cargo fmt",
            args,
        }
    }

    fn clippy() -> Self {
        Self {
            label: "cargo clippy",
            args: vec![
                "clippy",
                "--workspace",
                "--all-targets",
                "--",
                "-D",
                "warnings",
            ],
        }
    }

    fn test() -> Self {
        Self {
            label: "cargo test",
            args: vec!["test", "--workspace"],
        }
    }

    fn run(&self) -> Result<()> {
        println!("==> {} {}", self.label, self.args[1..].join(" "));
        let status = Command::new("cargo").args(&self.args).status()?;
        if !status.success() {
            anyhow::bail!("{} failed", self.label);
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let gates = match cli.command {
        Commands::Check => vec![Gate::fmt(false), Gate::clippy(), Gate::test()],
        Commands::Fmt { write } => vec![Gate::fmt(write)],
        Commands::Clippy => vec![Gate::clippy()],
        Commands::Test => vec![Gate::test()],
    };
    for gate in &gates {
        gate.run()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_checks_unless_asked_to_write() {
        assert_eq!(Gate::fmt(false).args, ["fmt", "--all", "--", "--check"]);
        assert_eq!(Gate::fmt(true).args, ["fmt", "--all"]);
    }

    #[test]
    fn clippy_denies_warnings() {
        let args = Gate::clippy().args;
        assert_eq!(&args[args.len() - 2..], ["-D", "warnings"]);
    }

    #[test]
    fn check_parses_without_flags() {
        let cli = Cli::parse_from(["xtask", "check"]);
        assert!(matches!(cli.command, Commands::Check));
    }
}
