use std::path::PathBuf;

use clap::Parser;

/// Standup reminder and escalation daemon
#[derive(Debug, Parser)]
#[command(name = "standup-notifier")]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Apply database migrations and exit
    #[arg(long)]
    pub migrate_only: bool,

    /// Run a single reminder and digest tick, then exit
    #[arg(long, conflicts_with = "migrate_only")]
    pub run_once: bool,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["standup-notifier"]).expect("parse");
        assert!(!cli.migrate_only);
        assert!(!cli.run_once);
    }

    #[test]
    fn flags_and_path() {
        let cli = Cli::try_parse_from(["standup-notifier", "-c", "/etc/standup.yaml", "--run-once"])
            .expect("parse");
        assert_eq!(cli.config.to_str(), Some("/etc/standup.yaml"));
        assert!(cli.run_once);
    }

    #[test]
    fn exclusive_modes() {
        assert!(
            Cli::try_parse_from(["standup-notifier", "--migrate-only", "--run-once"]).is_err()
        );
    }
}
