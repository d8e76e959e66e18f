use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use vigil_core::Priority;
use vigil_engine::EngineConfig;

#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(author, version, about = "Validate rules and run a hot-reloading rule engine")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an engine from the rules files and report the result
    Validate {
        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Run the engine, reloading rules on SIGHUP or file changes
    Run {
        #[command(flatten)]
        engine: EngineArgs,

        /// Reload when a rules file changes on disk
        #[arg(short, long)]
        watch: bool,

        /// Evaluation tick interval in milliseconds
        #[arg(long, default_value = "1000")]
        tick_ms: u64,

        /// Print Prometheus metrics on shutdown
        #[arg(long)]
        metrics: bool,
    },
}

/// Options shared by every subcommand that builds an engine
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "vigil.yaml", env = "VIGIL_CONFIG")]
    pub config: PathBuf,

    /// Rules files, loaded in order
    #[arg(short, long = "rules", required = true, num_args = 1..)]
    pub rules: Vec<PathBuf>,

    /// Render rule outputs as JSON
    #[arg(long)]
    pub json_output: bool,

    /// Least severe priority to evaluate
    #[arg(long, value_parser = parse_priority)]
    pub min_priority: Option<Priority>,

    /// Disable rules whose name contains this substring (repeatable)
    #[arg(short = 'D', long = "disable")]
    pub disabled_substrings: Vec<String>,

    /// Disable rules with this tag (repeatable)
    #[arg(short = 'T', long = "disable-tag")]
    pub disabled_tags: Vec<String>,

    /// Only enable rules with this tag (repeatable)
    #[arg(short = 't', long = "enable-tag")]
    pub enabled_tags: Vec<String>,

    /// Enable verbose logging and include warnings in load reports
    #[arg(short, long)]
    pub verbose: bool,
}

impl EngineArgs {
    /// Load the configuration file and apply command-line overrides
    pub fn load_config(&self) -> vigil_core::Result<EngineConfig> {
        let mut config = EngineConfig::load(&self.config)?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut EngineConfig) {
        config.json_output |= self.json_output;
        config.verbose |= self.verbose;
        if let Some(priority) = self.min_priority {
            config.min_priority = priority;
        }
        config
            .disabled_rule_substrings
            .extend(self.disabled_substrings.iter().cloned());
        config
            .disabled_rule_tags
            .extend(self.disabled_tags.iter().cloned());
        config
            .enabled_rule_tags
            .extend(self.enabled_tags.iter().cloned());
    }
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_arguments() {
        let cli = Cli::try_parse_from([
            "vigil",
            "run",
            "-r",
            "a.yaml",
            "b.yaml",
            "--watch",
            "-T",
            "network",
            "--min-priority",
            "warn",
        ])
        .unwrap();

        let Commands::Run { engine, watch, tick_ms, .. } = cli.command else {
            panic!("expected run");
        };
        assert!(watch);
        assert_eq!(tick_ms, 1000);
        assert_eq!(engine.rules, vec![PathBuf::from("a.yaml"), PathBuf::from("b.yaml")]);
        assert_eq!(engine.min_priority, Some(Priority::Warning));
        assert_eq!(engine.disabled_tags, vec!["network"]);
    }

    #[test]
    fn test_rules_required() {
        assert!(Cli::try_parse_from(["vigil", "validate"]).is_err());
    }

    #[test]
    fn test_overrides_extend_file_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vigil.yaml");
        std::fs::write(&path, "disabled_rule_tags: [filesystem]\nmin_priority: debug\n").unwrap();

        let cli = Cli::try_parse_from([
            "vigil",
            "validate",
            "-c",
            path.to_str().unwrap(),
            "-r",
            "rules.yaml",
            "-T",
            "network",
            "--json-output",
            "--min-priority",
            "error",
        ])
        .unwrap();
        let Commands::Validate { engine } = cli.command else {
            panic!("expected validate");
        };

        let config = engine.load_config().unwrap();
        assert!(config.json_output);
        assert_eq!(config.min_priority, Priority::Error);
        assert!(config.disabled_rule_tags.contains("filesystem"));
        assert!(config.disabled_rule_tags.contains("network"));
    }
}
