use clap::Parser;

/// Parsed command-line arguments.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = "hopper-worker",
    about = "Process hopper jobs stored in PostgreSQL",
    after_help = "Examples:\n  \
    hopper-worker --config worker.toml\n  \
    HOPPER_DATABASE_URL=postgres://localhost/jobs hopper-worker --queue emails --queue reports"
)]
pub struct CliArgs {
    /// Path to a TOML, YAML or JSON configuration file.
    #[arg(short, long, env = "HOPPER_CONFIG_PATH")]
    pub config: Option<String>,

    /// Queue to process. Repeat to run several; overrides `worker.queues`.
    #[arg(short, long = "queue", value_name = "NAME")]
    pub queues: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queues_repeat() {
        let args = CliArgs::parse_from(["hopper-worker", "-q", "emails", "--queue", "reports"]);
        assert_eq!(args.queues, ["emails", "reports"]);
    }

    #[test]
    fn config_path_is_optional() {
        let args = CliArgs::parse_from(["hopper-worker", "--config", "worker.yaml"]);
        assert_eq!(args.config.as_deref(), Some("worker.yaml"));
        assert!(args.queues.is_empty());
    }
}
