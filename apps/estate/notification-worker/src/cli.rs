use clap::{Parser, Subcommand};
use job_queue::JobId;

#[derive(Debug, Parser)]
#[command(name = "notification-worker")]
#[command(about = "Deliver queued notification emails and operate the notification queue")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the queue worker with its health and admin server
    Run,

    /// Upsert every bundled template into the template store
    BackfillTemplates,

    /// Print job counts by status
    Status,

    /// List failed jobs, newest first
    Failed {
        /// Maximum number of jobs to print
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Print a single job
    Job { id: JobId },

    /// Move every failed job back to waiting with a fresh attempt budget
    RetryFailed,

    /// Discard all waiting and delayed jobs
    Drain,

    /// Stop workers from claiming new jobs
    Pause,

    /// Let workers claim jobs again
    Resume,

    /// Render and send the welcome email to one address
    SendTest {
        /// Recipient address
        to: String,

        /// Name used in the greeting
        #[arg(short, long, default_value = "there")]
        name: String,

        /// Go through the queue instead of sending immediately
        #[arg(short, long)]
        queued: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_failed_with_limit() {
        let cli = Cli::try_parse_from(["notification-worker", "failed", "--limit", "5"]).unwrap();
        assert!(matches!(cli.command, Command::Failed { limit: 5 }));
    }

    #[test]
    fn test_parse_send_test_defaults() {
        let cli = Cli::try_parse_from(["notification-worker", "send-test", "ada@example.com"]).unwrap();
        match cli.command {
            Command::SendTest { to, name, queued } => {
                assert_eq!(to, "ada@example.com");
                assert_eq!(name, "there");
                assert!(!queued);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_subcommand_names_are_kebab_case() {
        assert!(Cli::try_parse_from(["notification-worker", "backfill-templates"]).is_ok());
        assert!(Cli::try_parse_from(["notification-worker", "retry-failed"]).is_ok());
        assert!(Cli::try_parse_from(["notification-worker", "job", "not-a-number"]).is_err());
    }
}
