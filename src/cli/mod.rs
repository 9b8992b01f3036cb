pub mod launch;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hibiscus-client")]
#[command(author = "Hibiscus Team")]
#[command(version)]
#[command(about = "Launch the Hibiscus federated-learning client container", long_about = None)]
pub struct Cli {
    /// Print the equivalent `docker run` command instead of launching
    #[arg(long)]
    pub dry_run: bool,

    /// YAML launch profile overriding the stock client-1 parameters
    #[arg(long, value_name = "FILE", env = "HIBISCUS_LAUNCH_PROFILE")]
    pub profile: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Run the launch and return the exit code the process should end with.
    pub async fn execute(self) -> Result<i32> {
        launch::run(self.profile.as_deref(), self.dry_run).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_flags_needed() {
        let cli = Cli::try_parse_from(["hibiscus-client"]).unwrap();
        assert!(!cli.dry_run);
        assert!(!cli.verbose);
    }

    #[test]
    fn positional_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["hibiscus-client", "extra"]).is_err());
    }
}
