use clap::{Parser, Subcommand};

const HELP_EPILOG: &str = r#"Server options can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml)
  DB_PATH     (default: data/famscore.db)
  PORT        (default: 5252 or config.listen_port)
"#;

#[derive(Debug, Parser)]
#[command(
    name = "famscore-server",
    version,
    about = "FamScore server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Optional subcommand. Without one, runs the server.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read a password from stdin and print its bcrypt hash for config.yaml
    HashPassword,
    /// Delete a family and every row that belongs to it
    RemoveFamily {
        /// Id of the family to remove
        family_id: String,
        /// Confirm the deletion; without this flag nothing is touched
        #[arg(long)]
        yes: bool,
    },
}
