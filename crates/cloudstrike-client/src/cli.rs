use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "cloudstrike",
    version,
    about = "CloudStrike - point-cloud world viewer and shooting mini-game"
)]
pub struct CliArgs {
    /// Subcommand (view, upload, browse, worlds, generate, status)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to cloudstrike.yaml (default: search upward from the working directory)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Override the world catalog base URL
    #[arg(long, global = true)]
    pub catalog_url: Option<String>,

    /// Override the decimation stride (keep every Nth vertex)
    #[arg(long, global = true)]
    pub stride: Option<usize>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Open the viewer at source selection
    View,
    /// Open the viewer and load local .ply/.drc files
    Upload {
        /// Point-cloud files, loaded together as one world
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Open the viewer at the world catalog
    Browse,
    /// Print the world catalog as JSON
    Worlds,
    /// Trigger world generation from a prompt
    Generate {
        /// Prompt text (at most 500 characters)
        prompt: String,
        #[arg(long, default_value_t = 42)]
        seed: i64,
        #[arg(long, default_value = "outdoor")]
        classes: String,
    },
    /// Query a generation run
    Status {
        execution_id: String,
        /// Poll until the run reaches a terminal state
        #[arg(long)]
        wait: bool,
    },
}

/// Where the viewer window starts.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StartMode {
    #[default]
    SourceSelect,
    Upload(Vec<String>),
    Browse,
}

impl CliArgs {
    /// Start mode for window commands, `None` for headless ones.
    pub fn start_mode(&self) -> Option<StartMode> {
        match &self.command {
            None | Some(Command::View) => Some(StartMode::SourceSelect),
            Some(Command::Upload { files }) => Some(StartMode::Upload(files.clone())),
            Some(Command::Browse) => Some(StartMode::Browse),
            Some(_) => None,
        }
    }
}
