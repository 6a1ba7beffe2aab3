use clap::Parser;
use eyre::{Context, Result};

use crate::config::{self, Configuration, load_configuration, lookup_config_path};

#[derive(Debug, Parser)]
#[command(
    version,
    about,
    long_about = r#"Chat with a roleplay conversation from the terminal

Default configuration file location looks up in the following order:
    * $XDG_CONFIG_HOME/chatsync/config.toml
    * $HOME/.config/chatsync/config.toml
    * $HOME/.chatsync.toml
"#,
    disable_version_flag = true
)]
pub struct Command {
    /// Configuration file path
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Conversation to join
    #[arg(short = 'C', long, value_name = "ID", required_unless_present = "version")]
    conversation: Option<String>,

    /// User id announced to the realtime server
    #[arg(short, long, value_name = "ID", env = "CHATSYNC_USER", default_value = "")]
    user: String,

    /// Show the version
    #[arg(short, long)]
    version: bool,
}

impl Command {
    pub fn new() -> Command {
        Self::parse()
    }

    pub fn get_config(&self) -> Result<Configuration> {
        let config_path = self
            .config
            .clone()
            .unwrap_or_else(|| lookup_config_path().unwrap_or_default());

        if config_path.is_empty() {
            // No config path is specified just use the default config
            return Ok(Configuration::default());
        }
        load_configuration(config_path.as_str()).wrap_err("loading configuration")
    }

    pub fn conversation(&self) -> Option<&str> {
        self.conversation.as_deref()
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn version(&self) -> bool {
        self.version
    }

    pub fn print_version(&self) {
        println!("{}", config::version())
    }
}
