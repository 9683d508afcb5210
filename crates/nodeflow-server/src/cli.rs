use clap::Parser;
use nodeflow_core::config::Config;

#[derive(Debug, Parser)]
#[command(
    name = "nodeflow",
    version,
    about = "Generation gateway for the nodeflow workflow editor"
)]
pub struct Cli {
    /// Extra config profile merged over the base files.
    #[arg(long)]
    pub profile: Option<String>,

    #[arg(long)]
    pub bind: Option<String>,

    #[arg(long, short)]
    pub port: Option<u16>,

    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,

    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl Cli {
    /// Flags override whatever the config files set.
    pub fn apply(&self, config: &mut Config) {
        if let Some(bind) = &self.bind {
            config.server.bind_addr = bind.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = &self.log_level {
            config.server.log_level = level.clone();
        }
        if self.log_json {
            config.server.log_json = true;
        }
        if let Some(secs) = self.timeout_secs {
            config.server.request_timeout_secs = secs;
        }
    }
}
