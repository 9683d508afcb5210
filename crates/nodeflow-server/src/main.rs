use anyhow::Result;
use clap::Parser;
use nodeflow::cli::Cli;
use nodeflow_core::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // .env.local takes precedence: dotenvy never overwrites a variable that is already set.
    for file in [".env.local", ".env"] {
        if let Err(err) = dotenvy::from_filename(file) {
            if !err.not_found() {
                eprintln!("warning: failed to load {file}: {err}");
            }
        }
    }

    let mut config = Config::load_with_profile(cli.profile.as_deref())?;
    cli.apply(&mut config);
    nodeflow::init_tracing(&config.server.log_level, config.server.log_json);

    nodeflow::start_server(config).await
}
