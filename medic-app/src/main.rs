use anyhow::Result;
use medic_app::{bootstrap, config, repl::Repl};
use std::time::Duration;
use tracing::info;

const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let level = config::log_level(std::env::var(config::LOG_ENV).ok().as_deref());
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = match config::load(args.get(1).map(String::as_str)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            eprintln!("💡 Tip: run `medic [config.yaml]` with a valid configuration file");
            return Err(e);
        }
    };

    let components = bootstrap::build(&config)?;
    let reaper = components.orchestrator.spawn_idle_reaper(IDLE_SWEEP_INTERVAL);
    info!("Backend endpoint: {}", config.backend.endpoint);

    let repl = Repl::new(components);
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut out = std::io::stdout();
    let result = repl.run(&mut input, &mut out).await;

    reaper.abort();
    result
}
