//! Headless client: plays one session against a relay and prints the result

use tracing::info;

use tank_arena::client::{run_session, SessionConfig};
use tank_arena::util::logging::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(&std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()));

    let config = SessionConfig::from_env()?;
    info!(
        url = %config.relay_url,
        mode = %config.game_mode,
        secs = config.max_duration.as_secs(),
        "starting headless session"
    );

    let report = run_session(&config).await?;
    info!(player_id = %report.player_id, frames = report.frames, "session finished");

    match report.game_over {
        Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
        None => {
            let stats = serde_json::to_string_pretty(&report.last_stats)?;
            println!("{stats}");
        }
    }
    Ok(())
}
