use std::sync::Arc;

use kroto_core::config::Config;

#[tokio::main]
async fn main() -> Result<(), kroto_core::Error> {
    kroto_core::logging::init("kroto")?;

    let cfg = Arc::new(Config::load()?);

    kroto_telegram::router::run_polling(cfg)
        .await
        .map_err(|e| kroto_core::Error::External(format!("telegram bot failed: {e}")))?;

    tracing::info!("kroto stopped");

    Ok(())
}
