use anyhow::Result;
use rollcall_core::dataset::Dataset;
use rollcall_core::{AttendanceLog, EncodingStore};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod reencode;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::from_env();
    tracing::info!(
        data_dir = %config.paths.root.display(),
        camera = %config.camera_device,
        "rollcalld starting"
    );

    let store = EncodingStore::open(&config.paths.encodings_file)?;
    let dataset = Dataset::new(&config.paths.dataset_dir);
    let log = AttendanceLog::new(&config.paths.ledger_file);

    let engine = engine::spawn_engine(&config, store.clone(), log)?;

    let service = dbus_interface::AttendanceService::new(
        engine,
        store,
        dataset,
        config.paths.root.clone(),
        config.paths.users_file.clone(),
        config.encode_program.clone(),
        Duration::from_secs(config.encode_timeout_secs),
    );

    let _connection = zbus::connection::Builder::session()?
        .name("org.rollcall.Attendance1")?
        .serve_at("/org/rollcall/Attendance1", service)?
        .build()
        .await?;

    tracing::info!("rollcalld ready on org.rollcall.Attendance1");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
