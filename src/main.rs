use carelink::config::Config;
use carelink::db::db::DBClient;
use carelink::service::background_jobs::start_expiry_sweeper;
use carelink::CoreServices;
use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::LevelFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .init();

    let config = Config::init();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    tracing::info!("Connected to the database");

    sqlx::migrate!("./migrations").run(&pool).await?;

    let core = CoreServices::new(DBClient::new(pool));

    let job_service = core.job_service.clone();
    let sweep_secs = config.expiry_sweep_secs;
    tokio::spawn(async move {
        start_expiry_sweeper(job_service, sweep_secs).await;
    });

    tracing::info!("carelink core running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    core.db_client.pool.close().await;
    Ok(())
}
