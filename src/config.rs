// config.rs
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    // Lifecycle tuning
    pub expiry_sweep_secs: u64,
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse::<u16>()
            .expect("PORT must be a number");

        let expiry_sweep_secs = std::env::var("EXPIRY_SWEEP_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse::<u64>()
            .expect("EXPIRY_SWEEP_SECS must be a number");

        Config {
            database_url,
            port,
            expiry_sweep_secs,
        }
    }
}
