mod analyzer;
mod config;
mod data;
mod error;
mod registry;
mod server;
mod solver;
mod validator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")).init();

    let config = config::Config::from_env()?;
    log::info!(
        "Weekly grid: {} days x {} periods",
        config.grid.days,
        config.grid.periods
    );

    server::run_server(config).await
}
