use dotenvy::dotenv;
use log::{error, info};
use loyalty_server::{
    config::{AuthConfig, ServerConfig},
    server::run_server,
};

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = ServerConfig::from_env_or_default();
    if !preflight_check(&config) {
        eprintln!("🚀️ Preflight check failed. Exiting. Check the logs for details.");
        return;
    }

    info!("🚀️ Starting server on {}:{}", config.host, config.port);
    match run_server(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}

fn preflight_check(config: &ServerConfig) -> bool {
    if std::env::var("LP_SKIP_PREFLIGHT").ok() == Some("Yes".to_string()) {
        info!("🚦️ Skipping preflight checks. I hope you know what you're doing!");
        return true;
    }
    let mut result = true;
    info!("🚦️ Running preflight checks...");
    info!("🚦️ Checking for required environment variables...");
    if AuthConfig::try_from_env().is_err() {
        error!("🚦️ Preflight check FAILED: You must set LP_JWT_SECRET before carrying on.");
        result = false;
    }
    if config.database_url.is_empty() {
        error!("🚦️ LP_DATABASE_URL is not set. Please set it to the URL for the loyalty database.");
        result = false;
    }
    if config.accrual_address.is_empty() {
        error!("🚦️ LP_ACCRUAL_ADDRESS is not set. Orders cannot be scored without the accrual service.");
        result = false;
    }
    if result {
        info!("🚦️ Preflight check PASSED.");
    } else {
        error!("🚦️ Preflight check FAILED: Please fix the issues above before starting the server.");
        info!(
            "🚦️ If you really know what you're doing and want to skip the preflight check, set `LP_SKIP_PREFLIGHT` \
             to `Yes` in your environment variables"
        );
    }
    result
}
