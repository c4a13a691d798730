use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use loyalty_engine::{OrderFlowApi, OrderFlowConfig, SqliteDatabase};
use tokio_util::sync::CancellationToken;

use crate::{
    auth::TokenIssuer,
    config::ServerConfig,
    errors::ServerError,
    routes::{add_order, balance, get_orders, get_withdrawals, health, login, metrics, register, withdraw},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let flow = OrderFlowApi::new(db, OrderFlowConfig {
        accrual_address: config.accrual_address.clone(),
        worker_count: config.worker_count,
        buffer_size: config.buffer_size,
        err_maximum: config.err_maximum,
        max_retries: config.max_retries,
        retry_delay: config.retry_delay,
    })
    .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let shutdown = CancellationToken::new();
    flow.start(shutdown.clone());
    let srv = create_server_instance(config, flow)?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    shutdown.cancel();
    result
}

/// Builds the actix server. The order flow API is created once and cloned into each worker so
/// that every worker shares the single task queue.
pub fn create_server_instance(
    config: ServerConfig,
    flow: OrderFlowApi<SqliteDatabase>,
) -> Result<Server, ServerError> {
    let auth_config = config.auth.clone();
    let srv = HttpServer::new(move || {
        let jwt_signer = TokenIssuer::new(&auth_config);
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("loyalty_server"))
            .app_data(web::Data::new(flow.clone()))
            .app_data(web::Data::new(jwt_signer))
            .service(health)
            .service(metrics)
            .service(register)
            .service(login)
            .service(add_order)
            .service(get_orders)
            .service(balance)
            .service(withdraw)
            .service(get_withdrawals)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
