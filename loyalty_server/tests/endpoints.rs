//! Endpoint tests covering the HTTP status contract: registration, login, order upload,
//! balance and withdrawals, plus one full journey through the accrual pipeline.
use std::time::{Duration, Instant};

use actix_web::{
    dev::{Service, ServiceResponse},
    http::StatusCode,
    test,
    web,
    App,
    HttpResponse,
    HttpServer,
};
use loyalty_engine::{
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::LoyaltyDatabase,
    OrderFlowApi,
    OrderFlowConfig,
    SqliteDatabase,
};
use loyalty_server::{
    auth::TokenIssuer,
    config::AuthConfig,
    routes::{add_order, balance, get_orders, get_withdrawals, health, login, metrics, register, withdraw},
};
use lp_common::{Points, Secret};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

const LUHN_ORDER: &str = "79927398713";
const LUHN_WITHDRAWAL: &str = "5062821234567892";

fn auth_config() -> AuthConfig {
    AuthConfig { jwt_secret: Secret::new("endpoint-test-secret".to_string()), token_expiry: Duration::from_secs(3600) }
}

async fn new_flow(accrual_address: &str) -> OrderFlowApi<SqliteDatabase> {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    OrderFlowApi::new(db, OrderFlowConfig {
        accrual_address: accrual_address.to_string(),
        worker_count: 2,
        buffer_size: 16,
        err_maximum: 100,
        max_retries: 2,
        retry_delay: Duration::from_millis(50),
    })
    .expect("Error creating order flow")
}

async fn test_app(
    flow: OrderFlowApi<SqliteDatabase>,
) -> impl Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error> {
    test::init_service(
        App::new()
            .app_data(web::Data::new(flow))
            .app_data(web::Data::new(TokenIssuer::new(&auth_config())))
            .service(health)
            .service(metrics)
            .service(register)
            .service(login)
            .service(add_order)
            .service(get_orders)
            .service(balance)
            .service(withdraw)
            .service(get_withdrawals),
    )
    .await
}

/// Registers a user and returns their bearer token.
async fn register_user<S>(app: &S, email: &str) -> String
where S: Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error> {
    let req = test::TestRequest::post()
        .uri("/api/user/register")
        .set_json(json!({"email": email, "password": "hunter2"}))
        .to_request();
    let resp: Value = test::call_and_read_body_json(app, req).await;
    resp["token"].as_str().expect("No token in register response").to_string()
}

fn authed_get(uri: &str, token: &str) -> actix_http::Request {
    test::TestRequest::get().uri(uri).insert_header(("Authorization", format!("Bearer {token}"))).to_request()
}

/// An accrual service that answers PROCESSED with a fixed score for every order.
async fn start_accrual_stub(accrual: i64) -> String {
    let server = HttpServer::new(move || {
        App::new().route(
            "/api/orders/{number}",
            web::get().to(move |path: web::Path<String>| async move {
                HttpResponse::Ok()
                    .json(json!({"number": path.into_inner(), "status": "PROCESSED", "accrual": accrual}))
            }),
        )
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .expect("Could not bind the accrual stub");
    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());
    addr.to_string()
}

//--------------------------------------       tests        ----------------------------------------------------------
#[actix_web::test]
async fn register_login_and_balance() {
    let flow = new_flow("127.0.0.1:1").await;
    let app = test_app(flow).await;

    let token = register_user(&app, "alice@x").await;
    let resp: Value = test::call_and_read_body_json(&app, authed_get("/api/user/balance", &token)).await;
    assert_eq!(resp, json!({"current": 0, "withdrawn": 0}));

    // A duplicate registration is a conflict.
    let req = test::TestRequest::post()
        .uri("/api/user/register")
        .set_json(json!({"email": "alice@x", "password": "other"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

    // Correct credentials log in, wrong ones don't, unknown emails 404.
    let req = test::TestRequest::post()
        .uri("/api/user/login")
        .set_json(json!({"email": "alice@x", "password": "hunter2"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    let req = test::TestRequest::post()
        .uri("/api/user/login")
        .set_json(json!({"email": "alice@x", "password": "wrong"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    let req = test::TestRequest::post()
        .uri("/api/user/login")
        .set_json(json!({"email": "nobody@x", "password": "hunter2"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn requests_without_a_token_are_rejected() {
    let flow = new_flow("127.0.0.1:1").await;
    let app = test_app(flow).await;
    let req = test::TestRequest::get().uri("/api/user/balance").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    let req = test::TestRequest::post().uri("/api/user/orders").set_payload(LUHN_ORDER).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn invalid_order_numbers_are_unprocessable() {
    let flow = new_flow("127.0.0.1:1").await;
    let app = test_app(flow).await;
    let token = register_user(&app, "alice@x").await;

    let req = test::TestRequest::post()
        .uri("/api/user/orders")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_payload("12345")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Nothing was persisted.
    let resp = test::call_service(&app, authed_get("/api/user/orders", &token)).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[actix_web::test]
async fn duplicate_order_upload_is_ok_conflicting_is_not() {
    let flow = new_flow("127.0.0.1:1").await;
    let app = test_app(flow).await;
    let alice = register_user(&app, "alice@x").await;
    let bob = register_user(&app, "bob@x").await;

    let post_order = |token: String| {
        test::TestRequest::post()
            .uri("/api/user/orders")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .set_payload(LUHN_ORDER)
            .to_request()
    };
    assert_eq!(test::call_service(&app, post_order(alice.clone())).await.status(), StatusCode::ACCEPTED);
    assert_eq!(test::call_service(&app, post_order(alice.clone())).await.status(), StatusCode::OK);
    assert_eq!(test::call_service(&app, post_order(bob)).await.status(), StatusCode::CONFLICT);

    let resp: Value = test::call_and_read_body_json(&app, authed_get("/api/user/orders", &alice)).await;
    let orders = resp.as_array().expect("Expected an order list");
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["number"], LUHN_ORDER);
    assert_eq!(orders[0]["status"], "REGISTERED");
}

#[actix_web::test]
async fn withdrawal_status_codes() {
    let flow = new_flow("127.0.0.1:1").await;
    let db = flow.db().clone();
    let app = test_app(flow).await;
    let token = register_user(&app, "alice@x").await;
    let user = db.fetch_user_by_email("alice@x").await.unwrap();
    db.add_accrual(user.id, Points::from(500)).await.unwrap();

    let post_withdraw = |order: &str, sum: i64| {
        test::TestRequest::post()
            .uri("/api/user/balance/withdraw")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .set_json(json!({"order": order, "sum": sum}))
            .to_request()
    };

    assert_eq!(test::call_service(&app, post_withdraw(LUHN_WITHDRAWAL, 300)).await.status(), StatusCode::OK);
    let resp: Value = test::call_and_read_body_json(&app, authed_get("/api/user/balance", &token)).await;
    assert_eq!(resp, json!({"current": 200, "withdrawn": 300}));

    // 402 once the balance runs dry, 409 for a reused number, 422 for a bad number.
    assert_eq!(
        test::call_service(&app, post_withdraw("4561261212345467", 500)).await.status(),
        StatusCode::PAYMENT_REQUIRED
    );
    assert_eq!(test::call_service(&app, post_withdraw(LUHN_WITHDRAWAL, 100)).await.status(), StatusCode::CONFLICT);
    assert_eq!(
        test::call_service(&app, post_withdraw("12345", 100)).await.status(),
        StatusCode::UNPROCESSABLE_ENTITY
    );

    let resp: Value = test::call_and_read_body_json(&app, authed_get("/api/user/withdrawals", &token)).await;
    let withdrawals = resp.as_array().expect("Expected a withdrawal list");
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0]["order"], LUHN_WITHDRAWAL);
    assert_eq!(withdrawals[0]["sum"], 300);
}

#[actix_web::test]
async fn uploaded_orders_accrue_points_end_to_end() {
    let accrual_addr = start_accrual_stub(500).await;
    let flow = new_flow(&accrual_addr).await;
    let db = flow.db().clone();
    let shutdown = CancellationToken::new();
    flow.start(shutdown.clone());
    let app = test_app(flow).await;
    let token = register_user(&app, "alice@x").await;

    let req = test::TestRequest::post()
        .uri("/api/user/orders")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_payload(LUHN_ORDER)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::ACCEPTED);

    // Wait for the pool to drive the order to its terminal state.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let order = db.fetch_order_by_number(&LUHN_ORDER.into()).await.unwrap().unwrap();
        if order.completed {
            break;
        }
        assert!(Instant::now() < deadline, "order was not processed in time");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let resp: Value = test::call_and_read_body_json(&app, authed_get("/api/user/balance", &token)).await;
    assert_eq!(resp, json!({"current": 500, "withdrawn": 0}));
    let resp: Value = test::call_and_read_body_json(&app, authed_get("/api/user/orders", &token)).await;
    assert_eq!(resp[0]["status"], "PROCESSED");
    assert_eq!(resp[0]["accrual"], 500);
    shutdown.cancel();
}
