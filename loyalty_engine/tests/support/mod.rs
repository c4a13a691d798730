//! Shared helpers for the integration tests: throwaway databases and a scripted stand-in for
//! the accrual service.
#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
};

use actix_web::{web, App, HttpResponse, HttpServer};
use loyalty_engine::{
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    SqliteDatabase,
};

pub async fn new_test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

//--------------------------------------    AccrualStub     ----------------------------------------------------------
/// One scripted reply from the stub accrual service.
#[derive(Clone)]
pub enum StubResponse {
    /// 200 with `{"number": ..., "status": ..., "accrual": ...}`.
    Order(&'static str, Option<i64>),
    /// 429 with the given `Retry-After` header value.
    RetryAfter(&'static str),
    /// A bare status code.
    Status(u16),
}

/// A stand-in for the accrual service that pops one scripted response per request and counts
/// how often it was hit. An exhausted script answers 404.
#[derive(Clone, Default)]
pub struct AccrualStub {
    script: Arc<Mutex<VecDeque<StubResponse>>>,
    hits: Arc<AtomicUsize>,
}

impl AccrualStub {
    pub fn scripted<I: IntoIterator<Item = StubResponse>>(responses: I) -> Self {
        let stub = Self::default();
        stub.script.lock().unwrap().extend(responses);
        stub
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Binds the stub to a random local port and serves it in the background. Returns the
    /// `host:port` address to point an `AccrualClient` at.
    pub async fn start(&self) -> String {
        let stub = self.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(stub.clone()))
                .route("/api/orders/{number}", web::get().to(handle_order_info))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .expect("Could not bind the accrual stub");
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        addr.to_string()
    }
}

async fn handle_order_info(stub: web::Data<AccrualStub>, path: web::Path<String>) -> HttpResponse {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    let next = stub.script.lock().unwrap().pop_front();
    match next {
        Some(StubResponse::Order(status, accrual)) => {
            let number = path.into_inner();
            let mut body = serde_json::json!({"number": number, "status": status});
            if let Some(accrual) = accrual {
                body["accrual"] = accrual.into();
            }
            HttpResponse::Ok().json(body)
        },
        Some(StubResponse::RetryAfter(value)) => {
            HttpResponse::TooManyRequests().insert_header(("Retry-After", value)).finish()
        },
        Some(StubResponse::Status(code)) => {
            let code = actix_web::http::StatusCode::from_u16(code).expect("Invalid status code in script");
            HttpResponse::build(code).finish()
        },
        None => HttpResponse::NotFound().finish(),
    }
}
