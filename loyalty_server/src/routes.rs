//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module
//! neat and tidy 🙏
use actix_web::{cookie::Cookie, get, post, web, HttpResponse, Responder};
use log::*;
use loyalty_engine::{
    db_types::{NewOrder, NewUser, NewWithdrawal},
    traits::{LoyaltyDatabase, UserApiError},
    OrderFlowApi,
    SqliteDatabase,
};
use lp_common::Points;

use crate::{
    auth::{hash_password, verify_password, JwtClaims, TokenIssuer, ACCESS_TOKEN_COOKIE},
    data_objects::{AuthParams, AuthResult, BalanceResult, OrderResult, WithdrawalParams, WithdrawalResult},
    errors::ServerError,
};

type FlowApi = web::Data<OrderFlowApi<SqliteDatabase>>;

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// ----------------------------------------------  Metrics  ----------------------------------------------------
#[get("/metrics")]
pub async fn metrics(api: FlowApi) -> impl Responder {
    trace!("💻️ Received metrics request");
    HttpResponse::Ok().json(api.metrics())
}

//----------------------------------------------  Register  ----------------------------------------------------
#[post("/api/user/register")]
pub async fn register(
    params: web::Json<AuthParams>,
    api: FlowApi,
    signer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, ServerError> {
    let params = params.into_inner();
    if params.email.is_empty() || params.password.is_empty() {
        return Err(ServerError::InvalidRequestBody("Empty password or email".to_string()));
    }
    let password_hash = hash_password(&params.password)?;
    let user = api.db().insert_user(NewUser::new(&params.email, password_hash)).await?;
    info!("💻️ Registered user {} with id #{}", user.email, user.id);
    let token = signer
        .issue_token(JwtClaims { user_id: user.id, email: user.email.clone() })
        .map_err(|e| ServerError::BackendError(e.to_string()))?;
    Ok(HttpResponse::Created()
        .cookie(access_cookie(&token))
        .json(AuthResult { user_id: user.id, token }))
}

//----------------------------------------------   Login   -----------------------------------------------------
#[post("/api/user/login")]
pub async fn login(
    params: web::Json<AuthParams>,
    api: FlowApi,
    signer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, ServerError> {
    let params = params.into_inner();
    if params.email.is_empty() || params.password.is_empty() {
        return Err(ServerError::InvalidRequestBody("Empty password or email".to_string()));
    }
    let user = api.db().fetch_user_by_email(&params.email).await?;
    if !verify_password(&user, &params.password) {
        debug!("💻️ Failed login attempt for {}", user.email);
        return Err(ServerError::Unauthorized("Wrong email or password".to_string()));
    }
    let token = signer
        .issue_token(JwtClaims { user_id: user.id, email: user.email.clone() })
        .map_err(|e| ServerError::BackendError(e.to_string()))?;
    Ok(HttpResponse::Ok().cookie(access_cookie(&token)).json(AuthResult { user_id: user.id, token }))
}

//----------------------------------------------  Add order  ---------------------------------------------------
/// Uploads an order number for the authenticated user and enqueues it for accrual processing.
///
/// * 202 — the order was accepted and queued.
/// * 200 — the same user already uploaded this number (it is re-queued if not yet completed).
/// * 409 — another user owns this number.
/// * 422 — the number fails the checksum.
/// * 429 — the processing queue is saturated; try again later.
#[post("/api/user/orders")]
pub async fn add_order(claims: JwtClaims, body: String, api: FlowApi) -> Result<HttpResponse, ServerError> {
    let number = body.trim();
    if number.is_empty() {
        return Err(ServerError::InvalidRequestBody("Empty order number".to_string()));
    }
    debug!("💻️ POST order [{number}] for user #{}", claims.user_id);
    let order = NewOrder::new(number, claims.user_id).map_err(|_| ServerError::InvalidOrderNumber)?;
    match api.db().add_order(order).await {
        Ok(order) => {
            api.async_process_order(order.clone())?;
            Ok(HttpResponse::Accepted().json(OrderResult::from(order)))
        },
        Err(UserApiError::OrderAlreadyExists(existing)) => {
            if !existing.completed {
                if let Err(e) = api.async_process_order(existing.clone()) {
                    warn!("💻️ Could not re-enqueue order [{}]: {e}", existing.number);
                }
            }
            Ok(HttpResponse::Ok().json(OrderResult::from(existing)))
        },
        Err(e) => Err(e.into()),
    }
}

//----------------------------------------------  List orders  -------------------------------------------------
#[get("/api/user/orders")]
pub async fn get_orders(claims: JwtClaims, api: FlowApi) -> Result<HttpResponse, ServerError> {
    let orders = api.db().orders_for_user(claims.user_id).await?;
    if orders.is_empty() {
        return Ok(HttpResponse::NoContent().finish());
    }
    let orders = orders.into_iter().map(OrderResult::from).collect::<Vec<_>>();
    Ok(HttpResponse::Ok().json(orders))
}

//----------------------------------------------   Balance  ----------------------------------------------------
#[get("/api/user/balance")]
pub async fn balance(claims: JwtClaims, api: FlowApi) -> Result<HttpResponse, ServerError> {
    let (current, withdrawn) = api.db().user_balance(claims.user_id).await?;
    Ok(HttpResponse::Ok().json(BalanceResult::new(current, withdrawn)))
}

//----------------------------------------------  Withdraw  ----------------------------------------------------
/// Withdraws points against a new order number.
///
/// * 200 — the withdrawal was recorded and the balance updated.
/// * 402 — insufficient points.
/// * 409 — a withdrawal against this number already exists.
/// * 422 — the number fails the checksum.
#[post("/api/user/balance/withdraw")]
pub async fn withdraw(
    claims: JwtClaims,
    params: web::Json<WithdrawalParams>,
    api: FlowApi,
) -> Result<HttpResponse, ServerError> {
    let params = params.into_inner();
    if params.sum <= 0 {
        debug!("💻️ Refusing withdrawal of {} points", params.sum);
        return Err(ServerError::InvalidRequestBody("The withdrawal sum must be positive".to_string()));
    }
    let withdrawal =
        NewWithdrawal::new(params.order, Points::from(params.sum)).map_err(|_| ServerError::InvalidOrderNumber)?;
    let withdrawal = api.db().process_withdrawal(claims.user_id, withdrawal).await?;
    Ok(HttpResponse::Ok().json(WithdrawalResult::from(withdrawal)))
}

//---------------------------------------------- Withdrawals ---------------------------------------------------
#[get("/api/user/withdrawals")]
pub async fn get_withdrawals(claims: JwtClaims, api: FlowApi) -> Result<HttpResponse, ServerError> {
    let withdrawals = api.db().withdrawals_for_user(claims.user_id).await?;
    if withdrawals.is_empty() {
        return Ok(HttpResponse::NoContent().finish());
    }
    let withdrawals = withdrawals.into_iter().map(WithdrawalResult::from).collect::<Vec<_>>();
    Ok(HttpResponse::Ok().json(withdrawals))
}

fn access_cookie(token: &str) -> Cookie<'_> {
    Cookie::build(ACCESS_TOKEN_COOKIE, token).path("/").http_only(true).finish()
}
