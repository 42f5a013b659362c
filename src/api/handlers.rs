// src/api/handlers.rs
use actix_web::{web, HttpRequest, HttpResponse};
use crate::services::{
    PricingService, CallBillingService, WalletLedger, DisputeService, LeadService, LeadRouter,
};
use crate::models::{
    CreatePricingRuleRequest, ResolvePriceRequest, UpdateBillingSettingsRequest,
    IngestCallRequest, OpenDisputeRequest, ResolveDisputeRequest, ManualCreditRequest,
    CreateLeadRequest, DeclineMatchRequest, SendQuoteRequest, MarkOutcomeRequest,
    RefundLeadRequest, HealthResponse, CallBillingStatus, DisputeStatus, LeadStatus, MatchStatus,
    TransactionType,
};
use crate::error::BillingError;
use std::sync::Arc;
use serde_json::json;

/// Tenant context comes in as headers; a stand-in for the upstream
/// gateway's tenant resolution.
fn workspace_id(req: &HttpRequest) -> i64 {
    req.headers()
        .get("X-Workspace-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(1)
}

fn company_id(req: &HttpRequest) -> Result<i64, BillingError> {
    req.headers()
        .get("X-Company-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| BillingError::Validation("X-Company-Id header required".to_string()))
}

#[derive(Debug, serde::Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, serde::Deserialize)]
pub struct TransactionsQuery {
    #[serde(rename = "type", default)]
    pub txn_type: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

fn ok(data: impl serde::Serialize) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "data": data }))
}

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        service: "leadmarket-billing-engine".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ==================== PRICING RULES ====================

pub async fn list_pricing_rules(
    req: HttpRequest,
    pricing: web::Data<Arc<PricingService>>,
) -> Result<HttpResponse, BillingError> {
    let rules = pricing.list_rules(workspace_id(&req)).await?;
    Ok(ok(rules))
}

pub async fn create_pricing_rule(
    req: HttpRequest,
    body: web::Json<CreatePricingRuleRequest>,
    pricing: web::Data<Arc<PricingService>>,
) -> Result<HttpResponse, BillingError> {
    let id = pricing.create_rule(workspace_id(&req), &body).await?;
    Ok(ok(json!({ "id": id })))
}

pub async fn update_pricing_rule(
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<CreatePricingRuleRequest>,
    pricing: web::Data<Arc<PricingService>>,
) -> Result<HttpResponse, BillingError> {
    pricing
        .update_rule(workspace_id(&req), path.into_inner(), &body)
        .await?;
    Ok(ok(json!({})))
}

pub async fn delete_pricing_rule(
    req: HttpRequest,
    path: web::Path<i64>,
    pricing: web::Data<Arc<PricingService>>,
) -> Result<HttpResponse, BillingError> {
    pricing.delete_rule(workspace_id(&req), path.into_inner()).await?;
    Ok(ok(json!({})))
}

/// Price preview: what would this lead cost under the current rules?
pub async fn resolve_price(
    req: HttpRequest,
    body: web::Json<ResolvePriceRequest>,
    pricing: web::Data<Arc<PricingService>>,
) -> Result<HttpResponse, BillingError> {
    let attrs = body.into_inner().into_attributes();
    let quote = pricing.quote_lead(workspace_id(&req), &attrs).await?;
    Ok(ok(json!({ "price": quote.price, "rule_id": quote.rule_id })))
}

// ==================== BILLING SETTINGS ====================

pub async fn get_billing_settings(
    req: HttpRequest,
    pricing: web::Data<Arc<PricingService>>,
) -> Result<HttpResponse, BillingError> {
    let settings = pricing.get_settings(workspace_id(&req)).await?;
    Ok(ok(settings))
}

pub async fn update_billing_settings(
    req: HttpRequest,
    body: web::Json<UpdateBillingSettingsRequest>,
    pricing: web::Data<Arc<PricingService>>,
) -> Result<HttpResponse, BillingError> {
    let settings = pricing.update_settings(workspace_id(&req), &body).await?;
    Ok(ok(settings))
}

// ==================== CALLS ====================

pub async fn list_calls(
    req: HttpRequest,
    query: web::Query<ListQuery>,
    calls: web::Data<Arc<CallBillingService>>,
) -> Result<HttpResponse, BillingError> {
    let status = query.status.as_deref().map(CallBillingStatus::from_str);
    let result = calls
        .list_calls(workspace_id(&req), status, query.limit.unwrap_or(50))
        .await?;
    Ok(ok(result))
}

/// Ingest a completed call and immediately run it through qualification
/// and billing.
pub async fn ingest_call(
    req: HttpRequest,
    body: web::Json<IngestCallRequest>,
    calls: web::Data<Arc<CallBillingService>>,
) -> Result<HttpResponse, BillingError> {
    let ws = workspace_id(&req);
    let call_id = calls.ingest_call(ws, &body).await?;
    let outcome = calls.process_call(ws, call_id).await?;
    Ok(ok(outcome))
}

pub async fn process_call(
    req: HttpRequest,
    path: web::Path<i64>,
    calls: web::Data<Arc<CallBillingService>>,
) -> Result<HttpResponse, BillingError> {
    let outcome = calls.process_call(workspace_id(&req), path.into_inner()).await?;
    Ok(ok(outcome))
}

// ==================== DISPUTES ====================

pub async fn create_dispute(
    req: HttpRequest,
    body: web::Json<OpenDisputeRequest>,
    disputes: web::Data<Arc<DisputeService>>,
) -> Result<HttpResponse, BillingError> {
    let company = company_id(&req)?;
    let id = disputes.open_dispute(workspace_id(&req), company, &body).await?;
    Ok(ok(json!({ "id": id })))
}

pub async fn list_disputes(
    req: HttpRequest,
    query: web::Query<ListQuery>,
    disputes: web::Data<Arc<DisputeService>>,
) -> Result<HttpResponse, BillingError> {
    let status = query.status.as_deref().map(DisputeStatus::from_str);
    let result = disputes
        .list_disputes(workspace_id(&req), status, query.limit.unwrap_or(50))
        .await?;
    Ok(ok(result))
}

pub async fn resolve_dispute(
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<ResolveDisputeRequest>,
    disputes: web::Data<Arc<DisputeService>>,
) -> Result<HttpResponse, BillingError> {
    let outcome = disputes
        .resolve_dispute(workspace_id(&req), path.into_inner(), &body)
        .await?;
    Ok(ok(outcome))
}

// ==================== WALLET ====================

pub async fn get_wallet(
    req: HttpRequest,
    ledger: web::Data<Arc<WalletLedger>>,
) -> Result<HttpResponse, BillingError> {
    let company = company_id(&req)?;
    let wallet = ledger.get_wallet(workspace_id(&req), company).await?;
    Ok(ok(wallet))
}

pub async fn list_transactions(
    req: HttpRequest,
    query: web::Query<TransactionsQuery>,
    ledger: web::Data<Arc<WalletLedger>>,
) -> Result<HttpResponse, BillingError> {
    let company = company_id(&req)?;
    let txn_type = query.txn_type.as_deref().map(TransactionType::from_str);
    let transactions = ledger
        .list_transactions(
            workspace_id(&req),
            company,
            txn_type,
            query.limit.unwrap_or(50),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(ok(transactions))
}

/// Admin credit: purchases (idempotent by payment id), adjustments, bonuses.
pub async fn add_credits(
    req: HttpRequest,
    body: web::Json<ManualCreditRequest>,
    ledger: web::Data<Arc<WalletLedger>>,
) -> Result<HttpResponse, BillingError> {
    let txn_type = body.txn_type.unwrap_or(TransactionType::Adjustment);
    let description = body.description.as_deref().unwrap_or("Manual adjustment");
    let payment = match (body.payment_provider.as_deref(), body.payment_id.as_deref()) {
        (Some(provider), Some(id)) => Some((provider, id)),
        _ => None,
    };

    let outcome = ledger
        .credit(
            workspace_id(&req),
            body.company_id,
            body.amount,
            txn_type,
            description,
            payment,
        )
        .await?;
    Ok(ok(json!({
        "transaction_id": outcome.transaction_id,
        "balance_after": outcome.balance_after,
    })))
}

// ==================== LEADS ====================

pub async fn create_lead(
    req: HttpRequest,
    body: web::Json<CreateLeadRequest>,
    leads: web::Data<Arc<LeadService>>,
) -> Result<HttpResponse, BillingError> {
    let response = leads.create_lead(workspace_id(&req), &body).await?;
    Ok(ok(response))
}

pub async fn list_leads(
    req: HttpRequest,
    query: web::Query<ListQuery>,
    leads: web::Data<Arc<LeadService>>,
) -> Result<HttpResponse, BillingError> {
    let status = query.status.as_deref().map(LeadStatus::from_str);
    let result = leads
        .list_leads(
            workspace_id(&req),
            status,
            query.limit.unwrap_or(50),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(ok(result))
}

pub async fn get_lead(
    req: HttpRequest,
    path: web::Path<i64>,
    leads: web::Data<Arc<LeadService>>,
) -> Result<HttpResponse, BillingError> {
    let detail = leads.get_lead(workspace_id(&req), path.into_inner()).await?;
    Ok(ok(detail))
}

pub async fn route_lead(
    req: HttpRequest,
    path: web::Path<i64>,
    router: web::Data<Arc<LeadRouter>>,
) -> Result<HttpResponse, BillingError> {
    let outcome = router.route_lead(workspace_id(&req), path.into_inner()).await?;
    Ok(ok(outcome))
}

pub async fn refund_lead(
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<RefundLeadRequest>,
    router: web::Data<Arc<LeadRouter>>,
) -> Result<HttpResponse, BillingError> {
    let balance_after = router
        .refund_match(workspace_id(&req), path.into_inner(), &body)
        .await?;
    Ok(ok(json!({ "balance_after": balance_after })))
}

// ==================== MATCHES ====================

pub async fn list_matches(
    req: HttpRequest,
    query: web::Query<ListQuery>,
    router: web::Data<Arc<LeadRouter>>,
) -> Result<HttpResponse, BillingError> {
    let company = company_id(&req)?;
    let status = query.status.as_deref().map(MatchStatus::from_str);
    let matches = router
        .list_matches(workspace_id(&req), company, status, query.limit.unwrap_or(50))
        .await?;
    Ok(ok(matches))
}

pub async fn get_match(
    req: HttpRequest,
    path: web::Path<i64>,
    router: web::Data<Arc<LeadRouter>>,
) -> Result<HttpResponse, BillingError> {
    let company = company_id(&req)?;
    let lead_match = router
        .get_match(workspace_id(&req), company, path.into_inner())
        .await?;
    Ok(ok(lead_match))
}

pub async fn accept_match(
    req: HttpRequest,
    path: web::Path<i64>,
    router: web::Data<Arc<LeadRouter>>,
) -> Result<HttpResponse, BillingError> {
    let company = company_id(&req)?;
    let outcome = router
        .accept_match(workspace_id(&req), company, path.into_inner())
        .await?;
    Ok(ok(outcome))
}

pub async fn decline_match(
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<DeclineMatchRequest>,
    router: web::Data<Arc<LeadRouter>>,
) -> Result<HttpResponse, BillingError> {
    let company = company_id(&req)?;
    router
        .decline_match(
            workspace_id(&req),
            company,
            path.into_inner(),
            body.reason.as_deref(),
        )
        .await?;
    Ok(ok(json!({})))
}

pub async fn send_quote(
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<SendQuoteRequest>,
    router: web::Data<Arc<LeadRouter>>,
) -> Result<HttpResponse, BillingError> {
    let company = company_id(&req)?;
    let id = router
        .send_quote(workspace_id(&req), company, path.into_inner(), &body)
        .await?;
    Ok(ok(json!({ "id": id })))
}

pub async fn mark_outcome(
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<MarkOutcomeRequest>,
    router: web::Data<Arc<LeadRouter>>,
) -> Result<HttpResponse, BillingError> {
    let company = company_id(&req)?;
    router
        .mark_outcome(workspace_id(&req), company, path.into_inner(), &body)
        .await?;
    Ok(ok(json!({})))
}
