// src/api/routes.rs
use actix_web::web;
use crate::api::handlers;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(handlers::health_check))
            // Pricing rules
            .route("/pricing-rules", web::get().to(handlers::list_pricing_rules))
            .route("/pricing-rules", web::post().to(handlers::create_pricing_rule))
            .route("/pricing-rules/{id}", web::put().to(handlers::update_pricing_rule))
            .route("/pricing-rules/{id}", web::delete().to(handlers::delete_pricing_rule))
            .route("/pricing-rules/resolve", web::post().to(handlers::resolve_price))
            // Billing settings
            .route("/billing-settings", web::get().to(handlers::get_billing_settings))
            .route("/billing-settings", web::put().to(handlers::update_billing_settings))
            // Qualified calls
            .route("/qualified-calls", web::get().to(handlers::list_calls))
            .route("/calls", web::post().to(handlers::ingest_call))
            .route("/calls/{id}/process", web::post().to(handlers::process_call))
            // Disputes
            .route("/disputes", web::get().to(handlers::list_disputes))
            .route("/disputes", web::post().to(handlers::create_dispute))
            .route("/disputes/{id}/resolve", web::post().to(handlers::resolve_dispute))
            // Wallet
            .route("/wallet", web::get().to(handlers::get_wallet))
            .route("/wallet/transactions", web::get().to(handlers::list_transactions))
            .route("/wallet/credits", web::post().to(handlers::add_credits))
            // Leads
            .route("/leads", web::get().to(handlers::list_leads))
            .route("/leads", web::post().to(handlers::create_lead))
            .route("/leads/{id}", web::get().to(handlers::get_lead))
            .route("/leads/{id}/route", web::post().to(handlers::route_lead))
            .route("/leads/{id}/refund", web::post().to(handlers::refund_lead))
            // Matches
            .route("/matches", web::get().to(handlers::list_matches))
            .route("/matches/{id}", web::get().to(handlers::get_match))
            .route("/matches/{id}/accept", web::post().to(handlers::accept_match))
            .route("/matches/{id}/decline", web::post().to(handlers::decline_match))
            .route("/matches/{id}/quote", web::post().to(handlers::send_quote))
            .route("/matches/{id}/outcome", web::post().to(handlers::mark_outcome))
    );
}
