// src/main.rs
use actix_web::{web, App, HttpServer, middleware};
use actix_cors::Cors;
use std::sync::Arc;
use tracing::info;

use leadmarket_billing_engine::config::Config;
use leadmarket_billing_engine::database::create_pool;
use leadmarket_billing_engine::cache::RedisClient;
use leadmarket_billing_engine::services::{
    PricingService, WalletLedger, CallBillingService, DisputeService, LeadService, LeadRouter,
    ExpirySweeper,
};
use leadmarket_billing_engine::api;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .json()
        .init();

    info!("Starting LeadMarket Billing Engine");

    // Load configuration
    let config = Config::from_env()
        .expect("Failed to load configuration");

    info!("Environment: {}", config.environment);

    // Create database pool
    let db_pool = create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");

    info!("Database pool created");

    // Create Redis client
    let redis_client = RedisClient::new(&config.redis_url)
        .await
        .expect("Failed to create Redis client");

    info!("Redis client connected");

    // Create services
    let pricing = Arc::new(PricingService::new(db_pool.clone(), redis_client.clone()));
    let ledger = Arc::new(WalletLedger::new(db_pool.clone()));

    let call_billing = Arc::new(CallBillingService::new(
        db_pool.clone(),
        pricing.clone(),
        ledger.clone(),
    ));

    let disputes = Arc::new(DisputeService::new(
        db_pool.clone(),
        pricing.clone(),
        ledger.clone(),
    ));

    let leads = Arc::new(LeadService::new(
        db_pool.clone(),
        redis_client.clone(),
        pricing.clone(),
    ));

    let router = Arc::new(LeadRouter::new(db_pool.clone(), ledger.clone()));

    // Background expiry sweep: offer and lead windows are enforced on the
    // server clock.
    let sweeper = ExpirySweeper::new(db_pool.clone(), config.sweep_interval_seconds);
    tokio::spawn(sweeper.run());

    info!("Expiry sweeper started ({}s interval)", config.sweep_interval_seconds);

    // HTTP Server
    let bind_address = format!("{}:{}", config.host, config.port);
    info!("Starting HTTP server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .wrap(Cors::permissive())
            .app_data(web::Data::new(pricing.clone()))
            .app_data(web::Data::new(ledger.clone()))
            .app_data(web::Data::new(call_billing.clone()))
            .app_data(web::Data::new(disputes.clone()))
            .app_data(web::Data::new(leads.clone()))
            .app_data(web::Data::new(router.clone()))
            .configure(api::routes::configure)
    })
    .workers(8)
    .bind(&bind_address)?
    .run()
    .await
}
