// src/services/mod.rs
pub mod pricing;
pub mod qualification;
pub mod ledger;
pub mod disputes;
pub mod leads;
pub mod routing;
pub mod sweeper;

pub use pricing::{PricingService, Quote, resolve_price, clamp_call_price};
pub use qualification::{CallBillingService, is_qualified};
pub use ledger::WalletLedger;
pub use disputes::DisputeService;
pub use leads::LeadService;
pub use routing::LeadRouter;
pub use sweeper::ExpirySweeper;
