// src/cache/mod.rs
pub mod redis_client;

pub use redis_client::RedisClient;

/// Helper for generating consistent cache keys
pub struct CacheKeys;

impl CacheKeys {
    /// Active pricing rules for a workspace: `pricing_rules:{workspace_id}`
    pub fn pricing_rules(workspace_id: i64) -> String {
        format!("pricing_rules:{}", workspace_id)
    }

    /// Billing settings for a workspace: `billing_settings:{workspace_id}`
    pub fn billing_settings(workspace_id: i64) -> String {
        format!("billing_settings:{}", workspace_id)
    }

    /// Short-lived intake guard against double-submitted leads:
    /// `lead_intake:{workspace_id}:{contact}`
    pub fn lead_intake(workspace_id: i64, contact: &str) -> String {
        format!("lead_intake:{}:{}", workspace_id, contact)
    }
}
