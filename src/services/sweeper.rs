// src/services/sweeper.rs
use crate::database::DbPool;
use crate::error::BillingError;
use tokio::time::{interval, Duration};
use tracing::{info, error};

/// Server-side enforcement of the time windows. Offers and routed leads
/// expire on this clock regardless of what any client believes, so an offer
/// can never be accepted late and a lapsed lead never lingers open.
pub struct ExpirySweeper {
    db_pool: DbPool,
    interval_seconds: u64,
}

impl ExpirySweeper {
    pub fn new(db_pool: DbPool, interval_seconds: u64) -> Self {
        Self {
            db_pool,
            interval_seconds,
        }
    }

    pub async fn run(self) {
        let mut tick = interval(Duration::from_secs(self.interval_seconds));

        loop {
            tick.tick().await;

            match self.sweep_once().await {
                Ok((offers, leads)) => {
                    if offers > 0 || leads > 0 {
                        info!("Sweep expired {} offers and {} leads", offers, leads);
                    }
                }
                Err(e) => {
                    error!("Expiry sweep failed: {}", e);
                }
            }
        }
    }

    async fn sweep_once(&self) -> Result<(u64, u64), BillingError> {
        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let offers = client
            .execute(
                "UPDATE lead_matches SET status = 'expired'
                 WHERE status IN ('offered', 'viewed') AND expires_at < NOW()",
                &[],
            )
            .await?;

        // Routed leads with no acceptance by their expiry lapse entirely;
        // partially sold leads keep their sales and close instead.
        let leads = client
            .execute(
                "UPDATE lead_requests SET status = 'expired'
                 WHERE status = 'routed' AND expires_at < NOW()",
                &[],
            )
            .await?;
        let closed = client
            .execute(
                "UPDATE lead_requests SET status = 'closed', closed_at = NOW()
                 WHERE status = 'partial' AND expires_at < NOW()",
                &[],
            )
            .await?;

        Ok((offers, leads + closed))
    }
}
