//! User access: channel subscription, free/paid period, unlimited flag and
//! promo codes.

mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use sqlite::SqliteAccessStore;

use crate::errors::BotResult;

/// Length of the free period given on first registration.
pub const TRIAL_DAYS: i64 = 7;
/// Price of one paid period in Telegram Stars.
pub const ACCESS_PRICE_STARS: u32 = 50;
/// Length of one paid period.
pub const ACCESS_DAYS: i64 = 30;
/// Invoice payload prefix, followed by the payer's user id.
pub const PAYMENT_PAYLOAD_PREFIX: &str = "winyl_access_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub user_id: u64,
    pub subscribed: bool,
    pub free_until: Option<DateTime<Utc>>,
    pub unlimited: bool,
}

impl AccessRecord {
    pub fn has_access(&self, now: DateTime<Utc>) -> bool {
        self.unlimited || self.subscribed || self.free_until.is_some_and(|until| now < until)
    }
}

/// Result of a promo code redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromoOutcome {
    Applied { unlimited: bool, days: i64 },
    NotFound,
    Exhausted,
    AlreadyUsed,
}

impl PromoOutcome {
    pub fn message(&self) -> String {
        match self {
            PromoOutcome::Applied {
                unlimited: true, ..
            } => "✅ Промокод применён: безлимитный доступ активирован.".to_string(),
            PromoOutcome::Applied { days, .. } => {
                format!("✅ Промокод применён: доступ на {days} дн.")
            }
            PromoOutcome::NotFound => "❌ Промокод не найден.".to_string(),
            PromoOutcome::Exhausted => {
                "❌ Промокод уже использован максимальное число раз.".to_string()
            }
            PromoOutcome::AlreadyUsed => "❌ Вы уже использовали этот промокод.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPromo {
    pub code: String,
    pub days: i64,
    pub max_uses: i64,
    pub unlimited: bool,
}

/// Every operation is a single statement or a single transaction keyed by
/// user id, so callers need no extra locking.
#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn get_access(&self, user_id: u64) -> BotResult<Option<AccessRecord>>;

    /// Inserts the user with a fresh trial unless already known.
    async fn register(&self, user_id: u64, username: &str) -> BotResult<()>;

    /// Upserts the channel-membership flag. A new record gets no trial.
    async fn set_subscribed(&self, user_id: u64, subscribed: bool) -> BotResult<()>;

    async fn check_access(&self, user_id: u64) -> BotResult<bool> {
        Ok(self
            .get_access(user_id)
            .await?
            .is_some_and(|record| record.has_access(Utc::now())))
    }

    async fn redeem_promo(&self, user_id: u64, code: &str) -> BotResult<PromoOutcome>;

    /// Extends the paid period by `days` from max(now, current end) and
    /// returns the new end.
    async fn extend_access(&self, user_id: u64, days: i64) -> BotResult<DateTime<Utc>>;

    /// Returns false when the code already exists.
    async fn add_promo(&self, promo: &NewPromo) -> BotResult<bool>;
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn record(subscribed: bool, free_until: Option<DateTime<Utc>>, unlimited: bool) -> AccessRecord {
        AccessRecord {
            user_id: 1,
            subscribed,
            free_until,
            unlimited,
        }
    }

    #[test]
    fn access_is_granted_by_any_of_three_grounds() {
        let now = Utc::now();
        let past = Some(now - Duration::days(1));
        let future = Some(now + Duration::days(1));

        assert!(!record(false, None, false).has_access(now));
        assert!(!record(false, past, false).has_access(now));
        assert!(record(false, future, false).has_access(now));
        assert!(record(true, past, false).has_access(now));
        assert!(record(false, past, true).has_access(now));
    }

    #[test]
    fn free_period_ends_exactly_at_its_timestamp() {
        let now = Utc::now();
        assert!(!record(false, Some(now), false).has_access(now));
    }
}
