//! Pre-built Test Fixtures
//!
//! Ready-to-use dates, periods and actors. Everything is pinned to March
//! 2024 so tests are reproducible.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use core_kernel::{BillingPeriod, ClientId, Money};
use domain_billing::{Actor, Role};

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// A date in 2024
    pub fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).expect("valid fixture date")
    }

    /// A timestamp in 2024 at 10:00 UTC
    pub fn at(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, month, day, 10, 0, 0)
            .single()
            .expect("valid fixture timestamp")
    }

    /// The March 2024 billing period
    pub fn march() -> BillingPeriod {
        BillingPeriod::new(Self::date(3, 1), Self::date(3, 31)).expect("valid fixture period")
    }

    /// The April 2024 billing period
    pub fn april() -> BillingPeriod {
        BillingPeriod::new(Self::date(4, 1), Self::date(4, 30)).expect("valid fixture period")
    }

    /// Rate cards in the fixtures take effect on this date
    pub fn rate_card_start() -> NaiveDate {
        Self::date(1, 1)
    }
}

/// Fixture for actors, one per role
pub struct ActorFixtures;

impl ActorFixtures {
    pub fn admin() -> Actor {
        Actor::staff("admin-1", Role::Admin)
    }

    pub fn finance_manager() -> Actor {
        Actor::staff("fin-mgr-1", Role::FinanceManager)
    }

    /// A second manager, for approval by someone other than the creator
    pub fn other_finance_manager() -> Actor {
        Actor::staff("fin-mgr-2", Role::FinanceManager)
    }

    pub fn finance_executive() -> Actor {
        Actor::staff("fin-exec-1", Role::FinanceExecutive)
    }

    pub fn operations() -> Actor {
        Actor::staff("ops-1", Role::Operations)
    }

    /// A client user linked to `client_id`
    pub fn client(client_id: ClientId) -> Actor {
        Actor::client(format!("client-user-{}", client_id), client_id)
    }
}

/// Fixture for rupee amounts used across scenarios
pub struct MoneyFixtures;

impl MoneyFixtures {
    pub fn rupees(major: i64) -> Money {
        Money::from_major(major)
    }

    pub fn paise(minor: i64) -> Money {
        Money::from_minor(minor)
    }
}
