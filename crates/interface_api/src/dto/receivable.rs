//! Receivable query parameters

use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use core_kernel::ClientId;

/// Date against which overdue status is derived; defaults to today
#[derive(Debug, Default, Deserialize)]
pub struct AsOfParams {
    pub as_of: Option<NaiveDate>,
}

impl AsOfParams {
    pub fn date(&self) -> NaiveDate {
        as_of_or_today(self.as_of)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListReceivablesParams {
    pub client_id: Option<ClientId>,
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ReportParams {
    pub client_id: Option<ClientId>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub as_of: Option<NaiveDate>,
}

pub fn as_of_or_today(as_of: Option<NaiveDate>) -> NaiveDate {
    as_of.unwrap_or_else(|| Utc::now().date_naive())
}
