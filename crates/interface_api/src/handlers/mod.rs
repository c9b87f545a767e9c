//! Request handlers, one module per resource

pub mod health;
pub mod invoices;
pub mod notes;
pub mod payments;
pub mod receivables;
