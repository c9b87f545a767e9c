//! Invoice line-item export
//!
//! Deterministic CSV: fixed column order, shipment rows sorted by billing
//! date then AWB, then one row per SLA adjustment. Every row has the same
//! nine columns.

use std::io::Write;

use core_kernel::Money;

use crate::error::BillingError;
use crate::invoice::Invoice;

/// Column header, in output order
pub const INVOICE_CSV_HEADER: [&str; 9] = [
    "awb",
    "delivery_date",
    "cod_amount",
    "freight",
    "cod_fee",
    "rto_fee",
    "platform_fee",
    "net_amount",
    "sla_adjustments",
];

fn format_amount(amount: Money) -> String {
    amount.amount().to_string()
}

/// Writes the line items of a generated invoice as CSV
///
/// # Errors
///
/// `InvalidState` for drafts, whose amounts are not final; `Export` if the
/// writer fails.
pub fn write_invoice_csv(invoice: &Invoice, writer: impl Write) -> Result<(), BillingError> {
    if !invoice.status.is_generated() {
        return Err(BillingError::invalid_state("invoice", invoice.status, "export"));
    }

    let mut lines: Vec<_> = invoice.lines.iter().collect();
    lines.sort_by(|a, b| {
        a.billing_date
            .cmp(&b.billing_date)
            .then_with(|| a.awb.cmp(&b.awb))
    });

    let mut csv = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    csv.write_record(INVOICE_CSV_HEADER)
        .map_err(|e| BillingError::Export(e.to_string()))?;

    for line in lines {
        csv.write_record([
            line.awb.clone(),
            line.billing_date.format("%Y-%m-%d").to_string(),
            format_amount(line.cod_amount),
            format_amount(line.freight),
            format_amount(line.cod_fee),
            format_amount(line.rto_fee),
            format_amount(line.platform_fee),
            format_amount(line.net()),
            format_amount(Money::ZERO),
        ])
        .map_err(|e| BillingError::Export(e.to_string()))?;
    }

    for adjustment in &invoice.sla_adjustments {
        csv.write_record([
            format!("SLA:{}", adjustment.rule_id),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            format_amount(adjustment.amount),
        ])
        .map_err(|e| BillingError::Export(e.to_string()))?;
    }

    csv.flush().map_err(|e| BillingError::Export(e.to_string()))?;
    Ok(())
}

/// Renders the CSV export into a string
pub fn invoice_csv(invoice: &Invoice) -> Result<String, BillingError> {
    let mut buffer = Vec::new();
    write_invoice_csv(invoice, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| BillingError::Export(e.to_string()))
}
