use chrono::{DateTime, NaiveDate, Utc};

use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::types::{BillingPeriod, InvoiceStatus};

use super::{Invoice, InvoiceAggregator};

/// reserved number prefix of opening-balance pseudo-invoices
pub const OPENING_NUMBER_PREFIX: &str = "OB/";

/// invoices fall due this many days after issuance unless overridden
pub const DEFAULT_DUE_DAYS: i64 = 14;

/// state machine governing invoice status transitions
pub struct InvoiceLifecycle;

impl InvoiceLifecycle {
    /// human-readable number scoped to (year, month)
    pub fn format_number(period: BillingPeriod, sequence: u32) -> String {
        if period.is_opening() {
            format!("{}{:06}", OPENING_NUMBER_PREFIX, sequence)
        } else {
            format!("{}-{:02}/{:06}", period.year, period.month, sequence)
        }
    }

    /// Draft -> Issued: assign the number and due date
    pub fn issue(
        invoice: &mut Invoice,
        number: String,
        due_date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if invoice.status != InvoiceStatus::Draft {
            return Err(BillingError::InvalidStatusTransition {
                current: invoice.status,
                requested: InvoiceStatus::Issued,
            });
        }
        invoice.number = Some(number);
        invoice.due_date =
            Some(due_date.unwrap_or_else(|| (now + chrono::Duration::days(DEFAULT_DUE_DAYS)).date_naive()));
        invoice.status = InvoiceStatus::Issued;
        Ok(())
    }

    /// Draft | Issued -> Canceled: zero the header, keep the lines, append
    /// an audit note; returns the voided total
    pub fn cancel(invoice: &mut Invoice, now: DateTime<Utc>) -> Result<Money> {
        match invoice.status {
            InvoiceStatus::Draft | InvoiceStatus::Issued => {}
            current => {
                return Err(BillingError::InvalidStatusTransition {
                    current,
                    requested: InvoiceStatus::Canceled,
                });
            }
        }
        let voided = invoice.amount_total;
        invoice.notes.push(format!(
            "canceled at {} (number {}, total {})",
            now.format("%Y-%m-%d %H:%M:%S"),
            invoice.number.as_deref().unwrap_or("-"),
            voided,
        ));
        invoice.amount_net = Money::ZERO;
        invoice.amount_vat = Money::ZERO;
        invoice.amount_total = Money::ZERO;
        invoice.status = InvoiceStatus::Canceled;
        Ok(voided)
    }

    /// Canceled -> Issued: restore totals from the lines and assign a fresh
    /// number; the (resident, period) uniqueness guard is the caller's
    pub fn reissue(
        invoice: &mut Invoice,
        number: String,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if invoice.status != InvoiceStatus::Canceled {
            return Err(BillingError::InvalidStatusTransition {
                current: invoice.status,
                requested: InvoiceStatus::Issued,
            });
        }
        invoice.notes.push(format!(
            "reissued at {} as {}",
            now.format("%Y-%m-%d %H:%M:%S"),
            number,
        ));
        invoice.status = InvoiceStatus::Issued;
        invoice.number = Some(number);
        invoice.due_date = Some((now + chrono::Duration::days(DEFAULT_DUE_DAYS)).date_naive());
        InvoiceAggregator::recompute(invoice);
        Ok(())
    }

    /// recompute status from the applied-payment total; canceled invoices
    /// are excluded entirely; returns (old, new) when the status moved
    pub fn refresh_status(invoice: &mut Invoice, paid: Money) -> Option<(InvoiceStatus, InvoiceStatus)> {
        if invoice.is_canceled() {
            return None;
        }
        let old = invoice.status;
        let new = if paid.is_zero() {
            match invoice.number {
                Some(_) => InvoiceStatus::Issued,
                None => InvoiceStatus::Draft,
            }
        } else if paid < invoice.amount_total {
            InvoiceStatus::Partial
        } else if paid == invoice.amount_total {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::Overpaid
        };
        if new == old {
            return None;
        }
        invoice.status = new;
        Some((old, new))
    }
}
