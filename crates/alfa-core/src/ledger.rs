//! Credit ledger. One credit per two USD of injected capital.

use chrono::{DateTime, Utc};

use crate::{Transaction, TransactionKind};

pub const USD_PER_CREDIT: f64 = 2.0;

fn transaction_id(now: DateTime<Utc>) -> String {
    format!("TX-{}", now.timestamp_millis())
}

/// Appends `tx` to the ledger. The ledger is append-only: when another transaction already
/// carries the same id (same millisecond), the new one gets a `-<n>` suffix.
pub fn append_transaction(ledger: &mut Vec<Transaction>, mut tx: Transaction) -> &Transaction {
    if ledger.iter().any(|t| t.trans_id == tx.trans_id) {
        let base = tx.trans_id.clone();
        let mut n = 2;
        while ledger.iter().any(|t| t.trans_id == format!("{base}-{n}")) {
            n += 1;
        }
        tx.trans_id = format!("{base}-{n}");
    }
    ledger.push(tx);
    &ledger[ledger.len() - 1]
}

pub fn credits_for_capital(usd: f64) -> i64 {
    if !usd.is_finite() || usd <= 0.0 {
        return 0;
    }
    (usd / USD_PER_CREDIT).floor() as i64
}

/// Returns the transaction and the new balance.
pub fn inject_capital(usd: f64, balance: i64, now: DateTime<Utc>) -> (Transaction, i64) {
    let credits = credits_for_capital(usd);
    let tx = Transaction {
        trans_id: transaction_id(now),
        amount: usd,
        source_type: TransactionKind::CapitalInjection,
        related_id: "POOL".to_string(),
        date: now,
        credits_delta: Some(credits),
    };
    (tx, balance.saturating_add(credits))
}

/// Consumes `n` credits for delivered work. The balance never goes below zero; the recorded
/// delta is what was requested.
pub fn consume_credits(n: u64, balance: i64, now: DateTime<Utc>) -> (Transaction, i64) {
    let n = i64::try_from(n).unwrap_or(i64::MAX);
    let tx = Transaction {
        trans_id: transaction_id(now),
        amount: 0.0,
        source_type: TransactionKind::CreditConsumption,
        related_id: "DELIVERY".to_string(),
        date: now,
        credits_delta: Some(-n),
    };
    (tx, balance.saturating_sub(n).max(0))
}

pub fn adjust_credits(delta: i64, balance: i64, now: DateTime<Utc>) -> (Transaction, i64) {
    let tx = Transaction {
        trans_id: transaction_id(now),
        amount: 0.0,
        source_type: TransactionKind::ManualAdjustment,
        related_id: "MANUAL".to_string(),
        date: now,
        credits_delta: Some(delta),
    };
    (tx, balance.saturating_add(delta).max(0))
}
