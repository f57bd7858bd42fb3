use crate::config::FeeSchedule;
use crate::domain::amount::Amount;
use crate::domain::payee::{SettlementKind, SettlementMethod};
use crate::domain::recommendation::{FeeEstimate, SettlementTime};
use rust_decimal::Decimal;

/// Deterministic fee comparison between settlement rails.
///
/// A stablecoin address always wins when one is available; fees are never
/// compared numerically.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeeEstimator {
    schedule: FeeSchedule,
}

impl FeeEstimator {
    pub fn new(schedule: FeeSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &FeeSchedule {
        &self.schedule
    }

    pub fn fee_for(&self, kind: SettlementKind, amount: Amount) -> Decimal {
        match kind {
            SettlementKind::StableCoinAddress => amount.scaled(self.schedule.stablecoin_rate),
            SettlementKind::BankTransfer => amount.scaled(self.schedule.bank_transfer_rate),
        }
    }

    pub fn estimate(&self, methods: &[SettlementMethod], amount: Amount) -> FeeEstimate {
        let (kind, reason) = if methods
            .iter()
            .any(|m| m.kind() == SettlementKind::StableCoinAddress)
        {
            (
                SettlementKind::StableCoinAddress,
                "USDC offers instant settlement with lowest fees",
            )
        } else if methods.iter().any(|m| m.kind() == SettlementKind::BankTransfer) {
            (SettlementKind::BankTransfer, "ACH is the best available option")
        } else {
            return FeeEstimate {
                method: None,
                fee: Decimal::ZERO,
                settlement_time: SettlementTime::Unknown,
                reason: "No valid payment methods found".to_string(),
            };
        };

        FeeEstimate {
            method: pick(methods, kind).cloned(),
            fee: self.fee_for(kind, amount),
            settlement_time: SettlementTime::for_kind(kind),
            reason: reason.to_string(),
        }
    }
}

/// Default method of the rail if flagged, otherwise the first one.
fn pick(methods: &[SettlementMethod], kind: SettlementKind) -> Option<&SettlementMethod> {
    let mut candidates = methods.iter().filter(|m| m.kind() == kind);
    let first = candidates.next();
    match first {
        Some(m) if m.is_default => Some(m),
        _ => candidates.find(|m| m.is_default).or(first),
    }
}
