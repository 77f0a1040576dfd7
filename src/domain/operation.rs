use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Cents;

/// The kind of a ledger transaction. The kind alone decides the sign of the
/// stored amount and whether the transaction settles earlier debits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    #[serde(rename = "Normal_Purchase")]
    NormalPurchase,
    #[serde(rename = "Purchase_With_Installment")]
    PurchaseWithInstallment,
    #[serde(rename = "Withdraw")]
    Withdraw,
    #[serde(rename = "Credit_Voucher")]
    CreditVoucher,
}

/// Persisted code and external name for every operation type.
static OPERATION_TABLE: [(OperationType, i64, &str); 4] = [
    (OperationType::NormalPurchase, 1, "Normal_Purchase"),
    (OperationType::PurchaseWithInstallment, 2, "Purchase_With_Installment"),
    (OperationType::Withdraw, 3, "Withdraw"),
    (OperationType::CreditVoucher, 4, "Credit_Voucher"),
];

impl OperationType {
    pub const ALL: [OperationType; 4] = [
        OperationType::NormalPurchase,
        OperationType::PurchaseWithInstallment,
        OperationType::Withdraw,
        OperationType::CreditVoucher,
    ];

    /// Operation types stored with a negative amount.
    pub const DEBITS: [OperationType; 2] = [OperationType::NormalPurchase, OperationType::Withdraw];

    /// Operation types stored with a positive amount.
    pub const CREDITS: [OperationType; 2] = [
        OperationType::PurchaseWithInstallment,
        OperationType::CreditVoucher,
    ];

    fn entry(&self) -> &'static (OperationType, i64, &'static str) {
        let row = match self {
            OperationType::NormalPurchase => 0,
            OperationType::PurchaseWithInstallment => 1,
            OperationType::Withdraw => 2,
            OperationType::CreditVoucher => 3,
        };
        &OPERATION_TABLE[row]
    }

    /// External name, e.g. `Purchase_With_Installment`.
    pub fn as_str(&self) -> &'static str {
        self.entry().2
    }

    /// Integer code persisted in the `operation_type` column.
    pub fn code(&self) -> i64 {
        self.entry().1
    }

    pub fn from_code(code: i64) -> Result<Self, ParseOperationTypeError> {
        OPERATION_TABLE
            .iter()
            .find(|(_, c, _)| *c == code)
            .map(|(op, _, _)| *op)
            .ok_or(ParseOperationTypeError::UnknownCode(code))
    }

    pub fn is_debit(&self) -> bool {
        matches!(self, OperationType::NormalPurchase | OperationType::Withdraw)
    }

    pub fn is_credit(&self) -> bool {
        !self.is_debit()
    }

    /// Apply this operation's sign to a positive magnitude.
    pub fn apply_sign(&self, magnitude: Cents) -> Cents {
        if self.is_debit() {
            -magnitude.abs()
        } else {
            magnitude.abs()
        }
    }
}

impl FromStr for OperationType {
    type Err = ParseOperationTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_");
        OPERATION_TABLE
            .iter()
            .find(|(_, _, name)| name.eq_ignore_ascii_case(&normalized))
            .map(|(op, _, _)| *op)
            .ok_or_else(|| ParseOperationTypeError::UnknownName(s.to_string()))
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseOperationTypeError {
    #[error(
        "unknown operation type '{0}' (expected one of Normal_Purchase, Purchase_With_Installment, Withdraw, Credit_Voucher)"
    )]
    UnknownName(String),

    #[error("unknown operation type code {0}")]
    UnknownCode(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_type_names_roundtrip() {
        for op in OperationType::ALL {
            assert_eq!(op.as_str().parse::<OperationType>(), Ok(op));
            assert_eq!(OperationType::from_code(op.code()), Ok(op));
        }
    }

    #[test]
    fn test_every_variant_owns_its_table_row() {
        for op in OperationType::ALL {
            assert_eq!(op.entry().0, op);
        }
        let codes: std::collections::HashSet<i64> =
            OperationType::ALL.iter().map(|op| op.code()).collect();
        assert_eq!(codes.len(), OperationType::ALL.len());
    }

    #[test]
    fn test_persisted_codes() {
        assert_eq!(OperationType::NormalPurchase.code(), 1);
        assert_eq!(OperationType::PurchaseWithInstallment.code(), 2);
        assert_eq!(OperationType::Withdraw.code(), 3);
        assert_eq!(OperationType::CreditVoucher.code(), 4);
    }

    #[test]
    fn test_parse_is_lenient_about_case_and_dashes() {
        assert_eq!(
            "purchase-with-installment".parse(),
            Ok(OperationType::PurchaseWithInstallment)
        );
        assert_eq!("WITHDRAW".parse(), Ok(OperationType::Withdraw));
        assert_eq!(" credit_voucher ".parse(), Ok(OperationType::CreditVoucher));
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        // No silent fallback to the first variant
        assert_eq!(
            "Unknown".parse::<OperationType>(),
            Err(ParseOperationTypeError::UnknownName("Unknown".into()))
        );
        assert!("".parse::<OperationType>().is_err());
        assert!("NormalPurchase".parse::<OperationType>().is_err());
        assert_eq!(
            OperationType::from_code(0),
            Err(ParseOperationTypeError::UnknownCode(0))
        );
        assert!(OperationType::from_code(5).is_err());
    }

    #[test]
    fn test_debit_credit_classification() {
        for op in OperationType::DEBITS {
            assert!(op.is_debit());
            assert!(!op.is_credit());
        }
        for op in OperationType::CREDITS {
            assert!(op.is_credit());
            assert!(!op.is_debit());
        }
    }

    #[test]
    fn test_apply_sign() {
        assert_eq!(OperationType::NormalPurchase.apply_sign(5000), -5000);
        assert_eq!(OperationType::Withdraw.apply_sign(2350), -2350);
        assert_eq!(OperationType::PurchaseWithInstallment.apply_sign(6000), 6000);
        assert_eq!(OperationType::CreditVoucher.apply_sign(100), 100);
        // Sign comes from the operation, never from the input
        assert_eq!(OperationType::CreditVoucher.apply_sign(-100), 100);
    }

    #[test]
    fn test_serde_uses_external_names() {
        let json = serde_json::to_string(&OperationType::PurchaseWithInstallment).unwrap();
        assert_eq!(json, "\"Purchase_With_Installment\"");
        let parsed: OperationType = serde_json::from_str("\"Credit_Voucher\"").unwrap();
        assert_eq!(parsed, OperationType::CreditVoucher);
    }
}
