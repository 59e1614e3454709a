//! Receipt status state machine.
//!
//! ```text
//! processing ──> review ──> approved
//!     │  ^         ^  │
//!     v  │         │  v
//!    failed      duplicate
//! ```

pub mod audit;

pub use audit::{AuditFormatter, Patch, ReceiptUpdate, apply_update, status_entry};

use crate::error::{KabalaError, Result};
use crate::models::receipt::{FieldName, ReceiptFields, ReceiptStatus};

/// Fields that must be present before approval.
pub const REQUIRED_FOR_APPROVAL: [FieldName; 4] = [
    FieldName::VendorName,
    FieldName::DocumentDate,
    FieldName::TotalAmount,
    FieldName::Category,
];

/// Whether the lifecycle allows moving from `from` to `to`.
pub fn can_transition(from: ReceiptStatus, to: ReceiptStatus) -> bool {
    use ReceiptStatus::*;

    matches!(
        (from, to),
        (Processing, Review)
            | (Processing, Failed)
            | (Processing, Duplicate)
            | (Review, Approved)
            | (Review, Duplicate)
            | (Duplicate, Review)
            | (Failed, Processing)
    )
}

/// Error unless `from -> to` is a legal transition.
pub fn check_transition(from: ReceiptStatus, to: ReceiptStatus) -> Result<()> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(KabalaError::IllegalTransition { from, to })
    }
}

/// Field edits are accepted in `review` and `duplicate` only.
pub fn is_editable(status: ReceiptStatus) -> bool {
    matches!(status, ReceiptStatus::Review | ReceiptStatus::Duplicate)
}

pub fn check_editable(status: ReceiptStatus) -> Result<()> {
    if is_editable(status) {
        Ok(())
    } else {
        Err(KabalaError::EditNotAllowed { status })
    }
}

/// Required fields that are still empty, in display order.
pub fn missing_required(fields: &ReceiptFields) -> Vec<FieldName> {
    REQUIRED_FOR_APPROVAL
        .into_iter()
        .filter(|field| match field {
            FieldName::VendorName => fields
                .vendor_name
                .as_deref()
                .is_none_or(|v| v.trim().is_empty()),
            other => !fields.is_present(*other),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReceiptStatus::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    const ALL: [ReceiptStatus; 5] = [Processing, Review, Approved, Failed, Duplicate];

    #[test]
    fn test_legal_transitions() {
        assert!(can_transition(Processing, Review));
        assert!(can_transition(Processing, Failed));
        assert!(can_transition(Review, Approved));
        assert!(can_transition(Review, Duplicate));
        assert!(can_transition(Duplicate, Review));
        assert!(can_transition(Failed, Processing));
    }

    #[test]
    fn test_approved_is_terminal() {
        for to in ALL {
            assert!(!can_transition(Approved, to), "approved -> {}", to);
        }
    }

    #[test]
    fn test_retry_only_from_failed() {
        for from in ALL {
            assert_eq!(can_transition(from, Processing), from == Failed);
        }
    }

    #[test]
    fn test_approve_from_processing_is_illegal() {
        let err = check_transition(Processing, Approved).unwrap_err();
        assert!(matches!(
            err,
            KabalaError::IllegalTransition {
                from: Processing,
                to: Approved
            }
        ));
    }

    #[test]
    fn test_editable_states() {
        let editable: Vec<_> = ALL.into_iter().filter(|s| is_editable(*s)).collect();
        assert_eq!(editable, vec![Review, Duplicate]);
        assert!(check_editable(Approved).is_err());
    }

    #[test]
    fn test_missing_required() {
        let mut fields = ReceiptFields::default();
        assert_eq!(missing_required(&fields), REQUIRED_FOR_APPROVAL.to_vec());

        fields.vendor_name = Some("Cafe Cafe".to_string());
        fields.document_date = NaiveDate::from_ymd_opt(2024, 3, 15);
        fields.total_amount = Some(Decimal::new(11700, 2));
        assert_eq!(missing_required(&fields), vec![FieldName::Category]);

        fields.category_id = Some(3);
        assert!(missing_required(&fields).is_empty());
    }
}
