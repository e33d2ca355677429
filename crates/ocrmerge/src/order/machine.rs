//! Order state machine rules.
//!
//! ```text
//! DRAFT → PROCESSING → MAPPING → COMPLETED
//!               │   ↖
//!               ├→ COMPLETED
//!               └→ FAILED ─(retry)─┘
//! ```

use std::collections::HashSet;

use super::model::{Order, OrderStatus};
use crate::error::OrderError;

/// Upper bound on user-selected join keys.
pub const MAX_MAPPING_KEYS: usize = 3;

impl OrderStatus {
    /// Whether `next` is a legal successor of this status.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Draft, Processing)
                | (Processing, Mapping)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Mapping, Completed)
                | (Failed, Processing)
        )
    }
}

pub fn ensure_transition(order: &Order, next: OrderStatus) -> Result<(), OrderError> {
    if order.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(OrderError::InvalidOrderTransition {
            id: order.id.clone(),
            from: order.status.to_string(),
            to: next.to_string(),
        })
    }
}

/// Fails with `InvalidState` unless the order is in one of `allowed`.
pub fn require_status(
    order: &Order,
    allowed: &[OrderStatus],
    operation: &'static str,
) -> Result<(), OrderError> {
    if allowed.contains(&order.status) {
        Ok(())
    } else {
        Err(OrderError::InvalidState {
            id: order.id.clone(),
            status: order.status.to_string(),
            operation,
        })
    }
}

/// Trims and validates a join key selection: 1 to 3 keys, none blank, no
/// duplicates. Order is preserved.
pub fn validate_mapping_keys(keys: &[String]) -> Result<Vec<String>, OrderError> {
    let trimmed: Vec<String> = keys.iter().map(|k| k.trim().to_string()).collect();

    if trimmed.is_empty() || trimmed.len() > MAX_MAPPING_KEYS {
        return Err(OrderError::InvalidMappingKeys(format!(
            "expected 1 to {} keys, got {}",
            MAX_MAPPING_KEYS,
            trimmed.len()
        )));
    }
    if trimmed.iter().any(|k| k.is_empty()) {
        return Err(OrderError::InvalidMappingKeys(
            "keys must not be blank".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for key in &trimmed {
        if !seen.insert(key.as_str()) {
            return Err(OrderError::InvalidMappingKeys(format!(
                "duplicate key '{}'",
                key
            )));
        }
    }

    Ok(trimmed)
}

/// Facts about a fully resolved order that decide where it rolls up to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RollupFacts {
    pub completed_items: u32,
    pub failed_items: u32,
    pub total_items: u32,
    /// Order keys are set or a template resolves for a completed item.
    pub mapping_resolvable: bool,
    /// Completed items carry both primary and attachment files.
    pub has_mergeable_files: bool,
}

impl RollupFacts {
    pub fn for_order(order: &Order) -> Self {
        Self {
            completed_items: order.completed_items,
            failed_items: order.failed_items,
            total_items: order.total_items,
            ..Default::default()
        }
    }
}

/// Target status once every item has resolved, or `None` while items are
/// still outstanding.
pub fn rollup_target(facts: &RollupFacts) -> Option<OrderStatus> {
    if facts.total_items == 0 || facts.completed_items + facts.failed_items != facts.total_items {
        return None;
    }
    if facts.completed_items > 0 && facts.mapping_resolvable && facts.has_mergeable_files {
        Some(OrderStatus::Mapping)
    } else if facts.failed_items == 0 {
        Some(OrderStatus::Completed)
    } else {
        Some(OrderStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_legal_transitions() {
        use OrderStatus::*;
        assert!(Draft.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Mapping));
        assert!(Mapping.can_transition_to(Completed));
        assert!(Failed.can_transition_to(Processing));

        assert!(!Draft.can_transition_to(Completed));
        assert!(!Mapping.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Processing.can_transition_to(Draft));
    }

    #[test]
    fn test_ensure_transition_error() {
        let order = Order::new(None);
        let err = ensure_transition(&order, OrderStatus::Mapping).unwrap_err();
        assert!(matches!(err, OrderError::InvalidOrderTransition { .. }));
    }

    #[test]
    fn test_require_status() {
        let order = Order::new(None);
        assert!(require_status(&order, &[OrderStatus::Draft], "add_item").is_ok());
        let err = require_status(&order, &[OrderStatus::Mapping], "merge").unwrap_err();
        assert!(err.to_string().contains("merge"));
    }

    #[test]
    fn test_validate_mapping_keys() {
        assert_eq!(
            validate_mapping_keys(&keys(&[" phone ", "acct"])).unwrap(),
            keys(&["phone", "acct"])
        );
        assert!(validate_mapping_keys(&[]).is_err());
        assert!(validate_mapping_keys(&keys(&["a", "b", "c", "d"])).is_err());
        assert!(validate_mapping_keys(&keys(&["a", " "])).is_err());
        assert!(validate_mapping_keys(&keys(&["a", "a "])).is_err());
    }

    #[test]
    fn test_rollup_waits_for_all_items() {
        let facts = RollupFacts {
            completed_items: 1,
            failed_items: 0,
            total_items: 2,
            mapping_resolvable: true,
            has_mergeable_files: true,
        };
        assert_eq!(rollup_target(&facts), None);
    }

    #[test]
    fn test_rollup_targets() {
        let mut facts = RollupFacts {
            completed_items: 2,
            failed_items: 0,
            total_items: 2,
            mapping_resolvable: true,
            has_mergeable_files: true,
        };
        assert_eq!(rollup_target(&facts), Some(OrderStatus::Mapping));

        facts.has_mergeable_files = false;
        assert_eq!(rollup_target(&facts), Some(OrderStatus::Completed));

        facts.completed_items = 1;
        facts.failed_items = 1;
        assert_eq!(rollup_target(&facts), Some(OrderStatus::Failed));

        facts.completed_items = 0;
        facts.failed_items = 2;
        facts.has_mergeable_files = true;
        assert_eq!(rollup_target(&facts), Some(OrderStatus::Failed));
    }
}
