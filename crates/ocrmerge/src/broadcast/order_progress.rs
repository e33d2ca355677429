//! Order progress broadcaster for real-time status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::order::{Order, OrderStatus};

/// What happened.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Submitted,
    ItemStarted,
    ItemCompleted,
    ItemFailed,
    ItemRetried,
    /// The order rolled up or was moved by a merge.
    StatusChanged,
    MergeCompleted,
    MergeFailed,
    ReportExported,
}

impl std::fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressPhase::Submitted => write!(f, "Submitted"),
            ProgressPhase::ItemStarted => write!(f, "Extracting item"),
            ProgressPhase::ItemCompleted => write!(f, "Item completed"),
            ProgressPhase::ItemFailed => write!(f, "Item failed"),
            ProgressPhase::ItemRetried => write!(f, "Item retried"),
            ProgressPhase::StatusChanged => write!(f, "Status changed"),
            ProgressPhase::MergeCompleted => write!(f, "Merge completed"),
            ProgressPhase::MergeFailed => write!(f, "Merge failed"),
            ProgressPhase::ReportExported => write!(f, "Report exported"),
        }
    }
}

/// Progress event for an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderProgressEvent {
    pub order_id: String,
    /// Set for item-level phases.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub phase: ProgressPhase,
    pub status: OrderStatus,
    pub total_items: u32,
    pub completed_items: u32,
    pub failed_items: u32,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OrderProgressEvent {
    /// Snapshot of `order` tagged with `phase`.
    pub fn new(order: &Order, phase: ProgressPhase, message: &str) -> Self {
        Self {
            order_id: order.id.clone(),
            item_id: None,
            phase,
            status: order.status,
            total_items: order.total_items,
            completed_items: order.completed_items,
            failed_items: order.failed_items,
            message: message.to_string(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn for_item(mut self, item_id: &str) -> Self {
        self.item_id = Some(item_id.to_string());
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Percentage of counted items that have resolved.
    pub fn percent_resolved(&self) -> u8 {
        if self.total_items == 0 {
            return 0;
        }
        let resolved = u64::from(self.completed_items + self.failed_items);
        ((resolved * 100) / u64::from(self.total_items)).min(100) as u8
    }
}

/// Broadcasts order progress events.
#[derive(Clone)]
pub struct OrderProgressBroadcaster {
    sender: Arc<broadcast::Sender<OrderProgressEvent>>,
}

impl OrderProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: OrderProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderProgressEvent> {
        self.sender.subscribe()
    }

    /// Tracker bound to one order.
    pub fn track(&self, order_id: &str) -> OrderProgressTracker {
        OrderProgressTracker {
            order_id: order_id.to_string(),
            sender: Arc::clone(&self.sender),
        }
    }
}

impl Default for OrderProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Emits events for a single order.
pub struct OrderProgressTracker {
    order_id: String,
    sender: Arc<broadcast::Sender<OrderProgressEvent>>,
}

impl OrderProgressTracker {
    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn order_event(&self, order: &Order, phase: ProgressPhase, message: &str) {
        let _ = self.sender.send(OrderProgressEvent::new(order, phase, message));
    }

    pub fn item_event(&self, order: &Order, item_id: &str, phase: ProgressPhase, message: &str) {
        let event = OrderProgressEvent::new(order, phase, message).for_item(item_id);
        let _ = self.sender.send(event);
    }

    pub fn item_failed(&self, order: &Order, item_id: &str, error: &str) {
        let event = OrderProgressEvent::new(order, ProgressPhase::ItemFailed, "Item failed")
            .for_item(item_id)
            .with_error(error);
        let _ = self.sender.send(event);
    }

    pub fn merge_failed(&self, order: &Order, error: &str) {
        let event = OrderProgressEvent::new(order, ProgressPhase::MergeFailed, "Merge failed")
            .with_error(error);
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        let mut order = Order::new(Some("batch".to_string()));
        order.status = OrderStatus::Processing;
        order.total_items = 4;
        order.completed_items = 2;
        order.failed_items = 1;
        order
    }

    #[test]
    fn test_broadcaster_send_receive() {
        let broadcaster = OrderProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();

        broadcaster.send(OrderProgressEvent::new(&order(), ProgressPhase::Submitted, "Submitted"));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.phase, ProgressPhase::Submitted);
        assert_eq!(received.status, OrderStatus::Processing);
        assert!(received.item_id.is_none());
    }

    #[test]
    fn test_tracker_item_events() {
        let broadcaster = OrderProgressBroadcaster::default();
        let mut rx = broadcaster.subscribe();
        let order = order();
        let tracker = broadcaster.track(&order.id);
        assert_eq!(tracker.order_id(), order.id);

        tracker.item_event(&order, "item-1", ProgressPhase::ItemStarted, "Extracting");
        tracker.item_failed(&order, "item-2", "vendor timeout");

        let started = rx.try_recv().unwrap();
        assert_eq!(started.item_id.as_deref(), Some("item-1"));
        assert_eq!(started.phase, ProgressPhase::ItemStarted);

        let failed = rx.try_recv().unwrap();
        assert_eq!(failed.phase, ProgressPhase::ItemFailed);
        assert_eq!(failed.error.as_deref(), Some("vendor timeout"));
    }

    #[test]
    fn test_percent_resolved() {
        let event = OrderProgressEvent::new(&order(), ProgressPhase::ItemCompleted, "");
        assert_eq!(event.percent_resolved(), 75);

        let empty = OrderProgressEvent::new(&Order::new(None), ProgressPhase::Submitted, "");
        assert_eq!(empty.percent_resolved(), 0);
    }

    #[test]
    fn test_send_without_subscribers() {
        let broadcaster = OrderProgressBroadcaster::new(1);
        broadcaster.send(OrderProgressEvent::new(&order(), ProgressPhase::Submitted, ""));
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let event = OrderProgressEvent::new(&order(), ProgressPhase::MergeFailed, "Merge failed")
            .with_error("no keys");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["phase"], "merge_failed");
        assert_eq!(json["status"], "PROCESSING");
        assert_eq!(json["completedItems"], 2);
        assert!(json.get("itemId").is_none());
    }
}
