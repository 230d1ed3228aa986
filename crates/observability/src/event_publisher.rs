use std::sync::Arc;

use async_trait::async_trait;
use orchestrator_domain::events::OrchestratorEvent;
use orchestrator_domain::ports::EventSink;
use tokio::sync::broadcast;
use tracing::trace;

use crate::metrics_collector::MetricsCollector;
use crate::structured_logger::StructuredLogger;

/// 默认事件发布器
///
/// 记录结构化日志、更新指标，并转发到广播通道供外部总线适配器订阅。
/// 没有订阅者或订阅者落后时事件直接丢弃，不会阻塞控制平面。
pub struct EventPublisher {
    sender: broadcast::Sender<OrchestratorEvent>,
    metrics: Arc<MetricsCollector>,
}

impl EventPublisher {
    pub fn new(capacity: usize, metrics: Arc<MetricsCollector>) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, metrics }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl EventSink for EventPublisher {
    async fn publish(&self, event: OrchestratorEvent) {
        StructuredLogger::log_event(&event);
        self.metrics.record_event(&event);
        if self.sender.send(event).is_err() {
            trace!("没有事件订阅者，事件已丢弃");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use orchestrator_domain::events::{DomainEvent, TaskEvent};
    use orchestrator_domain::models::QueueTier;

    fn queued(task_id: &str) -> OrchestratorEvent {
        OrchestratorEvent::task(
            TaskEvent::Queued {
                task_id: task_id.to_string(),
                tier: QueueTier::Normal,
                retry_count: 0,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_fail() {
        let publisher = EventPublisher::new(8, Arc::new(MetricsCollector::new()));
        assert_eq!(publisher.subscriber_count(), 0);
        publisher.publish(queued("t-1")).await;
    }

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let publisher = EventPublisher::new(8, Arc::new(MetricsCollector::new()));
        let mut rx = publisher.subscribe();

        publisher.publish(queued("t-1")).await;
        publisher.publish(queued("t-2")).await;

        assert_eq!(rx.recv().await.unwrap().aggregate_id(), "t-1");
        assert_eq!(rx.recv().await.unwrap().aggregate_id(), "t-2");
    }

    #[tokio::test]
    async fn test_lagging_subscriber_does_not_block_publisher() {
        let publisher = EventPublisher::new(2, Arc::new(MetricsCollector::new()));
        let mut rx = publisher.subscribe();

        for i in 0..5 {
            publisher.publish(queued(&format!("t-{i}"))).await;
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        assert_eq!(rx.recv().await.unwrap().aggregate_id(), "t-3");
    }
}
