//! Plain-text rendering of snapshots for the command line monitor.

use std::fmt::Write;

use rdist_protocol::Report;

const RULE: &str = "-----------";

/// Formats a report as three blocks: consumers, buffer, producers.
pub fn format_report(report: &Report) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "==== {} ====", report.generated_at.format("%H:%M:%S"));

    let _ = writeln!(out, "consumers ({})", report.consumers.len());
    for consumer in &report.consumers {
        let _ = writeln!(
            out,
            "consumer {}:\n   resources consumed: {}\n   status: {}\n{RULE}",
            consumer.id,
            consumer.resources_consumed,
            consumer.status.label()
        );
    }

    let _ = writeln!(out, "buffer ({})", report.buffer.len());
    for resource in &report.buffer {
        let _ = writeln!(
            out,
            "resource {}:\n   produced by: {}\n{RULE}",
            resource.id, resource.producer
        );
    }

    let _ = writeln!(out, "producers ({})", report.producers.len());
    for producer in &report.producers {
        let _ = writeln!(
            out,
            "producer {}:\n   resources produced: {}\n   status: {}\n{RULE}",
            producer.id,
            producer.count,
            producer.status.label()
        );
    }

    for event in &report.events {
        let _ = writeln!(out, "event: {}", event.message);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use rdist_core::{ConsumerId, ConsumerState, ProducerId, ProducerState, ResourceId};
    use rdist_protocol::{ConsumerReport, ProducerReport, ResourceReport};

    fn report() -> Report {
        Report {
            consumers: vec![ConsumerReport {
                id: ConsumerId::new(0),
                resources_consumed: 4,
                status: ConsumerState::Hungry,
            }],
            producers: vec![ProducerReport {
                id: ProducerId::new(1),
                status: ProducerState::Waiting,
                count: 9,
            }],
            buffer: vec![ResourceReport {
                id: ResourceId::new(12),
                producer: ProducerId::new(1),
            }],
            events: vec![],
            generated_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_format_report_lists_every_group() {
        let text = format_report(&report());
        assert!(text.contains("consumer 0:\n   resources consumed: 4\n   status: hungry"));
        assert!(text.contains("resource 12:\n   produced by: 1"));
        assert!(text.contains("producer 1:\n   resources produced: 9\n   status: waiting"));
        assert!(text.starts_with("==== 22:13:20 ===="));
    }

    #[test]
    fn test_format_empty_report() {
        let mut empty = report();
        empty.consumers.clear();
        empty.buffer.clear();
        empty.producers.clear();

        let text = format_report(&empty);
        assert!(text.contains("consumers (0)"));
        assert!(text.contains("buffer (0)"));
        assert!(text.contains("producers (0)"));
        assert!(!text.contains(RULE));
    }
}
