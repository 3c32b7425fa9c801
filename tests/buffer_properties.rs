use std::collections::HashMap;
use std::sync::Arc;

use dhbuffer::{Buffer, ManualClock, Status};
use proptest::prelude::*;

/// One insert in a generated trace, with the clock step taken before it.
#[derive(Debug, Clone)]
struct Step {
    subject: usize,
    name: usize,
    status: Status,
    score: f32,
    advance_ms: u64,
}

const SUBJECTS: [&str; 3] = ["node-1", "node-2", "node-3"];
const NAMES: [&str; 4] = ["cpu", "disk", "network", "zab"];

fn status_strategy() -> impl Strategy<Value = Status> {
    prop::sample::select(Status::all().to_vec())
}

fn step_strategy() -> impl Strategy<Value = Step> {
    (0..SUBJECTS.len(), 0..NAMES.len(), status_strategy(), 0.0f32..1.0, 0u64..50).prop_map(
        |(subject, name, status, score, advance_ms)| Step {
            subject,
            name,
            status,
            score,
            advance_ms,
        },
    )
}

/// Expected bucket state computed directly from the trace.
#[derive(Debug, PartialEq)]
struct Expected {
    score: f32,
    count: u64,
    first: u64,
    last: u64,
}

proptest! {
    #[test]
    fn counts_and_timestamps_match_trace(steps in prop::collection::vec(step_strategy(), 1..200)) {
        let clock = Arc::new(ManualClock::new(1_000));
        let buffer: Buffer = Buffer::with_clock(clock.clone());
        let mut expected: HashMap<(String, String, Status), Expected> = HashMap::new();
        let mut now = 1_000u64;

        for step in &steps {
            clock.advance(step.advance_ms);
            now += step.advance_ms;

            let subject = SUBJECTS[step.subject];
            let name = NAMES[step.name];
            buffer.insert(subject, name, step.status, step.score);

            expected
                .entry((subject.to_string(), name.to_string(), step.status))
                .and_modify(|e| {
                    e.count += 1;
                    e.last = now;
                })
                .or_insert(Expected {
                    score: step.score,
                    count: 1,
                    first: now,
                    last: now,
                });
        }

        let aggregates = buffer.aggregates();
        prop_assert_eq!(aggregates.len(), expected.len());

        for agg in &aggregates {
            prop_assert!(agg.count >= 1);
            prop_assert!(agg.first <= agg.last);

            let want = expected
                .get(&(agg.subject.clone(), agg.name.clone(), agg.status))
                .expect("every bucket comes from the trace");
            let got = Expected {
                score: agg.score,
                count: agg.count,
                first: agg.first,
                last: agg.last,
            };
            prop_assert_eq!(&got, want);
        }

        let total: u64 = aggregates.iter().map(|a| a.count).sum();
        prop_assert_eq!(total, steps.len() as u64);
    }

    #[test]
    fn subjects_are_isolated(
        before in prop::collection::vec(step_strategy(), 1..50),
        after in prop::collection::vec(step_strategy(), 1..50),
    ) {
        let buffer: Buffer = Buffer::with_clock(Arc::new(ManualClock::new(5)));

        // Seed every subject, then only touch node-1 afterwards.
        for step in &before {
            buffer.insert(SUBJECTS[step.subject], NAMES[step.name], step.status, step.score);
        }

        let snapshot = |subject: &str| {
            let mut aggs = buffer.aggregates_for(subject);
            aggs.sort_by(|a, b| (&a.name, a.status).cmp(&(&b.name, b.status)));
            aggs
        };
        let node2 = snapshot("node-2");
        let node3 = snapshot("node-3");

        for step in &after {
            buffer.insert("node-1", NAMES[step.name], step.status, step.score);
        }

        prop_assert_eq!(snapshot("node-2"), node2);
        prop_assert_eq!(snapshot("node-3"), node3);
    }

    #[test]
    fn backwards_clock_never_breaks_ordering(readings in prop::collection::vec(0u64..10_000, 1..100)) {
        let buffer: Buffer = Buffer::with_clock(Arc::new(ManualClock::scripted(readings.clone())));

        for _ in &readings {
            buffer.insert("s", "n", Status::Healthy, 0.5);
        }

        let value = buffer.get("s", "n", Status::Healthy).expect("bucket exists");
        prop_assert_eq!(value.count(), readings.len() as u64);
        prop_assert_eq!(value.first(), readings[0]);
        prop_assert_eq!(value.last(), readings.iter().copied().max().unwrap_or(0));
        prop_assert!(value.first() <= value.last());
    }
}
