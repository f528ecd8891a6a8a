#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::config::{OrderingMode, SchedulerConfig};
    use crate::error::{BoundaryFailure, RenderError};
    use crate::node::{BoundaryOutput, Node, ResumeState};
    use crate::scheduler::{BoundaryId, BoundaryScheduler, BoundaryUnit, UnitStatus};

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn delayed(label: &str, ms: u64) -> Node {
        let label = label.to_string();
        Node::boundary("…", move || async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<Node, BoundaryFailure>(Node::element("p").child(label).into())
        })
        .into()
    }

    fn prioritized(priority: i32, ms: u64) -> Node {
        Node::boundary("…", move || async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<_, BoundaryFailure>(Node::text(priority.to_string()))
        })
        .priority(priority)
        .into()
    }

    fn explode() -> Result<Node, BoundaryFailure> {
        panic!("boom")
    }

    async fn drain_all(scheduler: &mut BoundaryScheduler) -> Vec<BoundaryUnit> {
        let mut emitted = Vec::new();
        loop {
            let batch = scheduler.drain().await;
            if batch.is_empty() {
                return emitted;
            }
            emitted.extend(batch);
        }
    }

    fn priorities(units: &[BoundaryUnit]) -> Vec<i32> {
        units.iter().map(BoundaryUnit::priority).collect()
    }

    #[tokio::test]
    async fn test_drain_with_no_units_returns_immediately() {
        let mut scheduler = BoundaryScheduler::new(SchedulerConfig::default());
        assert!(scheduler.drain().await.is_empty());
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_every_unit_exactly_once() {
        let mut scheduler = BoundaryScheduler::new(SchedulerConfig::default());
        let markup = scheduler
            .render_tree(Node::list(vec![delayed("a", 30), delayed("b", 10), delayed("c", 20)]))
            .unwrap();
        assert_eq!(markup.matches("data-boundary-id").count(), 3);

        let emitted = drain_all(&mut scheduler).await;
        let ids: Vec<BoundaryId> = emitted.iter().map(BoundaryUnit::id).collect();
        assert_eq!(ids, vec![BoundaryId::new(1), BoundaryId::new(2), BoundaryId::new(0)]);
        assert!(emitted.iter().all(|unit| unit.status() == UnitStatus::Complete));
        assert_eq!(emitted[0].result_markup(), Some("<p>b</p>"));
        assert!(emitted.iter().all(|unit| unit.started_at().is_some()));
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.stats().completed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_ceiling_is_respected() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let boundaries: Vec<Node> = (0..50)
            .map(|i| {
                let active = active.clone();
                let peak = peak.clone();
                Node::boundary("…", move || async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5 + (i % 7) as u64)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, BoundaryFailure>(Node::empty())
                })
                .into()
            })
            .collect();

        let config = SchedulerConfig::default().with_concurrency_limit(3);
        let mut scheduler = BoundaryScheduler::new(config);
        scheduler.render_tree(Node::list(boundaries)).unwrap();

        assert_eq!(scheduler.rendering_count(), 3);
        assert_eq!(scheduler.pending_count(), 47);

        let emitted = drain_all(&mut scheduler).await;
        assert_eq!(emitted.len(), 50);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(scheduler.stats().peak_rendering, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_does_not_block_other_units() {
        let config =
            SchedulerConfig::default().with_boundary_timeout(Some(Duration::from_millis(50)));
        let mut scheduler = BoundaryScheduler::new(config);
        scheduler.render_tree(Node::list(vec![delayed("slow", 5_000), delayed("fast", 10)])).unwrap();

        let emitted = drain_all(&mut scheduler).await;
        assert_eq!(emitted.len(), 2);

        assert_eq!(emitted[0].id(), BoundaryId::new(1));
        assert_eq!(emitted[0].status(), UnitStatus::Complete);

        assert_eq!(emitted[1].id(), BoundaryId::new(0));
        assert_eq!(emitted[1].status(), UnitStatus::Error);
        assert_eq!(emitted[1].failure(), Some(&BoundaryFailure::TimedOut(50)));
        assert_eq!(scheduler.stats().timed_out, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_units_time_out_from_admission() {
        let config = SchedulerConfig::default()
            .with_concurrency_limit(1)
            .with_boundary_timeout(Some(Duration::from_millis(50)));
        let mut scheduler = BoundaryScheduler::new(config);
        scheduler.render_tree(Node::list(vec![delayed("a", 40), delayed("b", 40)])).unwrap();

        let emitted = drain_all(&mut scheduler).await;
        assert!(emitted.iter().all(|unit| unit.status() == UnitStatus::Complete));
    }

    #[tokio::test]
    async fn test_task_failure_becomes_error_unit() {
        let mut scheduler = BoundaryScheduler::new(SchedulerConfig::default());
        scheduler
            .render_tree(
                Node::boundary("…", || async {
                    Err::<Node, _>(BoundaryFailure::task("database unavailable"))
                })
                .into(),
            )
            .unwrap();

        let emitted = drain_all(&mut scheduler).await;
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].status(), UnitStatus::Error);
        assert_eq!(emitted[0].failure(), Some(&BoundaryFailure::task("database unavailable")));
        assert_eq!(scheduler.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_panicking_task_becomes_error_unit() {
        let mut scheduler = BoundaryScheduler::new(SchedulerConfig::default());
        scheduler
            .render_tree(Node::list(vec![
                Node::boundary("…", || async { explode() }).into(),
                delayed("ok", 0),
            ]))
            .unwrap();

        let emitted = drain_all(&mut scheduler).await;
        assert_eq!(emitted.len(), 2);

        let panicked = emitted.iter().find(|unit| unit.id() == BoundaryId::new(0)).unwrap();
        assert_eq!(panicked.failure(), Some(&BoundaryFailure::Panicked("boom".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_mode_emits_higher_priority_first() {
        // Higher priorities take longer, so completion order is the reverse.
        let config = SchedulerConfig::default().with_ordering(OrderingMode::Priority);
        let mut scheduler = BoundaryScheduler::new(config);
        scheduler.render_tree(Node::list((1..=5).map(|p| prioritized(p, p as u64 * 10)))).unwrap();

        let emitted = drain_all(&mut scheduler).await;
        assert_eq!(priorities(&emitted), vec![5, 4, 3, 2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_mode_emits_as_units_finish() {
        let mut scheduler = BoundaryScheduler::new(SchedulerConfig::default());
        scheduler.render_tree(Node::list((1..=5).map(|p| prioritized(p, p as u64 * 10)))).unwrap();

        let emitted = drain_all(&mut scheduler).await;
        assert_eq!(priorities(&emitted), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_order_mode_follows_registration() {
        let config = SchedulerConfig::default().in_order();
        let mut scheduler = BoundaryScheduler::new(config);
        scheduler
            .render_tree(Node::list(vec![delayed("a", 30), delayed("b", 20), delayed("c", 10)]))
            .unwrap();

        let emitted = drain_all(&mut scheduler).await;
        let ids: Vec<u32> = emitted.iter().map(|unit| unit.id().get()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_boundaries_are_registered_on_resolution() {
        let mut scheduler = BoundaryScheduler::new(SchedulerConfig::default());
        scheduler
            .render_tree(
                Node::boundary("outer…", || async {
                    Ok::<Node, BoundaryFailure>(
                        Node::element("section").child(delayed("inner", 10)).into(),
                    )
                })
                .into(),
            )
            .unwrap();

        let emitted = drain_all(&mut scheduler).await;
        assert_eq!(emitted.len(), 2);

        assert_eq!(emitted[0].id(), BoundaryId::new(0));
        let outer = emitted[0].result_markup().unwrap();
        assert!(outer.starts_with("<section><weft-boundary data-boundary-id=\"1\""));

        assert_eq!(emitted[1].id(), BoundaryId::new(1));
        assert_eq!(emitted[1].result_markup(), Some("<p>inner</p>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_resolution_abandons_nested_units() {
        let mut scheduler = BoundaryScheduler::new(SchedulerConfig::default());
        scheduler
            .render_tree(
                Node::boundary("outer…", || async {
                    Ok::<_, BoundaryFailure>(Node::list(vec![
                        delayed("inner", 10),
                        Node::component("Broken", json!({}), |_| {
                            Err(RenderError::component("Broken", "missing prop"))
                        }),
                    ]))
                })
                .into(),
            )
            .unwrap();

        let emitted = drain_all(&mut scheduler).await;
        assert_eq!(emitted.len(), 1);
        assert!(matches!(emitted[0].failure(), Some(BoundaryFailure::Render(_))));
        assert_eq!(scheduler.stats().abandoned, 1);
    }

    fn nesting(ms: u64, inner: Node) -> Node {
        Node::boundary("outer…", move || async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<Node, BoundaryFailure>(Node::element("section").child(inner).into())
        })
        .into()
    }

    fn ids(units: &[BoundaryUnit]) -> Vec<u32> {
        units.iter().map(|unit| unit.id().get()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_mode_emits_parent_before_higher_priority_child() {
        let config = SchedulerConfig::default().with_ordering(OrderingMode::Priority);
        let mut scheduler = BoundaryScheduler::new(config);
        scheduler.render_tree(nesting(5, prioritized(5, 10))).unwrap();

        let emitted = drain_all(&mut scheduler).await;
        assert_eq!(ids(&emitted), vec![0, 1]);
        assert_eq!(emitted[1].parent(), Some(BoundaryId::new(0)));
        assert_eq!(emitted[1].priority(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_mode_holds_subtree_behind_higher_sibling() {
        let config = SchedulerConfig::default().with_ordering(OrderingMode::Priority);
        let mut scheduler = BoundaryScheduler::new(config);
        scheduler
            .render_tree(Node::list(vec![nesting(5, prioritized(5, 10)), prioritized(3, 40)]))
            .unwrap();

        // Ids: 0 = parent, 1 = sibling, 2 = nested child.
        let emitted = drain_all(&mut scheduler).await;
        assert_eq!(ids(&emitted), vec![1, 0, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_order_mode_emits_parent_before_nested_child() {
        let config = SchedulerConfig::default().in_order();
        let mut scheduler = BoundaryScheduler::new(config);
        scheduler
            .render_tree(Node::list(vec![nesting(5, delayed("inner", 10)), delayed("b", 30)]))
            .unwrap();

        let emitted = drain_all(&mut scheduler).await;
        assert_eq!(ids(&emitted), vec![0, 1, 2]);
        assert_eq!(emitted[2].parent(), Some(BoundaryId::new(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_high_priority_unit_releases_held_units() {
        let config = SchedulerConfig::default()
            .with_ordering(OrderingMode::Priority)
            .with_boundary_timeout(Some(Duration::from_millis(50)));
        let mut scheduler = BoundaryScheduler::new(config);
        let start = tokio::time::Instant::now();
        let tree = Node::list(vec![prioritized(10, 5_000), prioritized(1, 10), prioritized(2, 20)]);
        scheduler.render_tree(tree).unwrap();

        let batch = scheduler.drain().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50), "released early after {elapsed:?}");
        assert!(elapsed < Duration::from_millis(60), "held too long: {elapsed:?}");

        assert_eq!(priorities(&batch), vec![10, 2, 1]);
        assert_eq!(batch[0].failure(), Some(&BoundaryFailure::TimedOut(50)));
        assert!(batch[1..].iter().all(|unit| unit.status() == UnitStatus::Complete));
        assert!(scheduler.drain().await.is_empty());
    }

    #[tokio::test]
    async fn test_resume_state_is_kept_on_the_unit() {
        let mut scheduler = BoundaryScheduler::new(SchedulerConfig::default());
        scheduler
            .render_tree(
                Node::boundary("…", || async {
                    Ok::<_, BoundaryFailure>(
                        BoundaryOutput::new(Node::text("3 items")).with_state(&json!({"count": 3})),
                    )
                })
                .into(),
            )
            .unwrap();

        let emitted = drain_all(&mut scheduler).await;
        assert_eq!(emitted[0].state(), Some(&ResumeState::Value(json!({"count": 3}))));
    }

    #[tokio::test]
    async fn test_cancel_all_aborts_outstanding_work() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let boundaries: Vec<Node> = (0..3)
            .map(|_| {
                let guard = DropCounter(dropped.clone());
                Node::boundary("…", move || async move {
                    let _guard = guard;
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<_, BoundaryFailure>(Node::empty())
                })
                .into()
            })
            .collect();

        let config = SchedulerConfig::default().with_concurrency_limit(2);
        let mut scheduler = BoundaryScheduler::new(config);
        scheduler.render_tree(Node::list(boundaries)).unwrap();
        tokio::task::yield_now().await;

        assert_eq!(scheduler.cancel_all(), 3);
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.rendering_count(), 0);

        for _ in 0..10 {
            if dropped.load(Ordering::SeqCst) == 3 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(dropped.load(Ordering::SeqCst), 3);
        assert!(scheduler.drain().await.is_empty());
    }

    #[tokio::test]
    async fn test_dropping_scheduler_aborts_tasks() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let guard = DropCounter(dropped.clone());

        let mut scheduler = BoundaryScheduler::new(SchedulerConfig::default());
        scheduler
            .render_tree(
                Node::boundary("…", move || async move {
                    let _guard = guard;
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<_, BoundaryFailure>(Node::empty())
                })
                .into(),
            )
            .unwrap();
        tokio::task::yield_now().await;
        drop(scheduler);

        for _ in 0..10 {
            if dropped.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_tree_render_abandons_registered_units() {
        let mut scheduler = BoundaryScheduler::new(SchedulerConfig::default());
        let result = scheduler.render_tree(Node::list(vec![
            delayed("a", 10),
            Node::element("bad tag").into(),
        ]));

        assert_eq!(result, Err(RenderError::InvalidTag("bad tag".to_string())));
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.stats().abandoned, 1);
    }
}
