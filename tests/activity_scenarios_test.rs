//! 调度器 + 路由器集成测试：逐步驱动 Scheduler::step，MockBrain 脚本化回复

use std::sync::Arc;
use std::time::Duration;

use cadence::activity::{ActivityStatus, GOAL_PROGRESS_KEY, RELEVANT_MEMORIES_KEY};
use cadence::core::{ActivityRegistry, ReadyQueue, Scheduler, StepOutcome};
use cadence::gateway::{Envelope, EventRouter, RouteOutcome};
use cadence::memory::{EpisodicStore, InMemoryEpisodicStore};
use cadence::react::{BrainOp, MockBrain};
use cadence::Activity;
use serde_json::json;

const TICK: Duration = Duration::from_millis(20);

struct Harness {
    brain: Arc<MockBrain>,
    scheduler: Scheduler,
    router: Arc<EventRouter>,
}

fn harness() -> Harness {
    let brain = Arc::new(MockBrain::new());
    let registry = Arc::new(ActivityRegistry::new());
    let queue = Arc::new(ReadyQueue::new());
    let scheduler = Scheduler::new(registry.clone(), queue.clone(), brain.clone());
    let router = Arc::new(EventRouter::new(registry, queue));
    Harness {
        brain,
        scheduler,
        router,
    }
}

/// 推进到 ACTION 阶段挂起前：observe(不完成) -> reason
async fn drive_to_action(h: &Harness, activity: &Arc<Activity>) {
    for _ in 0..2 {
        h.scheduler.step(TICK).await.unwrap();
    }
    assert_eq!(activity.status(), ActivityStatus::Action);
}

#[tokio::test]
async fn scenario_completes_on_first_observation() {
    let h = harness();
    h.brain.push_reply(BrainOp::Observe, r#"{"completed":true}"#);
    let a = h.scheduler.submit("ping").unwrap();
    assert_eq!(a.status(), ActivityStatus::Observation);

    let outcome = h.scheduler.step(TICK).await.unwrap();
    assert_eq!(outcome, StepOutcome::Completed { id: a.id() });
    assert_eq!(a.status(), ActivityStatus::Completed);
    assert_eq!(a.history_len(), 1);
    assert!(h.scheduler.registry().get(a.id()).is_none());
    assert!(h.scheduler.step(TICK).await.is_none());
}

#[tokio::test]
async fn scenario_tool_call_parks_until_event() {
    let h = harness();
    h.brain.push_reply(BrainOp::Act, r#"{"tool_name": "timerTool", "summary": "timer set"}"#);
    let a = h.scheduler.submit("wait for the timer").unwrap();
    drive_to_action(&h, &a).await;

    let outcome = h.scheduler.step(TICK).await.unwrap();
    assert_eq!(outcome, StepOutcome::Parked { id: a.id() });
    assert_eq!(a.status(), ActivityStatus::WaitingForEvent);
    assert!(!h.scheduler.queue().contains(a.id()));
    assert!(h.scheduler.registry().contains(a.id()));
    assert!(h.scheduler.step(TICK).await.is_none());

    let routed = h
        .router
        .route(&Envelope::event(a.id().to_string(), json!({"timer": "fired"})));
    assert_eq!(routed, Ok(RouteOutcome::Woken));
    assert_eq!(a.status(), ActivityStatus::Observation);
    assert!(h.scheduler.queue().contains(a.id()));

    h.scheduler.step(TICK).await.unwrap();
    let observe = h.brain.calls_of(BrainOp::Observe);
    let events = observe.last().unwrap().events.clone().unwrap();
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&events).unwrap(),
        json!([{"timer": "fired"}])
    );
    assert_eq!(a.last_step().unwrap().events, vec![json!({"timer": "fired"})]);
    assert!(!a.has_events());
}

/// 路由器在另一线程投递事件，与 ACTION 挂起并发；无论谁赢，恰好入队一次
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_event_racing_suspension_enqueues_once() {
    for round in 0..500 {
        let h = harness();
        h.brain.push_reply(BrainOp::Act, r#"{"tool_name": "timerTool"}"#);
        let a = h.scheduler.submit("race the timer").unwrap();
        drive_to_action(&h, &a).await;

        let router = h.router.clone();
        let envelope = Envelope::event(a.id().to_string(), json!({"round": round}));
        let deliver = tokio::task::spawn_blocking(move || router.route(&envelope));
        let (stepped, routed) = tokio::join!(h.scheduler.step(TICK), deliver);
        let stepped = stepped.unwrap();
        let routed = routed.unwrap().unwrap();

        assert_eq!(a.status(), ActivityStatus::Observation, "round {}", round);
        assert_eq!(h.scheduler.queue().len(), 1, "round {}", round);
        assert!(h.scheduler.queue().contains(a.id()));
        assert!(a.has_events());
        match routed {
            RouteOutcome::Woken => assert_eq!(stepped, StepOutcome::Parked { id: a.id() }),
            RouteOutcome::EventBuffered => assert_eq!(
                stepped,
                StepOutcome::Requeued { id: a.id(), status: ActivityStatus::Observation }
            ),
            other => panic!("unexpected route outcome {:?}", other),
        }
    }
}

#[tokio::test]
async fn scenario_event_during_action_skips_waiting() {
    let h = harness();
    h.brain.push_reply(BrainOp::Act, r#"{"tool_name": "timerTool"}"#);
    let a = h.scheduler.submit("race").unwrap();
    drive_to_action(&h, &a).await;

    // 工具的完成事件在 act 调用尚未返回时到达
    let router = h.router.clone();
    let id = a.id().to_string();
    h.brain.set_hook(move |call| {
        if call.op == BrainOp::Act {
            let outcome = router.route(&Envelope::event(id.as_str(), json!({"early": true})));
            assert_eq!(outcome, Ok(RouteOutcome::EventBuffered));
        }
    });

    let outcome = h.scheduler.step(TICK).await.unwrap();
    assert_eq!(
        outcome,
        StepOutcome::Requeued { id: a.id(), status: ActivityStatus::Observation }
    );
    assert_eq!(a.status(), ActivityStatus::Observation);
    assert_eq!(h.scheduler.queue().ids(), vec![a.id()]);
    assert!(a.has_events());
}

#[tokio::test]
async fn scenario_belief_update_isolated_to_target() {
    let h = harness();
    let y = h.scheduler.submit("activity y").unwrap();
    let z = h.scheduler.submit("activity z").unwrap();

    let routed = h
        .router
        .route(&Envelope::belief(y.id().to_string(), "k", json!(42)));
    assert_eq!(routed, Ok(RouteOutcome::BeliefStored));

    h.scheduler.step(TICK).await.unwrap();
    h.scheduler.step(TICK).await.unwrap();

    assert_eq!(y.last_step().unwrap().beliefs.get("k"), Some(&json!(42)));
    assert!(z.last_step().unwrap().beliefs.get("k").is_none());
    assert!(z.get_belief("k").is_none());
    let z_call = h
        .brain
        .calls_of(BrainOp::Observe)
        .into_iter()
        .find(|c| c.goal == "activity z")
        .unwrap();
    assert!(!z_call.beliefs.contains("\"k\""));
}

#[tokio::test]
async fn events_never_leak_between_activities() {
    let h = harness();
    let a = h.scheduler.submit("activity a").unwrap();
    let b = h.scheduler.submit("activity b").unwrap();

    h.router
        .route(&Envelope::event(a.id().to_string(), json!("for a")))
        .unwrap();
    assert!(a.has_events());
    assert!(!b.has_events());

    h.scheduler.step(TICK).await.unwrap();
    h.scheduler.step(TICK).await.unwrap();
    assert_eq!(a.history()[0].events, vec![json!("for a")]);
    assert!(b.history()[0].events.is_empty());
}

#[test]
fn consume_events_drains_exactly_once() {
    let a = Activity::new("g");
    a.push_event(json!(1));
    a.push_event(json!(2));
    assert_eq!(a.consume_events(), vec![json!(1), json!(2)]);
    assert!(a.consume_events().is_empty());
}

#[tokio::test]
async fn malformed_brain_output_takes_conservative_path() {
    let h = harness();
    h.brain.push_reply(BrainOp::Observe, "Sure! I think we are done here.");
    h.brain.push_reply(BrainOp::Act, "I called the calculator tool");
    let a = h.scheduler.submit("g").unwrap();

    assert_eq!(
        h.scheduler.step(TICK).await.unwrap(),
        StepOutcome::Requeued { id: a.id(), status: ActivityStatus::Reasoning }
    );
    h.scheduler.step(TICK).await.unwrap();
    assert_eq!(
        h.scheduler.step(TICK).await.unwrap(),
        StepOutcome::Requeued { id: a.id(), status: ActivityStatus::Observation }
    );
    assert!(a.get_belief(GOAL_PROGRESS_KEY).is_none());
}

#[tokio::test]
async fn observation_applies_progress_and_belief_updates() {
    let h = harness();
    h.brain.push_reply(
        BrainOp::Observe,
        "```json\n{\"completed\": false, \"new_progress\": \"1 [ ] call api\", \"update_variables\": {\"attempts\": 1, \"city\": \"Paris\"}}\n```",
    );
    let a = h.scheduler.submit("g").unwrap();
    h.scheduler.step(TICK).await.unwrap();

    assert_eq!(a.get_belief(GOAL_PROGRESS_KEY), Some(json!("1 [ ] call api")));
    assert_eq!(a.get_belief("attempts"), Some(json!(1)));
    assert_eq!(a.get_belief("city"), Some(json!("Paris")));
}

#[tokio::test]
async fn transitions_follow_edges_and_history_grows() {
    let h = harness();
    h.brain.push_reply(BrainOp::Act, r#"{"tool_name": "fetch"}"#);
    h.brain.push_reply(BrainOp::Observe, r#"{"completed": false}"#);
    h.brain.push_reply(BrainOp::Observe, r#"{"result": {"completed": "true"}}"#);
    let a = h.scheduler.submit("g").unwrap();

    let mut statuses = vec![a.status()];
    let mut lengths = vec![a.history_len()];
    for _ in 0..3 {
        h.scheduler.step(TICK).await.unwrap();
        statuses.push(a.status());
        lengths.push(a.history_len());
    }
    h.router
        .route(&Envelope::event(a.id().to_string(), json!({"ok": true})))
        .unwrap();
    statuses.push(a.status());
    while h.scheduler.step(TICK).await.is_some() {
        statuses.push(a.status());
        lengths.push(a.history_len());
    }

    assert_eq!(a.status(), ActivityStatus::Completed);
    for pair in statuses.windows(2) {
        assert!(
            pair[0] == pair[1] || pair[0].can_transition_to(pair[1]),
            "illegal transition {} -> {}",
            pair[0],
            pair[1]
        );
    }
    assert!(lengths.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn completion_reflects_into_memory_and_later_goals_recall_it() {
    let brain = Arc::new(MockBrain::new());
    brain.push_reply(BrainOp::Observe, r#"{"completed": true}"#);
    brain.push_reply(
        BrainOp::Reflect,
        r#"{"summary": "weather report fetched via api", "outcome": "SUCCESS", "procedure": ["call weather api"]}"#,
    );
    let store = Arc::new(InMemoryEpisodicStore::default());
    let scheduler = Scheduler::new(
        Arc::new(ActivityRegistry::new()),
        Arc::new(ReadyQueue::new()),
        brain.clone(),
    )
    .with_store(store.clone())
    .with_recall_top_k(2);

    scheduler.submit("fetch weather report").unwrap();
    scheduler.step(TICK).await.unwrap();
    scheduler.flush_reflections().await;

    let reflect = brain.calls_of(BrainOp::Reflect);
    assert_eq!(reflect.len(), 1);
    assert_eq!(reflect[0].progress.as_deref(), Some("COMPLETED"));
    assert_eq!(store.len(), 1);
    assert_eq!(store.retrieve_top_k("weather", 1).len(), 1);

    let next = scheduler.submit("weather report for tomorrow").unwrap();
    let recalled = next.get_belief(RELEVANT_MEMORIES_KEY).unwrap();
    assert_eq!(recalled.as_array().unwrap().len(), 1);
}
