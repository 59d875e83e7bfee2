//! DST Tests for MemoryManager
//!
//! TigerStyle: Budget, ordering and pinning are checked after every step of
//! seeded conversations.

use std::time::Duration;

use turnkeeper::dst::{DeterministicRng, SimConfig, Simulation};
use turnkeeper::{
    ConsolidationStrategy, MemoryConfig, MemoryError, MemoryManager, Provenance, Role,
    SharedMemoryManager, SimClock, Turn, TurnOptions, TIME_MS_PER_HOUR,
};

/// Content counting as exactly `tokens` under the default counter.
fn text(tokens: usize) -> String {
    "abc ".repeat(tokens)
}

fn manager_at(clock: SimClock, ceiling: usize, reserve: usize) -> MemoryManager {
    MemoryManager::builder()
        .with_config(MemoryConfig::new().with_budget(ceiling, reserve))
        .with_clock(clock)
        .build()
        .unwrap()
}

fn assert_chronological(turns: &[Turn]) {
    assert!(
        turns.windows(2).all(|w| w[0].order_key() < w[1].order_key()),
        "turns out of chronological order"
    );
}

// =============================================================================
// Budget Scenarios
// =============================================================================

#[tokio::test]
async fn test_dst_third_large_append_triggers_remediation() {
    let sim = Simulation::new(SimConfig::with_seed(42));

    sim.run(|env| async move {
        let mut memory = manager_at(env.clock.clone(), 1000, 100);

        let system = memory
            .append(Role::System, text(50), TurnOptions::pinned())
            .await?;
        let first = memory
            .append(Role::User, text(500), TurnOptions::default())
            .await?;
        assert!(!first.remediated());

        let third = memory
            .append(Role::User, text(500), TurnOptions::default())
            .await?;

        assert!(third.remediated(), "1050 tokens must not fit a 900 budget");
        assert!(memory.total_tokens() <= 900);
        assert!(memory.get(system.id).is_some_and(Turn::is_pinned));
        assert_eq!(memory.get(system.id).map(Turn::token_count), Some(50));
        assert_chronological(memory.turns());

        Ok::<_, MemoryError>(())
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_dst_pinned_turn_larger_than_budget() {
    let mut memory = manager_at(SimClock::new(), 200, 150);

    let result = memory
        .append(Role::System, text(80), TurnOptions::pinned())
        .await;

    match result {
        Err(MemoryError::BudgetExceeded {
            required_ceiling,
            ceiling,
            reserve,
            pinned_tokens,
        }) => {
            assert_eq!(pinned_tokens, 80);
            assert_eq!(ceiling, 200);
            assert_eq!(reserve, 150);
            assert_eq!(required_ceiling, 230);
        }
        other => panic!("expected BudgetExceeded, got {other:?}"),
    }
    assert!(memory.is_empty());
}

#[tokio::test]
async fn test_dst_adjacent_stale_turns_summarized_together() {
    let sim = Simulation::new(SimConfig::with_seed(7));

    sim.run(|env| async move {
        let mut memory = manager_at(env.clock.clone(), 1000, 100);
        let mut stale = Vec::new();
        for _ in 0..5 {
            let appended = memory
                .append(Role::Assistant, text(100), TurnOptions::default())
                .await?;
            stale.push(appended.id);
        }
        env.advance_time_ms(TIME_MS_PER_HOUR);

        let result = memory
            .append(Role::User, text(750), TurnOptions::default())
            .await?;

        // One merge, not five evictions
        assert_eq!(result.records.len(), 1);
        let record = &result.records[0];
        assert_eq!(record.turn_ids, stale);
        assert_ne!(record.strategy, ConsolidationStrategy::Evict);
        assert_eq!(memory.turns()[0].provenance(), Provenance::Summary);
        assert!(memory.total_tokens() <= 900);

        Ok::<_, MemoryError>(())
    })
    .await
    .unwrap();
}

// =============================================================================
// Seeded Conversations
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_dst_random_conversations_stay_under_budget() {
    for seed in turnkeeper::test_seeds(10) {
        let sim = Simulation::new(SimConfig::with_seed(seed)).with_summarizer_faults(0.3);

        sim.run(|mut env| async move {
            let mut memory = env.create_manager(
                MemoryConfig::new()
                    .with_budget(800, 200)
                    .with_summarizer_deadline_ms(100),
            )?;
            let mut rng = DeterministicRng::new(seed);

            for _ in 0..60 {
                let role = *rng.choose(&[Role::User, Role::Assistant]);
                let tokens = rng.next_usize(1, 250);
                let options = if rng.next_bool(0.05) {
                    TurnOptions::pinned()
                } else {
                    TurnOptions::default()
                };
                let pinned = options.pinned;

                match memory.append(role, text(tokens), options).await {
                    Ok(_) => {}
                    Err(err) if pinned && err.is_budget_exceeded() => {}
                    Err(err) => return Err(err),
                }

                assert!(memory.total_tokens() <= memory.budget_tokens());
                assert!(memory.pinned_tokens() <= memory.budget_tokens());
                assert_chronological(memory.turns());

                if rng.next_bool(0.2) {
                    let target = rng.next_usize(0, 600);
                    if let Ok(context) = memory.get_context(Some(target)) {
                        let used: usize = context.iter().map(Turn::token_count).sum();
                        assert!(used <= target);
                        assert_chronological(&context);
                    }
                }
                env.advance_time_ms(rng.next_u64_in(0, 90_000));
            }

            Ok(())
        })
        .await
        .unwrap_or_else(|e| panic!("seed {seed}: {e}"));
    }
}

#[tokio::test]
async fn test_dst_same_seed_same_outcome() {
    async fn run(seed: u64) -> Vec<(String, Provenance)> {
        let clock = SimClock::at_ms(1_000_000);
        let mut memory = manager_at(clock.clone(), 600, 100);
        let mut rng = DeterministicRng::new(seed);
        for _ in 0..40 {
            let tokens = rng.next_usize(5, 150);
            memory
                .append(Role::User, text(tokens), TurnOptions::default())
                .await
                .unwrap();
            clock.advance_ms(rng.next_u64_in(0, 300_000));
        }
        memory
            .turns()
            .iter()
            .map(|t| (t.content().to_string(), t.provenance()))
            .collect()
    }

    assert_eq!(run(99).await, run(99).await);
}

// =============================================================================
// Access Tracking
// =============================================================================

#[tokio::test]
async fn test_dst_context_marks_turns_accessed() {
    let clock = SimClock::at_ms(10_000);
    let mut memory = manager_at(clock.clone(), 1000, 100);
    let question = memory
        .append(Role::User, "What time is checkout?", TurnOptions::default())
        .await
        .unwrap();
    clock.advance_ms(5_000);

    memory.get_context(None).unwrap();
    memory.get_context(None).unwrap();

    let turn = memory.get(question.id).unwrap();
    assert_eq!(turn.access_count(), 2);
    assert_eq!(turn.last_accessed_ms(), 15_000);
    assert_eq!(turn.created_at_ms(), 10_000);
}

#[tokio::test]
async fn test_default_clock_follows_wall_time() {
    let mut memory = MemoryManager::new(MemoryConfig::new().with_budget(1000, 100)).unwrap();

    let first = memory
        .append(Role::User, "Is the pool open?", TurnOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = memory
        .append(Role::Assistant, "Until nine tonight.", TurnOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let before_ms = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap();
    let context = memory.get_context(None).unwrap();

    let created = |id| memory.get(id).map(Turn::created_at_ms).unwrap();
    assert!(created(second.id) >= created(first.id) + 15);
    for turn in &context {
        assert!(
            turn.last_accessed_ms() >= before_ms,
            "last access {} before call at {before_ms}",
            turn.last_accessed_ms()
        );
        assert!(turn.last_accessed_at().timestamp_millis() >= turn.created_at().timestamp_millis());
    }
}

// =============================================================================
// Shared Handle
// =============================================================================

#[tokio::test]
async fn test_shared_manager_serializes_appends() {
    let shared = SharedMemoryManager::new(manager_at(SimClock::new(), 2000, 200));

    let mut handles = Vec::new();
    for i in 0..8 {
        let shared = shared.clone();
        handles.push(tokio::spawn(async move {
            shared
                .append(Role::User, text(100 + i), TurnOptions::default())
                .await
                .map(|r| r.id)
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let diagnostics = shared.diagnostics().await;
    assert!(diagnostics.total_tokens <= diagnostics.budget_tokens);
    let context = shared.get_context(None).await.unwrap();
    assert_eq!(context.len(), diagnostics.turn_count);
    assert_chronological(&context);
}
