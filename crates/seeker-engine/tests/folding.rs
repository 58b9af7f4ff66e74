//! Folding under pressure: interactions pile up until projected usage
//! crosses the trigger, folding keeps the budget and loses no turns.

use seeker_engine::{ContextManager, FoldingDirective, heuristic_counter};

fn long_turn(words: usize) -> String {
    vec!["research"; words].join(" ")
}

#[test]
fn pressure_triggers_granular_condensation_and_respects_budget() {
    let budget = 2_000;
    let mut manager = ContextManager::new(heuristic_counter())
        .with_budget(budget)
        .with_working_capacity(5);

    // Inject interactions until projected usage crosses 75% of budget.
    let mut directives = Vec::new();
    for i in 0..40 {
        manager.observe("observe", format!("{i} {}", long_turn(60)));
        let projected = manager.usage();
        if manager.should_fold(projected) {
            let directive = manager.fallback_directive(projected);
            directives.push(directive);
            manager.apply(directive).unwrap();
        }
    }

    assert!(
        directives.contains(&FoldingDirective::GranularCondensation),
        "expected at least one granular condensation, got {directives:?}"
    );
    assert!(manager.usage() <= budget, "usage {} over budget", manager.usage());
    assert!(manager.working_len() <= 5);

    // No turn was lost silently.
    assert_eq!(&manager.represented_turn_ids(), manager.observed_turn_ids());
}

#[test]
fn repeated_deep_consolidation_converges_to_top_level() {
    let mut manager = ContextManager::new(heuristic_counter())
        .with_budget(100_000)
        .with_working_capacity(2);

    for _ in 0..20 {
        manager.observe("t", long_turn(50));
    }
    for _ in 0..4 {
        manager.apply(FoldingDirective::DeepConsolidation { level: 2 }).unwrap();
    }

    // Still complete coverage after aggressive folding.
    assert_eq!(&manager.represented_turn_ids(), manager.observed_turn_ids());
}
