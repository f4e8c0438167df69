//! Property-based tests for the state machine
//!
//! Navigation must be undoable step by step, and the global commands must
//! behave the same from every state.

use super::state::Step;
use super::transition::TransitionResult;
use super::*;
use crate::catalog::CatalogNode;
use crate::runtime::testing::EngineFixture;
use proptest::prelude::*;

const USER: &str = "2335550100@s.whatsapp.net";

// ============================================================================
// Test Helpers
// ============================================================================

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
        .block_on(future)
}

async fn step(fixture: &EngineFixture, state: Option<&ConversationState>, text: &str) -> TransitionResult {
    transition(&fixture.ctx, USER, state, &Event::parse(text))
        .await
        .unwrap()
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_nodes() -> impl Strategy<Value = Vec<CatalogNode>> {
    proptest::sample::subsequence(EngineFixture::nested_nodes(), 0..=5)
}

fn arb_page() -> impl Strategy<Value = ConversationState> {
    prop_oneof![
        arb_nodes().prop_map(ConversationState::main_menu),
        arb_nodes().prop_map(ConversationState::service_selection),
        proptest::sample::select(EngineFixture::nested_nodes()).prop_map(ConversationState::order_confirmation),
        "[a-f0-9]{8}".prop_map(ConversationState::in_conversation),
        Just(ConversationState {
            step: Step::Unknown,
            ..ConversationState::default()
        }),
    ]
}

/// Any page, with an arbitrary history behind it (possibly none)
fn arb_state() -> impl Strategy<Value = ConversationState> {
    (arb_page(), proptest::collection::vec(arb_page(), 0..4)).prop_map(|(mut state, history)| {
        state.nav_stack = history;
        state
    })
}

/// Menu picks; "1" on a confirmation page would place an order, so walks
/// stop there
fn arb_picks() -> impl Strategy<Value = Vec<usize>> {
    proptest::collection::vec(1usize..=3, 0..=10)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Every forward move is undone by exactly one `back`, in reverse order
    #[test]
    fn prop_back_undoes_each_descent(picks in arb_picks()) {
        let fixture = EngineFixture::nested();
        block_on(async {
            let SessionUpdate::Replace(menu) = step(&fixture, None, "menu").await.update else {
                panic!("menu must replace the state");
            };

            let mut history: Vec<ConversationState> = Vec::new();
            let mut current = menu.clone();
            for pick in picks {
                if current.step == Step::OrderConfirmation {
                    break;
                }
                let result = step(&fixture, Some(&current), &pick.to_string()).await;
                match result.update {
                    SessionUpdate::Keep => {}
                    SessionUpdate::Replace(next) => {
                        assert_eq!(next.nav_stack.len(), current.nav_stack.len() + 1);
                        history.push(current);
                        current = next;
                    }
                    SessionUpdate::Delete => panic!("navigation must not end the session"),
                }
            }

            while let Some(expected) = history.pop() {
                let result = step(&fixture, Some(&current), "back").await;
                let SessionUpdate::Replace(previous) = result.update else {
                    panic!("back must replace the state");
                };
                assert_eq!(&previous, &expected);
                current = previous;
            }

            // At the bottom, back lands on a fresh main menu
            let result = step(&fixture, Some(&current), "back").await;
            assert_eq!(result.update, SessionUpdate::Replace(menu));
        });
        prop_assert!(fixture.orders.all().is_empty());
    }

    /// `menu` always resets to the roots with no history
    #[test]
    fn prop_menu_resets_from_anywhere(state in arb_state()) {
        let fixture = EngineFixture::nested();
        let result = block_on(step(&fixture, Some(&state), "MENU"));
        let SessionUpdate::Replace(next) = result.update else {
            panic!("menu must replace the state");
        };
        prop_assert_eq!(next.step, Step::MainMenu);
        prop_assert!(next.nav_stack.is_empty());
        prop_assert_eq!(next.services.len(), 2);
        prop_assert!(result.reply.starts_with(render::WELCOME));
    }

    /// `help` answers without touching the state
    #[test]
    fn prop_help_keeps_state(state in arb_state()) {
        let fixture = EngineFixture::nested();
        let result = block_on(step(&fixture, Some(&state), " help "));
        prop_assert_eq!(result.update, SessionUpdate::Keep);
        prop_assert_eq!(result.reply, EngineFixture::HELP);
    }

    /// `back` pops one level, or lands on the main menu when there is none
    #[test]
    fn prop_back_pops_one_level(state in arb_state()) {
        let fixture = EngineFixture::nested();
        let result = block_on(step(&fixture, Some(&state), "go back"));
        let SessionUpdate::Replace(next) = result.update else {
            panic!("back must replace the state");
        };
        match state.pop_back() {
            Some(previous) => prop_assert_eq!(next, previous),
            None => {
                prop_assert_eq!(next.step, Step::MainMenu);
                prop_assert!(next.nav_stack.is_empty());
            }
        }
    }
}
