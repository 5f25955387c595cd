#![allow(non_snake_case)]
use mystery_box::{
    Activation,
    CloseOutcome,
    MoveAttempt,
    MoveVerdict,
    Placement,
    ledger::Counts,
    test_helpers::*,
};
use std::time::Duration;
use tokio::time::sleep;

const PLAYER: u64 = 42;

async fn settled(ctx: &mut TestContext) {
    ctx.app().request_open(PLAYER).unwrap();
    sleep(Duration::from_millis(600)).await;
    assert!(ctx.app().registry().find(PLAYER).unwrap().is_ready());
}

#[tokio::test(start_paused = true)]
async fn loot_session_ended__full_inventory__drops_reward_at_player() {
    // given
    let mut ctx = TestContext::new_with_counts(Counts::from([(PLAYER, 1)]));
    ctx.connect(PLAYER);
    ctx.host().set_inventory_full(PLAYER, true);
    settled(&mut ctx).await;

    // when
    let outcome = ctx.app().loot_session_ended(PLAYER).unwrap();

    // then
    assert!(matches!(
        outcome,
        Some(CloseOutcome::Delivered {
            placement: Placement::Dropped,
            ..
        })
    ));
    assert_eq!(ctx.host().dropped(PLAYER).len(), 1);
    assert_eq!(ctx.app().query_unopened_count(PLAYER).unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn item_removed__player_took_reward__close_hands_over_nothing_more() {
    // given
    let mut ctx = TestContext::new_with_counts(Counts::from([(PLAYER, 1)]));
    let slot = ctx.connect(PLAYER);
    settled(&mut ctx).await;
    let item = ctx.host().take_from_slot(slot, PLAYER).unwrap();

    // when
    let routed = ctx.app().item_removed(slot, item);
    let outcome = ctx.app().request_close(PLAYER).unwrap();

    // then
    assert!(routed);
    assert_eq!(outcome, CloseOutcome::Collected);
    assert_eq!(ctx.host().inventory(PLAYER).len(), 1);
    assert_eq!(ctx.app().query_unopened_count(PLAYER).unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn external_move__into_settled_slot__pushes_reward_to_inventory() {
    // given
    let mut ctx = TestContext::new_with_counts(Counts::from([(PLAYER, 1)]));
    let slot = ctx.connect(PLAYER);
    settled(&mut ctx).await;
    let intruder = ctx.host().spawn_loose("stones", 50);

    // when
    let verdict = ctx.app().external_move(&MoveAttempt {
        item: intruder,
        from: None,
        to: Some(slot),
    });

    // then
    assert_eq!(verdict, MoveVerdict::Reject);
    assert_eq!(ctx.host().slot_contents(slot), None);
    assert_eq!(ctx.host().inventory(PLAYER).len(), 1);
    assert_eq!(ctx.app().request_close(PLAYER).unwrap(), CloseOutcome::Collected);
}

#[tokio::test(start_paused = true)]
async fn external_move__out_of_spinning_slot__is_rejected() {
    // given
    let mut ctx = TestContext::new_with_counts(Counts::from([(PLAYER, 1)]));
    let slot = ctx.connect(PLAYER);
    ctx.app().request_open(PLAYER).unwrap();
    sleep(Duration::from_millis(150)).await;
    let candidate = ctx
        .app()
        .registry()
        .find_by_slot(slot)
        .and_then(|controller| controller.held_item())
        .unwrap();

    // when
    let verdict = ctx.app().external_move(&MoveAttempt {
        item: candidate.handle,
        from: Some(slot),
        to: None,
    });

    // then
    assert_eq!(verdict, MoveVerdict::Reject);
    assert!(ctx.app().is_viewing(PLAYER));
}

#[tokio::test(start_paused = true)]
async fn user_connected__still_loading__activates_on_retry() {
    // given
    let mut ctx = TestContext::new_with_counts(Counts::from([(PLAYER, 1)]));
    ctx.host().set_interactive(PLAYER, true);
    ctx.host().set_receiving_snapshot(PLAYER, true);
    assert_eq!(ctx.app().user_connected(PLAYER), Activation::Deferred);

    // when
    sleep(mystery_box::app::RECONNECT_RETRY_DELAY).await;
    ctx.host().set_receiving_snapshot(PLAYER, false);
    let activated = ctx.app().retry_deferred();

    // then
    assert_eq!(activated, vec![PLAYER]);
    assert!(ctx.app().request_open(PLAYER).unwrap().started());
}

#[tokio::test(start_paused = true)]
async fn shutdown__mid_spin__refunds_every_player() {
    // given
    let mut ctx = TestContext::new_with_counts(Counts::from([(1, 1), (2, 5)]));
    for user in [1, 2] {
        ctx.host().set_interactive(user, true);
    }
    assert_eq!(ctx.app().activate_all([1, 2, 3]), 3);
    ctx.app().request_open(1).unwrap();
    ctx.app().request_open(2).unwrap();
    sleep(Duration::from_millis(220)).await;

    // when
    ctx.app().shutdown().unwrap();

    // then
    assert!(ctx.app().registry().is_empty());
    assert_eq!(ctx.app().query_unopened_count(1).unwrap(), 1);
    assert_eq!(ctx.app().query_unopened_count(2).unwrap(), 5);
    assert_eq!(ctx.host().stray_items(), 0);
}
