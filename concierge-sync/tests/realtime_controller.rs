use concierge_core::RealtimeSettings;
use concierge_storage::{HostStorage, MemoryStorage};
use concierge_sync::query::QueryStore;
use concierge_sync::realtime::REALTIME_PREFERENCE_KEY;
use concierge_sync::{evaluate, InMemoryQueryStore, QueryEvent, QueryKey, RealtimeInputs, SmartRealtimeController};
use concierge_test_utils::fixtures::signed_in_session;
use concierge_test_utils::generators::arb_role;
use concierge_test_utils::{ManualClock, Role};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_general_user_is_ineligible_and_toggle_is_noop() {
    let storage = Arc::new(MemoryStorage::new());
    let controller = SmartRealtimeController::new(
        RealtimeSettings::default(),
        signed_in_session("g1", Role::GeneralUser),
        storage.clone(),
    );

    let state = controller.state();
    assert!(!state.is_enabled);
    assert!(!state.can_toggle);

    let after = controller.toggle();
    assert_eq!(after, state);
    assert!(storage.get_item(REALTIME_PREFERENCE_KEY).unwrap().is_none());
}

#[test]
fn test_super_user_defaults_on_at_sixty_seconds() {
    let controller = SmartRealtimeController::new(
        RealtimeSettings::default(),
        signed_in_session("s1", Role::SuperUser),
        Arc::new(MemoryStorage::new()),
    );
    let state = controller.state();
    assert!(state.is_enabled);
    assert_eq!(state.interval, Duration::from_millis(60_000));
    assert_eq!(state.effective_interval, Duration::from_millis(60_000));
}

#[test]
fn test_stored_preference_overrides_default() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set_item(REALTIME_PREFERENCE_KEY, "false").unwrap();
    let controller = SmartRealtimeController::new(
        RealtimeSettings::default(),
        signed_in_session("s1", Role::SuperUser),
        storage,
    );
    assert!(!controller.state().is_enabled);
}

proptest! {
    #[test]
    fn prop_hidden_page_never_polls(role in arb_role(), stored in proptest::option::of(any::<bool>()), for_users in any::<bool>()) {
        let settings = RealtimeSettings { enable_for_users: for_users, ..RealtimeSettings::default() };
        let state = evaluate(&settings, &RealtimeInputs { role: Some(role), stored_preference: stored, page_visible: false });
        prop_assert_eq!(state.effective_interval, Duration::ZERO);
    }

    #[test]
    fn prop_only_privileged_roles_get_the_short_interval(role in arb_role(), stored in proptest::option::of(any::<bool>())) {
        let settings = RealtimeSettings { enable_for_users: true, ..RealtimeSettings::default() };
        let state = evaluate(&settings, &RealtimeInputs { role: Some(role), stored_preference: stored, page_visible: true });
        if state.interval < Duration::from_millis(settings.regular_interval_ms) {
            prop_assert!(role.is_privileged());
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_polling_follows_visibility() {
    let clock = Arc::new(ManualClock::starting_now());
    let store = Arc::new(InMemoryQueryStore::new(clock, Duration::from_secs(1800)));
    let mut events = store.subscribe();
    let controller = SmartRealtimeController::new(
        RealtimeSettings::default(),
        signed_in_session("s1", Role::SuperUser),
        Arc::new(MemoryStorage::new()),
    );

    let users = QueryKey::new("users");
    let handle = controller.spawn_polling(store.clone(), vec![users.clone()]);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(events.try_recv().unwrap(), QueryEvent::Invalidated(users.clone()));

    controller.set_page_visible(false);
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(events.try_recv().is_err());

    controller.set_page_visible(true);
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(events.try_recv().unwrap(), QueryEvent::Invalidated(users));

    handle.stop();
}
