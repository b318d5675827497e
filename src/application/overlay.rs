use crate::infrastructure::overlay_module::OverlayModule;
use crate::infrastructure::scheduler::{ScheduledTask, Scheduler};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Rapid count changes (fast-typed brain-dump entries) coalesce into a
/// single native call per window.
pub const OVERLAY_COUNT_DEBOUNCE: Duration = Duration::from_millis(180);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayEventName {
    Started,
    Stopped,
    PermissionRequested,
    PermissionResult,
    PermissionTimeout,
    PermissionError,
}

impl OverlayEventName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "overlay_started",
            Self::Stopped => "overlay_stopped",
            Self::PermissionRequested => "overlay_permission_requested",
            Self::PermissionResult => "overlay_permission_result",
            Self::PermissionTimeout => "overlay_permission_timeout",
            Self::PermissionError => "overlay_permission_error",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayEventPayload {
    pub granted: Option<bool>,
}

type Listener = Arc<dyn Fn(&OverlayEventPayload) + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    listeners: Mutex<HashMap<OverlayEventName, Vec<(u64, Listener)>>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    fn add(&self, event: OverlayEventName, listener: Listener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.entry(event).or_default().push((id, listener));
        }
        id
    }

    fn remove(&self, event: OverlayEventName, id: u64) {
        if let Ok(mut listeners) = self.listeners.lock() {
            if let Some(entries) = listeners.get_mut(&event) {
                entries.retain(|(entry_id, _)| *entry_id != id);
            }
        }
    }

    fn snapshot(&self, event: OverlayEventName) -> Vec<Listener> {
        self.listeners
            .lock()
            .ok()
            .and_then(|listeners| {
                listeners
                    .get(&event)
                    .map(|entries| entries.iter().map(|(_, listener)| Arc::clone(listener)).collect())
            })
            .unwrap_or_default()
    }
}

/// Handle returned by [`OverlayBridge::add_event_listener`].
/// Unsubscribing is idempotent.
pub struct OverlaySubscription {
    registry: Arc<ListenerRegistry>,
    event: OverlayEventName,
    id: u64,
    active: AtomicBool,
}

impl OverlaySubscription {
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.registry.remove(self.event, self.id);
        }
    }
}

#[derive(Default)]
struct PendingCount {
    count: u32,
    flush: Option<ScheduledTask>,
}

struct PermissionGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for PermissionGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Mediates between UI state and the native floating-overlay module.
///
/// Native failures never reach callers: every operation degrades to
/// `false` or a no-op. On platforms without an overlay the composition
/// root wires in `NoopOverlayModule` and the same code runs unchanged.
pub struct OverlayBridge {
    module: Arc<dyn OverlayModule>,
    scheduler: Arc<dyn Scheduler>,
    pending: Arc<Mutex<PendingCount>>,
    permission_in_flight: Arc<AtomicBool>,
    registry: Arc<ListenerRegistry>,
}

impl OverlayBridge {
    pub fn new(module: Arc<dyn OverlayModule>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            module,
            scheduler,
            pending: Arc::new(Mutex::new(PendingCount::default())),
            permission_in_flight: Arc::new(AtomicBool::new(false)),
            registry: Arc::new(ListenerRegistry::default()),
        }
    }

    fn flush_now(module: &Arc<dyn OverlayModule>, pending: &Arc<Mutex<PendingCount>>) {
        let count = {
            let Ok(mut pending) = pending.lock() else {
                return;
            };
            pending.flush = None;
            pending.count
        };
        if let Err(error) = module.update_count(count) {
            log::warn!("overlay updateCount failed: {error}");
        }
    }

    fn cancel_pending_flush(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(flush) = pending.flush.take() {
                flush.cancel();
            }
        }
    }

    /// Records the latest badge value and schedules one flush per
    /// debounce window; only the most recent value ever reaches the
    /// native side.
    pub fn update_count(&self, count: i64) {
        let normalized = count.clamp(0, u32::MAX as i64) as u32;

        let Ok(mut pending) = self.pending.lock() else {
            return;
        };
        pending.count = normalized;
        let already_scheduled = pending
            .flush
            .as_ref()
            .map(|flush| !flush.is_cancelled())
            .unwrap_or(false);
        if already_scheduled {
            return;
        }

        let module = Arc::clone(&self.module);
        let shared = Arc::clone(&self.pending);
        let handle = self.scheduler.schedule(
            OVERLAY_COUNT_DEBOUNCE,
            Box::new(move || Self::flush_now(&module, &shared)),
        );
        pending.flush = Some(handle);
    }

    /// Cancels any pending debounce and pushes the latest count before
    /// starting, so the overlay never appears with a stale badge.
    pub fn start_overlay(&self) {
        self.cancel_pending_flush();
        Self::flush_now(&self.module, &self.pending);
        if let Err(error) = self.module.start_overlay() {
            log::warn!("overlay start failed: {error}");
        }
    }

    pub fn stop_overlay(&self) {
        self.cancel_pending_flush();
        if let Err(error) = self.module.stop_overlay() {
            log::warn!("overlay stop failed: {error}");
        }
    }

    pub fn collapse_overlay(&self) {
        if let Err(error) = self.module.collapse_overlay() {
            log::warn!("overlay collapse failed: {error}");
        }
    }

    pub async fn can_draw_overlays(&self) -> bool {
        match self.module.can_draw_overlays().await {
            Ok(allowed) => allowed,
            Err(error) => {
                log::warn!("overlay canDrawOverlays failed: {error}");
                false
            }
        }
    }

    pub async fn is_expanded(&self) -> bool {
        match self.module.is_expanded().await {
            Ok(expanded) => expanded,
            Err(error) => {
                log::warn!("overlay isExpanded failed: {error}");
                false
            }
        }
    }

    pub fn is_permission_request_in_progress(&self) -> bool {
        self.permission_in_flight.load(Ordering::SeqCst)
    }

    /// Requests the draw-over-apps permission. A request already in
    /// flight makes this return `false` without touching the native
    /// side, preventing duplicate permission dialogs. Native failures
    /// and the timeout sentinel also resolve to `false`.
    pub async fn request_permission(&self) -> bool {
        if self.permission_in_flight.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _guard = PermissionGuard {
            flag: Arc::clone(&self.permission_in_flight),
        };

        self.emit(OverlayEventName::PermissionRequested, OverlayEventPayload::default());

        match self.module.request_overlay_permission().await {
            Ok(granted) => {
                self.emit(
                    OverlayEventName::PermissionResult,
                    OverlayEventPayload {
                        granted: Some(granted),
                    },
                );
                granted
            }
            Err(error) => {
                let message = error.to_string();
                let lowered = message.to_ascii_lowercase();
                let event = if lowered.contains("timeout") || lowered.contains("timed out") {
                    OverlayEventName::PermissionTimeout
                } else {
                    OverlayEventName::PermissionError
                };
                log::warn!("overlay permission request failed: {message}");
                self.emit(event, OverlayEventPayload::default());
                false
            }
        }
    }

    pub fn add_event_listener(
        &self,
        event: OverlayEventName,
        listener: impl Fn(&OverlayEventPayload) + Send + Sync + 'static,
    ) -> OverlaySubscription {
        let id = self.registry.add(event, Arc::new(listener));
        OverlaySubscription {
            registry: Arc::clone(&self.registry),
            event,
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Entry point for the native event adapter; also used directly by
    /// the permission flow.
    pub fn emit(&self, event: OverlayEventName, payload: OverlayEventPayload) {
        for listener in self.registry.snapshot(event) {
            listener(&payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::error::InfraError;
    use crate::infrastructure::overlay_module::NoopOverlayModule;
    use crate::infrastructure::scheduler::ManualScheduler;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    enum FakePermissionResponse {
        Grant(bool),
        Fail(String),
        WaitThenGrant(Arc<Notify>),
    }

    #[derive(Default)]
    struct FakeOverlayModule {
        update_counts: Mutex<Vec<u32>>,
        start_calls: AtomicUsize,
        stop_calls: AtomicUsize,
        permission_calls: AtomicUsize,
        permission_responses: Mutex<VecDeque<FakePermissionResponse>>,
    }

    impl FakeOverlayModule {
        fn with_permission_responses(responses: Vec<FakePermissionResponse>) -> Self {
            Self {
                permission_responses: Mutex::new(responses.into()),
                ..Self::default()
            }
        }

        fn recorded_counts(&self) -> Vec<u32> {
            self.update_counts.lock().expect("counts lock").clone()
        }
    }

    #[async_trait]
    impl OverlayModule for FakeOverlayModule {
        fn start_overlay(&self) -> Result<(), InfraError> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop_overlay(&self) -> Result<(), InfraError> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn update_count(&self, count: u32) -> Result<(), InfraError> {
            self.update_counts.lock().expect("counts lock").push(count);
            Ok(())
        }

        fn collapse_overlay(&self) -> Result<(), InfraError> {
            Ok(())
        }

        async fn can_draw_overlays(&self) -> Result<bool, InfraError> {
            Ok(true)
        }

        async fn request_overlay_permission(&self) -> Result<bool, InfraError> {
            self.permission_calls.fetch_add(1, Ordering::SeqCst);
            let response = self
                .permission_responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .unwrap_or(FakePermissionResponse::Grant(true));
            match response {
                FakePermissionResponse::Grant(granted) => Ok(granted),
                FakePermissionResponse::Fail(message) => Err(InfraError::Api(message)),
                FakePermissionResponse::WaitThenGrant(notify) => {
                    notify.notified().await;
                    Ok(true)
                }
            }
        }

        async fn is_expanded(&self) -> Result<bool, InfraError> {
            Ok(false)
        }
    }

    fn bridge_with_manual_scheduler() -> (OverlayBridge, Arc<FakeOverlayModule>, Arc<ManualScheduler>) {
        let module = Arc::new(FakeOverlayModule::default());
        let scheduler = Arc::new(ManualScheduler::default());
        let bridge = OverlayBridge::new(
            Arc::clone(&module) as Arc<dyn OverlayModule>,
            Arc::clone(&scheduler) as Arc<dyn Scheduler>,
        );
        (bridge, module, scheduler)
    }

    #[test]
    fn rapid_updates_coalesce_into_one_native_call_with_last_value() {
        let (bridge, module, scheduler) = bridge_with_manual_scheduler();

        for count in 1..=5 {
            bridge.update_count(count);
        }
        assert_eq!(module.recorded_counts(), Vec::<u32>::new());

        assert_eq!(scheduler.fire_all(), 1);
        assert_eq!(module.recorded_counts(), vec![5]);

        // A later update opens a fresh window.
        bridge.update_count(9);
        scheduler.fire_all();
        assert_eq!(module.recorded_counts(), vec![5, 9]);
    }

    proptest! {
        #[test]
        fn debounce_always_flushes_exactly_the_last_clamped_value(
            counts in proptest::collection::vec(-1000i64..1000i64, 1..50)
        ) {
            let (bridge, module, scheduler) = bridge_with_manual_scheduler();
            for count in &counts {
                bridge.update_count(*count);
            }
            scheduler.fire_all();

            let expected = counts.last().expect("non-empty").max(&0);
            prop_assert_eq!(module.recorded_counts(), vec![*expected as u32]);
        }
    }

    #[test]
    fn negative_counts_clamp_to_zero() {
        let (bridge, module, scheduler) = bridge_with_manual_scheduler();
        bridge.update_count(-12);
        scheduler.fire_all();
        assert_eq!(module.recorded_counts(), vec![0]);
    }

    #[test]
    fn counts_beyond_u32_range_saturate_instead_of_wrapping() {
        let (bridge, module, scheduler) = bridge_with_manual_scheduler();
        bridge.update_count(i64::from(u32::MAX) + 1);
        scheduler.fire_all();
        assert_eq!(module.recorded_counts(), vec![u32::MAX]);
    }

    #[test]
    fn start_overlay_flushes_latest_count_before_native_start() {
        let (bridge, module, scheduler) = bridge_with_manual_scheduler();

        bridge.update_count(7);
        bridge.start_overlay();

        assert_eq!(module.recorded_counts(), vec![7]);
        assert_eq!(module.start_calls.load(Ordering::SeqCst), 1);

        // The debounced flush was cancelled: firing the scheduler now
        // must not produce a second native call.
        scheduler.fire_all();
        assert_eq!(module.recorded_counts(), vec![7]);
    }

    #[test]
    fn stop_overlay_cancels_pending_flush_without_flushing() {
        let (bridge, module, scheduler) = bridge_with_manual_scheduler();

        bridge.update_count(3);
        bridge.stop_overlay();
        scheduler.fire_all();

        assert_eq!(module.recorded_counts(), Vec::<u32>::new());
        assert_eq!(module.stop_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permission_timeout_resolves_to_false_and_emits_timeout_event() {
        let module = Arc::new(FakeOverlayModule::with_permission_responses(vec![
            FakePermissionResponse::Fail("permission request timed out".to_string()),
        ]));
        let bridge = OverlayBridge::new(
            Arc::clone(&module) as Arc<dyn OverlayModule>,
            Arc::new(ManualScheduler::default()),
        );

        let timeouts = Arc::new(AtomicUsize::new(0));
        let timeouts_clone = Arc::clone(&timeouts);
        let _subscription = bridge.add_event_listener(OverlayEventName::PermissionTimeout, move |_| {
            timeouts_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!bridge.request_permission().await);
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);
        assert!(!bridge.is_permission_request_in_progress());
    }

    #[tokio::test]
    async fn permission_error_resolves_to_false_and_emits_error_event() {
        let module = Arc::new(FakeOverlayModule::with_permission_responses(vec![
            FakePermissionResponse::Fail("settings activity unavailable".to_string()),
        ]));
        let bridge = OverlayBridge::new(
            Arc::clone(&module) as Arc<dyn OverlayModule>,
            Arc::new(ManualScheduler::default()),
        );

        let errors = Arc::new(AtomicUsize::new(0));
        let errors_clone = Arc::clone(&errors);
        let _subscription = bridge.add_event_listener(OverlayEventName::PermissionError, move |_| {
            errors_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!bridge.request_permission().await);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_permission_request_is_rejected_without_native_call() {
        let gate = Arc::new(Notify::new());
        let module = Arc::new(FakeOverlayModule::with_permission_responses(vec![
            FakePermissionResponse::WaitThenGrant(Arc::clone(&gate)),
        ]));
        let bridge = Arc::new(OverlayBridge::new(
            Arc::clone(&module) as Arc<dyn OverlayModule>,
            Arc::new(ManualScheduler::default()),
        ));

        let bridge_clone = Arc::clone(&bridge);
        let first = tokio::spawn(async move { bridge_clone.request_permission().await });

        // Let the first request reach the native await point.
        while module.permission_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        assert!(!bridge.request_permission().await);
        assert_eq!(module.permission_calls.load(Ordering::SeqCst), 1);

        gate.notify_one();
        assert!(first.await.expect("first request joins"));
        assert!(!bridge.is_permission_request_in_progress());
    }

    #[tokio::test]
    async fn permission_result_event_carries_granted_flag() {
        let module = Arc::new(FakeOverlayModule::with_permission_responses(vec![
            FakePermissionResponse::Grant(true),
        ]));
        let bridge = OverlayBridge::new(
            Arc::clone(&module) as Arc<dyn OverlayModule>,
            Arc::new(ManualScheduler::default()),
        );

        let observed = Arc::new(Mutex::new(Vec::new()));
        let observed_clone = Arc::clone(&observed);
        let _subscription =
            bridge.add_event_listener(OverlayEventName::PermissionResult, move |payload| {
                observed_clone
                    .lock()
                    .expect("observed lock")
                    .push(payload.clone());
            });

        assert!(bridge.request_permission().await);
        assert_eq!(
            observed.lock().expect("observed lock").as_slice(),
            &[OverlayEventPayload {
                granted: Some(true)
            }]
        );
    }

    #[test]
    fn listeners_fire_independently_and_unsubscribe_is_idempotent() {
        let (bridge, _module, _scheduler) = bridge_with_manual_scheduler();

        let first_hits = Arc::new(AtomicUsize::new(0));
        let second_hits = Arc::new(AtomicUsize::new(0));

        let first_clone = Arc::clone(&first_hits);
        let first = bridge.add_event_listener(OverlayEventName::Started, move |_| {
            first_clone.fetch_add(1, Ordering::SeqCst);
        });
        let second_clone = Arc::clone(&second_hits);
        let _second = bridge.add_event_listener(OverlayEventName::Started, move |_| {
            second_clone.fetch_add(1, Ordering::SeqCst);
        });

        bridge.emit(OverlayEventName::Started, OverlayEventPayload::default());
        assert_eq!(first_hits.load(Ordering::SeqCst), 1);
        assert_eq!(second_hits.load(Ordering::SeqCst), 1);

        first.unsubscribe();
        first.unsubscribe();
        bridge.emit(OverlayEventName::Started, OverlayEventPayload::default());
        assert_eq!(first_hits.load(Ordering::SeqCst), 1);
        assert_eq!(second_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn events_are_scoped_by_name() {
        let (bridge, _module, _scheduler) = bridge_with_manual_scheduler();

        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let _subscription = bridge.add_event_listener(OverlayEventName::Stopped, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        bridge.emit(OverlayEventName::Started, OverlayEventPayload::default());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn noop_module_makes_every_operation_a_safe_noop() {
        let bridge = OverlayBridge::new(
            Arc::new(NoopOverlayModule),
            Arc::new(ManualScheduler::default()),
        );

        bridge.update_count(4);
        bridge.start_overlay();
        bridge.stop_overlay();
        bridge.collapse_overlay();
        assert!(!bridge.can_draw_overlays().await);
        assert!(!bridge.request_permission().await);
        assert!(!bridge.is_expanded().await);
    }
}
