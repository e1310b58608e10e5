use std::sync::Arc;

use chrono::{Datelike, Timelike, Weekday};

use crate::{
    consts::NAVIGATE_SELECT_DELAY_MS,
    dispatch,
    model::{ClientState, NotificationEvent},
    navigate::resolve_action_url,
    settings::QuietHours,
};

/// Host-shell seam for every locally perceptible effect the gate can produce.
///
/// The core never renders anything itself; it decides *whether* an effect
/// happens and the host decides *how*. Implementations must be cheap; they
/// run on the frame-delivery path.
pub trait Presenter: Send + Sync {
    /// In-app toast. Shown for every delivered event unless notifications are
    /// globally disabled.
    fn show_toast(&self, event: &NotificationEvent);

    /// OS-level notification, only requested when permission was granted and
    /// the app is not focused.
    fn show_desktop(&self, event: &NotificationEvent);

    fn play_sound(&self, event: &NotificationEvent);

    /// Whether the platform previously granted OS-notification permission.
    fn desktop_permission_granted(&self) -> bool;

    /// Whether the app window/tab currently has focus.
    fn is_app_focused(&self) -> bool;

    fn navigate(&self, path: &str);

    fn select_entity(&self, target: &crate::navigate::NavigationTarget);
}

/// Presenter that swallows every effect. Useful for headless hosts and tests.
pub struct NoopPresenter;

impl Presenter for NoopPresenter {
    fn show_toast(&self, _event: &NotificationEvent) {}
    fn show_desktop(&self, _event: &NotificationEvent) {}
    fn play_sound(&self, _event: &NotificationEvent) {}
    fn desktop_permission_granted(&self) -> bool {
        false
    }
    fn is_app_focused(&self) -> bool {
        false
    }
    fn navigate(&self, _path: &str) {}
    fn select_entity(&self, _target: &crate::navigate::NavigationTarget) {}
}

/// Presentation gate: decide which local effects a delivered event produces.
///
/// The event has already been counted and fanned out to subscribers by the
/// time this runs; suppression here never affects delivery.
pub(crate) fn present(state: &Arc<ClientState>, event: &NotificationEvent) {
    let prefs = state
        .prefs
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    if !prefs.enabled {
        return;
    }

    state.presenter.show_toast(event);

    if !prefs.kind_enabled(event.kind) {
        // muted kind: visible in the UI, never interrupts
        return;
    }

    let now = chrono::Local::now();
    let quiet = quiet_hours_active(&prefs.quiet_hours, now.weekday(), now.hour() as u8);
    if event.requires_sound && prefs.sound_enabled && !quiet {
        state.presenter.play_sound(event);
    }

    if prefs.desktop_enabled
        && state.presenter.desktop_permission_granted()
        && !state.presenter.is_app_focused()
    {
        state.presenter.show_desktop(event);
    }
}

/// Quiet-hours check at hour granularity. The weekday window is a half-open
/// circular interval so a span like 22-8 wraps past midnight; `start == end`
/// covers the whole day.
pub(crate) fn quiet_hours_active(quiet: &QuietHours, weekday: Weekday, hour: u8) -> bool {
    if matches!(weekday, Weekday::Sat | Weekday::Sun) {
        return quiet.weekend_all_day;
    }

    let (start, end) = match (quiet.weekday_start, quiet.weekday_end) {
        (Some(start), Some(end)) => (start % 24, end % 24),
        _ => return false,
    };

    if start == end {
        return true;
    }
    if start < end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

/// Click on any produced effect: mark the event read and drive the host
/// through the navigate-then-select choreography.
pub(crate) fn handle_click(state: &Arc<ClientState>, event: &NotificationEvent) {
    dispatch::mark_read(state, &event.id);

    let Some(action_url) = event.action_url.as_deref() else {
        return;
    };
    let Some(target) = resolve_action_url(action_url) else {
        return;
    };

    state.presenter.navigate(target.path());
    if target.entity_id().is_none() {
        return;
    }

    let presenter = Arc::clone(&state.presenter);
    tokio::spawn(async move {
        // give the target view time to mount before selecting
        tokio::time::sleep(std::time::Duration::from_millis(NAVIGATE_SELECT_DELAY_MS)).await;
        presenter.select_entity(&target);
    });
}

/// macOS notification backend for host presenters, sent off-thread so the
/// blocking click wait never stalls the delivery path.
#[cfg(target_os = "macos")]
pub fn send_macos_notification(event: &NotificationEvent, on_click: impl FnOnce() + Send + 'static) {
    use mac_notification_sys::{MainButton, Notification, NotificationResponse};
    use tracing::debug;

    let title = if event.title.trim().is_empty() {
        "LinguaDesk".to_string()
    } else {
        event.title.clone()
    };
    let body = crate::core::truncate_message(&event.message, 220);

    std::thread::spawn(move || {
        let mut notification = Notification::new();
        notification
            .title(&title)
            .message(&body)
            .main_button(MainButton::SingleAction("Open"))
            .close_button("Dismiss")
            .wait_for_click(true)
            .asynchronous(false);

        match notification.send() {
            Ok(NotificationResponse::Click) | Ok(NotificationResponse::ActionButton(_)) => {
                on_click();
            }
            Ok(_) => {}
            Err(error) => {
                debug!(%error, "failed to show macOS notification");
            }
        }
    });
}
