mod control;
mod events;
mod logging;
mod settings;
mod ticker;
mod timer;
mod ui;

use crate::control::ClockCommand;
use crate::events::ClockEvent;
use crate::settings::SettingsStore;
use log::Level::{Info, Warn};
use tokio::sync::broadcast;
use winit::event_loop::{EventLoopBuilder, EventLoopProxy};

/// Events buffered per control client before it is reported as lagging.
const EVENT_BACKLOG: usize = 64;

#[tokio::main]
async fn main() {
    // Initialize logging
    logging::init_logging();

    let settings_path = SettingsStore::default_path();
    settings_log!(Info, "Settings file: {}", settings_path.display());
    let settings = SettingsStore::open(settings_path);

    // Control commands reach the UI thread as user events
    let event_loop = EventLoopBuilder::<ClockCommand>::with_user_event().build();
    let (events, _) = broadcast::channel::<ClockEvent>(EVENT_BACKLOG);

    start_control_listener(event_loop.create_proxy(), events.clone());

    ui::run_ui(event_loop, settings, events, tokio::runtime::Handle::current());
}

fn start_control_listener(proxy: EventLoopProxy<ClockCommand>, events: broadcast::Sender<ClockEvent>) {
    let addr = control::control_address();
    tokio::spawn(async move {
        if let Err(e) = control::run_listener(addr, proxy, events).await {
            control_log!(Warn, "{}; running without control channel", e);
        }
    });
}
