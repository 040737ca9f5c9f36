use crate::control::{ClockCommand, CountdownAction, StopwatchAction};
use crate::events::{ClockEvent, EventBus};
use crate::settings::{keys, Rgb, SettingKey, SettingsSnapshot, SettingsStore};
use crate::ticker::{earliest, Ticker};
use crate::timer::{
    format_countdown, format_stopwatch, TimerMachine, COUNTDOWN_MINUTES_RANGE,
    DEFAULT_COUNTDOWN_SECONDS,
};
use crate::ui::gradient::{GradientRenderer, PaintStyle};
use crate::ui::layout::{DisplayContent, DisplayMode, Layout, LayoutEngine, TextMeasure, WidgetSize};
use crate::ui::theme::{rgb_color, ThemeCatalog, SOLID_THEME};
use crate::ui_log;
use chrono::NaiveDateTime;
use femtovg::Color;
use log::Level::{Debug, Info, Warn};
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

pub const FONT_SIZE_RANGE: RangeInclusive<u32> = 20..=250;
pub const DEFAULT_FONT_FAMILY: &str = "Arial";
pub const DEFAULT_BASE_SIZE: u32 = 80;
pub const DEFAULT_POSITION: (i32, i32) = (100, 100);

pub const COUNTDOWN_MARKER: &str = "⏳ ";
pub const STOPWATCH_MARKER: &str = "⏱ ";

const CLOCK_INTERVAL: Duration = Duration::from_millis(1000);
const SECONDS_CLOCK_INTERVAL: Duration = Duration::from_millis(100);
const ANIMATION_INTERVAL: Duration = Duration::from_millis(50);
const ANIMATION_STEP: u32 = 2;

fn clock_interval(show_seconds: bool) -> Duration {
    if show_seconds {
        SECONDS_CLOCK_INTERVAL
    } else {
        CLOCK_INTERVAL
    }
}

fn clamp_i64(value: i64, range: RangeInclusive<u32>) -> u32 {
    value.clamp(i64::from(*range.start()), i64::from(*range.end())) as u32
}

fn stored_coordinate(settings: &SettingsStore, key: SettingKey<i64>, default: i32) -> i32 {
    let raw = settings.get(key, i64::from(default));
    i32::try_from(raw).unwrap_or_else(|_| {
        ui_log!(Warn, "Setting '{}' = {} is off screen; using {}", key.name(), raw, default);
        default
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayConfig {
    pub font_family: String,
    pub base_font_size: u32,
    pub opacity: u8,
    pub custom_color: Rgb,
    pub theme_name: String,
    pub show_date: bool,
    pub show_week: bool,
    pub show_seconds: bool,
    pub fixed_position: bool,
    pub stay_on_top: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            base_font_size: DEFAULT_BASE_SIZE,
            opacity: 255,
            custom_color: Rgb::WHITE,
            theme_name: SOLID_THEME.to_string(),
            show_date: true,
            show_week: true,
            show_seconds: false,
            fixed_position: false,
            stay_on_top: false,
        }
    }
}

impl DisplayConfig {
    /// Reads every display key, clamping numeric values into range and
    /// mapping the theme name onto its catalogue spelling.
    pub fn load(settings: &SettingsStore) -> Self {
        let defaults = Self::default();
        let theme_name = settings.get(keys::THEME, defaults.theme_name);
        Self {
            font_family: settings.get(keys::FONT_FAMILY, defaults.font_family),
            base_font_size: clamp_i64(
                settings.get(keys::BASE_SIZE, i64::from(defaults.base_font_size)),
                FONT_SIZE_RANGE,
            ),
            opacity: clamp_i64(settings.get(keys::FONT_OPACITY, i64::from(defaults.opacity)), 0..=255) as u8,
            custom_color: settings.get(keys::CUSTOM_COLOR, defaults.custom_color),
            theme_name: ThemeCatalog.get(&theme_name).name.to_string(),
            show_date: settings.get(keys::SHOW_DATE, defaults.show_date),
            show_week: settings.get(keys::SHOW_WEEK, defaults.show_week),
            show_seconds: settings.get(keys::SHOW_SECONDS, defaults.show_seconds),
            fixed_position: settings.get(keys::FIXED_POS, defaults.fixed_position),
            stay_on_top: settings.get(keys::STAY_ON_TOP, defaults.stay_on_top),
        }
    }

    pub fn store(&self, settings: &mut SettingsStore) {
        settings.set(keys::FONT_FAMILY, self.font_family.clone());
        settings.set(keys::BASE_SIZE, i64::from(self.base_font_size));
        settings.set(keys::FONT_OPACITY, i64::from(self.opacity));
        settings.set(keys::CUSTOM_COLOR, self.custom_color);
        settings.set(keys::THEME, self.theme_name.clone());
        settings.set(keys::SHOW_DATE, self.show_date);
        settings.set(keys::SHOW_WEEK, self.show_week);
        settings.set(keys::SHOW_SECONDS, self.show_seconds);
        settings.set(keys::FIXED_POS, self.fixed_position);
        settings.set(keys::STAY_ON_TOP, self.stay_on_top);
    }
}

/// Changes the event loop must make to the platform window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRequest {
    Resize(WidgetSize),
    MoveTo { x: i32, y: i32 },
    SetAlwaysOnTop(bool),
    SetVisible(bool),
    Exit,
}

/// Tracks a left-button drag in window-local pointer coordinates.
#[derive(Debug, Default)]
pub struct DragTracker {
    grab: Option<(f64, f64)>,
}

impl DragTracker {
    pub fn press(&mut self, pointer: (f64, f64)) {
        self.grab = Some(pointer);
    }

    pub fn is_active(&self) -> bool {
        self.grab.is_some()
    }

    /// New window origin keeping the grabbed point under the pointer, given
    /// the origin `pointer` is relative to.
    pub fn follow(&self, origin: (i32, i32), pointer: (f64, f64)) -> Option<(i32, i32)> {
        let (grab_x, grab_y) = self.grab?;
        let dx = (pointer.0 - grab_x).round() as i32;
        let dy = (pointer.1 - grab_y).round() as i32;
        Some((origin.0 + dx, origin.1 + dy))
    }

    /// Ends the drag; true if one was in progress.
    pub fn release(&mut self) -> bool {
        self.grab.take().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LayoutKey {
    content: DisplayContent,
    font_family: String,
    base_font_size: u32,
}

/// Everything needed to paint one frame.
pub struct Frame<'a> {
    pub layout: &'a Layout,
    pub font_family: &'a str,
    pub paint: PaintStyle<'a>,
    pub custom_color: Color,
    pub opacity: u8,
}

pub struct ClockSurface {
    config: DisplayConfig,
    settings: SettingsStore,
    settings_dirty: bool,
    timers: TimerMachine,
    layout_engine: LayoutEngine,
    gradient: GradientRenderer,
    themes: ThemeCatalog,
    layout: Option<Layout>,
    laid_out: Option<LayoutKey>,
    animation_offset: u32,
    clock_ticker: Ticker,
    animation_ticker: Ticker,
    drag: DragTracker,
    position: (i32, i32),
    // Last origin the platform reported. Pointer coordinates are relative
    // to it, not to a move we requested that may not have landed yet.
    platform_origin: (i32, i32),
    visible: bool,
    redraw: bool,
    bus: EventBus<ClockEvent>,
    requests: Vec<WindowRequest>,
}

impl ClockSurface {
    pub fn new(settings: SettingsStore, now: Instant) -> Self {
        let config = DisplayConfig::load(&settings);
        let themes = ThemeCatalog;
        let position = (
            stored_coordinate(&settings, keys::POS_X, DEFAULT_POSITION.0),
            stored_coordinate(&settings, keys::POS_Y, DEFAULT_POSITION.1),
        );
        let visible = settings.get(keys::CLOCK_VISIBLE, true);

        let mut clock_ticker = Ticker::new(clock_interval(config.show_seconds));
        clock_ticker.start_at(now);
        let mut animation_ticker = Ticker::new(ANIMATION_INTERVAL);
        if !themes.get(&config.theme_name).is_solid() {
            animation_ticker.start_at(now);
        }

        ui_log!(
            Info,
            "Clock surface: font '{}' {}px, theme '{}', at {:?}",
            config.font_family,
            config.base_font_size,
            config.theme_name,
            position
        );

        Self {
            config,
            settings,
            settings_dirty: false,
            timers: TimerMachine::new(),
            layout_engine: LayoutEngine::new(),
            gradient: GradientRenderer::new(),
            themes,
            layout: None,
            laid_out: None,
            animation_offset: 0,
            clock_ticker,
            animation_ticker,
            drag: DragTracker::default(),
            position,
            platform_origin: position,
            visible,
            redraw: true,
            bus: EventBus::new(),
            requests: Vec::new(),
        }
    }

    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    #[cfg(test)]
    pub fn timers(&self) -> &TimerMachine {
        &self.timers
    }

    pub fn position(&self) -> (i32, i32) {
        self.position
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    #[cfg(test)]
    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    #[cfg(test)]
    pub fn animation_offset(&self) -> u32 {
        self.animation_offset
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&ClockEvent) + 'static) {
        self.bus.subscribe(subscriber);
    }

    pub fn drain_window_requests(&mut self) -> Vec<WindowRequest> {
        std::mem::take(&mut self.requests)
    }

    /// True once per batch of changes that need a repaint.
    pub fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.redraw)
    }

    fn countdown_active(&self) -> bool {
        let state = self.timers.state();
        state.countdown_running || state.countdown_remaining != DEFAULT_COUNTDOWN_SECONDS
    }

    fn stopwatch_active(&self) -> bool {
        let state = self.timers.state();
        state.stopwatch_running || state.stopwatch_elapsed > 0
    }

    pub fn display_mode(&self) -> DisplayMode {
        if self.countdown_active() || self.stopwatch_active() {
            DisplayMode::TimerExclusive
        } else {
            DisplayMode::Clock
        }
    }

    /// The strings to show at wall-clock time `now`. The countdown wins
    /// over the stopwatch when both are active.
    pub fn content(&self, now: NaiveDateTime) -> DisplayContent {
        let state = self.timers.state();
        if self.countdown_active() {
            return DisplayContent::Timer {
                text: format!("{COUNTDOWN_MARKER}{}", format_countdown(state.countdown_remaining)),
            };
        }
        if self.stopwatch_active() {
            return DisplayContent::Timer {
                text: format!("{STOPWATCH_MARKER}{}", format_stopwatch(state.stopwatch_elapsed)),
            };
        }
        let time_format = if self.config.show_seconds { "%H:%M:%S" } else { "%H:%M" };
        DisplayContent::Clock {
            time: now.format(time_format).to_string(),
            date: self
                .config
                .show_date
                .then(|| now.format("%Y-%m-%d").to_string()),
            week: self.config.show_week.then(|| now.format("%A").to_string()),
        }
    }

    /// Recomputes the geometry when content or configuration changed since
    /// the last call. Queues a resize when the widget size changes.
    pub fn sync_layout(&mut self, measure: &mut dyn TextMeasure, now: NaiveDateTime) -> bool {
        let key = LayoutKey {
            content: self.content(now),
            font_family: self.config.font_family.clone(),
            base_font_size: self.config.base_font_size,
        };
        if self.layout.is_some() && self.laid_out.as_ref() == Some(&key) {
            return false;
        }

        let layout = self.layout_engine.compute(
            &key.content,
            &key.font_family,
            key.base_font_size,
            measure,
        );
        if self.layout.as_ref().map(|l| l.size) != Some(layout.size) {
            ui_log!(
                Debug,
                "Widget resized to {}x{} ({:?})",
                layout.size.width,
                layout.size.height,
                self.display_mode()
            );
            if layout.size.width > 0 {
                self.animation_offset %= layout.size.width;
            }
            self.requests.push(WindowRequest::Resize(layout.size));
        }
        self.layout = Some(layout);
        self.laid_out = Some(key);
        true
    }

    /// Paint data for the current layout, or `None` before the first layout.
    pub fn frame(&mut self) -> Option<Frame<'_>> {
        let layout = self.layout.as_ref()?;
        let theme = self.themes.get(&self.config.theme_name);
        let custom_color = rgb_color(self.config.custom_color);
        let paint = self
            .gradient
            .stylize(theme, custom_color, layout.size, self.animation_offset);
        Some(Frame {
            layout,
            font_family: &self.config.font_family,
            paint,
            custom_color,
            opacity: self.config.opacity,
        })
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([
            self.clock_ticker.deadline(),
            self.animation_ticker.deadline(),
            self.timers.next_deadline(),
        ])
    }

    /// Runs every ticker that is due at `now`.
    pub fn poll(&mut self, now: Instant) {
        if self.clock_ticker.fire(now) {
            self.redraw = true;
        }
        if self.animation_ticker.fire(now) {
            self.advance_animation();
        }
        self.timers.poll(now);
        self.publish_timer_events();
    }

    fn advance_animation(&mut self) {
        let width = self.layout.as_ref().map_or(0, |l| l.size.width);
        if width > 0 {
            self.animation_offset = (self.animation_offset + ANIMATION_STEP) % width;
            self.redraw = true;
        }
    }

    fn publish_timer_events(&mut self) {
        for event in self.timers.drain_events() {
            self.bus.publish(&ClockEvent::Timer(event));
            self.redraw = true;
        }
    }

    fn persist(&mut self) {
        self.config.store(&mut self.settings);
        self.settings_dirty = true;
    }

    fn appearance_changed(&mut self) {
        self.persist();
        self.bus.publish(&ClockEvent::AppearanceChanged);
    }

    /// Re-layout from scratch on the next sync.
    fn relayout(&mut self) {
        self.laid_out = None;
        self.redraw = true;
    }

    pub fn set_font_family(&mut self, family: String) {
        self.config.font_family = family;
        self.layout_engine.invalidate();
        self.relayout();
        self.appearance_changed();
    }

    pub fn set_font_size(&mut self, size: u32) {
        self.config.base_font_size = size.clamp(*FONT_SIZE_RANGE.start(), *FONT_SIZE_RANGE.end());
        self.layout_engine.invalidate();
        self.relayout();
        self.appearance_changed();
    }

    pub fn set_opacity(&mut self, opacity: u8) {
        self.config.opacity = opacity;
        self.redraw = true;
        self.appearance_changed();
    }

    pub fn set_custom_color(&mut self, color: Rgb) {
        self.config.custom_color = color;
        if self.themes.get(&self.config.theme_name).is_solid() {
            self.redraw = true;
        }
        self.appearance_changed();
    }

    /// Switches theme. The animation restarts from offset 0 one animation
    /// interval after `now`.
    pub fn set_theme(&mut self, name: &str, now: Instant) {
        if self.themes.find(name).is_none() {
            let known: Vec<_> = self.themes.names().collect();
            ui_log!(Warn, "Unknown theme '{}', using {} (known: {})", name, SOLID_THEME, known.join(", "));
        }
        let theme = self.themes.get(name);
        self.config.theme_name = theme.name.to_string();

        self.animation_ticker.stop();
        self.animation_offset = 0;
        self.gradient.invalidate();
        if !theme.is_solid() {
            self.animation_ticker.start_at(now);
        }
        ui_log!(Debug, "Theme set to '{}'", theme.name);

        self.redraw = true;
        self.appearance_changed();
    }

    pub fn set_show_date(&mut self, show: bool) {
        self.config.show_date = show;
        self.relayout();
        self.appearance_changed();
    }

    pub fn set_show_week(&mut self, show: bool) {
        self.config.show_week = show;
        self.relayout();
        self.appearance_changed();
    }

    pub fn set_show_seconds(&mut self, show: bool, now: Instant) {
        self.config.show_seconds = show;
        self.clock_ticker.set_interval(clock_interval(show), now);
        self.redraw = true;
        self.appearance_changed();
    }

    pub fn set_fixed_position(&mut self, fixed: bool) {
        self.config.fixed_position = fixed;
        if fixed && self.drag.release() {
            self.save_position();
        }
        self.appearance_changed();
    }

    pub fn set_stay_on_top(&mut self, on_top: bool) {
        self.config.stay_on_top = on_top;
        self.requests.push(WindowRequest::SetAlwaysOnTop(on_top));
        self.appearance_changed();
    }

    pub fn set_countdown_minutes(&mut self, minutes: u32) {
        let minutes = minutes.clamp(*COUNTDOWN_MINUTES_RANGE.start(), *COUNTDOWN_MINUTES_RANGE.end());
        self.settings.set(keys::COUNTDOWN_MINUTES, i64::from(minutes));
        self.settings_dirty = true;
        self.timers.set_countdown_minutes(minutes);
        self.publish_timer_events();
    }

    pub fn set_visible(&mut self, visible: bool) {
        if self.visible == visible {
            return;
        }
        self.visible = visible;
        self.settings.set(keys::CLOCK_VISIBLE, visible);
        self.settings_dirty = true;
        self.requests.push(WindowRequest::SetVisible(visible));
        if visible {
            self.redraw = true;
        }
        ui_log!(Debug, "Clock {}", if visible { "shown" } else { "hidden" });
        self.bus.publish(&ClockEvent::VisibilityChanged(visible));
    }

    /// The window's close button hides the clock instead of exiting.
    pub fn close_requested(&mut self) {
        self.save_position();
        self.set_visible(false);
    }

    pub fn quit(&mut self) {
        ui_log!(Info, "Quit requested");
        self.save_position();
        self.requests.push(WindowRequest::Exit);
    }

    pub fn pointer_pressed(&mut self, pointer: (f64, f64)) {
        if !self.config.fixed_position {
            self.drag.press(pointer);
        }
    }

    pub fn pointer_moved(&mut self, pointer: (f64, f64)) {
        if self.config.fixed_position {
            return;
        }
        if let Some((x, y)) = self.drag.follow(self.platform_origin, pointer) {
            if self.position != (x, y) {
                self.position = (x, y);
                self.requests.push(WindowRequest::MoveTo { x, y });
            }
        }
    }

    pub fn pointer_released(&mut self) {
        if self.drag.release() {
            self.save_position();
        }
    }

    /// The platform reports a new window origin. Mid-drag the requested
    /// position stays authoritative, since it may be ahead of the platform.
    pub fn window_moved(&mut self, x: i32, y: i32) {
        self.platform_origin = (x, y);
        if !self.drag.is_active() {
            self.position = (x, y);
        }
    }

    fn save_position(&mut self) {
        let (x, y) = self.position;
        self.settings.set(keys::POS_X, i64::from(x));
        self.settings.set(keys::POS_Y, i64::from(y));
        self.settings_dirty = true;
        self.bus.publish(&ClockEvent::PositionPersisted { x, y });
    }

    pub fn apply(&mut self, command: ClockCommand, now: Instant) {
        ui_log!(Debug, "Applying {:?}", command);
        match command {
            ClockCommand::SetFontFamily(family) => self.set_font_family(family),
            ClockCommand::SetFontSize(size) => self.set_font_size(size),
            ClockCommand::SetOpacity(opacity) => self.set_opacity(opacity),
            ClockCommand::SetColor(color) => self.set_custom_color(color),
            ClockCommand::SetTheme(name) => self.set_theme(&name, now),
            ClockCommand::ShowDate(show) => self.set_show_date(show),
            ClockCommand::ShowWeek(show) => self.set_show_week(show),
            ClockCommand::ShowSeconds(show) => self.set_show_seconds(show, now),
            ClockCommand::FixedPosition(fixed) => self.set_fixed_position(fixed),
            ClockCommand::StayOnTop(on_top) => self.set_stay_on_top(on_top),
            ClockCommand::SetCountdownMinutes(minutes) => self.set_countdown_minutes(minutes),
            ClockCommand::Countdown(action) => {
                match action {
                    CountdownAction::Start(minutes) => self.timers.start_countdown(minutes),
                    CountdownAction::Pause => self.timers.pause_countdown(),
                    CountdownAction::Toggle => self.timers.toggle_countdown(),
                    CountdownAction::Reset(minutes) => self.timers.reset_countdown(minutes),
                }
                ui_log!(Debug, "Timers now {:?}", self.timers.phase());
            }
            ClockCommand::Stopwatch(action) => {
                match action {
                    StopwatchAction::Start => self.timers.start_stopwatch(),
                    StopwatchAction::Pause => self.timers.pause_stopwatch(),
                    StopwatchAction::Toggle => self.timers.toggle_stopwatch(),
                    StopwatchAction::Reset => self.timers.reset_stopwatch(),
                }
                ui_log!(Debug, "Timers now {:?}", self.timers.phase());
            }
            ClockCommand::ToggleVisibility => self.set_visible(!self.visible),
            ClockCommand::Show => self.set_visible(true),
            ClockCommand::Hide => self.set_visible(false),
            ClockCommand::Close => self.close_requested(),
            ClockCommand::Quit => self.quit(),
        }
        self.publish_timer_events();
    }

    /// Pending settings changes, serialised for a background write.
    pub fn take_settings_snapshot(&mut self) -> Option<SettingsSnapshot> {
        if !std::mem::take(&mut self.settings_dirty) {
            return None;
        }
        match self.settings.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                ui_log!(Warn, "Could not serialise settings: {}", e);
                None
            }
        }
    }

    /// Records the final window state and returns the full settings for
    /// the last write. Called once the event loop is done.
    pub fn shutdown(&mut self) -> Option<SettingsSnapshot> {
        self.persist();
        self.settings.set(keys::POS_X, i64::from(self.position.0));
        self.settings.set(keys::POS_Y, i64::from(self.position.1));
        self.settings.set(keys::CLOCK_VISIBLE, self.visible);
        self.take_settings_snapshot()
    }
}
