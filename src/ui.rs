mod fonts;
pub mod gradient;
pub mod layout;
mod render;
pub mod surface;
pub mod theme;
mod window;

use crate::control::ClockCommand;
use crate::events::ClockEvent;
use crate::logging::UI_NAMESPACE;
use crate::settings::{SettingsStore, SettingsWriter};
use crate::settings_log;
use chrono::Local;
use fonts::{CanvasMeasure, FontBook};
use layout::WidgetSize;
use log::Level::Warn;
use log::{debug, info};
use std::time::{Duration, Instant};
use surface::{ClockSurface, WindowRequest};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::Window;

/// How long exit waits for queued settings writes.
const SETTINGS_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Size of the window before the first layout.
const INITIAL_SIZE: WidgetSize = WidgetSize {
    width: 200,
    height: 100,
};

fn apply_request(
    clock_window: &Window,
    femto_ctx: &mut window::FemtovgContext,
    request: WindowRequest,
    control_flow: &mut ControlFlow,
) {
    match request {
        WindowRequest::Resize(size) => {
            clock_window.set_inner_size(PhysicalSize::new(size.width, size.height));
            femto_ctx.resize(size.width, size.height);
            clock_window.request_redraw();
        }
        WindowRequest::MoveTo { x, y } => clock_window.set_outer_position(PhysicalPosition::new(x, y)),
        WindowRequest::SetAlwaysOnTop(on_top) => clock_window.set_window_level(window::window_level(on_top)),
        WindowRequest::SetVisible(visible) => {
            clock_window.set_visible(visible);
            if visible {
                clock_window.request_redraw();
            }
        }
        WindowRequest::Exit => *control_flow = ControlFlow::Exit,
    }
}

fn sync_layout(surface: &mut ClockSurface, femto_ctx: &mut window::FemtovgContext, fonts: &mut FontBook) {
    let mut measure = CanvasMeasure {
        canvas: &mut femto_ctx.canvas,
        fonts,
    };
    surface.sync_layout(&mut measure, Local::now().naive_local());
}

pub fn run_ui(
    event_loop: EventLoop<ClockCommand>,
    settings: SettingsStore,
    events: broadcast::Sender<ClockEvent>,
    runtime: Handle,
) {
    let mut surface = ClockSurface::new(settings, Instant::now());
    surface.subscribe(|event| debug!(target: UI_NAMESPACE, "{}", event));
    surface.subscribe(move |event| {
        // No connected control clients is not an error.
        let _ = events.send(*event);
    });

    info!(target: UI_NAMESPACE, "Creating clock window...");
    let app_window = window::AppWindow::new(
        &event_loop,
        window::WindowOptions {
            size: INITIAL_SIZE,
            position: surface.position(),
            always_on_top: surface.config().stay_on_top,
            visible: false,
        },
    );
    let mut femto_ctx = window::create_femtovg_context(&app_window);
    let mut fonts = FontBook::new();

    sync_layout(&mut surface, &mut femto_ctx, &mut fonts);
    let mut startup_flow = ControlFlow::Poll;
    for request in surface.drain_window_requests() {
        apply_request(&app_window.window, &mut femto_ctx, request, &mut startup_flow);
    }
    app_window.window.set_visible(surface.is_visible());

    let mut settings_writer = Some(SettingsWriter::spawn(&runtime));
    let mut cursor = (0.0, 0.0);
    info!(target: UI_NAMESPACE, "Starting event loop...");
    event_loop.run(move |event, _, control_flow| {
        match event {
            Event::NewEvents(_) => surface.poll(Instant::now()),
            Event::UserEvent(command) => surface.apply(command, Instant::now()),
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => {
                    info!(target: UI_NAMESPACE, "Window close requested, hiding");
                    surface.close_requested();
                }
                WindowEvent::Resized(size) => {
                    femto_ctx.resize(size.width, size.height);
                    app_window.window.request_redraw();
                }
                WindowEvent::Moved(position) => surface.window_moved(position.x, position.y),
                WindowEvent::CursorMoved { position, .. } => {
                    cursor = (position.x, position.y);
                    surface.pointer_moved(cursor);
                }
                WindowEvent::MouseInput {
                    state,
                    button: MouseButton::Left,
                    ..
                } => match state {
                    ElementState::Pressed => surface.pointer_pressed(cursor),
                    ElementState::Released => surface.pointer_released(),
                },
                _ => (),
            },
            Event::MainEventsCleared => {
                if surface.take_redraw() {
                    sync_layout(&mut surface, &mut femto_ctx, &mut fonts);
                    app_window.window.request_redraw();
                }
                for request in surface.drain_window_requests() {
                    apply_request(&app_window.window, &mut femto_ctx, request, control_flow);
                }
                if let (Some(snapshot), Some(writer)) =
                    (surface.take_settings_snapshot(), settings_writer.as_ref())
                {
                    writer.submit(snapshot);
                }
                if *control_flow != ControlFlow::Exit {
                    *control_flow = match surface.next_deadline() {
                        Some(deadline) => ControlFlow::WaitUntil(deadline),
                        None => ControlFlow::Wait,
                    };
                }
            }
            Event::RedrawRequested(_) => {
                if let Some(frame) = surface.frame() {
                    render::render_frame(&mut femto_ctx.canvas, &mut fonts, &frame);
                    femto_ctx.present();
                }
            }
            Event::LoopDestroyed => {
                info!(target: UI_NAMESPACE, "Event loop finished, saving settings");
                let last = surface.shutdown();
                match settings_writer.take() {
                    Some(writer) => {
                        if !writer.finish(last, SETTINGS_FLUSH_TIMEOUT) {
                            settings_log!(Warn, "Settings writer did not finish in {:?}", SETTINGS_FLUSH_TIMEOUT);
                        }
                    }
                    None => {
                        if let Some(Err(e)) = last.map(|snapshot| snapshot.write_blocking()) {
                            settings_log!(Warn, "Could not save settings on exit: {}", e);
                        }
                    }
                }
            }
            _ => (),
        }
    });
}
