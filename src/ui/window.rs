use crate::logging::UI_NAMESPACE;
use crate::ui::layout::WidgetSize;
use femtovg::{renderer::OpenGl, Canvas};
use glutin::{
    config::ConfigTemplateBuilder,
    context::{ContextAttributesBuilder, PossiblyCurrentContext},
    display::GetGlDisplay,
    prelude::*,
    surface::{Surface, SurfaceAttributesBuilder, WindowSurface},
};
use glutin_winit::DisplayBuilder;
use log::{debug, info, warn};
use raw_window_handle::HasRawWindowHandle;
use std::ffi::CString;
use std::num::NonZeroU32;
use winit::{
    dpi::{PhysicalPosition, PhysicalSize},
    event_loop::EventLoopWindowTarget,
    window::{Window, WindowBuilder, WindowLevel},
};

/// Initial window state, before the first layout sizes it.
#[derive(Debug, Clone, Copy)]
pub struct WindowOptions {
    pub size: WidgetSize,
    pub position: (i32, i32),
    pub always_on_top: bool,
    pub visible: bool,
}

pub fn window_level(always_on_top: bool) -> WindowLevel {
    if always_on_top {
        WindowLevel::AlwaysOnTop
    } else {
        WindowLevel::Normal
    }
}

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value.max(1)).unwrap_or(NonZeroU32::MIN)
}

pub struct AppWindow {
    pub window: Window,
    pub gl_config: glutin::config::Config,
}

impl AppWindow {
    pub fn new<T>(event_loop: &EventLoopWindowTarget<T>, options: WindowOptions) -> Self {
        let window_builder = WindowBuilder::new()
            .with_title("Desktop Clock")
            .with_inner_size(PhysicalSize::new(
                options.size.width.max(1),
                options.size.height.max(1),
            ))
            .with_position(PhysicalPosition::new(options.position.0, options.position.1))
            .with_window_level(window_level(options.always_on_top))
            .with_transparent(true)
            .with_decorations(false)
            .with_resizable(false)
            .with_visible(options.visible);

        let template = ConfigTemplateBuilder::new()
            .with_alpha_size(8)
            .with_stencil_size(8)
            .with_transparency(true);

        let display_builder = DisplayBuilder::new().with_window_builder(Some(window_builder));

        info!(target: UI_NAMESPACE, "Building display...");
        let (window, gl_config) = display_builder
            .build(event_loop, template, |configs| {
                configs
                    .reduce(|best, config| {
                        let transparent = config.supports_transparency().unwrap_or(false);
                        if transparent && !best.supports_transparency().unwrap_or(false) {
                            config
                        } else {
                            best
                        }
                    })
                    .expect("No GL configs available")
            })
            .expect("Failed to create display");

        let window = window.expect("Failed to create window");
        if !gl_config.supports_transparency().unwrap_or(false) {
            warn!(target: UI_NAMESPACE, "GL config has no transparency; background may be opaque");
        }
        info!(
            target: UI_NAMESPACE,
            "Clock window created at {:?}, {}x{}",
            options.position,
            window.inner_size().width,
            window.inner_size().height
        );

        Self { window, gl_config }
    }
}

pub struct FemtovgContext {
    pub canvas: Canvas<OpenGl>,
    pub surface: Surface<WindowSurface>,
    pub gl_context: PossiblyCurrentContext,
}

impl FemtovgContext {
    pub fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = (non_zero(width), non_zero(height));
        self.surface.resize(&self.gl_context, width, height);
        // Layout works in physical pixels, so the canvas runs at scale 1.
        self.canvas.set_size(width.get(), height.get(), 1.0);
        unsafe {
            gl::Viewport(0, 0, width.get() as i32, height.get() as i32);
        }
    }

    pub fn present(&self) {
        if let Err(e) = self.surface.swap_buffers(&self.gl_context) {
            warn!(target: UI_NAMESPACE, "Failed to swap buffers: {:?}", e);
        }
    }
}

pub fn create_femtovg_context(app_window: &AppWindow) -> FemtovgContext {
    let raw_window_handle = app_window.window.raw_window_handle();
    let display = app_window.gl_config.display();

    let context_attributes = ContextAttributesBuilder::new()
        .with_profile(glutin::context::GlProfile::Core)
        .with_context_api(glutin::context::ContextApi::OpenGl(Some(
            glutin::context::Version::new(3, 3),
        )))
        .build(Some(raw_window_handle));

    info!(target: UI_NAMESPACE, "Creating GL context...");
    let not_current_context = unsafe {
        display
            .create_context(&app_window.gl_config, &context_attributes)
            .expect("Failed to create GL context")
    };

    let size = app_window.window.inner_size();
    debug!(target: UI_NAMESPACE, "Window size for surface: {}x{}", size.width, size.height);
    let attrs = SurfaceAttributesBuilder::<WindowSurface>::new().build(
        raw_window_handle,
        non_zero(size.width),
        non_zero(size.height),
    );

    let surface = unsafe {
        display
            .create_window_surface(&app_window.gl_config, &attrs)
            .expect("Failed to create surface")
    };

    let gl_context = not_current_context
        .make_current(&surface)
        .expect("Failed to make context current");

    unsafe {
        gl::load_with(|s| match CString::new(s) {
            Ok(name) => display.get_proc_address(&name).cast(),
            Err(_) => std::ptr::null(),
        });
        gl::ClearColor(0.0, 0.0, 0.0, 0.0);
        gl::Clear(gl::COLOR_BUFFER_BIT);
        gl::Viewport(0, 0, size.width as i32, size.height as i32);
    }

    let renderer = unsafe {
        OpenGl::new_from_function_cstr(|s| display.get_proc_address(s).cast())
            .expect("Cannot create renderer")
    };

    let mut canvas = Canvas::new(renderer).expect("Cannot create canvas");
    canvas.set_size(size.width.max(1), size.height.max(1), 1.0);

    info!(target: UI_NAMESPACE, "Femtovg context ready");
    FemtovgContext {
        canvas,
        surface,
        gl_context,
    }
}
