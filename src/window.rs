//! Window management using winit

use std::sync::Arc;
use thiserror::Error;
use winit::{
    dpi::PhysicalSize,
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    window::{Window as WinitWindow, WindowBuilder},
};

/// Window creation or event loop failure
#[derive(Error, Debug)]
pub enum WindowError {
    #[error("Event loop failed: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("Failed to create window: {0}")]
    Os(#[from] winit::error::OsError),
}

/// Wrapper around winit window with additional state
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    close_requested: bool,
}

impl Window {
    /// Create a new window with the given title and dimensions
    pub fn new(
        event_loop: &EventLoop<()>,
        title: &str,
        width: u32,
        height: u32,
    ) -> Result<Self, WindowError> {
        let window = Arc::new(
            WindowBuilder::new()
                .with_title(title)
                .with_inner_size(PhysicalSize::new(width, height))
                .build(event_loop)?,
        );
        // The framebuffer can differ from the requested size on high-DPI displays
        let size = window.inner_size();

        Ok(Self {
            window,
            width: size.width,
            height: size.height,
            close_requested: false,
        })
    }

    /// Get the raw window for backend initialization
    pub fn window(&self) -> &WinitWindow {
        &self.window
    }

    /// Get arc reference to window
    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    /// Get current framebuffer dimensions in physical pixels
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Check if close was requested
    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    /// Ask the loop to exit after the current frame
    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    /// Handle window events
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
            }
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            _ => {}
        }
    }

    /// Request a redraw
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

/// Application driven by [`run`]
pub trait WindowApp {
    /// Called for every window event after the window has updated its own state
    fn window_event(&mut self, window: &mut Window, event: &WindowEvent);

    /// Update and draw one frame
    fn frame(&mut self, window: &mut Window);
}

/// Run the event loop until the window is closed
pub fn run<A: WindowApp + 'static>(
    event_loop: EventLoop<()>,
    mut window: Window,
    mut app: A,
) -> Result<(), WindowError> {
    event_loop.run(move |event, elwt: &EventLoopWindowTarget<()>| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { event, .. } => {
                window.handle_event(&event);
                app.window_event(&mut window, &event);
            }
            Event::AboutToWait => {
                app.frame(&mut window);
                window.request_redraw();
            }
            _ => {}
        }

        if window.should_close() {
            elwt.exit();
        }
    })?;
    Ok(())
}
