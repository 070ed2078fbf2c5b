//! The application window.
//!
//! winit requires the event loop to run on the main thread, so [`run`] takes over the main thread
//! and runs the application code on a separate thread. The application talks to the window
//! through a [`Gui`] handle: it sends complete canvas images to display and polls keyboard input.

mod renderer;

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    process,
    sync::mpsc::{self, Receiver, Sender},
    thread,
};

use anyhow::{anyhow, Context};
use winit::{
    dpi::{PhysicalPosition, PhysicalSize},
    event::{ElementState, Event as WinitEvent, KeyboardInput, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy},
    window::WindowBuilder,
};

use crate::{
    config::UiConfig,
    image::{Image, Resolution},
    termination::Termination,
};

use self::renderer::Renderer;

/// Keys the application reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    L,
    D,
    Q,
    Tab,
    Escape,
    Num1,
    Num2,
    Num3,
}

impl Key {
    fn from_virtual_keycode(code: VirtualKeyCode) -> Option<Self> {
        Some(match code {
            VirtualKeyCode::L => Key::L,
            VirtualKeyCode::D => Key::D,
            VirtualKeyCode::Q => Key::Q,
            VirtualKeyCode::Tab => Key::Tab,
            VirtualKeyCode::Escape => Key::Escape,
            VirtualKeyCode::Key1 | VirtualKeyCode::Numpad1 => Key::Num1,
            VirtualKeyCode::Key2 | VirtualKeyCode::Numpad2 => Key::Num2,
            VirtualKeyCode::Key3 | VirtualKeyCode::Numpad3 => Key::Num3,
            _ => return None,
        })
    }
}

/// Input delivered to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    KeyPressed(Key),
    /// The user asked to close the window.
    CloseRequested,
}

#[derive(Debug)]
enum Msg {
    Image { res: Resolution, data: Vec<u8> },
}

/// Receives the input [`Event`]s of the window.
pub struct Events {
    recv: Receiver<Event>,
}

impl Events {
    /// Returns all events that arrived since the last call, without blocking.
    pub fn poll(&self) -> impl Iterator<Item = Event> + '_ {
        self.recv.try_iter()
    }
}

/// Handle to the window, owned by the application thread.
pub struct Gui {
    proxy: EventLoopProxy<Msg>,
    events: Events,
    resolution: Resolution,
}

impl Gui {
    /// Returns the size of the window's drawing area.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn events(&self) -> &Events {
        &self.events
    }

    /// Displays `image` in the window, scaled to the window size.
    pub fn show(&self, image: &Image) -> anyhow::Result<()> {
        // Image data is RGBA8 internally, so it can be uploaded without conversion.
        let msg = Msg::Image {
            res: image.resolution(),
            data: image.data().to_vec(),
        };
        self.proxy
            .send_event(msg)
            .map_err(|_closed| anyhow!("window event loop has exited"))
    }
}

/// Opens the window, then runs `cb` on a new thread while the calling thread handles window
/// events.
///
/// The process exits when `cb` returns: with status 0 if it succeeded, with 1 if it returned an
/// error, and with 101 if it panicked. If the window cannot be opened, the process exits with
/// status 1.
pub fn run<F, R>(ui: &UiConfig, cb: F) -> !
where
    F: FnOnce(Gui) -> R + Send + 'static,
    R: Termination + Send,
{
    let event_loop = EventLoopBuilder::with_user_event().build();
    let resolution = Resolution::new(ui.window_width, ui.window_height);
    let renderer = match open_window(&event_loop, ui, resolution) {
        Ok(renderer) => renderer,
        Err(e) => {
            log::error!("failed to open window: {e:#}");
            process::exit(1);
        }
    };

    let (sender, recv) = mpsc::channel();
    let gui = Gui {
        proxy: event_loop.create_proxy(),
        events: Events { recv },
        resolution,
    };

    let spawned = thread::Builder::new()
        .name("app".into())
        .spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(move || cb(gui)));
            match result {
                Ok(r) => {
                    if r.is_success() {
                        process::exit(0);
                    } else {
                        r.report(); // prints the error
                        process::exit(1);
                    }
                }
                Err(_payload) => {
                    // The panic hook has printed the message already; exit with 101 like libstd.
                    process::exit(101);
                }
            }
        });
    if let Err(e) = spawned {
        log::error!("failed to spawn application thread: {e}");
        process::exit(1);
    }

    event_loop_run(event_loop, renderer, sender)
}

fn open_window(
    event_loop: &EventLoop<Msg>,
    ui: &UiConfig,
    resolution: Resolution,
) -> anyhow::Result<Renderer> {
    let window = WindowBuilder::new()
        .with_title(&ui.window_title)
        .with_inner_size(PhysicalSize::new(resolution.width(), resolution.height()))
        .with_position(PhysicalPosition::new(ui.window_pos_x, ui.window_pos_y))
        .with_resizable(false)
        .build(event_loop)
        .context("failed to create window")?;
    pollster::block_on(Renderer::new(window, resolution))
}

fn event_loop_run(event_loop: EventLoop<Msg>, mut renderer: Renderer, events: Sender<Event>) -> ! {
    event_loop.run(move |event, _target, flow| {
        *flow = ControlFlow::Wait;
        match event {
            WinitEvent::UserEvent(Msg::Image { res, data }) => {
                match renderer.update_texture(res, &data) {
                    Ok(()) => renderer.window().request_redraw(),
                    Err(e) => log::error!("failed to update window contents: {e:#}"),
                }
            }
            WinitEvent::RedrawRequested(_) => {
                if let Err(e) = renderer.redraw() {
                    log::error!("failed to redraw window: {e:#}");
                }
            }
            WinitEvent::WindowEvent { event, .. } => {
                let event = match event {
                    WindowEvent::CloseRequested => Some(Event::CloseRequested),
                    WindowEvent::KeyboardInput {
                        input:
                            KeyboardInput {
                                state: ElementState::Pressed,
                                virtual_keycode: Some(code),
                                ..
                            },
                        ..
                    } => Key::from_virtual_keycode(code).map(Event::KeyPressed),
                    _ => None,
                };
                if let Some(event) = event {
                    // The application thread exits the process, so it is always listening.
                    events.send(event).ok();
                }
            }
            _ => {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_mapping() {
        assert_eq!(Key::from_virtual_keycode(VirtualKeyCode::L), Some(Key::L));
        assert_eq!(Key::from_virtual_keycode(VirtualKeyCode::Numpad2), Some(Key::Num2));
        assert_eq!(Key::from_virtual_keycode(VirtualKeyCode::Key3), Some(Key::Num3));
        assert_eq!(Key::from_virtual_keycode(VirtualKeyCode::Escape), Some(Key::Escape));
        assert_eq!(Key::from_virtual_keycode(VirtualKeyCode::X), None);
    }

    #[test]
    fn events_poll_without_blocking() {
        let (sender, recv) = mpsc::channel();
        let events = Events { recv };
        assert_eq!(events.poll().count(), 0);

        sender.send(Event::KeyPressed(Key::Tab)).unwrap();
        sender.send(Event::CloseRequested).unwrap();
        assert_eq!(
            events.poll().collect::<Vec<_>>(),
            [Event::KeyPressed(Key::Tab), Event::CloseRequested]
        );
        assert_eq!(events.poll().count(), 0);
    }
}
