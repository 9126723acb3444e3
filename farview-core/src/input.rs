//! OS input injection.
//!
//! The injector is split in two: a cheap, cloneable [`InputInjector`]
//! handle that endpoints call from any task, and a single background
//! worker thread that owns the platform backend and applies commands
//! in order. Some input APIs are not thread-safe (and `SendInput`
//! interleaves badly when raced), so every injection in the process
//! funnels through that one thread.
//!
//! On Windows the backend wraps `SendInput`; on other platforms the
//! backend reports the operation as unsupported, keeping the control
//! channel alive with error replies instead of dead air.

use std::sync::mpsc;
use std::thread;

use tracing::{debug, warn};

use crate::error::FarviewError;

// ── MouseButton ──────────────────────────────────────────────────

/// Mouse buttons addressable from the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// Wire spelling, as used in message names and payloads.
    pub const fn name(self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

// ── Commands ─────────────────────────────────────────────────────

/// One queued injection command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    MoveTo { x: i32, y: i32 },
    Click { button: MouseButton },
    ButtonDown { button: MouseButton },
    ButtonUp { button: MouseButton },
    Scroll { dx: i32, dy: i32 },
    KeyDown { key: String },
    KeyUp { key: String },
    KeyTap { key: String },
    /// Tap the last key with all earlier keys held as modifiers.
    KeyCombo { keys: Vec<String> },
    TypeString { text: String },
}

// ── Backend trait ────────────────────────────────────────────────

/// Primitive operations of an OS input backend.
///
/// Compound commands (click, tap, combo, typing) are decomposed by the
/// worker, so a backend only implements the five primitives.
pub trait InputBackend: Send {
    fn move_to(&mut self, x: i32, y: i32) -> Result<(), FarviewError>;
    fn button(&mut self, button: MouseButton, down: bool) -> Result<(), FarviewError>;
    fn scroll(&mut self, dx: i32, dy: i32) -> Result<(), FarviewError>;
    fn key(&mut self, name: &str, down: bool) -> Result<(), FarviewError>;
    fn type_char(&mut self, c: char) -> Result<(), FarviewError>;
}

/// The backend for the current platform.
pub fn platform_backend() -> Box<dyn InputBackend> {
    #[cfg(target_os = "windows")]
    {
        Box::new(platform::SendInputBackend::new())
    }
    #[cfg(not(target_os = "windows"))]
    {
        Box::new(UnsupportedBackend)
    }
}

// ── InputInjector ────────────────────────────────────────────────

/// Handle to the injection worker.
#[derive(Clone)]
pub struct InputInjector {
    tx: mpsc::Sender<InputCommand>,
}

impl InputInjector {
    /// Spawn the worker with the platform backend.
    pub fn new() -> Self {
        Self::with_backend(platform_backend())
    }

    /// Spawn the worker with an explicit backend (tests).
    pub fn with_backend(mut backend: Box<dyn InputBackend>) -> Self {
        let (tx, rx) = mpsc::channel::<InputCommand>();

        thread::spawn(move || {
            while let Ok(cmd) = rx.recv() {
                if let Err(e) = apply(backend.as_mut(), &cmd) {
                    warn!(command = ?cmd, error = %e, "input injection failed");
                }
            }
            debug!("input worker exited");
        });

        Self { tx }
    }

    /// Enqueue a command for the worker. Fire-and-forget: backend
    /// errors are logged by the worker, not returned here.
    pub fn send(&self, cmd: InputCommand) -> Result<(), FarviewError> {
        self.tx
            .send(cmd)
            .map_err(|_| FarviewError::ChannelClosed)
    }

    // Convenience wrappers, one per control operation.

    pub fn move_to(&self, x: i32, y: i32) -> Result<(), FarviewError> {
        self.send(InputCommand::MoveTo { x, y })
    }

    pub fn click(&self, button: MouseButton) -> Result<(), FarviewError> {
        self.send(InputCommand::Click { button })
    }

    pub fn button_down(&self, button: MouseButton) -> Result<(), FarviewError> {
        self.send(InputCommand::ButtonDown { button })
    }

    pub fn button_up(&self, button: MouseButton) -> Result<(), FarviewError> {
        self.send(InputCommand::ButtonUp { button })
    }

    pub fn scroll(&self, dx: i32, dy: i32) -> Result<(), FarviewError> {
        self.send(InputCommand::Scroll { dx, dy })
    }

    pub fn key_down(&self, key: &str) -> Result<(), FarviewError> {
        self.send(InputCommand::KeyDown { key: key.into() })
    }

    pub fn key_up(&self, key: &str) -> Result<(), FarviewError> {
        self.send(InputCommand::KeyUp { key: key.into() })
    }

    pub fn key_tap(&self, key: &str) -> Result<(), FarviewError> {
        self.send(InputCommand::KeyTap { key: key.into() })
    }

    pub fn key_combo(&self, keys: Vec<String>) -> Result<(), FarviewError> {
        self.send(InputCommand::KeyCombo { keys })
    }

    pub fn type_string(&self, text: &str) -> Result<(), FarviewError> {
        self.send(InputCommand::TypeString { text: text.into() })
    }
}

impl Default for InputInjector {
    fn default() -> Self {
        Self::new()
    }
}

/// Decompose one command into backend primitives.
fn apply(backend: &mut dyn InputBackend, cmd: &InputCommand) -> Result<(), FarviewError> {
    match cmd {
        InputCommand::MoveTo { x, y } => backend.move_to(*x, *y),
        InputCommand::Click { button } => {
            backend.button(*button, true)?;
            backend.button(*button, false)
        }
        InputCommand::ButtonDown { button } => backend.button(*button, true),
        InputCommand::ButtonUp { button } => backend.button(*button, false),
        InputCommand::Scroll { dx, dy } => backend.scroll(*dx, *dy),
        InputCommand::KeyDown { key } => backend.key(key, true),
        InputCommand::KeyUp { key } => backend.key(key, false),
        InputCommand::KeyTap { key } => {
            backend.key(key, true)?;
            backend.key(key, false)
        }
        InputCommand::KeyCombo { keys } => {
            let Some((main, modifiers)) = keys.split_last() else {
                return Ok(());
            };
            for m in modifiers {
                backend.key(m, true)?;
            }
            let tap = backend
                .key(main, true)
                .and_then(|_| backend.key(main, false));
            // Modifiers are released even when the main tap failed.
            for m in modifiers.iter().rev() {
                backend.key(m, false)?;
            }
            tap
        }
        InputCommand::TypeString { text } => {
            for c in text.chars() {
                backend.type_char(c)?;
            }
            Ok(())
        }
    }
}

// ── Non-Windows stub backend ─────────────────────────────────────

/// Backend for platforms without an injection implementation.
#[cfg(not(target_os = "windows"))]
struct UnsupportedBackend;

#[cfg(not(target_os = "windows"))]
impl InputBackend for UnsupportedBackend {
    fn move_to(&mut self, _x: i32, _y: i32) -> Result<(), FarviewError> {
        Err(FarviewError::Input("input injection is only available on Windows".into()))
    }
    fn button(&mut self, _button: MouseButton, _down: bool) -> Result<(), FarviewError> {
        Err(FarviewError::Input("input injection is only available on Windows".into()))
    }
    fn scroll(&mut self, _dx: i32, _dy: i32) -> Result<(), FarviewError> {
        Err(FarviewError::Input("input injection is only available on Windows".into()))
    }
    fn key(&mut self, _name: &str, _down: bool) -> Result<(), FarviewError> {
        Err(FarviewError::Input("input injection is only available on Windows".into()))
    }
    fn type_char(&mut self, _c: char) -> Result<(), FarviewError> {
        Err(FarviewError::Input("input injection is only available on Windows".into()))
    }
}

// ── Windows implementation ───────────────────────────────────────

#[cfg(target_os = "windows")]
mod platform {
    use super::*;
    use windows::Win32::UI::Input::KeyboardAndMouse::*;
    use windows::Win32::UI::WindowsAndMessaging::{
        GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN,
    };

    /// Wheel increment per notch.
    const WHEEL_DELTA: i32 = 120;

    /// `SendInput`-based backend.
    ///
    /// Requires the process to run in the interactive desktop session.
    pub struct SendInputBackend;

    impl SendInputBackend {
        pub fn new() -> Self {
            Self
        }

        fn send(&self, input: INPUT) -> Result<(), FarviewError> {
            let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
            if sent == 0 {
                return Err(FarviewError::Input("SendInput returned 0".into()));
            }
            Ok(())
        }

        fn mouse_input(flags: MOUSE_EVENT_FLAGS, dx: i32, dy: i32, data: i32) -> INPUT {
            INPUT {
                r#type: INPUT_MOUSE,
                Anonymous: INPUT_0 {
                    mi: MOUSEINPUT {
                        dx,
                        dy,
                        mouseData: data as u32,
                        dwFlags: flags,
                        time: 0,
                        dwExtraInfo: 0,
                    },
                },
            }
        }

        fn key_input(vk: u16, up: bool) -> INPUT {
            let mut flags = KEYBD_EVENT_FLAGS(0);
            if up {
                flags |= KEYEVENTF_KEYUP;
            }
            INPUT {
                r#type: INPUT_KEYBOARD,
                Anonymous: INPUT_0 {
                    ki: KEYBDINPUT {
                        wVk: VIRTUAL_KEY(vk),
                        wScan: 0,
                        dwFlags: flags,
                        time: 0,
                        dwExtraInfo: 0,
                    },
                },
            }
        }
    }

    impl InputBackend for SendInputBackend {
        fn move_to(&mut self, x: i32, y: i32) -> Result<(), FarviewError> {
            let (screen_w, screen_h) = unsafe {
                (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN))
            };
            if screen_w == 0 || screen_h == 0 {
                return Err(FarviewError::Input("GetSystemMetrics returned 0".into()));
            }

            // Absolute coordinates are normalized to 0..65535.
            let abs_x = (x as i64 * 65535 / screen_w as i64) as i32;
            let abs_y = (y as i64 * 65535 / screen_h as i64) as i32;
            self.send(Self::mouse_input(
                MOUSEEVENTF_MOVE | MOUSEEVENTF_ABSOLUTE,
                abs_x,
                abs_y,
                0,
            ))
        }

        fn button(&mut self, button: MouseButton, down: bool) -> Result<(), FarviewError> {
            let flags = match (button, down) {
                (MouseButton::Left, true) => MOUSEEVENTF_LEFTDOWN,
                (MouseButton::Left, false) => MOUSEEVENTF_LEFTUP,
                (MouseButton::Right, true) => MOUSEEVENTF_RIGHTDOWN,
                (MouseButton::Right, false) => MOUSEEVENTF_RIGHTUP,
                (MouseButton::Middle, true) => MOUSEEVENTF_MIDDLEDOWN,
                (MouseButton::Middle, false) => MOUSEEVENTF_MIDDLEUP,
            };
            self.send(Self::mouse_input(flags, 0, 0, 0))
        }

        fn scroll(&mut self, dx: i32, dy: i32) -> Result<(), FarviewError> {
            if dy != 0 {
                self.send(Self::mouse_input(MOUSEEVENTF_WHEEL, 0, 0, dy * WHEEL_DELTA))?;
            }
            if dx != 0 {
                self.send(Self::mouse_input(MOUSEEVENTF_HWHEEL, 0, 0, dx * WHEEL_DELTA))?;
            }
            Ok(())
        }

        fn key(&mut self, name: &str, down: bool) -> Result<(), FarviewError> {
            let vk = vk_code(name).ok_or_else(|| {
                FarviewError::Input(format!("unknown key name: {name}"))
            })?;
            self.send(Self::key_input(vk, !down))
        }

        fn type_char(&mut self, c: char) -> Result<(), FarviewError> {
            // KEYEVENTF_UNICODE injects the character directly,
            // independent of the active keyboard layout.
            let mut buf = [0u16; 2];
            for &unit in c.encode_utf16(&mut buf).iter() {
                for up in [false, true] {
                    let mut flags = KEYEVENTF_UNICODE;
                    if up {
                        flags |= KEYEVENTF_KEYUP;
                    }
                    let input = INPUT {
                        r#type: INPUT_KEYBOARD,
                        Anonymous: INPUT_0 {
                            ki: KEYBDINPUT {
                                wVk: VIRTUAL_KEY(0),
                                wScan: unit,
                                dwFlags: flags,
                                time: 0,
                                dwExtraInfo: 0,
                            },
                        },
                    };
                    self.send(input)?;
                }
            }
            Ok(())
        }
    }

    /// Map a symbolic key name to a Windows virtual-key code.
    fn vk_code(name: &str) -> Option<u16> {
        let vk = match name {
            "backspace" => VK_BACK,
            "tab" => VK_TAB,
            "enter" => VK_RETURN,
            "shift" => VK_SHIFT,
            "ctrl" => VK_CONTROL,
            "alt" => VK_MENU,
            "cmd" => VK_LWIN,
            "esc" => VK_ESCAPE,
            "space" => VK_SPACE,
            "left" => VK_LEFT,
            "up" => VK_UP,
            "right" => VK_RIGHT,
            "down" => VK_DOWN,
            "delete" => VK_DELETE,
            "home" => VK_HOME,
            "end" => VK_END,
            "pageup" => VK_PRIOR,
            "pagedown" => VK_NEXT,
            _ => {
                // Single printable character: letters/digits map to
                // their uppercase VK; others go through VkKeyScanW.
                let mut chars = name.chars();
                let c = chars.next()?;
                if chars.next().is_some() {
                    // Function keys: f1..f12.
                    if let Some(n) = name.strip_prefix('f').and_then(|s| s.parse::<u16>().ok()) {
                        if (1..=12).contains(&n) {
                            return Some(VK_F1.0 + n - 1);
                        }
                    }
                    return None;
                }
                if c.is_ascii_alphanumeric() {
                    return Some(c.to_ascii_uppercase() as u16);
                }
                let scan = unsafe { VkKeyScanW(c as u16) };
                if scan == -1 {
                    return None;
                }
                return Some((scan & 0xFF) as u16);
            }
        };
        Some(vk.0)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Backend that records primitive calls as strings.
    struct MockBackend {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl InputBackend for MockBackend {
        fn move_to(&mut self, x: i32, y: i32) -> Result<(), FarviewError> {
            self.log.lock().unwrap().push(format!("move {x},{y}"));
            Ok(())
        }
        fn button(&mut self, button: MouseButton, down: bool) -> Result<(), FarviewError> {
            let dir = if down { "down" } else { "up" };
            self.log
                .lock()
                .unwrap()
                .push(format!("button {} {dir}", button.name()));
            Ok(())
        }
        fn scroll(&mut self, dx: i32, dy: i32) -> Result<(), FarviewError> {
            self.log.lock().unwrap().push(format!("scroll {dx},{dy}"));
            Ok(())
        }
        fn key(&mut self, name: &str, down: bool) -> Result<(), FarviewError> {
            let dir = if down { "down" } else { "up" };
            self.log.lock().unwrap().push(format!("key {name} {dir}"));
            Ok(())
        }
        fn type_char(&mut self, c: char) -> Result<(), FarviewError> {
            self.log.lock().unwrap().push(format!("type {c}"));
            Ok(())
        }
    }

    fn injector() -> (InputInjector, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let backend = MockBackend {
            log: Arc::clone(&log),
        };
        (InputInjector::with_backend(Box::new(backend)), log)
    }

    /// Wait until the worker has drained everything it will get.
    fn drain(inj: InputInjector, log: &Arc<Mutex<Vec<String>>>, expected: usize) -> Vec<String> {
        drop(inj);
        for _ in 0..100 {
            if log.lock().unwrap().len() >= expected {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        log.lock().unwrap().clone()
    }

    #[test]
    fn click_decomposes_to_down_up() {
        let (inj, log) = injector();
        inj.move_to(10, 20).unwrap();
        inj.click(MouseButton::Left).unwrap();
        let log = drain(inj, &log, 3);
        assert_eq!(log, vec!["move 10,20", "button left down", "button left up"]);
    }

    #[test]
    fn combo_holds_modifiers_around_main_key() {
        let (inj, log) = injector();
        inj.key_combo(vec!["ctrl".into(), "shift".into(), "esc".into()])
            .unwrap();
        let log = drain(inj, &log, 6);
        assert_eq!(
            log,
            vec![
                "key ctrl down",
                "key shift down",
                "key esc down",
                "key esc up",
                "key shift up",
                "key ctrl up",
            ]
        );
    }

    #[test]
    fn single_key_combo_is_a_tap() {
        let (inj, log) = injector();
        inj.key_combo(vec!["a".into()]).unwrap();
        let log = drain(inj, &log, 2);
        assert_eq!(log, vec!["key a down", "key a up"]);
    }

    #[test]
    fn type_string_emits_per_char() {
        let (inj, log) = injector();
        inj.type_string("hi").unwrap();
        let log = drain(inj, &log, 2);
        assert_eq!(log, vec!["type h", "type i"]);
    }

    #[test]
    fn commands_apply_in_submission_order() {
        let (inj, log) = injector();
        inj.button_down(MouseButton::Left).unwrap();
        inj.scroll(0, 3).unwrap();
        inj.button_up(MouseButton::Left).unwrap();
        let log = drain(inj, &log, 3);
        assert_eq!(
            log,
            vec!["button left down", "scroll 0,3", "button left up"]
        );
    }
}
