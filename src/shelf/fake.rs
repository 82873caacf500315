//! In-memory shelf platform for tests
//!
//! Each hand-off opens a new numbered window unless told otherwise, and
//! every call is recorded for assertions.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use super::platform::ShelfPlatform;
use crate::error::{AutoShelfError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FakeWindow(pub u32);

#[derive(Default)]
pub struct FakeState {
    pub windows: Vec<FakeWindow>,
    pub next_window: u32,
    pub hand_offs: Vec<(Vec<PathBuf>, String)>,
    pub pressed: Vec<FakeWindow>,
    pub observed: Vec<FakeWindow>,
    pub fail_hand_off: bool,
    pub open_window_on_hand_off: bool,
    pub missing_close_control: bool,
}

#[derive(Clone)]
pub struct FakePlatform {
    pub state: Rc<RefCell<FakeState>>,
    destroyed_tx: async_channel::Sender<FakeWindow>,
    destroyed_rx: async_channel::Receiver<FakeWindow>,
}

impl FakePlatform {
    pub fn new() -> Self {
        let (destroyed_tx, destroyed_rx) = async_channel::unbounded();
        let state = FakeState {
            next_window: 100,
            open_window_on_hand_off: true,
            ..Default::default()
        };
        Self {
            state: Rc::new(RefCell::new(state)),
            destroyed_tx,
            destroyed_rx,
        }
    }

    /// The user closes the window by hand
    pub fn destroy(&self, window: FakeWindow) {
        self.state.borrow_mut().windows.retain(|w| *w != window);
        self.destroyed_tx.try_send(window).unwrap();
    }
}

impl ShelfPlatform for FakePlatform {
    type Window = FakeWindow;

    fn shelf_windows(&self) -> Result<Vec<FakeWindow>> {
        Ok(self.state.borrow().windows.clone())
    }

    fn hand_off(&self, paths: &[PathBuf], service_name: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_hand_off {
            return Err(AutoShelfError::HandOff {
                path: paths[0].clone(),
                reason: "service unavailable".to_string(),
            });
        }
        state
            .hand_offs
            .push((paths.to_vec(), service_name.to_string()));
        if state.open_window_on_hand_off {
            let window = FakeWindow(state.next_window);
            state.next_window += 1;
            state.windows.push(window);
        }
        Ok(())
    }

    fn press_close_control(&self, window: &FakeWindow) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.missing_close_control {
            return Err(AutoShelfError::CloseControlNotFound);
        }
        state.pressed.push(*window);
        state.windows.retain(|w| w != window);
        Ok(())
    }

    fn observe_destruction(&self, window: &FakeWindow) -> Result<()> {
        self.state.borrow_mut().observed.push(*window);
        Ok(())
    }

    fn destruction_events(&self) -> async_channel::Receiver<FakeWindow> {
        self.destroyed_rx.clone()
    }
}
