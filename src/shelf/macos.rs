//! Shelf platform backed by macOS Accessibility and the Services menu
//!
//! Windows are found through `AXUIElementCreateApplication(pid)` and the
//! `AXWindows` attribute, files are handed over with `NSPerformService`, and
//! destruction is observed with an `AXObserver` whose run loop source lives
//! on a dedicated thread.
//!
//! Requires Accessibility permission in System Settings > Privacy & Security > Accessibility

#![allow(non_upper_case_globals)]

use anyhow::{bail, Context};
use std::ffi::c_void;
use std::path::PathBuf;
use std::thread;
use tracing::{debug, info, instrument, warn};

use super::platform::ShelfPlatform;
use crate::error::{AutoShelfError, Result};

// ============================================================================
// CoreFoundation FFI bindings
// ============================================================================

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFRelease(cf: *const c_void);
    fn CFRetain(cf: *const c_void) -> *const c_void;
    fn CFEqual(cf1: *const c_void, cf2: *const c_void) -> u8;
    fn CFStringCreateWithCString(
        alloc: *const c_void,
        c_str: *const i8,
        encoding: u32,
    ) -> CFStringRef;
    fn CFStringGetCString(
        string: CFStringRef,
        buffer: *mut i8,
        buffer_size: i64,
        encoding: u32,
    ) -> bool;
    fn CFStringGetLength(string: CFStringRef) -> i64;
    fn CFGetTypeID(cf: CFTypeRef) -> u64;
    fn CFStringGetTypeID() -> u64;
    fn CFArrayGetCount(array: CFArrayRef) -> i64;
    fn CFArrayGetValueAtIndex(array: CFArrayRef, index: i64) -> CFTypeRef;
    fn CFRunLoopGetCurrent() -> CFRunLoopRef;
    fn CFRunLoopRun();
    fn CFRunLoopStop(run_loop: CFRunLoopRef);
    fn CFRunLoopAddSource(run_loop: CFRunLoopRef, source: CFRunLoopSourceRef, mode: CFStringRef);

    static kCFRunLoopDefaultMode: CFStringRef;
}

// ============================================================================
// ApplicationServices (Accessibility) FFI bindings
// ============================================================================

type AXObserverCallback = extern "C" fn(
    observer: AXObserverRef,
    element: AXUIElementRef,
    notification: CFStringRef,
    refcon: *mut c_void,
);

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn AXUIElementCreateApplication(pid: i32) -> AXUIElementRef;
    fn AXUIElementCopyAttributeValue(
        element: AXUIElementRef,
        attribute: CFStringRef,
        value: *mut CFTypeRef,
    ) -> i32;
    fn AXUIElementPerformAction(element: AXUIElementRef, action: CFStringRef) -> i32;
    fn AXObserverCreate(
        application: i32,
        callback: AXObserverCallback,
        out_observer: *mut AXObserverRef,
    ) -> i32;
    fn AXObserverAddNotification(
        observer: AXObserverRef,
        element: AXUIElementRef,
        notification: CFStringRef,
        refcon: *mut c_void,
    ) -> i32;
    fn AXObserverGetRunLoopSource(observer: AXObserverRef) -> CFRunLoopSourceRef;
}

#[link(name = "AppKit", kind = "framework")]
extern "C" {
    fn NSPerformService(item_name: cocoa::base::id, pboard: cocoa::base::id) -> cocoa::base::BOOL;
}

// AXError codes
const kAXErrorSuccess: i32 = 0;
const kAXErrorAPIDisabled: i32 = -25211;
const kAXErrorNoValue: i32 = -25212;
const kAXErrorNotificationAlreadyRegistered: i32 = -25209;

const kCFStringEncodingUTF8: u32 = 0x08000100;

const SHELF_SUBROLE: &str = "AXSystemDialog";
const DESTROYED_NOTIFICATION: &str = "AXUIElementDestroyed";
const FILENAMES_PBOARD_TYPE: &str = "NSFilenamesPboardType";

type AXUIElementRef = *const c_void;
type AXObserverRef = *mut c_void;
type CFTypeRef = *const c_void;
type CFStringRef = *const c_void;
type CFArrayRef = *const c_void;
type CFRunLoopRef = *mut c_void;
type CFRunLoopSourceRef = *mut c_void;

// ============================================================================
// Helper Functions
// ============================================================================

/// Create a CFString from a Rust string. Caller releases.
fn create_cf_string(s: &str) -> CFStringRef {
    let c_str = match std::ffi::CString::new(s) {
        Ok(c) => c,
        Err(_) => return std::ptr::null(),
    };
    unsafe { CFStringCreateWithCString(std::ptr::null(), c_str.as_ptr(), kCFStringEncodingUTF8) }
}

fn cf_string_to_string(cf_string: CFStringRef) -> Option<String> {
    if cf_string.is_null() {
        return None;
    }

    unsafe {
        let length = CFStringGetLength(cf_string);
        if length <= 0 {
            return Some(String::new());
        }

        let buffer_size = (length * 4 + 1) as usize;
        let mut buffer: Vec<i8> = vec![0; buffer_size];

        if CFStringGetCString(
            cf_string,
            buffer.as_mut_ptr(),
            buffer_size as i64,
            kCFStringEncodingUTF8,
        ) {
            let c_str = std::ffi::CStr::from_ptr(buffer.as_ptr());
            c_str.to_str().ok().map(|s| s.to_string())
        } else {
            None
        }
    }
}

fn cf_release(cf: CFTypeRef) {
    if !cf.is_null() {
        unsafe {
            CFRelease(cf);
        }
    }
}

fn cf_retain(cf: CFTypeRef) -> CFTypeRef {
    if cf.is_null() {
        cf
    } else {
        unsafe { CFRetain(cf) }
    }
}

/// Raw AX status plus the copied value (null unless the status is success)
fn copy_ax_attribute(element: AXUIElementRef, attribute: &str) -> (i32, CFTypeRef) {
    let attr_str = create_cf_string(attribute);
    let mut value: CFTypeRef = std::ptr::null();

    let result =
        unsafe { AXUIElementCopyAttributeValue(element, attr_str, &mut value as *mut CFTypeRef) };

    cf_release(attr_str);
    (result, value)
}

/// Copy an attribute value from an AXUIElement. Caller releases.
fn get_ax_attribute(element: AXUIElementRef, attribute: &str) -> anyhow::Result<CFTypeRef> {
    match copy_ax_attribute(element, attribute) {
        (kAXErrorSuccess, value) => Ok(value),
        (kAXErrorAPIDisabled, _) => bail!("Accessibility API is disabled"),
        (kAXErrorNoValue, _) => bail!("No value for attribute: {}", attribute),
        (result, _) => bail!("Failed to get attribute {}: error {}", attribute, result),
    }
}

fn get_string_attribute(element: AXUIElementRef, attribute: &str) -> Option<String> {
    let value = get_ax_attribute(element, attribute).ok()?;
    let is_string = unsafe { CFGetTypeID(value) == CFStringGetTypeID() };
    let result = if is_string {
        cf_string_to_string(value as CFStringRef)
    } else {
        None
    };
    cf_release(value);
    result
}

/// Retained copies of every element in an array-valued attribute
fn get_element_array(element: AXUIElementRef, attribute: &str) -> anyhow::Result<Vec<AxWindow>> {
    let array = match copy_ax_attribute(element, attribute) {
        (kAXErrorSuccess, array) if !array.is_null() => array,
        (kAXErrorSuccess, _) | (kAXErrorNoValue, _) => return Ok(Vec::new()),
        (kAXErrorAPIDisabled, _) => bail!("Accessibility API is disabled"),
        (result, _) => bail!("Failed to get attribute {}: error {}", attribute, result),
    };

    let count = unsafe { CFArrayGetCount(array as CFArrayRef) };
    let elements = (0..count)
        .filter_map(|i| {
            let item = unsafe { CFArrayGetValueAtIndex(array as CFArrayRef, i) };
            AxWindow::retain(item)
        })
        .collect();

    cf_release(array);
    Ok(elements)
}

fn perform_ax_action(element: AXUIElementRef, action: &str) -> anyhow::Result<()> {
    let action_str = create_cf_string(action);

    let result = unsafe { AXUIElementPerformAction(element, action_str) };

    cf_release(action_str);

    match result {
        kAXErrorSuccess => Ok(()),
        kAXErrorAPIDisabled => bail!("Accessibility API is disabled"),
        _ => bail!("Failed to perform action {}: error {}", action, result),
    }
}

// ============================================================================
// Window handle
// ============================================================================

/// A retained `AXUIElementRef` for one window.
///
/// Equality is `CFEqual`, which still holds for an element whose window has
/// since been destroyed.
pub struct AxWindow(AXUIElementRef);

// AXUIElementRef is a CF type; retain/release and CFEqual are thread-safe
unsafe impl Send for AxWindow {}

impl AxWindow {
    fn retain(element: CFTypeRef) -> Option<Self> {
        if element.is_null() {
            None
        } else {
            Some(Self(cf_retain(element)))
        }
    }

    fn as_ptr(&self) -> AXUIElementRef {
        self.0
    }

    fn subrole(&self) -> Option<String> {
        get_string_attribute(self.0, "AXSubrole")
    }
}

impl Clone for AxWindow {
    fn clone(&self) -> Self {
        Self(cf_retain(self.0))
    }
}

impl Drop for AxWindow {
    fn drop(&mut self) {
        cf_release(self.0);
    }
}

impl PartialEq for AxWindow {
    fn eq(&self, other: &Self) -> bool {
        unsafe { CFEqual(self.0, other.0) != 0 }
    }
}

impl std::fmt::Debug for AxWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AxWindow").field(&self.0).finish()
    }
}

// ============================================================================
// Destruction observer
// ============================================================================

/// Forwards `AXUIElementDestroyed` into a channel.
///
/// Runs on the observer thread. Never touches manager state.
extern "C" fn on_element_destroyed(
    _observer: AXObserverRef,
    element: AXUIElementRef,
    _notification: CFStringRef,
    refcon: *mut c_void,
) {
    // Unwinding across the FFI boundary is undefined behavior
    let _ = std::panic::catch_unwind(|| {
        if refcon.is_null() {
            return;
        }
        let tx = unsafe { &*(refcon as *const async_channel::Sender<AxWindow>) };
        if let Some(window) = AxWindow::retain(element) {
            debug!(window = ?window, "Shelf window destroyed");
            let _ = tx.try_send(window);
        }
    });
}

/// AXObserver plus the run loop thread that services it
struct DestructionObserver {
    observer: AXObserverRef,
    run_loop: usize,
    thread: Option<thread::JoinHandle<()>>,
    refcon: *mut async_channel::Sender<AxWindow>,
}

impl DestructionObserver {
    fn create(pid: i32, tx: async_channel::Sender<AxWindow>) -> anyhow::Result<Self> {
        let mut observer: AXObserverRef = std::ptr::null_mut();
        let result = unsafe { AXObserverCreate(pid, on_element_destroyed, &mut observer) };
        if result != kAXErrorSuccess || observer.is_null() {
            bail!("AXObserverCreate failed for pid {}: error {}", pid, result);
        }

        let source = unsafe { AXObserverGetRunLoopSource(observer) } as usize;
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<usize>();

        let spawned = thread::Builder::new()
            .name("ax-observer".into())
            .spawn(move || unsafe {
                let run_loop = CFRunLoopGetCurrent();
                CFRunLoopAddSource(run_loop, source as CFRunLoopSourceRef, kCFRunLoopDefaultMode);
                // Released by the owner once this thread has been joined
                cf_retain(run_loop as CFTypeRef);
                let _ = ready_tx.send(run_loop as usize);
                CFRunLoopRun();
                debug!("AX observer run loop exited");
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                cf_release(observer as CFTypeRef);
                return Err(e).context("Failed to spawn AX observer thread");
            }
        };

        let run_loop = match ready_rx.recv() {
            Ok(run_loop) => run_loop,
            Err(_) => {
                cf_release(observer as CFTypeRef);
                bail!("AX observer thread exited before its run loop started");
            }
        };

        Ok(Self {
            observer,
            run_loop,
            thread: Some(thread),
            refcon: Box::into_raw(Box::new(tx)),
        })
    }

    fn watch(&self, element: AXUIElementRef) -> anyhow::Result<()> {
        let notification = create_cf_string(DESTROYED_NOTIFICATION);
        let result = unsafe {
            AXObserverAddNotification(
                self.observer,
                element,
                notification,
                self.refcon as *mut c_void,
            )
        };
        cf_release(notification);

        match result {
            kAXErrorSuccess | kAXErrorNotificationAlreadyRegistered => Ok(()),
            kAXErrorAPIDisabled => bail!("Accessibility API is disabled"),
            _ => bail!("AXObserverAddNotification failed: error {}", result),
        }
    }
}

const STOP_RETRY: std::time::Duration = std::time::Duration::from_millis(10);
const STOP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

/// Stop the run loop and wait for its thread. Returns false on timeout.
///
/// The thread may not have entered `CFRunLoopRun` yet, and a stop issued
/// before that is lost, so the stop is repeated until the thread exits.
fn stop_run_loop_thread(run_loop: usize, thread: thread::JoinHandle<()>) -> bool {
    let deadline = std::time::Instant::now() + STOP_TIMEOUT;
    while !thread.is_finished() {
        if std::time::Instant::now() >= deadline {
            warn!("AX observer thread did not stop, leaving it running");
            return false;
        }
        unsafe { CFRunLoopStop(run_loop as CFRunLoopRef) };
        thread::sleep(STOP_RETRY);
    }
    let _ = thread.join();
    true
}

impl Drop for DestructionObserver {
    fn drop(&mut self) {
        let stopped = match self.thread.take() {
            Some(thread) => stop_run_loop_thread(self.run_loop, thread),
            None => true,
        };
        if !stopped {
            // A live run loop may still call back with the observer and sender
            return;
        }
        cf_release(self.run_loop as CFTypeRef);
        cf_release(self.observer as CFTypeRef);
        // The run loop is gone, so no callback can still hold the sender
        drop(unsafe { Box::from_raw(self.refcon) });
    }
}

// ============================================================================
// Platform
// ============================================================================

/// Process id of the first running application with `bundle_id`
fn find_running_app(bundle_id: &str) -> anyhow::Result<Option<i32>> {
    use cocoa::base::{id, nil};
    use cocoa::foundation::NSString;
    use objc::{class, msg_send, sel, sel_impl};

    unsafe {
        let ns_bundle_id = NSString::alloc(nil).init_str(bundle_id);
        if ns_bundle_id == nil {
            bail!("Failed to create NSString for bundle id");
        }
        let apps: id = msg_send![
            class!(NSRunningApplication),
            runningApplicationsWithBundleIdentifier: ns_bundle_id
        ];
        let _: () = msg_send![ns_bundle_id, release];

        if apps == nil {
            return Ok(None);
        }
        let count: usize = msg_send![apps, count];
        if count == 0 {
            return Ok(None);
        }
        let app: id = msg_send![apps, objectAtIndex: 0usize];
        let pid: i32 = msg_send![app, processIdentifier];
        Ok(Some(pid))
    }
}

/// Whether an application with `bundle_id` is currently running
pub fn is_shelf_app_running(bundle_id: &str) -> bool {
    matches!(find_running_app(bundle_id), Ok(Some(_)))
}

pub struct MacShelfPlatform {
    bundle_id: String,
    app: AxWindow,
    observer: DestructionObserver,
    destroyed_rx: async_channel::Receiver<AxWindow>,
}

impl MacShelfPlatform {
    /// Locate the shelf process and create the destruction observer.
    ///
    /// Both failures are fatal: without the process or the observer there is
    /// nothing useful to do.
    #[instrument(name = "shelf_platform_connect")]
    pub fn connect(bundle_id: &str) -> Result<Self> {
        let pid = find_running_app(bundle_id)
            .map_err(|e| AutoShelfError::Accessibility(format!("{:#}", e)))?
            .ok_or_else(|| AutoShelfError::ShelfAppNotRunning {
                bundle_id: bundle_id.to_string(),
            })?;

        let app_ref = unsafe { AXUIElementCreateApplication(pid) };
        if app_ref.is_null() {
            return Err(AutoShelfError::Observer(format!(
                "cannot create accessibility element for pid {}",
                pid
            )));
        }
        // Create rule: we already own this reference
        let app = AxWindow(app_ref);

        let (tx, destroyed_rx) = async_channel::unbounded();
        let observer = DestructionObserver::create(pid, tx)
            .map_err(|e| AutoShelfError::Observer(format!("{:#}", e)))?;

        info!(bundle_id, pid, "Connected to shelf application");
        Ok(Self {
            bundle_id: bundle_id.to_string(),
            app,
            observer,
            destroyed_rx,
        })
    }
}

impl ShelfPlatform for MacShelfPlatform {
    type Window = AxWindow;

    fn shelf_windows(&self) -> Result<Vec<AxWindow>> {
        let windows = get_element_array(self.app.as_ptr(), "AXWindows").map_err(|e| {
            AutoShelfError::Accessibility(format!(
                "cannot list windows of {}: {:#}",
                self.bundle_id, e
            ))
        })?;

        Ok(windows
            .into_iter()
            .filter(|w| w.subrole().as_deref() == Some(SHELF_SUBROLE))
            .collect())
    }

    #[instrument(skip(self, paths), fields(count = paths.len()))]
    fn hand_off(&self, paths: &[PathBuf], service_name: &str) -> Result<()> {
        use cocoa::base::{id, nil, NO};
        use cocoa::foundation::{NSArray, NSString};
        use objc::{class, msg_send, sel, sel_impl};

        let first = paths.first().cloned().unwrap_or_default();
        let fail = |reason: String| AutoShelfError::HandOff {
            path: first.clone(),
            reason,
        };

        let path_strings = paths
            .iter()
            .map(|p| {
                p.to_str()
                    .map(str::to_owned)
                    .ok_or_else(|| fail("path is not valid UTF-8".to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        objc::rc::autoreleasepool(|| unsafe {
            let pboard: id = msg_send![class!(NSPasteboard), pasteboardWithUniqueName];
            if pboard == nil {
                return Err(fail("cannot create pasteboard".to_string()));
            }

            let pboard_type: id = NSString::alloc(nil).init_str(FILENAMES_PBOARD_TYPE);
            let _: id = msg_send![pboard_type, autorelease];
            let types: id = NSArray::arrayWithObject(nil, pboard_type);
            let _: i64 = msg_send![pboard, declareTypes: types owner: nil];

            let ns_paths: Vec<id> = path_strings
                .iter()
                .map(|s| {
                    let ns: id = NSString::alloc(nil).init_str(s);
                    msg_send![ns, autorelease]
                })
                .collect();
            let plist: id = NSArray::arrayWithObjects(nil, &ns_paths);
            let wrote: cocoa::base::BOOL =
                msg_send![pboard, setPropertyList: plist forType: pboard_type];

            let service: id = NSString::alloc(nil).init_str(service_name);
            let _: id = msg_send![service, autorelease];
            let performed = if wrote == NO {
                NO
            } else {
                NSPerformService(service, pboard)
            };
            let _: () = msg_send![pboard, releaseGlobally];

            if wrote == NO {
                return Err(fail("cannot write paths to pasteboard".to_string()));
            }
            if performed == NO {
                return Err(fail(format!("service '{}' did not run", service_name)));
            }
            Ok(())
        })
    }

    fn press_close_control(&self, window: &AxWindow) -> Result<()> {
        let children = get_element_array(window.as_ptr(), "AXChildren")
            .map_err(|_| AutoShelfError::CloseControlNotFound)?;
        let close = children
            .into_iter()
            .next()
            .ok_or(AutoShelfError::CloseControlNotFound)?;

        perform_ax_action(close.as_ptr(), "AXPress")
            .map_err(|e| AutoShelfError::Accessibility(format!("{:#}", e)))
    }

    fn observe_destruction(&self, window: &AxWindow) -> Result<()> {
        self.observer
            .watch(window.as_ptr())
            .map_err(|e| AutoShelfError::Accessibility(format!("{:#}", e)))
    }

    fn destruction_events(&self) -> async_channel::Receiver<AxWindow> {
        self.destroyed_rx.clone()
    }
}
