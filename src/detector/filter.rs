//! "Real entry" heuristic
//!
//! Browsers write partial downloads under temporary names (`.crdownload`,
//! `.download`, dotted staging folders). Those extensions have no default
//! application, so requiring one filters them out without a deny-list.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use super::snapshot::EntryKind;

/// Answers whether the OS has a default application for a file extension
pub trait DefaultHandlerLookup: Send + Sync {
    fn has_default_handler(&self, extension: &str) -> bool;
}

impl<F> DefaultHandlerLookup for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn has_default_handler(&self, extension: &str) -> bool {
        self(extension)
    }
}

/// Lookup backed by the platform's file-type registry, memoized per extension
#[derive(Default)]
pub struct SystemHandlerLookup {
    cache: Mutex<HashMap<String, bool>>,
}

impl SystemHandlerLookup {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DefaultHandlerLookup for SystemHandlerLookup {
    fn has_default_handler(&self, extension: &str) -> bool {
        let key = extension.to_ascii_lowercase();
        if let Some(&cached) = self.cache.lock().get(&key) {
            return cached;
        }
        let found = platform_has_default_handler(&key);
        self.cache.lock().insert(key, found);
        found
    }
}

#[cfg(target_os = "macos")]
fn platform_has_default_handler(extension: &str) -> bool {
    launch_services::has_default_application(extension)
}

/// Off macOS there is no LaunchServices; a known MIME type is the closest signal
#[cfg(not(target_os = "macos"))]
fn platform_has_default_handler(extension: &str) -> bool {
    mime_guess::from_ext(extension).first().is_some()
}

#[cfg(target_os = "macos")]
mod launch_services {
    use core_foundation::base::TCFType;
    use core_foundation::string::{CFString, CFStringRef};
    use std::ffi::c_void;

    type CFURLRef = *const c_void;
    type CFErrorRef = *mut c_void;

    const K_LS_ROLES_ALL: u32 = 0xFFFF_FFFF;

    #[link(name = "CoreServices", kind = "framework")]
    extern "C" {
        fn UTTypeCreatePreferredIdentifierForTag(
            tag_class: CFStringRef,
            tag: CFStringRef,
            conforming_to: CFStringRef,
        ) -> CFStringRef;
        fn LSCopyDefaultApplicationURLForContentType(
            content_type: CFStringRef,
            role: u32,
            out_error: *mut CFErrorRef,
        ) -> CFURLRef;
    }

    #[link(name = "CoreFoundation", kind = "framework")]
    extern "C" {
        fn CFRelease(cf: *const c_void);
    }

    pub fn has_default_application(extension: &str) -> bool {
        let tag_class = CFString::new("public.filename-extension");
        let tag = CFString::new(extension);

        unsafe {
            let uti = UTTypeCreatePreferredIdentifierForTag(
                tag_class.as_concrete_TypeRef(),
                tag.as_concrete_TypeRef(),
                std::ptr::null(),
            );
            if uti.is_null() {
                return false;
            }

            let app_url =
                LSCopyDefaultApplicationURLForContentType(uti, K_LS_ROLES_ALL, std::ptr::null_mut());
            CFRelease(uti as *const c_void);

            if app_url.is_null() {
                return false;
            }
            CFRelease(app_url);
            true
        }
    }
}

/// Decides which entries are worth reporting
#[derive(Clone)]
pub struct EntryFilter {
    lookup: Arc<dyn DefaultHandlerLookup>,
}

impl EntryFilter {
    pub fn new(lookup: Arc<dyn DefaultHandlerLookup>) -> Self {
        Self { lookup }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemHandlerLookup::new()))
    }

    /// Directories are kept unless dotted. Files are kept only when their
    /// extension has a default application.
    pub fn is_real(&self, name: &OsStr, kind: EntryKind) -> bool {
        match kind {
            EntryKind::Directory => !is_hidden(name),
            EntryKind::File => Path::new(name)
                .extension()
                .and_then(|ext| ext.to_str())
                .filter(|ext| !ext.is_empty())
                .map(|ext| self.lookup.has_default_handler(ext))
                .unwrap_or(false),
        }
    }
}

impl std::fmt::Debug for EntryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryFilter").finish_non_exhaustive()
    }
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}
