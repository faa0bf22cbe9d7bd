//! Guest-side helpers for telehost Wasm plugins.
//!
//! A plugin is a `cdylib` built for `wasm32-unknown-unknown`. Implement
//! [`Plugin`] and call [`export_plugin!`]; the macro emits the four exports
//! the host binds (`plugin_manifest`, `plugin_execute`, `plugin_alloc`,
//! `plugin_dealloc`).
//!
//! ```rust,ignore
//! use telehost_plugin_sdk::prelude::*;
//!
//! struct Echo;
//!
//! impl Plugin for Echo {
//!     fn manifest() -> PluginManifest {
//!         PluginManifest::new()
//!             .name("echo")
//!             .command(CommandSpec::new("echo", "Echoes its arguments"))
//!     }
//!
//!     fn invoke(invocation: Invocation) -> ExecuteResult {
//!         match invocation {
//!             Invocation::Command { args, .. } => ExecuteResult::reply(args.join(" ")),
//!             _ => ExecuteResult::Silent,
//!         }
//!     }
//! }
//!
//! export_plugin!(Echo);
//! ```

pub use telehost_plugin_api::*;

pub mod prelude {
    pub use crate::{export_plugin, Plugin};
    pub use telehost_plugin_api::{
        CommandSpec, CronSpec, ExecuteError, ExecuteResult, Invocation, PluginManifest,
    };
}

/// A guest plugin
pub trait Plugin {
    /// Commands, listener and cron tasks
    fn manifest() -> PluginManifest;

    /// One command, listener delivery or cron firing
    fn invoke(invocation: Invocation) -> ExecuteResult;
}

/// Buffers shared with the host.
///
/// Buffers are byte-aligned heap allocations addressed by their offset in
/// linear memory; `0` stands for "no buffer".
pub mod abi {
    use std::alloc::{alloc, dealloc, Layout};

    fn layout(len: i32) -> Option<Layout> {
        let len = usize::try_from(len).ok().filter(|&len| len > 0)?;
        Layout::from_size_align(len, 1).ok()
    }

    /// Allocate `len` bytes for the host to write into
    pub fn alloc_buffer(len: i32) -> i32 {
        match layout(len) {
            // SAFETY: the layout has a non-zero size
            Some(layout) => unsafe { alloc(layout) as usize as i32 },
            None => 0,
        }
    }

    /// Free a buffer from [`alloc_buffer`] or [`write_payload`]
    pub fn free_buffer(ptr: i32, len: i32) {
        if ptr == 0 {
            return;
        }
        if let Some(layout) = layout(len) {
            // SAFETY: the host only frees buffers we handed out, with their length
            unsafe { dealloc(ptr as usize as *mut u8, layout) }
        }
    }

    /// Pointer in the high half, length in the low half
    pub fn pack(ptr: i32, len: i32) -> i64 {
        ((ptr as i64) << 32) | (len as u32 as i64)
    }

    /// Encode `value` into a fresh buffer and return it packed
    pub fn write_payload<T: serde::Serialize>(value: &T) -> i64 {
        let Ok(bytes) = rmp_serde::to_vec(value) else {
            return 0;
        };
        let Ok(len) = i32::try_from(bytes.len()) else {
            return 0;
        };
        let ptr = alloc_buffer(len);
        if ptr == 0 {
            return 0;
        }
        // SAFETY: `ptr` was just allocated with room for `len` bytes
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as usize as *mut u8, bytes.len());
        }
        pack(ptr, len)
    }

    /// Decode the buffer at `ptr`
    ///
    /// # Safety
    /// `ptr` must point to `len` readable bytes.
    pub unsafe fn read_payload<T: serde::de::DeserializeOwned>(ptr: i32, len: i32) -> Option<T> {
        let len = usize::try_from(len).ok().filter(|&len| len > 0)?;
        if ptr == 0 {
            return None;
        }
        let bytes = std::slice::from_raw_parts(ptr as usize as *const u8, len);
        rmp_serde::from_slice(bytes).ok()
    }
}

/// Emit the Wasm exports for a [`Plugin`] implementation
#[macro_export]
macro_rules! export_plugin {
    ($plugin:ty) => {
        #[no_mangle]
        pub extern "C" fn plugin_manifest() -> i64 {
            $crate::abi::write_payload(&<$plugin as $crate::Plugin>::manifest())
        }

        #[no_mangle]
        pub extern "C" fn plugin_execute(ptr: i32, len: i32) -> i64 {
            let result = match unsafe { $crate::abi::read_payload::<$crate::Invocation>(ptr, len) } {
                Some(invocation) => <$plugin as $crate::Plugin>::invoke(invocation),
                None => $crate::ExecuteResult::error("malformed invocation"),
            };
            $crate::abi::write_payload(&result)
        }

        #[no_mangle]
        pub extern "C" fn plugin_alloc(len: i32) -> i32 {
            $crate::abi::alloc_buffer(len)
        }

        #[no_mangle]
        pub extern "C" fn plugin_dealloc(ptr: i32, len: i32) {
            $crate::abi::free_buffer(ptr, len)
        }
    };
}
