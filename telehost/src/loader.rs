//! Wasm module loading
//!
//! Modules run under wasmtime with a fuel budget per call. Guests get no
//! imports at all (no WASI), only their own linear memory, which the host
//! reads and writes to exchange MessagePack payloads.
//!
//! Guest ABI:
//!
//! | export            | signature              |
//! |-------------------|------------------------|
//! | `memory`          | linear memory          |
//! | `plugin_manifest` | `() -> i64`            |
//! | `plugin_execute`  | `(ptr, len) -> i64`    |
//! | `plugin_alloc`    | `(len) -> ptr`         |
//! | `plugin_dealloc`  | `(ptr, len)`           |
//!
//! An `i64` result packs a pointer in its high half and a length in its low
//! half.

use telehost_plugin_api::{ExecuteResult, Invocation, PluginManifest, API_VERSION};
use thiserror::Error;
use wasmtime::{
    Config, Engine, Instance, Linker, Memory, Module, Store, Trap, TypedFunc, WasmParams,
    WasmResults,
};

/// Fuel granted to each guest call
const FUEL_PER_CALL: u64 = 10_000_000;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Failed to set up the Wasm engine: {0}")]
    Engine(#[source] anyhow::Error),

    #[error("Not a valid Wasm module: {0}")]
    Compile(#[source] anyhow::Error),

    #[error("Module could not be instantiated: {0}")]
    Instantiate(#[source] anyhow::Error),

    #[error("Module does not export {0}")]
    MissingExport(&'static str),

    #[error("Guest call {export} trapped: {source}")]
    Trap {
        export: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Guest ran out of fuel in {0}")]
    FuelExhausted(&'static str),

    #[error("Plugin API version {actual} is not supported (host speaks {expected})")]
    ApiVersionMismatch { expected: u32, actual: u32 },

    #[error("Malformed guest payload: {0}")]
    Decode(#[source] rmp_serde::decode::Error),

    #[error("Could not encode invocation: {0}")]
    Encode(#[source] rmp_serde::encode::Error),

    #[error("Guest memory access out of range: {0}")]
    GuestMemory(String),
}

impl LoaderError {
    fn from_call(export: &'static str, e: anyhow::Error) -> Self {
        match e.downcast_ref::<Trap>() {
            Some(Trap::OutOfFuel) => LoaderError::FuelExhausted(export),
            _ => LoaderError::Trap { export, source: e },
        }
    }
}

/// Split a packed `(ptr, len)` pair
fn unpack(packed: i64) -> (i32, i32) {
    ((packed >> 32) as i32, packed as i32)
}

fn typed<P, R>(
    instance: &Instance,
    store: &mut Store<()>,
    name: &'static str,
) -> Result<TypedFunc<P, R>, LoaderError>
where
    P: WasmParams,
    R: WasmResults,
{
    instance
        .get_typed_func::<P, R>(store, name)
        .map_err(|_| LoaderError::MissingExport(name))
}

/// Copy `len` bytes at `ptr` out of guest memory
fn read_guest(
    store: &Store<()>,
    memory: &Memory,
    ptr: i32,
    len: i32,
) -> Result<Vec<u8>, LoaderError> {
    let data = memory.data(store);
    let range = usize::try_from(ptr)
        .ok()
        .zip(usize::try_from(len).ok())
        .and_then(|(start, len)| Some(start..start.checked_add(len)?))
        .filter(|range| range.end <= data.len())
        .ok_or_else(|| {
            LoaderError::GuestMemory(format!("ptr={} len={} memory={}", ptr, len, data.len()))
        })?;
    Ok(data[range].to_vec())
}

/// Compiles and instantiates plugin modules
pub struct PluginLoader {
    engine: Engine,
}

/// A module that passed loading, with the manifest it declared
pub struct LoadedPlugin {
    pub manifest: PluginManifest,
    pub instance: PluginInstance,
}

/// A live module instance
pub struct PluginInstance {
    store: Store<()>,
    memory: Memory,
    alloc: TypedFunc<i32, i32>,
    dealloc: TypedFunc<(i32, i32), ()>,
    execute: TypedFunc<(i32, i32), i64>,
}

impl PluginLoader {
    pub fn new() -> Result<Self, LoaderError> {
        let mut config = Config::new();
        config.consume_fuel(true);
        config.wasm_memory64(false);

        Ok(Self {
            engine: Engine::new(&config).map_err(LoaderError::Engine)?,
        })
    }

    /// Compile `wasm`, bind the guest exports and read its manifest
    pub fn load(&self, wasm: &[u8]) -> Result<LoadedPlugin, LoaderError> {
        let module = Module::new(&self.engine, wasm).map_err(LoaderError::Compile)?;

        let mut store = Store::new(&self.engine, ());
        let instance = Linker::new(&self.engine)
            .instantiate(&mut store, &module)
            .map_err(LoaderError::Instantiate)?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or(LoaderError::MissingExport("memory"))?;

        let mut plugin = PluginInstance {
            alloc: typed(&instance, &mut store, "plugin_alloc")?,
            dealloc: typed(&instance, &mut store, "plugin_dealloc")?,
            execute: typed(&instance, &mut store, "plugin_execute")?,
            memory,
            store,
        };
        let manifest_fn: TypedFunc<(), i64> =
            typed(&instance, &mut plugin.store, "plugin_manifest")?;

        let manifest: PluginManifest = plugin.exchange("plugin_manifest", |store| {
            manifest_fn.call(store, ())
        })?;

        if manifest.api_version != API_VERSION {
            return Err(LoaderError::ApiVersionMismatch {
                expected: API_VERSION,
                actual: manifest.api_version,
            });
        }

        Ok(LoadedPlugin {
            manifest,
            instance: plugin,
        })
    }
}

impl PluginInstance {
    /// Run one guest call that returns a packed MessagePack payload, decode
    /// the payload and hand its buffer back to the guest.
    ///
    /// Each call starts with a full fuel tank.
    fn exchange<T, F>(&mut self, export: &'static str, call: F) -> Result<T, LoaderError>
    where
        T: serde::de::DeserializeOwned,
        F: FnOnce(&mut Store<()>) -> anyhow::Result<i64>,
    {
        self.store
            .set_fuel(FUEL_PER_CALL)
            .map_err(LoaderError::Engine)?;

        let packed = call(&mut self.store).map_err(|e| LoaderError::from_call(export, e))?;
        let (ptr, len) = unpack(packed);
        let bytes = read_guest(&self.store, &self.memory, ptr, len)?;

        if let Err(e) = self.dealloc.call(&mut self.store, (ptr, len)) {
            tracing::trace!(export, error = %e, "Guest failed to free its result");
        }

        rmp_serde::from_slice(&bytes).map_err(LoaderError::Decode)
    }

    /// Hand an invocation to the guest and read back its result
    pub fn execute(&mut self, invocation: &Invocation) -> Result<ExecuteResult, LoaderError> {
        let input = rmp_serde::to_vec(invocation).map_err(LoaderError::Encode)?;
        let input_len = i32::try_from(input.len())
            .map_err(|_| LoaderError::GuestMemory(format!("input of {} bytes", input.len())))?;

        let input_ptr = self
            .alloc
            .call(&mut self.store, input_len)
            .map_err(|e| LoaderError::from_call("plugin_alloc", e))?;
        let offset = usize::try_from(input_ptr)
            .map_err(|_| LoaderError::GuestMemory(format!("alloc returned {}", input_ptr)))?;
        self.memory
            .write(&mut self.store, offset, &input)
            .map_err(|e| LoaderError::GuestMemory(e.to_string()))?;

        let execute = self.execute.clone();
        let result = self.exchange("plugin_execute", |store| {
            execute.call(store, (input_ptr, input_len))
        });

        if let Err(e) = self.dealloc.call(&mut self.store, (input_ptr, input_len)) {
            tracing::trace!(error = %e, "Guest failed to free its input");
        }
        result
    }
}
