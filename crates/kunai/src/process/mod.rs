mod provider;
mod reader;
mod system;
pub mod value;

// Mock process backend for unit and integration tests
#[doc(hidden)]
pub mod mock;

pub use provider::{
    Architecture, ProcessInfo, ProcessProvider, RemoteProcess, process_name_matches,
    resolve_pointer_width,
};
pub use reader::{MemoryRegion, PointerWidth, ReadMemory, offset_address};
pub use system::{SystemProcess, SystemProcessProvider};
pub use value::{RemoteValue, ValueKind, round_hundredths, round_hundredths_f32};

#[doc(hidden)]
pub use mock::{MockMemoryBuilder, MockMemoryReader, MockProcess, MockProcessProvider};
