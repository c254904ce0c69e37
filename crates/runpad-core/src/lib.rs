pub mod error;
pub use error::CoreError;

pub mod relay;
pub use relay::{Relay, RelayMessage, RelayReceiver};

pub mod registry;
pub use registry::{ProcessHandle, ProcessRegistry, Registration};

pub mod batch;
pub use batch::BatchCoordinator;

pub mod sink;
pub use sink::{LogSink, MemorySink, WriterSink};

pub mod drain;
pub use drain::DrainLoop;
