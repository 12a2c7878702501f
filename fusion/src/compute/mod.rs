//! Device model: physical device, context (logical device + hardware queue)
//! and logical compute queues, plus kernel building.

mod context;
mod program;
mod queue;

pub use self::context::{ComputeContext, DeviceKey};
pub use self::program::Program;
pub use self::queue::{Compatibility, ComputeQueue, QueueIdentity};

pub(crate) use self::program::buffer_entry;
