//! Device model for the simulation kernels.
//!
//! Every pass of the simulation is expressed as a *dispatch*: a named kernel run over a number
//! of independent lanes. Lanes of one dispatch run in parallel on the rayon thread pool and all of
//! them finish before the dispatch returns, so a dispatch is a barrier for everything that
//! depends on its output.
//!
//! Lanes may only mutate shared state through:
//! - the slot they own ([`Dispatcher::map`]),
//! - a write-once slot they are the designated owner of ([`Dispatcher::scatter`]),
//! - an atomic slot claim ([`AppendBuffer::append`]),
//! - an exact fixed-point atomic add ([`FixedPointAccumulator::add`]).

mod append;
mod atomic;
mod buffer;
mod dispatch;

pub use append::AppendBuffer;
pub use atomic::FixedPointAccumulator;
pub use buffer::Buffer;
pub use dispatch::{thread_groups, DispatchStats, Dispatcher, Kernel, KernelFamily};
