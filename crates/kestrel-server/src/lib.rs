//! Authoritative kestrel server: gameplay systems, message handlers, the
//! tick-driven runtime and the async process around it.

pub mod app;
pub mod handlers;
pub mod router;
pub mod runtime;
pub mod settings;
pub mod systems;

pub use app::{ServerApp, run};
pub use router::{HandlerContext, MessageHandler, MessageRouter};
pub use runtime::{Outgoing, ServerRuntime};
pub use settings::SimSettings;
