pub mod parser;
pub mod router;

pub use parser::ControlAction;
pub use router::CommandRouter;
