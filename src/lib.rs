pub mod config;
pub mod error;
pub mod node;
pub mod output;
pub mod shutdown;
pub mod source;
pub mod worker;

pub use error::{GshError, Result};
pub use node::Node;
pub use output::{OutputLine, OutputSink};
