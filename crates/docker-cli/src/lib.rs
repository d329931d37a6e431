pub mod cli;
pub mod commands;
pub mod error;
pub mod request_file;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat};
pub use error::{CliError, CliResult};
pub use request_file::RequestFile;
pub use utils::{init_tracing, ColoredOutput};
