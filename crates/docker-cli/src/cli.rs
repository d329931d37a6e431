//! CLI argument definitions using clap

use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;

#[derive(Parser)]
#[command(
    name = "docker",
    about = "Docker - declarative HTTP service calls with demo mode and automatic retry",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Service manager configuration (YAML or JSON)
    #[arg(long, global = true, env = "DOCKER_SERVICE_CONFIG", help = "Service manager configuration file")]
    pub config: Option<String>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send the request described in a request file
    Call {
        /// Request file path (YAML or JSON)
        #[arg(help = "Request file to send")]
        file: String,

        /// Serve the call from demo fixtures instead of the network
        #[arg(long, help = "Force demo mode for this call")]
        demo: bool,

        /// Directory demo fixtures are read from
        #[arg(long, help = "Directory containing demo fixture files")]
        fixtures: Option<String>,

        /// Override the automatic retries declared in the file
        #[arg(long, help = "Automatic retries when no response arrives")]
        retries: Option<u32>,

        #[arg(long, value_enum, default_value = "pretty", help = "Output format for the body")]
        format: OutputFormat,

        #[arg(long, help = "Save the response body to file")]
        output: Option<String>,

        #[arg(long, help = "Print response headers")]
        show_headers: bool,
    },

    /// Build the wire request from a request file without sending it
    Validate {
        /// Request file path (YAML or JSON)
        #[arg(help = "Request file to validate")]
        file: String,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    /// Pretty-printed JSON when the body is JSON
    Pretty,
    /// Compact JSON
    Json,
    /// YAML format
    Yaml,
    /// Body as received
    Raw,
}

impl OutputFormat {
    /// Format a JSON value according to the output format
    pub fn format_json(&self, value: &JsonValue) -> Result<String, serde_json::Error> {
        match self {
            Self::Pretty => serde_json::to_string_pretty(value),
            Self::Json | Self::Raw => serde_json::to_string(value),
            Self::Yaml => serde_yaml::to_string(value).map_err(|e| {
                serde_json::Error::io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("YAML serialization error: {}", e),
                ))
            }),
        }
    }
}
