//! Build a request file into its wire form without sending it

use super::{base_dir, load_config, render_body};
use crate::cli::OutputFormat;
use crate::error::{CliError, CliResult};
use crate::request_file::RequestFile;
use crate::utils::ColoredOutput;
use docker_service::{ReqwestTransport, RequestKind, Transport, WireRequest};
use std::path::Path;
use tracing::info;

pub struct ValidateCommand;

impl ValidateCommand {
    pub fn run(file: &str, config: Option<&str>) -> CliResult<()> {
        let wire = Self::build(file, config)?;
        println!("{} Request is valid", ColoredOutput::success("✓"));
        println!("{} {}", ColoredOutput::highlight(wire.method.as_str()), wire.url);
        for (name, value) in &wire.headers {
            println!(
                "{}: {}",
                ColoredOutput::dim(name.as_str()),
                value.to_str().unwrap_or("<binary>")
            );
        }
        if let Some(body) = &wire.body {
            println!();
            println!("{}", render_body(body, OutputFormat::Pretty)?);
        }
        Ok(())
    }

    /// Load the request file and build the wire request the transport would receive
    pub fn build(file: &str, config: Option<&str>) -> CliResult<WireRequest> {
        let path = Path::new(file);
        let request = RequestFile::load(path)?.to_request(base_dir(path), None)?;
        let config = load_config(config)?;
        let transport = ReqwestTransport::from_config(&config.transport)
            .map_err(|e| CliError::General(e.to_string()))?;

        request.validate_multipart()?;
        let wire = request.build_wire_request(&transport.default_headers())?;

        match &request.kind {
            RequestKind::Data => {}
            RequestKind::UploadFile(file) => info!("Uploads file {}", file.display()),
            RequestKind::UploadMultipart => info!(
                "Uploads {} multipart part(s)",
                request.multipart_parts.as_ref().map_or(0, Vec::len)
            ),
            RequestKind::Download(destination) => {
                info!("Downloads to {}", destination.resolve(&wire.url).display())
            }
        }
        Ok(wire)
    }
}
