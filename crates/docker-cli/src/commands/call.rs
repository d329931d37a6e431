//! Send a request file through a service manager

use super::{base_dir, load_config, render_body};
use crate::cli::OutputFormat;
use crate::error::{CliError, CliResult};
use crate::request_file::RequestFile;
use crate::utils::{format_duration, write_output_data, ColoredOutput};
use docker_service::{
    DataDecoder, DownloadedFile, FileDecoder, Request, RequestKind, Response, ResponseDecoder,
    ServiceCall, ServiceManager,
};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct CallArgs {
    pub file: String,
    pub config: Option<String>,
    pub demo: bool,
    pub fixtures: Option<String>,
    pub retries: Option<u32>,
    pub format: OutputFormat,
    pub output: Option<String>,
    pub show_headers: bool,
}

pub struct CallCommand;

impl CallCommand {
    pub async fn run(args: CallArgs) -> CliResult<()> {
        let path = Path::new(&args.file);
        info!("Loading request from file: {}", path.display());
        let definition = RequestFile::load(path)?;
        let mut request =
            definition.to_request(base_dir(path), args.fixtures.as_deref().map(Path::new))?;
        if args.demo {
            request.demo.enabled = true;
        }

        let config = load_config(args.config.as_deref())?;
        let manager = ServiceManager::from_config(&config)?;
        let retries = args.retries.unwrap_or(definition.retries);

        let started = Instant::now();
        if matches!(request.kind, RequestKind::Download(_)) {
            let response = Self::send(&manager, request, FileDecoder, retries).await?;
            Self::print_status(&response, started.elapsed(), args.show_headers);
            if let Some(DownloadedFile::Path(path)) =
                response.result.as_ref().and_then(|result| result.value())
            {
                println!("{} {}", ColoredOutput::success("Saved to"), path.display());
            }
            Self::finish(&response, &args)
        } else {
            let response = Self::send(&manager, request, DataDecoder, retries).await?;
            Self::print_status(&response, started.elapsed(), args.show_headers);
            Self::finish(&response, &args)
        }
    }

    async fn send<D: ResponseDecoder>(
        manager: &ServiceManager,
        request: Request,
        decoder: D,
        retries: u32,
    ) -> CliResult<Response<D>> {
        let call = ServiceCall::new(request, decoder).with_automatic_retries(retries);
        let handle = manager.call(call)?;
        Ok(handle.response().await?)
    }

    fn print_status<D: ResponseDecoder>(response: &Response<D>, elapsed: Duration, show_headers: bool) {
        let url = response
            .url()
            .map(|url| url.to_string())
            .unwrap_or_else(|| response.request.url_description());
        let demo = if response.sent_in_demo_mode { " (demo)" } else { "" };
        println!(
            "{} {} {} {}{}",
            ColoredOutput::status(response.status_code),
            ColoredOutput::highlight(response.request.method.as_str()),
            url,
            ColoredOutput::dim(&format_duration(elapsed)),
            ColoredOutput::dim(demo)
        );

        if show_headers {
            if let Some(headers) = response.headers() {
                for (name, value) in headers {
                    println!(
                        "{}: {}",
                        ColoredOutput::dim(name.as_str()),
                        value.to_str().unwrap_or("<binary>")
                    );
                }
            }
        }
    }

    /// Print or save the body, failing the command when the call failed
    fn finish<D: ResponseDecoder>(response: &Response<D>, args: &CallArgs) -> CliResult<()> {
        if !response.data.is_empty() {
            let body = render_body(&response.data, args.format)?;
            match &args.output {
                Some(output) => {
                    write_output_data(output, &body)?;
                    println!("{} Output written to: {}", ColoredOutput::success("✓"), output);
                }
                None => println!("{}", body),
            }
        }

        match response.result.as_ref().and_then(|result| result.error()) {
            Some(error) => {
                warn!("Call failed: {}", error);
                Err(CliError::CallFailed(error.to_string()))
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(file: &Path, fixtures: &Path) -> CallArgs {
        CallArgs {
            file: file.display().to_string(),
            config: None,
            demo: true,
            fixtures: Some(fixtures.display().to_string()),
            retries: None,
            format: OutputFormat::Json,
            output: None,
            show_headers: false,
        }
    }

    fn demo_request(dir: &Path, failure_chance: f64) -> std::path::PathBuf {
        let path = dir.join("status.yaml");
        std::fs::write(
            &path,
            format!(
                r#"
service:
  base_url: https://api.test
  path: /status
demo:
  success_file: ok.json
  failure_file: down.json
  failure_chance: {}
"#,
                failure_chance
            ),
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn test_demo_call_succeeds_from_fixtures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ok.json"), r#"{"status": "up"}"#).unwrap();
        let file = demo_request(dir.path(), 0.0);

        let mut args = args(&file, dir.path());
        let output = dir.path().join("out/body.json");
        args.output = Some(output.display().to_string());

        CallCommand::run(args).await.unwrap();
        assert_eq!(std::fs::read_to_string(output).unwrap(), r#"{"status":"up"}"#);
    }

    #[tokio::test]
    async fn test_demo_failure_fails_the_command() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("down.json"), r#"{"status": "down"}"#).unwrap();
        let file = demo_request(dir.path(), 1.0);

        let err = CallCommand::run(args(&file, dir.path())).await.unwrap_err();
        assert!(matches!(err, CliError::CallFailed(_)));
    }

    #[tokio::test]
    async fn test_missing_request_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CallCommand::run(args(&dir.path().join("absent.yaml"), dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::FileNotFound(_)));
    }
}
