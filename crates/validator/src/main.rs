use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use appvalidator::report::ErrorBundle;
use appvalidator::{is_remote, validate_hosted_app, validate_packaged_app, ValidatorConfig};
use appvalidator_js::JsBackend;
use clap::{Parser, ValueEnum};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    Builtin,
    Spidermonkey,
    Acorn,
}

/// Validates open web app packages and hosted manifests.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a packaged app (zip or directory), or the URL of a hosted manifest
    package: String,

    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Show descriptions and context for every message
    #[arg(short, long)]
    verbose: bool,

    /// Disable coloured output
    #[arg(long)]
    boring: bool,

    /// The app is not headed for the marketplace
    #[arg(long)]
    unlisted: bool,

    /// Seconds the validation may take; 0 disables the guard
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Keep running later tiers after a tier fails
    #[arg(long)]
    determined: bool,

    /// Stop at the first failing tier
    #[arg(long)]
    no_determined: bool,

    /// Fetch icons and other resources the manifest points at
    #[arg(long)]
    fetch_resources: bool,

    #[arg(long, value_enum)]
    js_backend: Option<Backend>,

    /// SpiderMonkey shell used by the spidermonkey backend
    #[arg(long, value_name = "PATH")]
    spidermonkey: Option<PathBuf>,

    /// JSON configuration file; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Cli {
    fn config(&self) -> appvalidator::Result<ValidatorConfig> {
        let mut config = match &self.config {
            Some(path) => ValidatorConfig::from_file(path)?,
            None => ValidatorConfig::default(),
        };

        if self.unlisted {
            config.listed = false;
        }
        if let Some(seconds) = self.timeout {
            config.timeout = (seconds > 0).then(|| Duration::from_secs(seconds));
        }
        if self.no_determined {
            config.determined = false;
        } else if self.determined {
            config.determined = true;
        }
        if self.fetch_resources {
            config.fetch_resources = true;
        }

        let backend = match (self.js_backend, self.spidermonkey.clone()) {
            (Some(Backend::Builtin), _) => Some(JsBackend::Builtin),
            (Some(Backend::Acorn), _) => Some(JsBackend::Acorn { node: PathBuf::from("node") }),
            (Some(Backend::Spidermonkey), Some(path)) | (None, Some(path)) => Some(JsBackend::Spidermonkey { path }),
            (Some(Backend::Spidermonkey), None) => {
                return Err(appvalidator::ValidatorError::Config(
                    "the spidermonkey backend needs --spidermonkey PATH".to_string(),
                ))
            }
            (None, None) => None,
        };
        if let Some(backend) = backend {
            config.js_backend = backend;
        }

        config.check()?;
        Ok(config)
    }
}

fn render(err: &ErrorBundle, output: OutputFormat, verbose: bool, boring: bool) -> String {
    match output {
        OutputFormat::Text => err.print_summary(verbose, boring),
        OutputFormat::Json => match err.render_json() {
            Ok(json) => json,
            Err(e) => {
                log::error!("Could not render the report: {}", e);
                String::new()
            }
        },
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = match cli.config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("appvalidator: {}", e);
            return ExitCode::FAILURE;
        }
    };
    log::info!("Validating {} with appvalidator v{}", cli.package, env!("CARGO_PKG_VERSION"));

    let err = if is_remote(&cli.package) {
        validate_hosted_app(&cli.package, &config)
    } else {
        validate_packaged_app(&cli.package, &config)
    };

    println!("{}", render(&err, cli.output, cli.verbose, cli.boring));
    if err.failed(false) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
