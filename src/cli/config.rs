//! Conversion of CLI arguments into a validated batch job

use crate::catalog::CatalogConfig;
use crate::cli::main_impl::Cli;
use crate::{
    config::{BatchJob, ModelSelector, OutputLayout, RemovalSettings, RgbColor},
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};
use std::path::PathBuf;

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the job for one run; every malformed argument is reported before any work starts
    pub(crate) fn from_cli(cli: &Cli) -> Result<BatchJob> {
        let source = cli
            .source
            .clone()
            .context("A source directory is required")?;

        let model: ModelSelector = cli.model.parse().context("Invalid model")?;
        let fill_color: RgbColor = cli
            .background_color
            .parse()
            .context("Invalid background color")?;
        let (backend_type, execution_provider) =
            ExecutionProviderManager::parse_provider_string(&cli.execution_provider)
                .context("Invalid execution provider format")?;

        let catalog = if cli.publish {
            Self::load_catalog(cli)?
        } else {
            None
        };

        let job = BatchJob::builder(source)
            .layout(Self::layout(cli))
            .model(model)
            .fill_color(fill_color)
            .scan_codes(cli.scan_codes)
            .delete_source(!cli.keep_source)
            .eject_media(cli.eject)
            .workers(cli.workers)
            .removal(RemovalSettings {
                backend_type,
                execution_provider,
                intra_threads: cli.threads,
                model_dir: cli.model_dir.clone(),
                allow_download: !cli.no_download,
            })
            .catalog(catalog)
            .build()?;
        Ok(job)
    }

    fn layout(cli: &Cli) -> OutputLayout {
        let root = cli
            .output_root
            .clone()
            .unwrap_or_else(OutputLayout::default_root);
        let defaults = OutputLayout::under(&root);
        let pick = |flag: &Option<PathBuf>, default: PathBuf| flag.clone().unwrap_or(default);

        OutputLayout {
            original: pick(&cli.original_dir, defaults.original),
            no_background: pick(&cli.nb_dir, defaults.no_background),
            no_background_trimmed: pick(&cli.nb_trimmed_dir, defaults.no_background_trimmed),
            trimmed: pick(&cli.trimmed_dir, defaults.trimmed),
        }
    }

    fn load_catalog(cli: &Cli) -> Result<Option<CatalogConfig>> {
        let path = match &cli.secret_file {
            Some(path) => path.clone(),
            None => CatalogConfig::default_secret_path()
                .context("Cannot locate the home directory for the secret file")?,
        };
        CatalogConfig::load_or_create_template(&path)
            .with_context(|| format!("Failed to load catalog credentials from {}", path.display()))
    }
}
