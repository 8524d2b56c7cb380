//! qdt-prebuild - quiz dataset prebuild pipeline
//!
//! **Usage:**
//! ```bash
//! qdt-prebuild [--config <file>] [--domain <name>] <command>
//! ```
//!
//! `init` creates the store from `<data>/tests.json`; the other commands run
//! one stage against it. `run --from <step>` resumes the pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use qdt_common::config::{load_config, PrebuildConfig};
use qdt_prebuild::doctor::{TextCanonicalDoctor, TextSanityDoctor, TextTranslationDoctor};
use qdt_prebuild::llm::{CachedLlm, ChatCompletionsClient, LlmService, RetryPolicy, RetryingLlm, StringCache};
use qdt_prebuild::overrides::TextOverrides;
use qdt_prebuild::parser::JsonSourceParser;
use qdt_prebuild::stages::{
    ComposeMode, ComposeStage, DoctorStage, QuestionCommentService, QuestionCommentStage,
    TranslateStage,
};
use qdt_prebuild::translation::{LlmTranslator, TextTranslator};
use qdt_prebuild::{BootstrapMode, Pipeline, PipelineStep, PrebuildBuilder, PrebuildStore, StoreOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

type ProductionLlm = CachedLlm<RetryingLlm<ChatCompletionsClient>>;

/// Quiz dataset prebuild pipeline
#[derive(Parser, Debug)]
#[clap(name = "qdt-prebuild", version)]
#[clap(about = "Build and enrich the multi-language prebuild store")]
struct Args {
    /// Configuration file (overrides QDT_CONFIG and ./qdt-prebuild.toml)
    #[clap(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Domain to work on (overrides the configured one)
    #[clap(long)]
    domain: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the store from the source dataset
    Init {
        /// Drop an existing store instead of refusing to overwrite it
        #[clap(long)]
        recreate: bool,
    },
    /// Top up tests with questions from the rest of the dataset
    Compose,
    /// Apply the override table
    Override,
    /// Write edited translations back into the override table
    DumpOverrides,
    /// Fill missing translations
    Translate,
    /// Generate missing question comments
    Comment,
    /// Run the doctor checks
    Doctor,
    /// Run the pipeline from a step to the end
    Run {
        #[clap(long, default_value = "override")]
        from: PipelineStep,
    },
}

fn init_tracing(config: &PrebuildConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();
}

/// Cached, retrying LLM client whose responses live in `<cache>/<domain>/<name>.json`
fn open_llm(config: &PrebuildConfig, name: &str) -> Result<Arc<ProductionLlm>> {
    let client = ChatCompletionsClient::from_config(&config.llm)
        .context("Failed to create LLM client")?;
    let policy = RetryPolicy {
        max_attempts: config.llm.max_retries,
        delay: Duration::from_millis(config.llm.retry_delay_ms),
    };
    let cache_path = StringCache::path_for(&config.cache_dir(), &config.domain, name);
    let cache = StringCache::open(&cache_path)
        .with_context(|| format!("Failed to open cache {}", cache_path.display()))?;
    Ok(Arc::new(CachedLlm::new(RetryingLlm::new(client, policy), cache)))
}

fn compose_stage(config: &PrebuildConfig) -> Result<ComposeStage> {
    let mode: ComposeMode = config.compose_mode.parse()?;
    Ok(ComposeStage::new(mode, config.questions_per_test, config.random_seed))
}

/// LLM-backed services opened for a run, flushed when it ends
#[derive(Default)]
struct LlmCaches {
    opened: Vec<Arc<ProductionLlm>>,
}

impl LlmCaches {
    fn open(&mut self, config: &PrebuildConfig, name: &str) -> Result<Arc<ProductionLlm>> {
        let llm = open_llm(config, name)?;
        self.opened.push(llm.clone());
        Ok(llm)
    }

    async fn flush(&self) {
        for llm in &self.opened {
            if let Err(e) = llm.flush().await {
                error!(error = %e, "Failed to flush LLM cache");
            }
        }
    }

    fn translate_stage(&mut self, config: &PrebuildConfig) -> Result<TranslateStage> {
        let llm = self.open(config, "translation")?;
        let translator = LlmTranslator::new(llm, config.test_type.clone());
        Ok(TranslateStage::new(TextTranslator::new(
            Arc::new(translator),
            config.languages.clone(),
        )))
    }

    fn comment_stage(&mut self, config: &PrebuildConfig) -> Result<QuestionCommentStage> {
        let llm: Arc<dyn LlmService> = self.open(config, "question_comment")?;
        Ok(QuestionCommentStage::new(QuestionCommentService::new(
            llm,
            config.test_type.clone(),
            config.images_dir.clone(),
        )))
    }

    fn doctor_stage(&mut self, config: &PrebuildConfig) -> Result<DoctorStage> {
        let mut stage = DoctorStage::new(config.doctor.workers).with_doctor(TextSanityDoctor::new());
        if config.doctor.canonical {
            let llm: Arc<dyn LlmService> = self.open(config, "doctor_canonical")?;
            stage = stage.with_doctor(TextCanonicalDoctor::new(
                llm,
                config.test_type.clone(),
                config.images_dir.clone(),
            ));
        }
        if config.doctor.translation {
            let llm: Arc<dyn LlmService> = self.open(config, "doctor_translation")?;
            stage = stage.with_doctor(TextTranslationDoctor::new(llm, config.test_type.clone()));
        }
        Ok(stage)
    }
}

async fn run_command(
    command: Command,
    config: &PrebuildConfig,
    builder: &PrebuildBuilder,
    caches: &mut LlmCaches,
) -> Result<()> {
    match command {
        Command::Init { recreate } => {
            let parser = JsonSourceParser::new(&config.data_path);
            let mode = if recreate {
                BootstrapMode::Recreate
            } else {
                BootstrapMode::Preserve
            };
            builder
                .run_init(&parser, &mut compose_stage(config)?, mode)
                .await
                .context("init failed")?;
        }
        Command::Compose => {
            builder
                .run_compose(&mut compose_stage(config)?)
                .await
                .context("compose failed")?;
        }
        Command::Override => {
            let overrides = TextOverrides::load(config.overrides_path())?;
            builder.run_override(&overrides).await.context("override failed")?;
        }
        Command::DumpOverrides => {
            let mut overrides = TextOverrides::load(config.overrides_path())?;
            builder
                .run_dump_overrides(&mut overrides)
                .await
                .context("dump-overrides failed")?;
        }
        Command::Translate => {
            let mut stage = caches.translate_stage(config)?;
            builder.run_translate(&mut stage).await.context("translate failed")?;
        }
        Command::Comment => {
            let mut stage = caches.comment_stage(config)?;
            builder
                .run_question_comment(&mut stage)
                .await
                .context("comment failed")?;
        }
        Command::Doctor => {
            let mut stage = caches.doctor_stage(config)?;
            builder.run_doctor(&mut stage).await.context("doctor failed")?;
        }
        Command::Run { from } => {
            let mut pipeline = Pipeline {
                overrides: TextOverrides::load(config.overrides_path())?,
                translate: caches.translate_stage(config)?,
                comment: caches.comment_stage(config)?,
                doctor: caches.doctor_stage(config)?,
            };
            builder
                .run_from(from, &mut pipeline)
                .await
                .with_context(|| format!("pipeline run from '{}' failed", from))?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(domain) = args.domain {
        config.domain = domain;
    }
    init_tracing(&config);

    info!("Starting qdt-prebuild {}", env!("CARGO_PKG_VERSION"));
    info!(domain = %config.domain, "Prebuild directory: {}", config.prebuild_dir().display());

    let store = PrebuildStore::open(
        &config.prebuild_dir(),
        StoreOptions {
            backup: true,
            backup_retention: config.backup_retention,
        },
    )
    .await
    .context("Failed to open prebuild store")?;
    let builder = PrebuildBuilder::new(store, config.languages.clone());

    let mut caches = LlmCaches::default();
    let result = run_command(args.command, &config, &builder, &mut caches).await;
    // Keep paid responses even when the stage failed
    caches.flush().await;
    builder.close().await;

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}
