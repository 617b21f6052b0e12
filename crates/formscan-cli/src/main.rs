mod display;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use formscan_ai::{DEFAULT_ENDPOINT, DEFAULT_MODEL, Extractor, ExtractorConfig, ImageNormalizer};
use formscan_core::{DomainProfile, IdentifierMinter, SchemaError};
use formscan_intake::{FormError, GateError, GateState, RecordForm, ScanSession};
use formscan_store::{MemoryStore, OrderBy, RecordStore};

#[derive(Parser)]
#[command(name = "formscan")]
#[command(about = "Turn photos of paper forms into validated records")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    model: ModelArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ModelArgs {
    /// API key for the extraction model
    #[arg(long, global = true, env = "FORMSCAN_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, global = true, env = "FORMSCAN_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(long, global = true, env = "FORMSCAN_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Deadline for one extraction call
    #[arg(long, global = true, default_value_t = 30)]
    timeout_secs: u64,

    #[arg(long, global = true, default_value_t = 0.1)]
    temperature: f32,
}

impl ModelArgs {
    fn config(&self) -> Result<ExtractorConfig> {
        let api_key = self
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .context("no API key: pass --api-key or set FORMSCAN_API_KEY")?;
        Ok(ExtractorConfig {
            api_key,
            model: self.model.clone(),
            endpoint: self.endpoint.clone(),
            temperature: self.temperature,
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

#[derive(Args)]
struct ReviewArgs {
    /// Document profile (employee, inventory)
    #[arg(short, long)]
    profile: String,

    /// Override a field before confirming, e.g. --set email=asha@example.com
    #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
    edits: Vec<(String, String)>,

    /// Print the reviewed extraction and stop before confirming
    #[arg(long)]
    review_only: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the document profiles and their fields
    Profiles,
    /// Extract a record from a photo or scan
    Scan {
        image: PathBuf,

        #[command(flatten)]
        review: ReviewArgs,

        /// Send the image as-is instead of downscaling to JPEG
        #[arg(long)]
        passthrough: bool,

        #[arg(long, default_value_t = 1600)]
        max_width: u32,

        /// JPEG quality, 1-100
        #[arg(long, default_value_t = 85)]
        quality: u8,
    },
    /// Extract a record from already-recognised text (a file, or - for stdin)
    ParseText {
        input: PathBuf,

        #[command(flatten)]
        review: ReviewArgs,
    },
}

fn parse_assignment(s: &str) -> std::result::Result<(String, String), String> {
    let (field, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got {s:?}"))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("missing field name in {s:?}"));
    }
    Ok((field.to_string(), value.to_string()))
}

fn profile_named(name: &str) -> Result<&'static DomainProfile> {
    DomainProfile::by_name(name).with_context(|| {
        let known: Vec<_> = DomainProfile::all().iter().map(|p| p.name).collect();
        format!("unknown profile {name:?} (expected one of: {})", known.join(", "))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Profiles => {
            for profile in DomainProfile::all() {
                display::print_profile(profile);
            }
        }
        Commands::Scan {
            image,
            review,
            passthrough,
            max_width,
            quality,
        } => {
            let profile = profile_named(&review.profile)?;
            let extractor = Extractor::gemini(&cli.model.config()?)?;
            let normalizer = if passthrough {
                ImageNormalizer::pass_through()
            } else {
                ImageNormalizer::downscale(max_width, quality)
            };

            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("failed to read {}", image.display()))?;
            let mut session = ScanSession::new(profile);
            session.select_image(image.display().to_string(), bytes)?;

            info!(profile = profile.name, image = %image.display(), "scanning");
            if session.process(&normalizer, &extractor).await? == GateState::Error {
                bail!("{}", session.error().unwrap_or("the image could not be processed"));
            }
            finish(session, &review).await?;
        }
        Commands::ParseText { input, review } => {
            let profile = profile_named(&review.profile)?;
            let extractor = Extractor::gemini(&cli.model.config()?)?;
            let text = read_text(&input).await?;

            info!(profile = profile.name, chars = text.len(), "parsing text");
            let extraction = extractor.extract_text(&text, profile).await;
            finish(ScanSession::reviewing(profile, extraction), &review).await?;
        }
    }

    Ok(())
}

async fn read_text(input: &Path) -> Result<String> {
    if input == Path::new("-") {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("failed to read stdin")?;
        Ok(text)
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("failed to read {}", input.display()))
    }
}

/// Review, confirm, fill the record form and submit it.
async fn finish(mut session: ScanSession, review: &ReviewArgs) -> Result<()> {
    let profile = session.profile();

    // Extracted fields are edited at the gate; record-only fields (the
    // generated identifier) wait for the form.
    let mut form_edits = Vec::new();
    for (field, value) in &review.edits {
        match session.edit(field, value) {
            Ok(()) => {}
            Err(GateError::Field(SchemaError::UnknownField(_))) if field != "confidence" => {
                form_edits.push((field, value));
            }
            Err(e) => return Err(e).with_context(|| format!("cannot set {field}")),
        }
    }

    let result = session.result().context("nothing to review")?;
    display::print_review(profile, result, session.notice());
    if review.review_only {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    let draft = session.confirm(&mut IdentifierMinter::new())?;
    let mut form = RecordForm::prefilled(profile, draft);
    for (field, value) in form_edits {
        form.set(field, value)
            .with_context(|| format!("cannot set {field}"))?;
    }

    let store = MemoryStore::new();
    let id = match form.submit(&store).await {
        Ok(id) => id,
        Err(FormError::Invalid(violations)) => {
            display::print_violations(&violations);
            bail!("record was not saved");
        }
        Err(e) => return Err(e.into()),
    };

    let mut records = store.subscribe(profile.collection, OrderBy::default());
    let record = records
        .next()
        .await
        .and_then(|snapshot| snapshot.into_iter().find(|r| r.id == id));
    match record {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => warn!(id = %id, "saved record not visible in its collection"),
    }
    Ok(())
}

