use anyhow::{Context, Result};
use clap::Parser;
use spoken_eval::audio::{decoder, encoder, stretch};
use spoken_eval::pronunciation::cli::{Cli, Command, EvaluateArgs, StretchArgs};
use spoken_eval::pronunciation::ModeDispatcher;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Evaluate(args) => handle_evaluate(&args),
        Command::Stretch(args) => handle_stretch(&args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_evaluate(args: &EvaluateArgs) -> Result<()> {
    let config = args.engine_config()?;
    let dispatcher = ModeDispatcher::from_config(&config)?;
    let request = args.request()?;
    let result = match args.mode.evaluation_mode() {
        Some(_) => dispatcher.evaluate(request)?,
        None => dispatcher.evaluate_legacy(request)?,
    };
    let json = if args.pretty {
        serde_json::to_string_pretty(&result)
    } else {
        serde_json::to_string(&result)
    }
    .context("failed to serialize evaluation result")?;
    println!("{json}");
    Ok(())
}

fn handle_stretch(args: &StretchArgs) -> Result<()> {
    args.validate()?;
    let audio = decoder::decode_file(&args.input)?;
    let stretched = stretch::change_tempo(&audio, args.factor)?;
    encoder::encode_wav(&stretched, &args.output)?;
    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        factor = args.factor,
        seconds = stretched.duration_seconds(),
        "stretched recording written"
    );
    Ok(())
}
