use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use tracing::debug;
use wmg_ai::{
    build_prompt, ContentForm, ContentProcessor, ProcessError, ProcessResponse, StyleOptions,
    ValidationError,
};
use wmg_config::WmgConfig;

#[derive(Parser)]
#[command(name = "wmg", version, about = "Improve a piece of writing with a completion model")]
struct Cli {
    /// Path to a `wmg.toml` config file (only read by `improve`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send the text to the completion endpoint and print the revised version
    Improve(ImproveArgs),
    /// Print the prompt that `improve` would send, without contacting the endpoint
    Prompt(PromptArgs),
}

#[derive(Args)]
struct StyleArgs {
    /// Text to process; read from stdin when omitted or `-`
    text: Option<String>,
    /// Fix grammar, spelling, and punctuation
    #[arg(long)]
    grammar: bool,
    /// Make the writing more creative
    #[arg(long)]
    creative: bool,
    /// Make the tone more professional
    #[arg(long)]
    professional: bool,
    /// Keep roughly the original length
    #[arg(long)]
    keep_length: bool,
}

impl StyleArgs {
    fn options(&self) -> StyleOptions {
        StyleOptions {
            improve_grammar: self.grammar,
            make_creative: self.creative,
            make_professional: self.professional,
            keep_length: self.keep_length,
        }
    }

    fn into_form(self) -> Result<ContentForm> {
        let options = self.options();
        let content = match self.text {
            Some(text) if text != "-" => text,
            _ => read_stdin()?,
        };
        Ok(ContentForm::new(content).with_options(options))
    }
}

#[derive(Args)]
struct ImproveArgs {
    #[command(flatten)]
    style: StyleArgs,
    /// Emit the `{success, data}` / `{error}` response as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct PromptArgs {
    #[command(flatten)]
    style: StyleArgs,
    /// Emit JSON suitable for scripting
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Improve(args) => {
            let request = match args.style.into_form()?.validate() {
                Ok(request) => request,
                Err(err) => return report_invalid_form(err, args.json),
            };

            let config = load_config(cli.config)?;
            wmg_config::init_tracing(&config);
            debug!(ai = ?config.ai, "loaded configuration");

            let processor = ContentProcessor::from_config(&config.ai)
                .context("failed to set up completion client")?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            let result = runtime.block_on(processor.process_request(request));

            let exit = if result.is_ok() { 0 } else { 1 };
            if args.json {
                print_json(&ProcessResponse::from(result))?;
            } else {
                match result {
                    Ok(processed) => {
                        println!("{}", processed.revised_text);
                        if !processed.suggestions.is_empty() {
                            println!();
                            println!("Suggestions:");
                            for suggestion in &processed.suggestions {
                                println!("- {suggestion}");
                            }
                        }
                    }
                    Err(err) => eprintln!("{err}"),
                }
            }
            Ok(exit)
        }
        Command::Prompt(args) => {
            let request = match args.style.into_form()?.validate() {
                Ok(request) => request,
                Err(err) => return report_invalid_form(err, args.json),
            };

            let prompt = build_prompt(&request);
            if args.json {
                print_json(&PromptEnvelope { prompt: &prompt })?;
            } else {
                println!("{prompt}");
            }
            Ok(0)
        }
    }
}

fn report_invalid_form(err: ValidationError, json: bool) -> Result<i32> {
    let err = ProcessError::InvalidForm(err);
    if json {
        print_json(&ProcessResponse::failure(&err))?;
    } else if let Some(detail) = err.validation_error() {
        eprintln!("{err}: {detail}");
    }
    Ok(1)
}

fn load_config(explicit: Option<PathBuf>) -> Result<WmgConfig> {
    let cwd = std::env::current_dir().context("failed to resolve current directory")?;
    let config = wmg_config::load_config(explicit.as_deref(), &cwd)?;
    Ok(config)
}

fn read_stdin() -> Result<String> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("failed to read text from stdin")?;
    // `echo text | wmg improve` should not send the shell's trailing newline.
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    Ok(text)
}

#[derive(Serialize)]
struct PromptEnvelope<'a> {
    prompt: &'a str,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}
