//! Terminal demos: stream one prompt, optionally followed by a canned batch.

use std::io::Write;
use std::time::Duration;

use tracing::info;

use crate::relay::console::ConsoleSink;
use crate::relay::{ModelVariant, Prompt, RelayOutcome, StreamRelay};

/// Per-variant demo script.
#[derive(Debug, Clone, Copy)]
pub struct DemoScript {
    pub title: &'static str,
    pub default_prompt: &'static str,
    pub batch: &'static [&'static str],
    pub batch_delay: Duration,
    /// Width of the rule under the title.
    pub title_width: usize,
    /// Width of the rules around each batch prompt banner.
    pub batch_banner_width: usize,
}

impl DemoScript {
    pub fn for_variant(variant: ModelVariant) -> Self {
        match variant {
            ModelVariant::Chat => Self {
                title: "🤖 DeepSeek streaming chat demo",
                default_prompt: "Briefly introduce the history of artificial intelligence in about 200 words.",
                batch: &[
                    "What is machine learning?",
                    "Explain the basic concepts of deep learning.",
                    "What are the applications of artificial intelligence in medicine?",
                ],
                batch_delay: Duration::from_secs(2),
                title_width: 60,
                batch_banner_width: 50,
            },
            ModelVariant::Reasoner => Self {
                title: "🤖 DeepSeek reasoner demo",
                default_prompt: "Why is the sky blue?",
                batch: &[
                    "Why does water freeze?",
                    "Why does the Earth rotate?",
                    "Why do humans need sleep?",
                    "Why are plants green?",
                ],
                batch_delay: Duration::from_secs(3),
                title_width: 80,
                batch_banner_width: 80,
            },
        }
    }
}

/// Relay a single prompt to `out` through a fresh [`ConsoleSink`].
pub async fn stream_prompt<W: Write + Send>(
    relay: &StreamRelay,
    prompt: &Prompt,
    out: &mut W,
) -> std::io::Result<RelayOutcome> {
    writeln!(out, "🚀 Sending request to {}...\n", relay.variant())?;
    writeln!(out, "📝 Prompt: {}\n", prompt.as_str())?;
    out.flush()?;

    let mut sink = ConsoleSink::new(&mut *out);
    Ok(relay.relay(prompt, &mut sink).await)
}

/// Run `prompts` one after another, pausing `delay` between them.
///
/// A failed prompt is reported and the batch moves on.
pub async fn run_batch<W: Write + Send>(
    relay: &StreamRelay,
    script: &DemoScript,
    prompts: &[Prompt],
    out: &mut W,
) -> std::io::Result<Vec<RelayOutcome>> {
    writeln!(out, "🔄 Running batch of {} prompts...", prompts.len())?;
    info!(count = prompts.len(), model = %relay.variant(), "Batch started");

    let rule = "=".repeat(script.batch_banner_width);
    let mut outcomes = Vec::with_capacity(prompts.len());

    for (i, prompt) in prompts.iter().enumerate() {
        writeln!(out, "\n{rule}")?;
        writeln!(out, "📋 Prompt {}/{}", i + 1, prompts.len())?;
        writeln!(out, "{rule}")?;

        outcomes.push(stream_prompt(relay, prompt, out).await?);

        if i + 1 < prompts.len() {
            writeln!(
                out,
                "\n⏳ Waiting {:.0?} before the next prompt...",
                script.batch_delay
            )?;
            out.flush()?;
            tokio::time::sleep(script.batch_delay).await;
        }
    }

    writeln!(out, "\n🎉 Batch finished")?;
    let failed = outcomes.iter().filter(|o| !o.is_completed()).count();
    info!(count = outcomes.len(), failed, "Batch finished");
    Ok(outcomes)
}

/// Entry point for the `chat` and `reason` subcommands.
pub async fn run<W: Write + Send>(
    relay: &StreamRelay,
    prompt: Option<String>,
    batch: bool,
    out: &mut W,
) -> anyhow::Result<Vec<RelayOutcome>> {
    let script = DemoScript::for_variant(relay.variant());
    let prompt = Prompt::new(prompt.unwrap_or_else(|| script.default_prompt.to_string()))?;

    writeln!(out, "{}", script.title)?;
    writeln!(out, "{}", "=".repeat(script.title_width))?;

    let mut outcomes = vec![stream_prompt(relay, &prompt, out).await?];

    if batch {
        let prompts = script
            .batch
            .iter()
            .map(|p| Prompt::new(*p))
            .collect::<Result<Vec<_>, _>>()?;
        outcomes.extend(run_batch(relay, &script, &prompts, out).await?);
    }

    Ok(outcomes)
}
