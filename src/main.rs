use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{Context, bail};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use lead_qualifier::classify::{
    ClassificationRequest, ClassificationResult, Classifier, parse_classification,
};
use lead_qualifier::config::EngineConfig;
use lead_qualifier::content::load_catalog;
use lead_qualifier::error::ClassifyError;
use lead_qualifier::flow::{StateMachineConfig, StateMachineContext, validate};
use lead_qualifier::llm::ChatMessage;
use lead_qualifier::turn::TurnProcessor;

const USAGE: &str = "usage:
  lead-qualifier lint <flow.yaml|flow.json>
  lead-qualifier replay <flow> [content-catalog] < classifier-replies.jsonl";

/// Feeds recorded classifier replies back through the parser, one per turn.
struct ReplayClassifier {
    replies: Mutex<VecDeque<String>>,
}

#[async_trait]
impl Classifier for ReplayClassifier {
    async fn classify(
        &self,
        _request: &ClassificationRequest,
    ) -> Result<ClassificationResult, ClassifyError> {
        let next = self
            .replies
            .lock()
            .map_err(|_| ClassifyError::Unavailable("replay queue poisoned".into()))?
            .pop_front();
        match next {
            Some(raw) => Ok(parse_classification(&raw)),
            None => Err(ClassifyError::Unavailable("no recorded reply left".into())),
        }
    }
}

fn lint(flow_path: &str) -> anyhow::Result<()> {
    let config = StateMachineConfig::load(flow_path)?;
    let issues = validate(&config);
    if issues.is_empty() {
        println!("{flow_path}: ok ({} states)", config.states.len());
        return Ok(());
    }
    for issue in &issues {
        println!("{flow_path}: {issue}");
    }
    bail!("{} issue(s) found", issues.len());
}

async fn replay(flow_path: &str, catalog_path: Option<&str>) -> anyhow::Result<()> {
    let config = StateMachineConfig::load(flow_path)?;
    let catalog = match catalog_path {
        Some(path) => load_catalog(path)?,
        None => Vec::new(),
    };

    let mut replies = VecDeque::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if !line.trim().is_empty() {
            replies.push_back(line);
        }
    }
    let turns = replies.len();
    info!(flow = %config.flow, turns, "Replaying recorded classifier replies");

    let classifier = Arc::new(ReplayClassifier {
        replies: Mutex::new(replies),
    });
    let processor = TurnProcessor::new(classifier, catalog, EngineConfig::from_env());

    let mut context = StateMachineContext::new(&config);
    let mut history: Vec<ChatMessage> = Vec::new();
    for turn in 1..=turns {
        let message = format!("(replayed turn {turn})");
        let outcome = processor
            .process_turn(&config, &context, &history, &message)
            .await;
        println!("{}", serde_json::to_string(&outcome)?);

        history.push(ChatMessage::user(message));
        if let Some(ref prompt) = outcome.next_prompt {
            history.push(ChatMessage::assistant(prompt.clone()));
        }
        context = outcome.advancement.context;
        if outcome.advancement.is_complete {
            info!(state = %context.current_state_id, turn, "Flow complete");
            break;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["lint", flow] => lint(flow),
        ["replay", flow] => replay(flow, None).await,
        ["replay", flow, catalog] => replay(flow, Some(*catalog)).await,
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
}
