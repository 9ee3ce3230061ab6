use screenroom_ask::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let client = AskClient::from_env()?;
    let mut conversation = Conversation::new();

    let mut stream = client.ask(&mut conversation, "What was decided about the Q3 roadmap?")?;
    while let Some(event) = stream.next_event().await {
        conversation.apply(&event);
        match &event {
            AskEvent::AnswerDelta { delta, .. } => print!("{delta}"),
            AskEvent::CitationsUpdated { citations, .. } => {
                eprintln!("\n-- {} citation(s) so far --", citations.len());
            }
            AskEvent::Failed { failure, .. } => eprintln!("\nask failed: {failure}"),
            _ => {}
        }
    }
    println!();

    if let Some(turn) = conversation.latest_answer() {
        for citation in &turn.citations {
            println!(
                "[{}] {} at {}{}",
                citation.display_number,
                citation.title,
                citation.start,
                if citation.cited { "" } else { " (uncited)" },
            );
        }
    }
    Ok(())
}
