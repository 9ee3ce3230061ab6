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

    match client
        .collect(&mut conversation, "Summarize last week's all-hands.")
        .await?
    {
        AskOutcome::Answer(answer) => {
            println!("{}", answer.text);
            for citation in &answer.citations {
                println!("[{}] {} ({})", citation.display_number, citation.title, citation.start);
            }
        }
        AskOutcome::Clarification { question, .. } => {
            println!("The service needs more detail: {question}");
        }
        AskOutcome::Cancelled { .. } => println!("cancelled"),
    }
    Ok(())
}
