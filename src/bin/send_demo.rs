//! Demo that pushes one fabricated post through the Telegram sender.
//! Needs TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID in the environment.

use chrono::Utc;
use tweet_relay_bot::notify::telegram::{TelegramClient, TelegramNotifier};
use tweet_relay_bot::notify::Notifier;
use tweet_relay_bot::sources::Tweet;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let token = std::env::var("TELEGRAM_BOT_TOKEN")?;
    let chat_id: i64 = std::env::var("TELEGRAM_CHAT_ID")?.parse()?;

    let client = TelegramClient::new(token, reqwest::Client::new());
    let notifier = TelegramNotifier::new(client, chat_id);

    let tweet = Tweet {
        id: "0".to_string(),
        text: "Demo post from send_demo. If you can read this, the sender works.".to_string(),
        created_at: Utc::now(),
        media: vec![],
    };
    notifier.notify_tweet("demo", "Demo source", &tweet).await?;

    println!("send-demo done");
    Ok(())
}
