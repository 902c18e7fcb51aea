use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use social_client::{Config, SocialClient};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,social_client=debug".into());

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    let client = SocialClient::from_config(&config).context("Failed to build client")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] | ["feed"] => print_feed(&client).await,
        ["like", post_id, user_id] => like(&client, post_id, user_id).await,
        ["save", post_id, account_id] => save(&client, post_id, account_id).await,
        _ => bail!("usage: snapgram [feed | like <post> <user> | save <post> <account>]"),
    }
}

async fn print_feed(client: &SocialClient) -> Result<()> {
    let mut paginator = client.paginator();
    let mut page_number = 1;

    while !paginator.is_exhausted() {
        let page = paginator.next_page().await.context("Failed to fetch feed page")?;
        info!(page = page_number, posts = page.posts.len(), "Fetched feed page");
        println!("{}", serde_json::to_string_pretty(&page.posts)?);
        page_number += 1;
    }

    Ok(())
}

async fn like(client: &SocialClient, post_id: &str, user_id: &str) -> Result<()> {
    let post = client.get_post(post_id).await.context("Failed to load post")?;
    let likes = client.like_controller(&post);

    let snapshot = likes.toggle_like(user_id)?;
    println!("liked={} count={}", snapshot.liked, snapshot.count);

    likes.settled().await;
    if let Some(error) = likes.last_error() {
        bail!("Like was rolled back: {}", error);
    }
    println!("persisted likes={}", likes.like_count());
    Ok(())
}

async fn save(client: &SocialClient, post_id: &str, account_id: &str) -> Result<()> {
    let user = client
        .current_user(account_id)
        .await
        .context("Failed to load current user")?;
    let saves = client.save_controller(&user, post_id);

    let saved = saves.toggle_save().await?;
    println!("saved={}", saved);
    Ok(())
}
