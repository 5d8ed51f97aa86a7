use std::time::Duration;

use chrono::{TimeDelta, Utc};
use ergon::prelude::*;
use serde_json::json;

const DEFAULT_URL: &str = "http://localhost:8080";
const DEFAULT_QUEUE: &str = "demo";
const URL: &str = "ERGON_URL";
const QUEUE: &str = "ERGON_QUEUE";
const TOKEN: &str = "ERGON_TOKEN";

const SUBJECT: &str = "demo.greet";
const ROUNDS: usize = 5;

#[tokio::main]
pub async fn main() -> ergon::Result<()> {
    let url = std::env::var(URL).unwrap_or_else(|_| DEFAULT_URL.to_owned());
    let queue = std::env::var(QUEUE).unwrap_or_else(|_| DEFAULT_QUEUE.to_owned());
    let token = std::env::var(TOKEN).unwrap_or_default();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let client = Client::builder(url, queue, token)
        .with_retry(RetryConfig::default().with_max_retries(5))
        .build()?;

    if !client.ping().await {
        tracing::error!("Ergon is not reachable");
        return Ok(());
    }

    let job = client
        .simple_push(Some("greetings"), SUBJECT, Utc::now(), json!({"name": "world"}))
        .await?;
    println!("Inserted job {:?}", job.id);

    let delayed = Job::builder(client.queue_id(), SUBJECT)
        .with_payload(json!({"name": "later"}))
        .with_max_retries(2)
        .run_in(TimeDelta::seconds(2))
        .build();
    client.push(&[delayed]).await?;

    let schedule = client
        .simple_schedule(None, SUBJECT, 1, json!({"name": "every minute"}))
        .await?;
    println!("Created schedule {:?}", schedule.id);

    for _ in 0..ROUNDS {
        for job in client.pull_wait(Duration::from_secs(5), 10).await? {
            if greet(&job) {
                client.ack(&job).await?;
            } else {
                client
                    .nack_with_delay(&job, Utc::now() + TimeDelta::seconds(10))
                    .await?;
            }
        }
    }

    if let Some(schedule_id) = &schedule.id {
        client.delete_schedule(schedule_id).await?;
    }
    client.delete_jobs_with_key("greetings").await?;

    Ok(())
}

fn greet(job: &Job) -> bool {
    match job.payload.get("name").and_then(|name| name.as_str()) {
        Some(name) => {
            println!("{} running, hello {name}", job.subject);
            true
        }
        None => false,
    }
}
