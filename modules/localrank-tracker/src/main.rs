use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use localrank_common::Config;
use localrank_tracker::competitor::phone_hint;
use localrank_tracker::{RankTracker, SignatureInputs};
use serp_client::RenderClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("localrank_tracker=info".parse()?)
                .add_directive("serp_client=info".parse()?),
        )
        .init();

    info!("LocalRank tracker starting...");

    // Load config
    let config = Config::from_env();
    config.log_redacted();

    let client = RenderClient::new(&config.render_base_url, config.render_token.as_deref());

    let inputs = SignatureInputs {
        display_name: config.business_name.clone(),
        canonical_name: config.canonical_name.clone(),
        stop_words: config.stop_words.clone(),
    };

    let tracker = RankTracker::new(&client, &client);
    let run = tracker
        .resolve_keyword_rankings(&inputs, &config.city, &config.keywords)
        .await;

    // Caller-facing summary table; persistence/report generation live
    // outside this binary.
    println!(
        "\n{:<32} {:>10}  {:<36} {:>6}  {:<16}",
        "Keyword", "Your rank", "Top competitor", "Rank", "Phone"
    );
    for row in &run.rows {
        let (competitor_title, competitor_rank, phone) = match &row.competitor.record {
            Some(record) => (
                record.title.clone(),
                row.competitor
                    .rank
                    .map(|r| r.to_string())
                    .unwrap_or_default(),
                phone_hint(record).unwrap_or_default(),
            ),
            None => ("No competitor found".to_string(), String::new(), String::new()),
        };
        println!(
            "{:<32} {:>10}  {:<36} {:>6}  {:<16}",
            row.keyword,
            row.rank.to_string(),
            competitor_title,
            competitor_rank,
            phone
        );
    }

    info!(
        run_id = %run.run_id,
        status = ?run.status,
        rows = run.rows.len(),
        "Run finished"
    );

    Ok(())
}
